use clap::Parser;
use log::{debug, info};
use rtd::detect::{model, traj, Analyzer};
use rtd::map::loader;
use rtd::utils;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "RTD")]
#[command(version = "0.1")]
#[command(about = "detect the transit route or stop you are at using rust", long_about = None)]
struct Args {
    /// speed above which routes are preferred over stops (m/s)
    #[arg(long, default_value_t = 3.0)]
    on_route_speed: f64,
    /// samples averaged per poi, current one included
    #[arg(long, default_value_t = 3)]
    averaging_window: usize,
    /// history buffer capacity
    #[arg(long, default_value_t = 10)]
    history_capacity: usize,
    /// point to segment precision (m)
    #[arg(long, default_value_t = 0.1)]
    segment_precision: f64,
    /// ceiling for route candidates when moving fast (m), 0 leaves it off
    #[arg(long, default_value_t = 0.0)]
    max_route_distance: f64,
    /// accuracy used for fixes that carry none (m)
    #[arg(long, default_value_t = 10.0)]
    accuracy: f64,
    /// directory with routes/sections/platforms/platformBounds csv.zlib files
    #[arg(short, long, value_name = "MAP_DIR")]
    map_dir: PathBuf,

    /// input gps traj (.geojson or .wkt)
    #[arg(value_name = "GPS_TRAJ_FILE")]
    input_file: PathBuf,
}

fn main() {
    utils::log::log_init();
    let args = Args::parse();
    debug!("{:?}", args);

    // 配置
    let config = model::Config {
        on_route_speed: args.on_route_speed,
        averaging_window: args.averaging_window,
        history_capacity: args.history_capacity,
        segment_precision: args.segment_precision,
        max_route_distance: if args.max_route_distance > 0.0 {
            Some(args.max_route_distance)
        } else {
            None
        },
    };

    info!("try load pois from {}", args.map_dir.display());
    let pois = loader::load_pois_from_dir(&args.map_dir).expect("load pois failed: ");
    let mut analyzer = Analyzer::new(config);
    analyzer.update_pois(&pois);

    let positions =
        traj::read_positions(&args.input_file, args.accuracy).expect("read gps traj failed: ");
    for (index, position) in positions.into_iter().enumerate() {
        analyzer
            .update_position(position)
            .expect("update position failed: ");
        let status = analyzer.get_status();
        info!(
            "fix {} ({:.6}, {:.6}) {}: guesses {:?}, nearby platforms {:?}",
            index,
            position.latitude,
            position.longitude,
            analyzer.state().name(),
            status.guess_ids(),
            status
                .nearby_platforms
                .iter()
                .map(|p| p.poi.get_name())
                .collect::<Vec<_>>()
        );
    }
}
