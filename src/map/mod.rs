pub mod poi;
pub use poi::*;
pub mod route_map;
pub use route_map::*;
pub mod loader;
