pub mod model;
pub use model::*;
pub mod history;
pub use history::*;
pub mod distance;
pub use distance::*;
pub mod state;
pub use state::*;
pub mod analyzer;
pub use analyzer::*;
pub mod traj;
