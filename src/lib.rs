pub mod algorithm;
pub mod detect;
pub mod map;
pub mod utils;
