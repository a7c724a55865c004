mod edit_distance;
mod logmath;

pub use edit_distance::*;
pub use logmath::*;
