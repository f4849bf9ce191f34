pub mod loader;
pub mod types;

pub use loader::{load_shape_index, GtfsError};
pub use types::{RoutePoint, ShapeIndex};
