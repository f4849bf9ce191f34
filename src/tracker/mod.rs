pub mod animator;

pub use animator::{AnimatedVehicle, Coordinate, Reconciler};
