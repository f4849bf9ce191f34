pub mod batcher;
pub mod pipeline;
pub mod stream;

pub use batcher::{RiderBatcher, TelemetryBatcher, VehicleSnapshot};
