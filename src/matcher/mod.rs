pub mod boarding;
pub mod clients;
pub mod history;
pub mod proximity;

pub use boarding::BoardingDetector;
pub use clients::{ClassifierClient, PaymentClient};
pub use history::{LocationHistory, LocationSample};
pub use proximity::ProximityRanker;
