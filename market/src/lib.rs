pub mod cloud;
pub mod errors;
pub mod provider;
pub mod scripted;
pub mod types;

pub use errors::PriceError;
pub use provider::PriceProvider;
pub use types::{HISTORY_LEN, PriceSample};
