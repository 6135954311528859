pub mod config;
pub mod error;
pub mod period;
pub mod types;

pub use config::Config;
pub use error::EchomanError;
pub use period::{Period, PeriodKey};
pub use types::*;
