pub mod config;
pub mod error;
pub mod types;

pub use config::TasklaneConfig;
pub use error::{CoreError, Result};
pub use types::*;
