pub mod config;
pub mod error;
pub mod worker;

pub use config::Config;
pub use error::{AddressError, LaunchError, StartupError};
pub use worker::WorkerHandle;
