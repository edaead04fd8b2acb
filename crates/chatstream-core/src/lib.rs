pub mod app;
pub mod error;
pub mod preferences;
pub mod utils;

pub use error::{Error, Result};
