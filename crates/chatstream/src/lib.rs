pub mod cli;
pub mod commands;
pub mod error;

pub use chatstream_core::{app, preferences, utils};
