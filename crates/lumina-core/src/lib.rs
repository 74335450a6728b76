//! # lumina-core
//!
//! Core types, traits, and error handling for the Lumina light show executor.

pub mod command;
pub mod config;
pub mod error;
pub mod sink;
pub mod types;

pub use command::{Command, CommandKind};
pub use config::Config;
pub use error::{Error, Result};
pub use sink::{CommandSink, StatusPublisher};
pub use types::*;
