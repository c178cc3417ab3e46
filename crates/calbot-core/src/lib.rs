//! # Calbot Core
//! Entry model, recurrence rules, collaborator traits and configuration.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{CalbotConfig, ChannelSettings, LifecycleConfig};
pub use error::{CalbotError, Result};
