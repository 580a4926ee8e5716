//! # Configuration Management
//!
//! Typed settings for one invocation. The CLI layer resolves flags, the config
//! file and the environment into these structs (see `cli::config`).

pub mod settings;

pub use settings::{validate_path_component, BrokerConfig, SessionSettings};
