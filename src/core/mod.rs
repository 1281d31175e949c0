//! Core domain models
//!
//! Configuration, platforms, pipeline presets, steps and run state.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod platform;
pub mod state;
pub mod step;

pub use config::*;
pub use error::*;
pub use pipeline::*;
pub use platform::*;
pub use state::*;
pub use step::*;
