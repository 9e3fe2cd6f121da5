//! CLI-specific utilities for playlist-dl
//!
//! This module contains code specific to the command-line interface,
//! separate from the core library functionality.

pub mod progress;
pub mod quality;

pub use progress::ProgressManager;
pub use quality::unknown_quality_message;
