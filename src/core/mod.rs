//! Core library modules for playlist-dl
//!
//! This module contains the implementation behind the public API in `lib.rs`.

pub mod config;
pub mod convert;
pub mod error;
pub mod location;
pub mod naming;
pub mod playlist;
pub mod resolver;
pub mod stream;
pub mod transfer;
pub mod transport;
