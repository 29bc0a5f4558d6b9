//! Core types, traits, and primitives for the sync layer.
//!
//! This module contains the building blocks shared by the scheduler and the
//! VFS sync operations.

pub mod atomic;
pub mod config;
pub mod error;
pub mod time;

pub use config::*;
pub use error::*;
