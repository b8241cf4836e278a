//! Configuration module for launchkit.
//!
//! Manages launcher settings stored as JSON.

mod settings;

pub use settings::{Settings, DEFAULT_DOWNLOAD_BASE, DEFAULT_LIBRARIES_BASE};
