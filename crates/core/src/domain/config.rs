//! Watchdog configuration
//!
//! A [`Config`] is built once from the process arguments, validated, and then
//! shared read-only for the life of the process.

use crate::domain::audio::{ParseScopeError, Scope};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Substring identifying the virtual pass-through device
pub const DEFAULT_PROXY_MARKER: &str = "eqMac";

/// Errors that can occur while building a configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Target device name must not be empty")]
    EmptyTargetName,

    #[error("{name} must be a number between 0 and 1, got {value}")]
    VolumeOutOfRange { name: &'static str, value: f32 },

    #[error("Default volume {default} exceeds dangerous volume {dangerous}; every correction would trigger another")]
    DefaultExceedsDangerous { default: f32, dangerous: f32 },

    #[error("Proxy marker must not be empty")]
    EmptyProxyMarker,

    #[error(transparent)]
    UnknownScope(#[from] ParseScopeError),
}

/// Immutable, validated watchdog parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Exact display name of the device to protect
    pub target_device_name: String,

    /// Volume written on activation and after every clamp
    pub default_volume: f32,

    /// Volumes strictly above this are clamped
    pub dangerous_volume: f32,

    /// Channel for the activation write (0 = master)
    pub channel: u32,

    /// Scope for the activation write
    pub scope: Scope,

    /// Substring identifying the pass-through proxy device
    pub proxy_marker: String,
}

impl Config {
    pub fn new(
        target_device_name: impl Into<String>,
        default_volume: f32,
        dangerous_volume: f32,
        channel: u32,
        scope: Scope,
    ) -> Result<Self> {
        let target_device_name = target_device_name.into();
        if target_device_name.is_empty() {
            return Err(ConfigError::EmptyTargetName);
        }

        check_volume("default volume", default_volume)?;
        check_volume("dangerous volume", dangerous_volume)?;

        if default_volume > dangerous_volume {
            return Err(ConfigError::DefaultExceedsDangerous {
                default: default_volume,
                dangerous: dangerous_volume,
            });
        }

        Ok(Self {
            target_device_name,
            default_volume,
            dangerous_volume,
            channel,
            scope,
            proxy_marker: DEFAULT_PROXY_MARKER.to_string(),
        })
    }

    /// Replace the proxy marker substring
    pub fn with_proxy_marker(mut self, marker: impl Into<String>) -> Result<Self> {
        let marker = marker.into();
        if marker.is_empty() {
            return Err(ConfigError::EmptyProxyMarker);
        }
        self.proxy_marker = marker;
        Ok(self)
    }

    /// Whether a reading must be clamped
    pub fn is_dangerous(&self, volume: f32) -> bool {
        volume > self.dangerous_volume
    }
}

fn check_volume(name: &'static str, value: f32) -> Result<()> {
    // NaN fails the range check
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::VolumeOutOfRange { name, value })
    }
}
