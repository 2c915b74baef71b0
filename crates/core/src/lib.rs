//! Volume watchdog core
//!
//! Platform-independent reconciliation of notification subscriptions and the
//! threshold watchdog that clamps a device's volume back to a safe default.

pub mod domain;
