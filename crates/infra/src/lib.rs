//! Platform audio backends for the volume watchdog

pub mod audio;
