//! Audio subsystem backends
//!
//! - `pulse_backend`: PulseAudio/PipeWire through the `pactl` tool
//! - `memory_backend`: in-process simulated host used by the integration tests
//!
//! Both fan notifications out through the shared [`Registry`].

pub mod memory_backend;
pub mod pulse_backend;
pub mod pulse_events;
pub mod registry;

pub use memory_backend::{MemoryAudioHost, VolumeWrite};
pub use pulse_backend::{Pactl, PulseAudioSubsystem, SinkInfo};
pub use registry::Registry;
