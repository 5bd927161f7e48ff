//! Debug telemetry that goes beyond plain `tracing` events.

pub mod prompt_dump;
