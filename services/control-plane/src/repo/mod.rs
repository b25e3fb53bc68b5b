pub mod commands;
pub mod device_events;
pub mod devices;
pub mod enrollment;
pub mod sessions;
pub mod telemetry;
