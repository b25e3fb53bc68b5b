//! HTTP Control Surface (§4.H): plain JSON request/response handlers, no
//! long-lived connections. Each submodule owns one resource area; shared
//! error-response helpers live in `response`.

pub mod commands;
pub mod devices;
pub mod enrollment;
pub mod events;
pub mod pairing;
pub mod response;
