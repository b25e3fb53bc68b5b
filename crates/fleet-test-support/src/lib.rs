// fleet-test-support: shared test utilities for control-plane integration tests.
//
// Provides WebSocket test clients that speak the relay binary frame format
// and the plain-JSON signaling/admin formats, so integration tests can drive
// a real in-process axum router without a browser or a real device agent.

pub mod json_client;
pub mod relay_client;

pub use json_client::JsonTestClient;
pub use relay_client::RelayTestClient;
