//! Wire-level vocabulary shared between the control-plane service and any
//! agent/viewer/operator client: the binary relay frame codec, the JSON
//! payloads carried inside relay frames, and the JSON message sets for the
//! signaling switchboard, the admin socket, and the HTTP control surface.
//!
//! This crate has no I/O of its own — it only defines shapes and the codec
//! that turns bytes into [`frame::Frame`]s and back.

pub mod admin;
pub mod frame;
pub mod http_api;
pub mod messages;
pub mod signaling;

pub use admin::{AdminClientMessage, AdminServerMessage, DeviceEventMessage, SubscriptionFilters};
pub use frame::{message_type, Frame, FrameError, RelayCodec, CONTROL_CHANNEL, HEADER_LEN};
pub use http_api::HttpErrorEnvelope;
pub use signaling::{PeerRole, SignalingClientMessage, SignalingServerMessage};
