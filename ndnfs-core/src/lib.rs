//! File access over Named Data Networking: naming, packet model and the
//! fetch table with its retry policy.
//! Host-driven: no I/O; host passes events and performs the returned actions.

pub mod config;
pub mod error;
pub mod fetch;
pub mod name;
pub mod namespace;
pub mod packet;
pub mod segment;
pub mod tlv;
pub mod wire;

pub use config::{Config, RetryPolicy};
pub use error::{ConfigError, FetchError};
pub use fetch::{Action, Admission, FetchEntry, FetchTable};
pub use name::{Component, Name};
pub use namespace::{Namespace, MAX_PAYLOAD_SIZE};
pub use packet::{ContentType, Data, Inbound, Interest, Nack, NackReason, Packet};
pub use tlv::{decode_nni, encode_nni, NniError};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
