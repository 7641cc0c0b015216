//! Single-link relay bridge between a game server and an external chat bot
//!
//! This crate provides:
//! - Line-delimited wire protocol (outbound records, four-line inbound frames)
//! - Transport abstractions (LineReader/RecordWriter traits) and stream wrappers
//! - Connection supervisor holding at most one peer
//! - Heartbeat timer slot and the self-healing relay lifecycle
//! - Host integration hooks

pub mod bridge;
pub mod heartbeat;
pub mod host;
pub mod protocol;
pub mod relay;
pub mod supervisor;
pub mod tcp;
pub mod transport;

pub use bridge::Bridge;
pub use heartbeat::{Pulse, TimerSlot};
pub use host::{Host, strip_audio_tag};
pub use protocol::{Accumulator, encode};
pub use relay::Relay;
pub use supervisor::{ConnectionInfo, Supervisor};
pub use transport::{LineReader, RecordWriter, reader_task};

pub use chat_relay_core::{
    InboundFrame, OutboundEvent, Participant, RelayConfig, RelayError, Result,
};
