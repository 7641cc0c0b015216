//! Line-delimited wire protocol between the bridge and the remote peer
//!
//! Outbound records are the event keyword followed by its fields, joined
//! with a bare `\n` and terminated by `\r\n`:
//!
//! ```text
//! CONNECT\n<name>\r\n
//! DISCONNECT\n<name>\r\n
//! MESSAGE\n<sender>\n<text>\r\n
//! HEARTBEAT\r\n
//! ```
//!
//! Inbound frames are exactly four lines: type, sender, source, body.
//! Boundaries are positional only.
//!
//! Field values are not escaped. A name or text containing `\n` or `\r\n`
//! shifts the peer's line framing.

use chat_relay_core::{InboundFrame, OutboundEvent};

/// Terminator appended to every outbound record
pub const RECORD_TERMINATOR: &str = "\r\n";

/// Separator between fields of one outbound record
pub const FIELD_SEPARATOR: char = '\n';

/// Serialize an outbound event to its wire record
pub fn encode(event: &OutboundEvent) -> Vec<u8> {
    let mut record = String::from(event.keyword());
    match event {
        OutboundEvent::Connect { name } | OutboundEvent::Disconnect { name } => {
            record.push(FIELD_SEPARATOR);
            record.push_str(name);
        }
        OutboundEvent::Message { sender, text } => {
            record.push(FIELD_SEPARATOR);
            record.push_str(sender);
            record.push(FIELD_SEPARATOR);
            record.push_str(text);
        }
        OutboundEvent::Heartbeat => {}
    }
    record.push_str(RECORD_TERMINATOR);
    record.into_bytes()
}

/// Partial inbound frame state for one connection
///
/// A slot holding the empty string counts as unfilled. A peer that sends an
/// empty type, sender or source line therefore never advances past that
/// slot, and every later frame on the connection is read one line out of
/// phase. Only a new connection resets this.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Accumulator {
    message_type: String,
    message_sender: String,
    message_source: String,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received line; returns the frame once its body arrives
    pub fn feed(&mut self, line: &str) -> Option<InboundFrame> {
        if self.message_type.is_empty() {
            self.message_type = line.to_string();
            return None;
        }

        if self.message_sender.is_empty() {
            self.message_sender = line.to_string();
            return None;
        }

        if self.message_source.is_empty() {
            self.message_source = line.to_string();
            return None;
        }

        let frame = InboundFrame {
            message_type: std::mem::take(&mut self.message_type),
            sender: std::mem::take(&mut self.message_sender),
            source: std::mem::take(&mut self.message_source),
            body: line.to_string(),
        };
        Some(frame)
    }

    /// True when no header slot is filled
    pub fn is_empty(&self) -> bool {
        self.message_type.is_empty()
            && self.message_sender.is_empty()
            && self.message_source.is_empty()
    }

    /// Number of header lines received for the pending frame
    pub fn pending_lines(&self) -> usize {
        [&self.message_type, &self.message_sender, &self.message_source]
            .iter()
            .filter(|slot| !slot.is_empty())
            .count()
    }
}
