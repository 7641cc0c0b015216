//! Outbound events and inbound frames

/// Event relayed from the host to the remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// A participant joined the host session
    Connect { name: String },

    /// A participant left the host session
    Disconnect { name: String },

    /// A chat line from a participant
    Message { sender: String, text: String },

    /// Liveness check
    Heartbeat,
}

impl OutboundEvent {
    /// Wire keyword for this event
    pub fn keyword(&self) -> &'static str {
        match self {
            OutboundEvent::Connect { .. } => "CONNECT",
            OutboundEvent::Disconnect { .. } => "DISCONNECT",
            OutboundEvent::Message { .. } => "MESSAGE",
            OutboundEvent::Heartbeat => "HEARTBEAT",
        }
    }
}

/// A complete four-line frame received from the remote peer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InboundFrame {
    pub message_type: String,
    pub sender: String,
    pub source: String,
    pub body: String,
}

impl InboundFrame {
    /// Text broadcast to local participants for this frame
    pub fn broadcast_text(&self) -> String {
        format!("[{}] {}: {}", self.source, self.sender, self.body)
    }
}
