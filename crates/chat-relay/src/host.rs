//! Host game server integration
//!
//! The bridge consumes two things from the host: a way to show text to
//! every local participant, and a predicate that marks bots.

use chat_relay_core::Participant;

/// Primitives the host game server provides to the bridge
pub trait Host: Send + Sync + 'static {
    /// Show `text` to every local participant
    fn broadcast(&self, text: &str);

    /// Whether the participant is host-controlled (not a human)
    fn is_host_controlled(&self, participant: &Participant) -> bool;
}

/// Strip a positional audio tag: the marker and everything after it
pub fn strip_audio_tag<'a>(text: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return text;
    }
    match text.find(marker) {
        Some(position) => &text[..position],
        None => text,
    }
}
