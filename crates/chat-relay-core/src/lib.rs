//! # chat-relay-core
//!
//! Core types shared by the chat relay bridge.
//!
//! This crate provides:
//! - Error taxonomy and result alias
//! - Relay configuration
//! - Outbound events and inbound frames
//! - Host participant type

pub mod config;
pub mod error;
pub mod event;
pub mod participant;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use event::{InboundFrame, OutboundEvent};
pub use participant::Participant;
