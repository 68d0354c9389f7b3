//! Chat platform connectivity for Nodus.
//!
//! This crate provides:
//! - A WebSocket gateway session with heartbeats and automatic reconnection
//! - An in-process event bus and time-boxed event collectors
//! - Domain objects whose REST actions are tunneled through the task service
//! - The [`Bot`] that owns all of the above

pub mod bot;
pub mod cache;
pub mod collector;
pub mod error;
pub mod events;
pub mod gateway;
pub mod models;
pub mod protocol;
pub mod rest;

pub use bot::Bot;
pub use cache::BotCache;
pub use collector::{
    Collectable, Collected, Collector, CollectorEnd, CollectorEvent, CollectorOptions, EndReason,
};
pub use error::DiscordError;
pub use events::{DispatchEvent, EventBus, EventKind, GatewayEvent, ListenerId};
pub use gateway::{GatewayConfig, GatewaySession, SessionState};
pub use models::{Channel, Guild, Interaction, Member, Message, MessageContent, User};
pub use protocol::GatewayPayload;
pub use rest::{Method, RestClient, ScriptRunner, TaskRunner};

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, DiscordError>;
