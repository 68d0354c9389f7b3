//! Client for the Tickrate remote task service.
//!
//! This crate provides:
//! - Sentinel-delimited framing over a raw TCP stream
//! - A correlated request/response client with heartbeat auto-reply
//! - Automatic reconnection under a configurable policy
//! - Discovery of the task scripts that are shipped to the service

mod activity;
pub mod client;
pub mod codec;
pub mod error;
pub mod pending;
pub mod scripts;
pub mod wire;

pub use client::{ClientConfig, ConnectionState, TaskResponse, TickrateClient};
pub use codec::{FrameCodec, FRAME_DELIMITER};
pub use error::RpcError;
pub use scripts::ScriptCatalog;
pub use wire::{MessageType, WireMessage};

/// Result type for task service operations.
pub type Result<T> = std::result::Result<T, RpcError>;
