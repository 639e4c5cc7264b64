#![deny(missing_docs)]
//! Telegram transport adapter for Clip Relay.

/// Telegram-specific bot/transport implementation.
pub mod bot;
/// Telegram transport configuration.
pub mod config;
/// Liveness HTTP endpoint.
pub mod health;
/// Telegram runtime entrypoint.
pub mod runner;
