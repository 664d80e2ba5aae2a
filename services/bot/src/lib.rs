//! Runa Bot Library Crate
//!
//! Everything the Telegram bot needs beyond the relay core: configuration,
//! the Telegram transport, and application state wiring. The `bot` binary is
//! a thin wrapper around this library.

pub mod config;
pub mod state;
pub mod telegram;
