//! Hearth - hotword-activated voice assistant daemon
//!
//! This library provides the core functionality of the hearth daemon:
//! - Voice capture, recognition, and synthesis (cpal + Azure Speech)
//! - Local intent handling (time, weather, music, devices, climate)
//! - Streaming chat with sentence-by-sentence speech
//! - A web dashboard with runtime configuration and SSE token relay
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   Wake sources                        │
//! │  Hotword  │  Button  │  Dashboard  │  Quick command  │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼────────────────────────────────┐
//! │                  Coordinator                          │
//! │  Turn lifecycle │ Interruption │ Continuous dialog    │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼────────────────────────────────┐
//! │    Intents  │  Chat backend  │  Speech pipeline      │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod chat;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod error;
pub mod hardware;
pub mod intents;
pub mod notify;
pub mod store;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
