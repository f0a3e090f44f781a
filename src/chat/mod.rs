//! Chat backend: completion client plus persisted history

mod client;
mod history;

pub use client::{ChatBackend, ChatClient};
pub use history::{ChatHistory, Message, Role};
