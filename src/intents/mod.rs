//! Local intent handlers
//!
//! Recognized text is offered to each handler in a fixed priority order
//! before it ever reaches the chat backend; the first handler that claims
//! it short-circuits the turn. Handlers speak through the announcer and
//! signal through the store, so the coordinator only learns "handled".

mod climate;
mod device;
mod exit;
mod music;
mod time;
mod weather;

pub use climate::ClimateIntent;
pub use device::DeviceIntent;
pub use exit::{is_end_phrase, is_exit_phrase};
pub use music::{MusicClient, MusicIntent};
pub use time::TimeIntent;
pub use weather::{WeatherClient, WeatherNow};

use async_trait::async_trait;

use crate::Result;

/// One locally-handled intent
#[async_trait]
pub trait IntentHandler: Send + Sync {
    /// Handler name for logs
    fn name(&self) -> &'static str;

    /// Inspect the utterance; `true` means it was handled here
    ///
    /// # Errors
    ///
    /// Returns error only on failures that should abort the turn; a
    /// handler that cannot serve a matched intent speaks an apology and
    /// still returns `Ok(true)`.
    async fn detect(&self, text: &str) -> Result<bool>;
}

/// Offer the utterance to each handler in order, first match wins
///
/// # Errors
///
/// Propagates the first handler error
pub async fn dispatch(handlers: &[Box<dyn IntentHandler>], text: &str) -> Result<bool> {
    for handler in handlers {
        if handler.detect(text).await? {
            tracing::info!(handler = handler.name(), "intent handled locally");
            return Ok(true);
        }
    }
    Ok(false)
}

/// Strip the punctuation recognition tends to append
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '。' | '，' | '？' | '!' | '！'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_spoken_punctuation() {
        assert_eq!(clean_text("现在几点了？"), "现在几点了");
        assert_eq!(clean_text("开灯！"), "开灯");
        assert_eq!(clean_text("你好，世界。"), "你好世界");
    }
}
