//! End-of-conversation and exit-program phrase checks
//!
//! These are consulted by the coordinator directly, ahead of the intent
//! handlers, because they change turn flow rather than produce a reply.

use super::clean_text;

const END_PHRASES: &[&str] = &["结束对话", "再见", "拜拜", "先这样"];

const EXIT_PHRASES: &[&str] = &["终止程序", "退出程序", "关闭程序"];

/// Whether the utterance ends the current conversation
#[must_use]
pub fn is_end_phrase(text: &str) -> bool {
    let cleaned = clean_text(text);
    END_PHRASES.iter().any(|p| cleaned.contains(p))
}

/// Whether the utterance asks the whole program to exit
#[must_use]
pub fn is_exit_phrase(text: &str) -> bool {
    let cleaned = clean_text(text);
    EXIT_PHRASES.iter().any(|p| cleaned.contains(p))
}
