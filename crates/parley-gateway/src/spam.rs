//! Per-sender send-rate and content policy.
//!
//! State lives in process memory for the lifetime of the process; restarts
//! clear active mutes. The rules form a sequential chain, not independent
//! checks: the mute check short-circuits everything else, and fast-count
//! state only moves on the rate branch.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Minimum gap between accepted messages from one sender.
const MIN_INTERVAL_MS: u64 = 2_000;
/// Fast sends before a mute kicks in.
const FAST_STRIKES: u32 = 3;
/// Mute duration once triggered.
const MUTE_MS: u64 = 30_000;
/// Maximum message length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamVerdict {
    Allowed,
    /// Sender is inside an active mute window.
    Muted,
    /// This send crossed the strike threshold and started a mute.
    MutedJustNow,
    TooFast,
    TooLong,
    Duplicate,
}

impl SpamVerdict {
    /// Warning text for the sender; `None` for accepted messages.
    /// Rejections are reported only to the sender, never broadcast.
    pub fn warning(self) -> Option<&'static str> {
        match self {
            SpamVerdict::Allowed => None,
            SpamVerdict::Muted => Some("You are muted for spamming. Please wait."),
            SpamVerdict::MutedJustNow => {
                Some("You've been muted for 30s (spamming too fast).")
            }
            SpamVerdict::TooFast => Some("Too fast! Wait before sending again."),
            SpamVerdict::TooLong => Some("Message too long! Max 300 characters."),
            SpamVerdict::Duplicate => Some("Duplicate message blocked."),
        }
    }
}

#[derive(Default)]
struct SenderState {
    last_send_ms: u64,
    last_text: String,
    fast_count: u32,
    muted_until_ms: u64,
}

/// Keyed store of per-sender state. The whole read-modify-write for one
/// sender happens under one short lock hold, so concurrent handlers for
/// the same sender cannot race the counters.
#[derive(Default)]
pub struct SpamGuard {
    senders: Mutex<HashMap<String, SenderState>>,
}

impl SpamGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one inbound message against the rule chain.
    pub fn check(&self, username: &str, text: &str) -> SpamVerdict {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.check_at(username, text, now_ms)
    }

    fn check_at(&self, username: &str, text: &str, now_ms: u64) -> SpamVerdict {
        let mut senders = self.senders.lock().expect("spam state lock poisoned");
        let state = senders.entry(username.to_string()).or_default();

        // 1. Active mute: reject without touching any other state.
        if now_ms < state.muted_until_ms {
            return SpamVerdict::Muted;
        }

        // 2. Rate window. The counter persists across rejections and only
        //    resets on acceptance or on triggering a mute.
        if now_ms.saturating_sub(state.last_send_ms) < MIN_INTERVAL_MS {
            state.fast_count += 1;
            if state.fast_count >= FAST_STRIKES {
                state.muted_until_ms = now_ms + MUTE_MS;
                state.fast_count = 0;
                return SpamVerdict::MutedJustNow;
            }
            return SpamVerdict::TooFast;
        }

        // 3. Length. Does not affect rate or mute state.
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return SpamVerdict::TooLong;
        }

        // 4. Exact repeat of the previous accepted message.
        if text == state.last_text {
            return SpamVerdict::Duplicate;
        }

        state.last_send_ms = now_ms;
        state.last_text = text.to_string();
        state.fast_count = 0;
        SpamVerdict::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_is_allowed() {
        let guard = SpamGuard::new();
        assert_eq!(guard.check_at("ava", "hi", 1_000), SpamVerdict::Allowed);
    }

    #[test]
    fn rapid_sends_escalate_to_a_mute() {
        let guard = SpamGuard::new();
        assert_eq!(guard.check_at("ava", "one", 10_000), SpamVerdict::Allowed);
        assert_eq!(guard.check_at("ava", "two", 10_500), SpamVerdict::TooFast);
        assert_eq!(guard.check_at("ava", "three", 11_000), SpamVerdict::TooFast);
        assert_eq!(
            guard.check_at("ava", "four", 11_500),
            SpamVerdict::MutedJustNow
        );

        // inside the 30s mute window
        assert_eq!(guard.check_at("ava", "five", 20_000), SpamVerdict::Muted);
        assert_eq!(guard.check_at("ava", "five", 41_000), SpamVerdict::Muted);
        // mute expires at 41_500
        assert_eq!(guard.check_at("ava", "five", 41_600), SpamVerdict::Allowed);
    }

    #[test]
    fn fast_count_survives_rejections_but_resets_on_accept() {
        let guard = SpamGuard::new();
        assert_eq!(guard.check_at("ava", "one", 10_000), SpamVerdict::Allowed);
        assert_eq!(guard.check_at("ava", "two", 10_100), SpamVerdict::TooFast);
        // a slow, accepted send clears the strike count
        assert_eq!(guard.check_at("ava", "two", 13_000), SpamVerdict::Allowed);
        assert_eq!(guard.check_at("ava", "x", 13_100), SpamVerdict::TooFast);
        assert_eq!(guard.check_at("ava", "y", 13_200), SpamVerdict::TooFast);
        assert_eq!(guard.check_at("ava", "z", 13_300), SpamVerdict::MutedJustNow);
    }

    #[test]
    fn overlong_text_is_rejected_without_state_changes() {
        let guard = SpamGuard::new();
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(guard.check_at("ava", &long, 10_000), SpamVerdict::TooLong);
        // rejection did not count as a send: next message is not "too fast"
        assert_eq!(guard.check_at("ava", "ok", 10_100), SpamVerdict::Allowed);
    }

    #[test]
    fn exactly_max_length_is_allowed() {
        let guard = SpamGuard::new();
        let text = "x".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(guard.check_at("ava", &text, 10_000), SpamVerdict::Allowed);
    }

    #[test]
    fn duplicate_text_is_rejected_and_not_recorded() {
        let guard = SpamGuard::new();
        assert_eq!(guard.check_at("ava", "hello", 10_000), SpamVerdict::Allowed);
        assert_eq!(
            guard.check_at("ava", "hello", 13_000),
            SpamVerdict::Duplicate
        );
        // a different message still goes through
        assert_eq!(guard.check_at("ava", "world", 16_000), SpamVerdict::Allowed);
        // and the duplicate check tracks the last ACCEPTED text
        assert_eq!(guard.check_at("ava", "world", 19_000), SpamVerdict::Duplicate);
    }

    #[test]
    fn senders_are_isolated() {
        let guard = SpamGuard::new();
        assert_eq!(guard.check_at("ava", "hi", 10_000), SpamVerdict::Allowed);
        // ben is unaffected by ava's window or last text
        assert_eq!(guard.check_at("ben", "hi", 10_100), SpamVerdict::Allowed);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let guard = SpamGuard::new();
        // 300 multibyte characters is within the limit
        let text = "é".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(guard.check_at("ava", &text, 10_000), SpamVerdict::Allowed);
    }
}
