//! Observer port for progress feedback.
//!
//! Retry backoff and the agent loop both emit progress signals the host UI
//! may want to surface (retry countdowns, "using tools...", truncation
//! notices). The port keeps the core free of any UI dependency: every method
//! is a notification with a default empty body, and none of them affect
//! control flow or conversation state.

use std::time::Duration;

/// Receives progress notifications from the client and the agent loop.
///
/// Implementations must be cheap and non-blocking; the loop calls them
/// inline.
pub trait AgentObserver: Send + Sync {
    /// A retryable failure occurred; the client will wait `delay` before
    /// attempt number `attempt` (1-based).
    fn retry_wait(&self, attempt: usize, delay: Duration) {
        let _ = (attempt, delay);
    }

    /// A tool is about to execute.
    fn tool_started(&self, name: &str) {
        let _ = name;
    }

    /// The response was cut off by the token limit and the turn stopped
    /// with partial text.
    fn turn_truncated(&self) {}

    /// Free-form progress notice.
    fn notice(&self, message: &str) {
        let _ = message;
    }
}

/// Observer that ignores every notification. Useful for tests and for
/// internal requests (e.g. conversation naming) that should stay silent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl AgentObserver for NullObserver {}
