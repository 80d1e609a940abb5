//! Context module - token budgeting and history compaction
//!
//! The [`ContextManager`] keeps a conversation inside the model's context
//! window. Everything here is pure over `Vec<Message>`: deterministic token
//! estimation (characters / 4), low-value pruning, hard-cap truncation with
//! an auto-summarize split, per-message content truncation with explicit
//! markers, and a deterministic transcript digest.
//!
//! Invariant maintained throughout: a `tool_use` block and its matching
//! `tool_result` block are never separated across a kept/discarded
//! boundary. When a cut would split a pair, the boundary moves backward so
//! both ends stay kept.

use tracing::debug;

use crate::config::ContextConfig;
use crate::conversation::{ContentBlock, Message, MessageContent, Role};

/// Messages at the end of the history that pruning never touches.
const PRUNE_WINDOW: usize = 5;

/// Messages at the end of the history kept verbatim by content truncation,
/// so an in-flight tool_use/tool_result pairing is never mangled.
const VERBATIM_TAIL: usize = 3;

/// Per-message text cap in the summary digest.
const DIGEST_TEXT_CAP: usize = 200;

/// Delimiter terminating a summary digest.
const DIGEST_DELIMITER: &str = "--- end of earlier conversation ---";

/// Marker suffix appended to truncated content. Also used to detect
/// already-truncated content so a second pass is a no-op.
const TRUNCATION_MARKER_SUFFIX: &str = "chars total]";

/// Exact acknowledgment texts that carry no information worth resending.
const ACK_TEXTS: &[&str] = &[
    "ok", "okay", "k", "thanks", "thank you", "thx", "yes", "no", "sure", "got it", "cool",
];

/// Result of bounding a history: the messages to keep, plus the older
/// messages that were split off for summarization (if the auto-summarize
/// path was taken). The caller digests the split-off messages via
/// [`ContextManager::summarize`] and folds the digest into the
/// conversation's summary.
#[derive(Debug, Clone)]
pub struct TruncationOutcome {
    /// The bounded history, safe to send.
    pub messages: Vec<Message>,
    /// Messages removed for summarization, in their original order.
    pub summarized: Option<Vec<Message>>,
}

/// Bounds conversation history to the configured token budget.
pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    /// Create a manager with the given budget configuration.
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Deterministic token estimate for one message's content.
    ///
    /// Characters / 4 (rounded up), summed across text, tool-result
    /// content, and serialized tool-input payloads. Cheap and stable —
    /// called on every turn, never a network call. Monotonic: appending
    /// text never decreases the estimate.
    pub fn estimate_tokens(content: &MessageContent) -> usize {
        let chars = match content {
            MessageContent::Text(text) => text.chars().count(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => text.chars().count(),
                    ContentBlock::ToolResult { content, .. } => content.chars().count(),
                    ContentBlock::ToolUse { name, input, .. } => {
                        let input_chars = serde_json::to_string(input)
                            .map(|s| s.chars().count())
                            .unwrap_or(0);
                        name.chars().count() + input_chars
                    }
                })
                .sum(),
        };
        chars.div_ceil(4)
    }

    /// Token estimate for a whole history.
    pub fn estimate_history_tokens(messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| Self::estimate_tokens(&m.content))
            .sum()
    }

    /// Remove low-information messages outside the most recent
    /// [`PRUNE_WINDOW`] messages.
    ///
    /// A message is low-value when it is plain text that either exactly
    /// matches a short acknowledgment ("ok", "thanks", ...) or is shorter
    /// than the configured minimum length. Messages carrying structured
    /// blocks (tool use/results) are never pruned. Order is preserved.
    pub fn prune_low_value(&self, messages: Vec<Message>) -> Vec<Message> {
        if messages.len() <= PRUNE_WINDOW {
            return messages;
        }

        let protected_from = messages.len() - PRUNE_WINDOW;
        let before = messages.len();
        let result: Vec<Message> = messages
            .into_iter()
            .enumerate()
            .filter(|(i, msg)| *i >= protected_from || !self.is_low_value(msg))
            .map(|(_, msg)| msg)
            .collect();

        let removed = before - result.len();
        if removed > 0 {
            debug!(removed = removed, "Pruned low-value messages");
        }
        result
    }

    fn is_low_value(&self, message: &Message) -> bool {
        let text = match &message.content {
            MessageContent::Text(text) => text,
            // Structured content is never low-value
            MessageContent::Blocks(_) => return false,
        };
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();
        ACK_TEXTS.contains(&lowered.as_str())
            || trimmed.chars().count() < self.config.min_message_chars
    }

    /// Bound a history: prune, enforce the hard message cap (splitting off
    /// old messages for summarization when the token usage ratio is above
    /// the auto-summarize threshold), and truncate oversized old content.
    ///
    /// Idempotent: running it again on an already-bounded history returns
    /// the same messages unchanged.
    pub fn truncate(&self, messages: Vec<Message>) -> TruncationOutcome {
        let pruned = self.prune_low_value(messages);

        let (mut kept, summarized) = if pruned.len() > self.config.max_messages {
            let used = Self::estimate_history_tokens(&pruned);
            let ratio = used as f64 / self.config.context_window.max(1) as f64;

            if ratio > self.config.auto_summarize_threshold {
                // Keep only the recent window; everything older is handed
                // back for summarization.
                let keep = self.config.keep_recent.min(pruned.len());
                let cut = pair_safe_cut(&pruned, pruned.len() - keep);
                debug!(
                    total = pruned.len(),
                    cut = cut,
                    used_tokens = used,
                    "History over cap and budget, splitting for summarization"
                );
                let mut older = pruned;
                let recent = older.split_off(cut);
                let summarized = (!older.is_empty()).then_some(older);
                (recent, summarized)
            } else {
                let cut = pair_safe_cut(&pruned, pruned.len() - self.config.max_messages);
                debug!(total = pruned.len(), cut = cut, "History over cap, trimming");
                let mut trimmed = pruned;
                let recent = trimmed.split_off(cut);
                (recent, None)
            }
        } else {
            (pruned, None)
        };

        self.truncate_old_content(&mut kept);
        TruncationOutcome {
            messages: kept,
            summarized,
        }
    }

    /// Truncate oversized content in all but the last [`VERBATIM_TAIL`]
    /// messages: tool-result content over its cap and assistant free text
    /// over its cap both get an explicit marker noting the original length.
    fn truncate_old_content(&self, messages: &mut [Message]) {
        let len = messages.len();
        if len <= VERBATIM_TAIL {
            return;
        }

        for msg in &mut messages[..len - VERBATIM_TAIL] {
            let role = msg.role;
            match &mut msg.content {
                MessageContent::Text(text) => {
                    if role == Role::Assistant {
                        truncate_with_marker(text, self.config.max_assistant_text_chars);
                    }
                }
                MessageContent::Blocks(blocks) => {
                    for block in blocks.iter_mut() {
                        match block {
                            ContentBlock::ToolResult { content, .. } => {
                                truncate_with_marker(content, self.config.max_tool_result_chars);
                            }
                            ContentBlock::Text { text } => {
                                if role == Role::Assistant {
                                    truncate_with_marker(
                                        text,
                                        self.config.max_assistant_text_chars,
                                    );
                                }
                            }
                            ContentBlock::ToolUse { .. } => {}
                        }
                    }
                }
            }
        }
    }

    /// Produce a condensed textual digest of `messages`: one line per
    /// message with a role label, text capped at 200 chars, and any tool
    /// names invoked; terminated with a fixed delimiter. The digest is
    /// injected as a prefix to the system prompt on subsequent turns.
    pub fn summarize(&self, messages: &[Message]) -> String {
        let mut out = String::new();
        for msg in messages {
            let mut text: String = msg.text().chars().take(DIGEST_TEXT_CAP).collect();
            text = text.replace('\n', " ");

            let tools = msg.tool_names();
            out.push_str(&msg.role.to_string());
            out.push_str(": ");
            out.push_str(&text);
            if !tools.is_empty() {
                out.push_str(&format!(" [tools: {}]", tools.join(", ")));
            }
            out.push('\n');
        }
        out.push_str(DIGEST_DELIMITER);
        out
    }
}

/// Move a cut index backward until the boundary no longer separates a
/// `tool_use` from its `tool_result`.
///
/// Tool results always directly follow the assistant message that issued
/// them, so a boundary is unsafe exactly when the first kept message
/// carries tool results (its tool_use would be discarded) or the last
/// discarded message carries tool_use blocks (its results would be kept).
/// Preferring to keep both ends, the cut only ever moves backward.
fn pair_safe_cut(messages: &[Message], mut cut: usize) -> usize {
    while cut > 0
        && cut < messages.len()
        && (messages[cut].has_tool_result() || messages[cut - 1].has_tool_use())
    {
        cut -= 1;
    }
    cut
}

/// Truncate `text` to `cap` characters with a marker noting the original
/// length. Already-marked text is left alone so the operation is
/// idempotent.
fn truncate_with_marker(text: &mut String, cap: usize) {
    if text.ends_with(TRUNCATION_MARKER_SUFFIX) {
        return;
    }
    let total = text.chars().count();
    if total <= cap {
        return;
    }
    let mut truncated: String = text.chars().take(cap).collect();
    truncated.push_str(&format!("\n[truncated, {} {}", total, TRUNCATION_MARKER_SUFFIX));
    *text = truncated;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> ContextManager {
        ContextManager::new(ContextConfig::default())
    }

    fn tool_pair(id: &str) -> (Message, Message) {
        let use_msg = Message::assistant_blocks(vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: "read_note".to_string(),
            input: json!({"path": "daily.md"}),
        }]);
        let result_msg = Message::tool_results(vec![ContentBlock::ToolResult {
            tool_use_id: id.to_string(),
            content: "note content".to_string(),
        }]);
        (use_msg, result_msg)
    }

    // ── estimate_tokens ────────────────────────────────────────────────

    #[test]
    fn test_estimate_tokens_text() {
        let content = MessageContent::Text("abcdefgh".to_string()); // 8 chars
        assert_eq!(ContextManager::estimate_tokens(&content), 2);
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        let content = MessageContent::Text("abcde".to_string()); // 5 chars
        assert_eq!(ContextManager::estimate_tokens(&content), 2);
    }

    #[test]
    fn test_estimate_tokens_counts_tool_input() {
        let empty_input = MessageContent::Blocks(vec![ContentBlock::ToolUse {
            id: "t1".to_string(),
            name: "search".to_string(),
            input: json!({}),
        }]);
        let big_input = MessageContent::Blocks(vec![ContentBlock::ToolUse {
            id: "t1".to_string(),
            name: "search".to_string(),
            input: json!({"query": "a much longer serialized payload"}),
        }]);
        assert!(
            ContextManager::estimate_tokens(&big_input)
                > ContextManager::estimate_tokens(&empty_input)
        );
    }

    #[test]
    fn test_estimate_tokens_monotonic_in_length() {
        let mut text = String::new();
        let mut last = 0;
        for _ in 0..50 {
            text.push_str("word ");
            let estimate =
                ContextManager::estimate_tokens(&MessageContent::Text(text.clone()));
            assert!(estimate >= last, "estimate decreased as text grew");
            last = estimate;
        }
    }

    #[test]
    fn test_estimate_history_tokens_sums() {
        let messages = vec![Message::user("abcd"), Message::assistant("efgh")];
        assert_eq!(ContextManager::estimate_history_tokens(&messages), 2);
    }

    // ── prune_low_value ────────────────────────────────────────────────

    #[test]
    fn test_prune_removes_acknowledgments_outside_window() {
        let mut messages = vec![
            Message::user("How do I organize my daily notes?"),
            Message::assistant("Use a consistent template."),
            Message::user("ok"),
            Message::user("Thanks"),
        ];
        // Pad so the acks fall outside the protected window
        for i in 0..PRUNE_WINDOW {
            messages.push(Message::user(&format!("follow-up question number {}", i)));
        }

        let result = manager().prune_low_value(messages);
        let texts: Vec<String> = result.iter().map(|m| m.text()).collect();
        assert!(!texts.contains(&"ok".to_string()));
        assert!(!texts.contains(&"Thanks".to_string()));
        assert!(texts.contains(&"How do I organize my daily notes?".to_string()));
    }

    #[test]
    fn test_prune_never_touches_last_five() {
        let messages = vec![
            Message::user("padding so the window has something before it"),
            Message::user("ok"),
            Message::user("thanks"),
            Message::user("yes"),
            Message::user("no"),
            Message::user("k"),
        ];
        let result = manager().prune_low_value(messages);
        // The five trailing acks are protected regardless of content
        assert_eq!(result.len(), 6);
    }

    #[test]
    fn test_prune_never_removes_structured_content() {
        let (use_msg, result_msg) = tool_pair("t1");
        let mut messages = vec![use_msg, result_msg];
        for i in 0..PRUNE_WINDOW {
            messages.push(Message::user(&format!("later message number {}", i)));
        }

        let result = manager().prune_low_value(messages);
        assert!(result[0].has_tool_use());
        assert!(result[1].has_tool_result());
    }

    #[test]
    fn test_prune_removes_below_min_length() {
        let mut messages = vec![Message::user("hm")];
        for i in 0..PRUNE_WINDOW {
            messages.push(Message::user(&format!("substantial message {}", i)));
        }
        let result = manager().prune_low_value(messages);
        assert_eq!(result.len(), PRUNE_WINDOW);
    }

    #[test]
    fn test_prune_preserves_order() {
        let mut messages = Vec::new();
        for i in 0..10 {
            messages.push(Message::user(&format!("message number {}", i)));
        }
        let result = manager().prune_low_value(messages);
        for (i, msg) in result.iter().enumerate() {
            assert_eq!(msg.text(), format!("message number {}", i));
        }
    }

    // ── truncate ───────────────────────────────────────────────────────

    #[test]
    fn test_truncate_under_cap_is_identity() {
        let messages = vec![
            Message::user("How are my projects going?"),
            Message::assistant("Two are on track."),
        ];
        let outcome = manager().truncate(messages.clone());
        assert_eq!(outcome.messages, messages);
        assert!(outcome.summarized.is_none());
    }

    #[test]
    fn test_truncate_plain_trim_over_cap() {
        let mut config = ContextConfig::default();
        config.max_messages = 6;
        let manager = ContextManager::new(config);

        let messages: Vec<Message> = (0..10)
            .map(|i| Message::user(&format!("message number {}", i)))
            .collect();
        let outcome = manager.truncate(messages);

        assert_eq!(outcome.messages.len(), 6);
        assert!(outcome.summarized.is_none());
        assert_eq!(outcome.messages[0].text(), "message number 4");
        assert_eq!(outcome.messages[5].text(), "message number 9");
    }

    #[test]
    fn test_truncate_splits_for_summarization_when_budget_tight() {
        let mut config = ContextConfig::default();
        config.max_messages = 6;
        config.keep_recent = 4;
        // Tiny window so the usage ratio trips the threshold
        config.context_window = 40;
        let manager = ContextManager::new(config);

        let messages: Vec<Message> = (0..10)
            .map(|i| Message::user(&format!("a reasonably long message number {}", i)))
            .collect();
        let outcome = manager.truncate(messages);

        assert_eq!(outcome.messages.len(), 4);
        let summarized = outcome.summarized.unwrap();
        assert_eq!(summarized.len(), 6);
        assert_eq!(summarized[0].text(), "a reasonably long message number 0");
        assert_eq!(outcome.messages[0].text(), "a reasonably long message number 6");
    }

    #[test]
    fn test_truncate_never_splits_tool_pair_on_trim() {
        let mut config = ContextConfig::default();
        config.max_messages = 4;
        let manager = ContextManager::new(config);

        // Build: 4 user messages, then a tool pair, then 3 user messages.
        // A naive trim to 4 would cut between the pair.
        let mut messages: Vec<Message> = (0..4)
            .map(|i| Message::user(&format!("early message number {}", i)))
            .collect();
        let (use_msg, result_msg) = tool_pair("t1");
        messages.push(use_msg);
        messages.push(result_msg);
        messages.push(Message::user("after one"));
        messages.push(Message::user("after two"));
        messages.push(Message::user("after three"));

        let outcome = manager.truncate(messages);
        let kept = &outcome.messages;

        // Either both halves of the pair are kept, or both are gone.
        let uses = kept.iter().filter(|m| m.has_tool_use()).count();
        let results = kept.iter().filter(|m| m.has_tool_result()).count();
        assert_eq!(uses, results, "tool pair split across the boundary");
        assert_eq!(uses, 1, "cut should have moved back to keep the pair");
    }

    #[test]
    fn test_truncate_never_splits_tool_pair_on_summarize_split() {
        let mut config = ContextConfig::default();
        config.max_messages = 4;
        config.keep_recent = 3;
        config.context_window = 20;
        let manager = ContextManager::new(config);

        let mut messages: Vec<Message> = (0..5)
            .map(|i| Message::user(&format!("early chatter number {}", i)))
            .collect();
        let (use_msg, result_msg) = tool_pair("t9");
        messages.push(use_msg);
        messages.push(result_msg); // a keep_recent of 3 would cut here
        messages.push(Message::user("latest message in the thread"));

        let outcome = manager.truncate(messages);

        let kept_uses = outcome.messages.iter().filter(|m| m.has_tool_use()).count();
        let kept_results = outcome
            .messages
            .iter()
            .filter(|m| m.has_tool_result())
            .count();
        assert_eq!(kept_uses, kept_results);

        if let Some(summarized) = &outcome.summarized {
            let old_uses = summarized.iter().filter(|m| m.has_tool_use()).count();
            let old_results = summarized.iter().filter(|m| m.has_tool_result()).count();
            assert_eq!(old_uses, old_results);
        }
    }

    #[test]
    fn test_truncate_caps_old_tool_results() {
        let mut config = ContextConfig::default();
        config.max_tool_result_chars = 50;
        let manager = ContextManager::new(config);

        let long = "x".repeat(300);
        let messages = vec![
            Message::tool_results(vec![ContentBlock::ToolResult {
                tool_use_id: "t1".to_string(),
                content: long.clone(),
            }]),
            Message::user("one"),
            Message::user("two"),
            Message::user("three"),
        ];
        let outcome = manager.truncate(messages);

        match &outcome.messages[0].content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { content, .. } => {
                    assert!(content.contains("[truncated, 300 chars total]"));
                    assert!(content.chars().count() < 300);
                }
                other => panic!("unexpected block {:?}", other),
            },
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_truncate_caps_old_assistant_text() {
        let mut config = ContextConfig::default();
        config.max_assistant_text_chars = 40;
        let manager = ContextManager::new(config);

        let long = "a".repeat(200);
        let messages = vec![
            Message::assistant(&long),
            Message::user("one"),
            Message::user("two"),
            Message::user("three"),
        ];
        let outcome = manager.truncate(messages);
        assert!(outcome.messages[0]
            .text()
            .contains("[truncated, 200 chars total]"));
    }

    #[test]
    fn test_truncate_last_three_kept_verbatim() {
        let mut config = ContextConfig::default();
        config.max_tool_result_chars = 10;
        let manager = ContextManager::new(config);

        let long = "y".repeat(500);
        let messages = vec![
            Message::user("old message up front"),
            Message::user("second old message"),
            Message::assistant_blocks(vec![ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "read_note".to_string(),
                input: json!({}),
            }]),
            Message::tool_results(vec![ContentBlock::ToolResult {
                tool_use_id: "t1".to_string(),
                content: long.clone(),
            }]),
            Message::user("newest"),
        ];
        let outcome = manager.truncate(messages);

        // The big tool result sits inside the last 3 and must be untouched
        match &outcome.messages[3].content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { content, .. } => assert_eq!(content, &long),
                other => panic!("unexpected block {:?}", other),
            },
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_truncate_idempotent() {
        let mut config = ContextConfig::default();
        config.max_messages = 6;
        config.max_tool_result_chars = 30;
        config.max_assistant_text_chars = 30;
        let manager = ContextManager::new(config);

        let mut messages: Vec<Message> = (0..8)
            .map(|i| Message::user(&format!("message with some content {}", i)))
            .collect();
        messages.insert(
            0,
            Message::assistant(&"long assistant reply ".repeat(20)),
        );

        let first = manager.truncate(messages);
        let second = manager.truncate(first.messages.clone());

        assert_eq!(first.messages, second.messages);
        assert!(second.summarized.is_none());
    }

    // ── summarize ──────────────────────────────────────────────────────

    #[test]
    fn test_summarize_digest_shape() {
        let messages = vec![
            Message::user("What meetings do I have today?"),
            Message::assistant_blocks(vec![
                ContentBlock::Text {
                    text: "Checking your calendar note.".to_string(),
                },
                ContentBlock::ToolUse {
                    id: "t1".to_string(),
                    name: "read_note".to_string(),
                    input: json!({"path": "calendar.md"}),
                },
            ]),
        ];
        let digest = manager().summarize(&messages);

        assert!(digest.starts_with("user: What meetings do I have today?"));
        assert!(digest.contains("assistant: Checking your calendar note."));
        assert!(digest.contains("[tools: read_note]"));
        assert!(digest.ends_with(DIGEST_DELIMITER));
    }

    #[test]
    fn test_summarize_caps_long_text() {
        let long = "z".repeat(1000);
        let digest = manager().summarize(&[Message::user(&long)]);
        let first_line = digest.lines().next().unwrap();
        // role label + ": " + 200 chars
        assert!(first_line.chars().count() <= DIGEST_TEXT_CAP + 10);
    }

    #[test]
    fn test_summarize_flattens_newlines() {
        let digest = manager().summarize(&[Message::user("line one\nline two")]);
        assert!(digest.starts_with("user: line one line two"));
    }

    // ── pair_safe_cut ──────────────────────────────────────────────────

    #[test]
    fn test_pair_safe_cut_noop_on_safe_boundary() {
        let messages = vec![
            Message::user("one"),
            Message::user("two"),
            Message::user("three"),
        ];
        assert_eq!(pair_safe_cut(&messages, 1), 1);
    }

    #[test]
    fn test_pair_safe_cut_moves_before_pair() {
        let (use_msg, result_msg) = tool_pair("t1");
        let messages = vec![Message::user("zero"), use_msg, result_msg];
        // Cutting at 2 would keep the result without its use
        assert_eq!(pair_safe_cut(&messages, 2), 1);
    }

    #[test]
    fn test_pair_safe_cut_handles_consecutive_pairs() {
        let (use_a, result_a) = tool_pair("a");
        let (use_b, result_b) = tool_pair("b");
        let messages = vec![use_a, result_a, use_b, result_b];
        // Cutting at 3 walks back over pair b entirely, then stops at the
        // boundary between the pairs
        assert_eq!(pair_safe_cut(&messages, 3), 2);
    }
}
