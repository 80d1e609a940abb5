//! Agent loop implementation
//!
//! Drives one turn: user message in, terminal outcome out, with any number
//! of model/tool round-trips in between. The loop is an explicit state
//! machine — `step` takes a [`TurnState`] and returns the next one, with
//! all per-turn state in a `TurnContext` rather than hidden instance
//! fields, so single transitions are testable in isolation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{ModelResponse, RequestClient, StopReason};
use crate::config::{AgentConfig, Config};
use crate::context::ContextManager;
use crate::conversation::{ContentBlock, Conversation, Message};
use crate::error::{QuillError, Result};
use crate::observer::{AgentObserver, NullObserver};
use crate::store::{self, ConversationStore};
use crate::tools::ToolRegistry;

/// Notice surfaced when a response is cut off by the token limit with no
/// tool calls to execute.
const TRUNCATION_NOTICE: &str =
    "Response was cut off by the token limit. Type \"continue\" to resume.";

/// Caller-settable cooperative cancellation flag.
///
/// Checked once per loop iteration, between tool execution and the next
/// model call; an in-flight request or tool is always allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a new, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the running turn.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal classification of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model finished its answer (`end_turn`).
    Completed,
    /// The final response was cut off by the token limit; the partial text
    /// was kept and a truncation notice surfaced.
    Truncated,
    /// The cancellation flag was observed between iterations.
    Cancelled,
    /// The request/tool round-trip cap was reached. Accumulated history is
    /// preserved.
    IterationLimit,
}

/// What a completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// How the turn ended.
    pub outcome: TurnOutcome,
    /// Final assistant text, when the turn produced one.
    pub final_text: Option<String>,
    /// Number of tool round-trips executed.
    pub iterations: usize,
}

/// Loop state, passed into and returned from `step`.
enum TurnState {
    /// Send the bounded history to the model.
    CallModel,
    /// Execute the tool calls in this response, then decide whether to
    /// continue.
    RunTools(ModelResponse),
    /// Terminal.
    Finished(TurnOutcome),
}

/// Per-turn working state.
struct TurnContext {
    iterations: usize,
    final_text: Option<String>,
}

/// The turn-driving state machine.
///
/// One `AgentLoop` instance serves one conversation turn at a time; the
/// host must not start a second turn against the same conversation while
/// one is in flight.
///
/// # Example
///
/// ```rust,ignore
/// use quillclaw::agent::{AgentLoop, CancelFlag};
/// use quillclaw::client::RequestClient;
/// use quillclaw::config::Config;
/// use quillclaw::conversation::Conversation;
/// use quillclaw::tools::ToolRegistry;
///
/// let config = Config::from_env();
/// let client = RequestClient::new(&config)?;
/// let agent = AgentLoop::new(&config, client, ToolRegistry::new());
///
/// let mut conversation = Conversation::new();
/// let report = agent
///     .run_turn(&mut conversation, "Summarize today's note", &CancelFlag::new())
///     .await?;
/// println!("{}", report.final_text.unwrap_or_default());
/// ```
pub struct AgentLoop {
    client: RequestClient,
    context: ContextManager,
    tools: Arc<ToolRegistry>,
    store: Option<ConversationStore>,
    observer: Arc<dyn AgentObserver>,
    agent_config: AgentConfig,
}

impl AgentLoop {
    /// Create a new agent loop.
    ///
    /// # Arguments
    /// * `config` - Engine configuration
    /// * `client` - Request client for the model endpoint
    /// * `tools` - The host's tool registry
    pub fn new(config: &Config, client: RequestClient, tools: ToolRegistry) -> Self {
        Self {
            client,
            context: ContextManager::new(config.context.clone()),
            tools: Arc::new(tools),
            store: None,
            observer: Arc::new(NullObserver),
            agent_config: config.agent.clone(),
        }
    }

    /// Attach a conversation store; with `agent.auto_save` enabled the
    /// conversation is persisted at the end of every completed turn.
    pub fn with_store(mut self, store: ConversationStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a progress observer (retry countdowns, tool notices).
    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run one turn: append the user message, then step the state machine
    /// until a terminal outcome.
    ///
    /// On error the conversation keeps every message appended so far — a
    /// failed turn never loses the tool results already collected.
    ///
    /// # Errors
    /// Returns classified API errors after retries are exhausted, and
    /// [`QuillError::UnexpectedStopReason`] on a protocol violation.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        user_input: &str,
        cancel: &CancelFlag,
    ) -> Result<TurnReport> {
        info!(
            conversation = %conversation.id,
            input_len = user_input.len(),
            "Starting turn"
        );
        conversation.add_message(Message::user(user_input));

        let mut turn = TurnContext {
            iterations: 0,
            final_text: None,
        };
        let mut state = TurnState::CallModel;

        let outcome = loop {
            state = self.step(state, &mut turn, conversation, cancel).await?;
            if let TurnState::Finished(outcome) = &state {
                break outcome.clone();
            }
        };

        self.finish_turn(conversation).await;
        info!(
            conversation = %conversation.id,
            outcome = ?outcome,
            iterations = turn.iterations,
            "Turn finished"
        );
        Ok(TurnReport {
            outcome,
            final_text: turn.final_text.take(),
            iterations: turn.iterations,
        })
    }

    /// Advance the state machine by one transition.
    async fn step(
        &self,
        state: TurnState,
        turn: &mut TurnContext,
        conversation: &mut Conversation,
        cancel: &CancelFlag,
    ) -> Result<TurnState> {
        match state {
            TurnState::CallModel => self.call_model(turn, conversation).await,
            TurnState::RunTools(response) => {
                self.run_tools(response, turn, conversation, cancel).await
            }
            TurnState::Finished(outcome) => Ok(TurnState::Finished(outcome)),
        }
    }

    /// Bound the history, send it, and branch on the stop reason.
    async fn call_model(
        &self,
        turn: &mut TurnContext,
        conversation: &mut Conversation,
    ) -> Result<TurnState> {
        // Bound the working history in place; summarized-away messages are
        // folded into the running summary before they leave the history.
        let bounded = self.context.truncate(std::mem::take(&mut conversation.messages));
        if let Some(old) = &bounded.summarized {
            let digest = self.context.summarize(old);
            debug!(summarized = old.len(), "Folded old messages into summary");
            conversation.push_summary(&digest);
        }
        conversation.messages = bounded.messages;

        let system = self.effective_system(conversation);
        let response = self
            .client
            .send(
                &conversation.messages,
                Some(&system),
                &self.tools.specs(),
                self.observer.as_ref(),
            )
            .await?;

        match response.stop_reason {
            StopReason::EndTurn => {
                let text = response.text();
                conversation.add_message(Message::assistant(&text));
                turn.final_text = Some(text);
                Ok(TurnState::Finished(TurnOutcome::Completed))
            }
            StopReason::ToolUse => Ok(TurnState::RunTools(response)),
            StopReason::MaxTokens => {
                if response.has_tool_use() {
                    // Cut off mid-plan, but complete tool calls survived:
                    // applying a partial plan beats discarding it.
                    debug!("Response hit the token limit with tool calls present, executing them");
                    Ok(TurnState::RunTools(response))
                } else {
                    let text = response.text();
                    conversation.add_message(Message::assistant(&text));
                    turn.final_text = Some(text);
                    self.observer.turn_truncated();
                    self.observer.notice(TRUNCATION_NOTICE);
                    warn!("Response truncated by token limit");
                    Ok(TurnState::Finished(TurnOutcome::Truncated))
                }
            }
            StopReason::Other(reason) => Err(QuillError::UnexpectedStopReason(reason)),
        }
    }

    /// Append the raw assistant content, execute its tool calls in order,
    /// append one user message with all results, then decide whether to
    /// continue.
    async fn run_tools(
        &self,
        response: ModelResponse,
        turn: &mut TurnContext,
        conversation: &mut Conversation,
        cancel: &CancelFlag,
    ) -> Result<TurnState> {
        conversation.add_message(Message::assistant_blocks(response.content.clone()));

        let mut results = Vec::new();
        for block in &response.content {
            if let ContentBlock::ToolUse { id, name, input } = block {
                self.observer.tool_started(name);
                info!(tool = %name, id = %id, "Executing tool");
                let output = self.tools.execute(name, input.clone()).await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id.clone(),
                    content: output,
                });
            }
        }
        if !results.is_empty() {
            conversation.add_message(Message::tool_results(results));
        }
        turn.iterations += 1;

        // Cooperative cancellation point: after this iteration's history
        // mutation, before the next model call.
        if cancel.is_cancelled() {
            info!(iterations = turn.iterations, "Turn cancelled by caller");
            return Ok(TurnState::Finished(TurnOutcome::Cancelled));
        }

        if turn.iterations >= self.agent_config.max_tool_iterations {
            info!(
                iterations = turn.iterations,
                "Tool loop reached maximum iterations"
            );
            return Ok(TurnState::Finished(TurnOutcome::IterationLimit));
        }

        debug!(
            iteration = turn.iterations,
            max = self.agent_config.max_tool_iterations,
            "Tool round-trip complete, calling model again"
        );
        Ok(TurnState::CallModel)
    }

    /// The system prompt with the conversation's running summary injected
    /// as a prefix.
    fn effective_system(&self, conversation: &Conversation) -> String {
        match &conversation.summary {
            Some(summary) => format!(
                "Summary of the conversation so far:\n{}\n\n{}",
                summary, self.agent_config.system_prompt
            ),
            None => self.agent_config.system_prompt.clone(),
        }
    }

    /// Persist the conversation (and derive a name on first save) when a
    /// store is attached. Persistence failures are logged, never raised —
    /// the turn's result is already in the caller's hands.
    async fn finish_turn(&self, conversation: &mut Conversation) {
        let Some(store) = &self.store else {
            return;
        };
        if !self.agent_config.auto_save {
            return;
        }

        if self.agent_config.auto_name && conversation.name.is_none() {
            let name = store::derive_name(conversation, &self.client).await;
            conversation.name = Some(name);
        }

        if let Err(e) = store.save(conversation).await {
            warn!(error = %e, "Failed to persist conversation");
        }
    }

    /// Get a reference to the tool registry.
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}
