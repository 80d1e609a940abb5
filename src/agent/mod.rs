//! Agent module - the turn-driving state machine
//!
//! The agent loop is the coordinator: it bounds history through the
//! [`ContextManager`](crate::context::ContextManager), calls the
//! [`RequestClient`](crate::client::RequestClient), branches on the
//! response's stop reason, dispatches tool calls through the
//! [`ToolRegistry`](crate::tools::ToolRegistry), and hands the finished
//! conversation to the [`ConversationStore`](crate::store::ConversationStore).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌───────────────┐
//! │ host chat UI │────>│  AgentLoop  │────>│ RequestClient │
//! └──────────────┘     └─────────────┘     └───────────────┘
//!                        │    │    │
//!                        ▼    ▼    ▼
//!               ┌────────┐ ┌───────┐ ┌──────────────┐
//!               │Context │ │ Tools │ │ Conversation │
//!               │Manager │ │       │ │    Store     │
//!               └────────┘ └───────┘ └──────────────┘
//! ```

mod r#loop;

pub use r#loop::{AgentLoop, CancelFlag, TurnOutcome, TurnReport};
