//! Conversation module - messages, content blocks, and conversation records
//!
//! The types here are shared by every other component: the client serializes
//! them onto the wire, the context manager bounds them, the agent loop
//! mutates them, and the store persists them.

pub mod types;

pub use types::{ContentBlock, Conversation, Message, MessageContent, Role};
