//! Tools module - the executor boundary between the engine and the host
//!
//! Tools are how the model acts on the host's vault-like storage. The engine
//! never touches files itself; it dispatches named tool calls through the
//! [`ToolRegistry`] and treats the string result as opaque.
//!
//! Business failures (missing note, invalid path) are encoded in the result
//! string by the tool itself. An unrecognized tool name or an execution
//! error also become descriptive result strings, never transport failures:
//! a failed tool must not abort the turn.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::error::Result;

/// Static description of a tool, serialized onto the model request.
///
/// The catalog is derived from the registry once per request and is
/// immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's input
    pub input_schema: Value,
}

impl ToolSpec {
    /// Create a new tool spec.
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Trait the host implements for each tool it exposes.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use quillclaw::tools::Tool;
/// use quillclaw::error::Result;
///
/// struct ListNotes;
///
/// #[async_trait]
/// impl Tool for ListNotes {
///     fn name(&self) -> &str { "list_notes" }
///     fn description(&self) -> &str { "List the notes in the vault" }
///     fn input_schema(&self) -> Value {
///         serde_json::json!({ "type": "object", "properties": {} })
///     }
///     async fn execute(&self, _input: Value) -> Result<String> {
///         Ok("daily.md\nprojects.md".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, used by the model to address it.
    fn name(&self) -> &str;

    /// Description sent to the model so it knows when to use the tool.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input.
    fn input_schema(&self) -> Value;

    /// Execute the tool.
    ///
    /// Encode expected failures ("note not found") in the returned string.
    /// `Err` is reserved for unexpected process-level failures; the agent
    /// loop converts those into an error result string as well.
    async fn execute(&self, input: Value) -> Result<String>;
}

/// A registry that holds the host's tools and dispatches calls by name.
///
/// # Example
///
/// ```rust
/// use quillclaw::tools::{ToolRegistry, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(EchoTool));
///
/// assert!(registry.has("echo"));
/// let result = registry.execute("echo", json!({"message": "hello"})).await;
/// assert_eq!(result, "hello");
/// # });
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Execute a tool by name.
    ///
    /// Never fails: an unknown name or an execution error is reported as
    /// the result string, which the agent loop places verbatim into the
    /// `tool_result` block.
    pub async fn execute(&self, name: &str, input: Value) -> String {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => {
                error!(tool = name, "Unknown tool requested by model");
                return format!("Error: unknown tool '{}'", name);
            }
        };

        let start = Instant::now();
        match tool.execute(input).await {
            Ok(output) => {
                info!(
                    tool = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed successfully"
                );
                output
            }
            Err(e) => {
                error!(
                    tool = name,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool execution failed"
                );
                format!("Error: {}", e)
            }
        }
    }

    /// Get the tool catalog for the model request.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|t| ToolSpec::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Check if a tool exists in the registry.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the names of all registered tools.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A simple echo tool for tests and wiring checks.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "Message to echo" }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: Value) -> Result<String> {
        Ok(input
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)")
            .to_string())
    }
}
