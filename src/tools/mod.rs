//! Tool registry (spec §4.5): a name-keyed table of async handlers,
//! registered once before the session starts and never mutated during a
//! call. Used only from the turn-processing path — a call handles one
//! tool invocation at a time, so no internal locking is needed.
//!
//! Grounded on the teacher's `agent/tool_loop.rs` dispatch shape, which
//! looks up a tool by name out of a fixed list and calls it with a JSON
//! argument object; here the lookup table is a plain `HashMap` since the
//! spec's registry has no allow-list/permission layer to thread through.

pub mod reservation;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::types::{ToolCall, ToolResult};

pub type ToolFuture = Pin<Box<dyn Future<Output = serde_json::Value> + Send>>;
pub type ToolHandler = Arc<dyn Fn(serde_json::Value) -> ToolFuture + Send + Sync>;

/// Tool metadata needed to declare the tool to the LLM (spec §4.3's
/// "tool/function declarations with strict JSON-schema parameters").
/// Kept separate from `providers::llm::ToolSpec` so this module has no
/// dependency on the provider layer; the session converts between them.
#[derive(Debug, Clone)]
pub struct ToolMeta {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Immutable name -> handler mapping. Clone is cheap (`Arc` handlers).
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, ToolHandler>,
    specs: Vec<ToolMeta>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { handlers: HashMap::new(), specs: Vec::new() }
    }

    pub fn register<F, Fut>(&mut self, name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value, handler: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = serde_json::Value> + Send + 'static,
    {
        let name = name.into();
        self.specs.push(ToolMeta { name: name.clone(), description: description.into(), parameters });
        self.handlers.insert(name, Arc::new(move |args| Box::pin(handler(args))));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }

    /// Metadata for every registered tool, in registration order, used
    /// to build the per-turn tool declarations sent to the LLM.
    pub fn specs(&self) -> &[ToolMeta] {
        &self.specs
    }

    /// Invoke the named tool, returning a result tagged with the call's
    /// id. Unknown tool names surface as an `{"error": ...}` result
    /// object rather than a hard failure, matching how the LLM provider
    /// treats any other malformed tool output.
    pub async fn invoke(&self, call: ToolCall) -> ToolResult {
        let output = match self.handlers.get(&call.name) {
            Some(handler) => handler(call.arguments).await,
            None => serde_json::json!({ "error": format!("unknown tool: {}", call.name) }),
        };
        ToolResult { call_id: call.call_id, output }
    }

    /// Build the demo reservation registry used by the default deployment
    /// (spec E.5 / `original_source/src/reservation/tools.py`).
    pub fn with_reservation_demo() -> Self {
        let mut registry = Self::new();
        let inventory = reservation::InMemoryInventory::seeded();
        reservation::register(&mut registry, inventory);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_tool_name_returns_error_object_not_panic() {
        let registry = ToolRegistry::new();
        let result = registry
            .invoke(ToolCall { call_id: "c1".into(), name: "does_not_exist".into(), arguments: serde_json::json!({}) })
            .await;
        assert_eq!(result.call_id, "c1");
        assert!(result.output.get("error").is_some());
    }

    #[tokio::test]
    async fn registered_tool_is_invoked_with_its_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register("echo", "Echoes its input", serde_json::json!({"type": "object"}), |args| async move {
            serde_json::json!({ "echoed": args })
        });
        let result = registry
            .invoke(ToolCall { call_id: "c2".into(), name: "echo".into(), arguments: serde_json::json!({"x": 1}) })
            .await;
        assert_eq!(result.output["echoed"]["x"], 1);
    }
}
