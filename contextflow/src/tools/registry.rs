//! Tool registry and handler trait.

use super::{ToolCall, ToolDescriptor};
use crate::errors::ContextflowError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Executes a tool. Implementations own all storage access.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool and returns its JSON result.
    async fn invoke(&self, call: ToolCall) -> anyhow::Result<Value>;
}

/// A descriptor paired with its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Static description.
    pub descriptor: Arc<ToolDescriptor>,
    /// The handler.
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Name-indexed registry of tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any previous tool with the same name.
    /// Returns true if a tool was replaced.
    pub fn register(&self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> bool {
        let name = descriptor.name.clone();
        let replaced = self
            .tools
            .write()
            .insert(
                name.clone(),
                RegisteredTool {
                    descriptor: Arc::new(descriptor),
                    handler,
                },
            )
            .is_some();
        debug!(tool = %name, replaced, "Registered tool");
        replaced
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_tool(self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(descriptor, handler);
        self
    }

    /// Removes a tool. Returns true if it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools.write().remove(name).is_some()
    }

    /// Resolves a tool by name.
    pub fn get(&self, name: &str) -> Result<RegisteredTool, ContextflowError> {
        self.tools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContextflowError::ToolNotFound(name.to_string()))
    }

    /// Returns a tool's descriptor.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.read().get(name).map(|tool| Arc::clone(&tool.descriptor))
    }

    /// Returns true if a tool is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Lists registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheInvalidator, InMemoryResultCache};
    use crate::core::ScopeId;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn invoke(&self, call: ToolCall) -> anyhow::Result<Value> {
            Ok(Value::Object(call.parameters))
        }
    }

    fn call(tool: &str) -> ToolCall {
        ToolCall {
            tool_name: tool.to_string(),
            scope_id: ScopeId::session("s"),
            execution_id: Uuid::now_v7(),
            parameters: json!({"q": 1}).as_object().cloned().unwrap(),
            deadline: tokio::time::Instant::now() + Duration::from_secs(1),
            invalidator: CacheInvalidator::new(Arc::new(InMemoryResultCache::default())),
        }
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let registry = ToolRegistry::new().with_tool(ToolDescriptor::search("echo"), Arc::new(Echo));

        let tool = registry.get("echo").unwrap();
        assert!(tool.descriptor.cacheable);
        let result = tool.handler.invoke(call("echo")).await.unwrap();
        assert_eq!(result, json!({"q": 1}));
    }

    #[test]
    fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, ContextflowError::ToolNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_replace_and_unregister() {
        let registry = ToolRegistry::new();
        assert!(!registry.register(ToolDescriptor::search("a"), Arc::new(Echo)));
        assert!(registry.register(ToolDescriptor::store("a"), Arc::new(Echo)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descriptor("a").unwrap().kind, crate::tools::ToolKind::Store);

        assert!(registry.unregister("a"));
        assert!(registry.is_empty());
    }
}
