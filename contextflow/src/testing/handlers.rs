//! Mock tool handlers.

use crate::tools::{ToolCall, ToolHandler};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Returns a fixed value and records every call.
#[derive(Debug)]
pub struct StaticToolHandler {
    value: Value,
    calls: Mutex<Vec<ToolCall>>,
}

impl StaticToolHandler {
    /// Creates a handler returning `value`.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the most recent call.
    #[must_use]
    pub fn last_call(&self) -> Option<ToolCall> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl ToolHandler for StaticToolHandler {
    async fn invoke(&self, call: ToolCall) -> anyhow::Result<Value> {
        self.calls.lock().push(call);
        Ok(self.value.clone())
    }
}

/// Always fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingToolHandler {
    message: String,
}

impl FailingToolHandler {
    /// Creates a failing handler.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for FailingToolHandler {
    async fn invoke(&self, _call: ToolCall) -> anyhow::Result<Value> {
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// Sleeps before returning a fixed value.
#[derive(Debug, Clone)]
pub struct SlowToolHandler {
    delay: Duration,
    value: Value,
}

impl SlowToolHandler {
    /// Creates a slow handler.
    #[must_use]
    pub fn new(delay: Duration, value: Value) -> Self {
        Self { delay, value }
    }
}

#[async_trait]
impl ToolHandler for SlowToolHandler {
    async fn invoke(&self, _call: ToolCall) -> anyhow::Result<Value> {
        tokio::time::sleep(self.delay).await;
        Ok(self.value.clone())
    }
}

/// Blocks every call until [`GatedToolHandler::open`] is called.
#[derive(Debug)]
pub struct GatedToolHandler {
    value: Value,
    started: AtomicUsize,
    started_notify: Notify,
    gate: watch::Sender<bool>,
}

impl GatedToolHandler {
    /// Creates a closed gate.
    #[must_use]
    pub fn new(value: Value) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            value,
            started: AtomicUsize::new(0),
            started_notify: Notify::new(),
            gate,
        }
    }

    /// Returns how many calls have entered the handler.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` calls are blocked in the handler.
    pub async fn wait_started(&self, count: usize) {
        loop {
            let notified = self.started_notify.notified();
            if self.started() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Releases every blocked and future call.
    pub fn open(&self) {
        self.gate.send_replace(true);
    }
}

#[async_trait]
impl ToolHandler for GatedToolHandler {
    async fn invoke(&self, _call: ToolCall) -> anyhow::Result<Value> {
        let mut gate = self.gate.subscribe();
        self.started.fetch_add(1, Ordering::SeqCst);
        self.started_notify.notify_waiters();
        gate.wait_for(|open| *open).await?;
        Ok(self.value.clone())
    }
}

/// A mutating tool that invalidates cached results tagged with the value
/// of one of its parameters.
#[derive(Debug, Clone)]
pub struct InvalidatingToolHandler {
    entity_param: String,
}

impl InvalidatingToolHandler {
    /// Creates a handler reading the entity id from `entity_param`.
    #[must_use]
    pub fn new(entity_param: impl Into<String>) -> Self {
        Self {
            entity_param: entity_param.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for InvalidatingToolHandler {
    async fn invoke(&self, call: ToolCall) -> anyhow::Result<Value> {
        let entity = call
            .parameter(&self.entity_param)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing '{}' parameter", self.entity_param))?;
        let invalidated = call.invalidator.invalidate_tag(entity);
        Ok(json!({ "id": entity, "invalidated": invalidated }))
    }
}
