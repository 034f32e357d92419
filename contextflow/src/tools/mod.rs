//! Tool handler seam.
//!
//! The orchestrator never talks to storage directly: every side effect goes
//! through a registered [`ToolHandler`], looked up by name in the
//! [`ToolRegistry`] together with its [`ToolDescriptor`].

mod definitions;
mod registry;

pub use crate::cache::CacheInvalidator;
pub use definitions::{ToolCall, ToolDescriptor, ToolKind};
pub use registry::{RegisteredTool, ToolHandler, ToolRegistry};
