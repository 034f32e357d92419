//! Test doubles for tool handlers and pipeline stages.

mod handlers;
mod stages;

pub use handlers::{
    FailingToolHandler, GatedToolHandler, InvalidatingToolHandler, SlowToolHandler,
    StaticToolHandler,
};
pub use stages::{FailingStage, SlowStage};
