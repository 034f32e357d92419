//! Unified context building.
//!
//! Combines a request with the current memory snapshot for its scope into one
//! enriched parameter map, and validates tool parameters against a declared
//! schema.

mod builder;
mod schema;

pub use builder::{EnrichedContext, UnifiedContextBuilder, CONTEXT_KEY};
pub use schema::{FieldSpec, ParamType, ParameterError, ParameterSchema};
