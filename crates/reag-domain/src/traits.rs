//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the query pipeline and the
//! collaborators it does not own. Model invocation is async and lives in
//! `reag-llm`; conversation memory is synchronous and lives here.

use crate::memory::MemoryEntry;

/// Append-only log of prior queries
///
/// Owned by the caller's client instance. The query pipeline reads it when
/// composing prompts and appends to it exactly once per successful query.
/// Implementations use interior mutability so one log can be shared across
/// concurrent queries.
pub trait ConversationMemory: Send + Sync {
    /// Record one completed query
    fn append(&self, entry: MemoryEntry);

    /// Prior entries, oldest first
    fn history(&self) -> Vec<MemoryEntry>;
}
