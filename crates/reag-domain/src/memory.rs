//! Conversation memory entries and an in-process log

use crate::judgment::QueryResult;
use crate::traits::ConversationMemory;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One prior exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// The user query
    pub query: String,
    /// What the query produced
    pub response: String,
}

impl MemoryEntry {
    /// Create an entry
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
        }
    }

    /// Summarize a query's results into an entry
    ///
    /// The response is the content of the relevant results, one per line.
    pub fn from_results(query: impl Into<String>, results: &[QueryResult]) -> Self {
        let response = results
            .iter()
            .filter(|r| r.is_relevant() && !r.content.is_empty())
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(query, response)
    }
}

/// Shared in-memory conversation log
///
/// Clones share the same log.
///
/// # Examples
///
/// ```
/// use reag_domain::{ConversationLog, ConversationMemory, MemoryEntry};
///
/// let log = ConversationLog::new();
/// log.append(MemoryEntry::new("My name is John", "Hello John"));
///
/// let shared = log.clone();
/// assert_eq!(shared.history().len(), 1);
///
/// log.clear();
/// assert!(shared.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    entries: Arc<Mutex<Vec<MemoryEntry>>>,
}

impl ConversationLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MemoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConversationMemory for ConversationLog {
    fn append(&self, entry: MemoryEntry) {
        self.lock().push(entry);
    }

    fn history(&self) -> Vec<MemoryEntry> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::judgment::Judgment;

    fn result(content: &str, is_irrelevant: bool) -> QueryResult {
        QueryResult::from_judgment(
            Judgment {
                content: content.to_string(),
                is_irrelevant,
                ..Judgment::default()
            },
            Document::new("doc", "text"),
        )
    }

    #[test]
    fn test_history_preserves_order() {
        let log = ConversationLog::new();
        log.append(MemoryEntry::new("first", "a"));
        log.append(MemoryEntry::new("second", "b"));

        let history = log.history();
        assert_eq!(history[0].query, "first");
        assert_eq!(history[1].query, "second");
    }

    #[test]
    fn test_from_results_keeps_relevant_content() {
        let results = vec![
            result("Your name is John.", false),
            result("ignored", true),
            result("", false),
            result("Second fact.", false),
        ];
        let entry = MemoryEntry::from_results("What is my name?", &results);
        assert_eq!(entry.response, "Your name is John.\nSecond fact.");
    }

    #[test]
    fn test_usable_as_trait_object() {
        let log = ConversationLog::new();
        let memory: Arc<dyn ConversationMemory> = Arc::new(log.clone());
        memory.append(MemoryEntry::new("q", "r"));
        assert_eq!(log.len(), 1);
    }
}
