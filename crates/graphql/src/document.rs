//! GraphQL document resolution.

use std::borrow::Cow;
use std::collections::BTreeMap;

use pipeline::{OperationDescriptor, TransportError};

const OPERATION_KEYWORDS: [&str; 3] = ["query", "mutation", "subscription"];

/// Named GraphQL documents, keyed by operation target.
#[derive(Debug, Clone, Default)]
pub struct DocumentRegistry {
    documents: BTreeMap<String, String>,
}

impl DocumentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `document` under `target`, replacing any previous entry.
    pub fn insert(&mut self, target: impl Into<String>, document: impl Into<String>) {
        self.documents.insert(target.into(), document.into());
    }

    /// Finds the document for `descriptor`, in order: the descriptor's own
    /// document, the registry entry for its target, and finally the target
    /// itself when it is an inline document.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unimplemented`] when no document is found.
    pub fn resolve<'a>(&'a self, descriptor: &'a OperationDescriptor) -> Result<Cow<'a, str>, TransportError> {
        if let Some(document) = descriptor.document() {
            return Ok(Cow::Borrowed(document));
        }
        let target = descriptor.target().trim();
        if let Some(document) = self.documents.get(target) {
            return Ok(Cow::Borrowed(document.as_str()));
        }
        if looks_like_document(target) {
            return Ok(Cow::Borrowed(target));
        }
        Err(TransportError::Unimplemented(format!(
            "no GraphQL document registered for {target:?}"
        )))
    }
}

/// Returns `true` if `text` starts like an executable GraphQL document.
pub fn looks_like_document(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with('{') || OPERATION_KEYWORDS.iter().any(|kw| starts_with_keyword(text, kw))
}

/// Returns `true` if `document` declares an operation called `name`.
pub fn declares_operation(document: &str, name: &str) -> bool {
    let tokens: Vec<&str> = document
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect();
    tokens
        .windows(2)
        .any(|pair| OPERATION_KEYWORDS.contains(&pair[0]) && pair[1] == name)
}

fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    text.strip_prefix(keyword)
        .is_some_and(|rest| rest.chars().next().map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_')))
}
