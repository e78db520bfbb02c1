//! Startup-time catalogs for resources and prompts.
//!
//! Entries are registered once while the server is assembled and read from
//! many concurrent request handlers afterwards.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A readable resource exposed over `resources/list` / `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mime_type: String,
    pub text: String,
}

impl ResourceEntry {
    pub fn text_resource(
        uri: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: "text/plain".to_owned(),
            text: text.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn summary(&self) -> Value {
        json!({
            "uri": self.uri,
            "name": self.name,
            "description": self.description,
            "mimeType": self.mime_type,
        })
    }
}

#[derive(Debug, Default)]
pub struct ResourceCatalog {
    entries: RwLock<IndexMap<String, ResourceEntry>>,
}

impl ResourceCatalog {
    /// Register an entry, keyed by uri. Re-registering overwrites.
    pub fn register(&self, entry: ResourceEntry) {
        self.entries.write().insert(entry.uri.clone(), entry);
    }

    /// Listing summaries in registration order, without contents.
    pub fn list(&self) -> Vec<Value> {
        self.entries.read().values().map(|e| e.summary()).collect()
    }

    pub fn read(&self, uri: &str) -> Option<ResourceEntry> {
        self.entries.read().get(uri).cloned()
    }
}

/// One message of a prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

/// A prompt exposed over `prompts/list` / `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

impl PromptEntry {
    pub fn new(name: impl Into<String>, messages: Vec<PromptMessage>) -> Self {
        Self {
            name: name.into(),
            description: None,
            messages,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn summary(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
        })
    }
}

#[derive(Debug, Default)]
pub struct PromptCatalog {
    entries: RwLock<IndexMap<String, PromptEntry>>,
}

impl PromptCatalog {
    pub fn register(&self, entry: PromptEntry) {
        self.entries.write().insert(entry.name.clone(), entry);
    }

    pub fn list(&self) -> Vec<Value> {
        self.entries.read().values().map(|e| e.summary()).collect()
    }

    pub fn get(&self, name: &str) -> Option<PromptEntry> {
        self.entries.read().get(name).cloned()
    }
}
