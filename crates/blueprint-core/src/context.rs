//! Transaction Config: execution settings carried by a transaction
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Free-form label attached to logs and reports
    pub label: String,
    /// Correlation ID for logs and reports
    pub trace_id: String,
    /// Run data and position transforms in one traversal
    pub fuse_transforms: bool,
    /// Return the source template itself when no operator can change it
    pub reuse_unchanged_source: bool,
    /// Upper bound on positions created across all operators
    pub max_created_positions: Option<usize>,
    pub metadata: HashMap<String, Value>,
}

impl TransactionConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_fused_transforms(mut self, fuse: bool) -> Self {
        self.fuse_transforms = fuse;
        self
    }

    pub fn with_source_reuse(mut self, reuse: bool) -> Self {
        self.reuse_unchanged_source = reuse;
        self
    }

    pub fn with_max_created_positions(mut self, limit: usize) -> Self {
        self.max_created_positions = Some(limit);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            label: "transaction".to_string(),
            trace_id: uuid::Uuid::new_v4().to_string(),
            fuse_transforms: true,
            reuse_unchanged_source: true,
            max_created_positions: None,
            metadata: HashMap::new(),
        }
    }
}
