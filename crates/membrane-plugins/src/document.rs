//! Document storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub content: serde_json::Map<String, serde_json::Value>,
}

/// Comparison used in a [`QueryExpression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "startsWith")]
    StartsWith,
}

/// One filter clause of a document query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExpression {
    pub operand: String,
    pub operator: Operator,
    pub value: serde_json::Value,
}

impl QueryExpression {
    pub fn new(
        operand: impl Into<String>,
        operator: Operator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            operand: operand.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Document backend addressed by `(collection, key)`.
#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn get(&self, _collection: &str, _key: &str) -> PluginResult<Document> {
        Err(PluginError::unimplemented("Document.Get"))
    }

    async fn set(
        &self,
        _collection: &str,
        _key: &str,
        _content: serde_json::Map<String, serde_json::Value>,
    ) -> PluginResult<()> {
        Err(PluginError::unimplemented("Document.Set"))
    }

    async fn delete(&self, _collection: &str, _key: &str) -> PluginResult<()> {
        Err(PluginError::unimplemented("Document.Delete"))
    }

    /// Documents matching every expression, up to `limit` (0 = no limit).
    async fn query(
        &self,
        _collection: &str,
        _expressions: &[QueryExpression],
        _limit: usize,
    ) -> PluginResult<Vec<Document>> {
        Err(PluginError::unimplemented("Document.Query"))
    }
}
