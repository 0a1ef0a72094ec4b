//! In-memory document store.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use membrane_plugins::{
    Code, Document, DocumentService, Operator, PluginError, PluginResult, QueryExpression,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};

type Content = Map<String, Value>;

/// Document store kept in process memory.
///
/// Query results come back in key order. Operands address nested fields
/// with dots, e.g. `address.city`.
#[derive(Debug, Default)]
pub struct DevDocumentService {
    collections: RwLock<HashMap<String, BTreeMap<String, Content>>>,
}

impl DevDocumentService {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_key(service: &str, collection: &str, key: &str) -> PluginResult<()> {
    let scope = PluginError::scoped(service, [("collection", collection), ("key", key)]);
    if collection.is_empty() {
        return Err(scope.error(Code::InvalidArgument, "provide non-blank collection"));
    }
    if key.is_empty() {
        return Err(scope.error(Code::InvalidArgument, "provide non-blank key"));
    }
    Ok(())
}

fn field<'a>(content: &'a Content, operand: &str) -> Option<&'a Value> {
    let mut parts = operand.split('.');
    let mut current = content.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn satisfies(content: &Content, expression: &QueryExpression) -> bool {
    let Some(value) = field(content, &expression.operand) else {
        return false;
    };

    match expression.operator {
        Operator::Eq => compare(value, &expression.value) == Some(Ordering::Equal)
            || value == &expression.value,
        Operator::Lt => compare(value, &expression.value) == Some(Ordering::Less),
        Operator::Le => matches!(
            compare(value, &expression.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => compare(value, &expression.value) == Some(Ordering::Greater),
        Operator::Ge => matches!(
            compare(value, &expression.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::StartsWith => match (value, &expression.value) {
            (Value::String(v), Value::String(prefix)) => v.starts_with(prefix.as_str()),
            _ => false,
        },
    }
}

#[async_trait]
impl DocumentService for DevDocumentService {
    async fn get(&self, collection: &str, key: &str) -> PluginResult<Document> {
        check_key("DevDocument.Get", collection, key)?;
        let content = self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned();

        content
            .map(|content| Document {
                key: key.to_string(),
                content,
            })
            .ok_or_else(|| {
                PluginError::scoped("DevDocument.Get", [("collection", collection), ("key", key)])
                    .error(Code::NotFound, "document not found")
            })
    }

    async fn set(&self, collection: &str, key: &str, content: Content) -> PluginResult<()> {
        check_key("DevDocument.Set", collection, key)?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), content);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> PluginResult<()> {
        check_key("DevDocument.Delete", collection, key)?;
        let removed = self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|docs| docs.remove(key));

        match removed {
            Some(_) => Ok(()),
            None => {
                let scope = PluginError::scoped(
                    "DevDocument.Delete",
                    [("collection", collection), ("key", key)],
                );
                Err(scope.error(Code::NotFound, "document not found"))
            }
        }
    }

    async fn query(
        &self,
        collection: &str,
        expressions: &[QueryExpression],
        limit: usize,
    ) -> PluginResult<Vec<Document>> {
        if collection.is_empty() {
            return Err(PluginError::scoped("DevDocument.Query", [("collection", collection)])
                .error(Code::InvalidArgument, "provide non-blank collection"));
        }

        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let limit = if limit == 0 { usize::MAX } else { limit };
        Ok(docs
            .iter()
            .filter(|(_, content)| expressions.iter().all(|e| satisfies(content, e)))
            .take(limit)
            .map(|(key, content)| Document {
                key: key.clone(),
                content: content.clone(),
            })
            .collect())
    }
}
