//! Object storage.

use async_trait::async_trait;

use crate::error::{PluginError, PluginResult};

/// Blob storage backend addressed by `(bucket, key)`.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn read(&self, _bucket: &str, _key: &str) -> PluginResult<Vec<u8>> {
        Err(PluginError::unimplemented("Storage.Read"))
    }

    async fn write(&self, _bucket: &str, _key: &str, _body: Vec<u8>) -> PluginResult<()> {
        Err(PluginError::unimplemented("Storage.Write"))
    }

    async fn delete(&self, _bucket: &str, _key: &str) -> PluginResult<()> {
        Err(PluginError::unimplemented("Storage.Delete"))
    }
}
