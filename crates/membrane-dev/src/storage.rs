//! In-memory object storage.

use std::collections::HashMap;

use async_trait::async_trait;
use membrane_plugins::{Code, PluginError, PluginResult, StorageService};
use parking_lot::RwLock;

/// Object storage kept in process memory.
#[derive(Debug, Default)]
pub struct DevStorageService {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl DevStorageService {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check(service: &str, bucket: &str, key: &str) -> PluginResult<()> {
    let scope = PluginError::scoped(service, [("bucket", bucket), ("key", key)]);
    if bucket.is_empty() {
        return Err(scope.error(Code::InvalidArgument, "provide non-blank bucket"));
    }
    if key.is_empty() {
        return Err(scope.error(Code::InvalidArgument, "provide non-blank key"));
    }
    Ok(())
}

#[async_trait]
impl StorageService for DevStorageService {
    async fn read(&self, bucket: &str, key: &str) -> PluginResult<Vec<u8>> {
        check("DevStorage.Read", bucket, key)?;
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| {
                PluginError::scoped("DevStorage.Read", [("bucket", bucket), ("key", key)])
                    .error(Code::NotFound, "object not found")
            })
    }

    async fn write(&self, bucket: &str, key: &str, body: Vec<u8>) -> PluginResult<()> {
        check("DevStorage.Write", bucket, key)?;
        self.objects
            .write()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> PluginResult<()> {
        check("DevStorage.Delete", bucket, key)?;
        self.objects
            .write()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}
