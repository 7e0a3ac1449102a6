//! Impls - KeyValueStore bindings.
//!
//! - **InMemoryStore**: process-local, for development and tests
//! - **RedisStore**: Redis node or cluster (`redis` feature)

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use std::sync::Arc;

use tracing::info;

use crate::config::{CacheProperties, CacheType};
use crate::domain::TetherResult;
use crate::ports::KeyValueStore;

pub use self::memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis_store::RedisStore;

/// Build the store described by `props`. Redis connections are pinged once.
pub async fn connect(props: &CacheProperties) -> TetherResult<Arc<dyn KeyValueStore>> {
    props.validate()?;
    match props.cache_type {
        CacheType::Memory => {
            info!(cache = "memory", "using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        CacheType::Redis => connect_redis(props).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(props: &CacheProperties) -> TetherResult<Arc<dyn KeyValueStore>> {
    let store = RedisStore::connect(props).await?;
    info!(
        cache = "redis",
        addresses = ?props.addresses,
        cluster = props.is_cluster(),
        database = props.database,
        "connected"
    );
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_props: &CacheProperties) -> TetherResult<Arc<dyn KeyValueStore>> {
    Err(crate::domain::TetherError::Unsupported {
        what: "cache type",
        value: "redis (built without the `redis` feature)".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TetherError;

    #[tokio::test]
    async fn connects_memory_store() {
        let store = connect(&CacheProperties::memory()).await.unwrap();
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_invalid_redis_properties_before_connecting() {
        let mut props = CacheProperties::redis("");
        props.addresses.clear();
        let err = connect(&props).await.err().unwrap();
        assert!(matches!(err, TetherError::Config(_)));
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn redis_requires_feature() {
        let err = connect(&CacheProperties::redis("127.0.0.1:6379"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TetherError::Unsupported { .. }));
    }
}
