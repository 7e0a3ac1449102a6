//! RedisStore - KeyValueStore over a single Redis node or a Redis cluster.
//!
//! Lists map to RPUSH/LPOP/LLEN, the lock to `SET NX PX`, and the conditional
//! delete to a server-side Lua script so the compare and the delete cannot be
//! interleaved with another client. Every command touches one key, so the same
//! commands route unchanged through a cluster connection.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::{
    Cmd, ConnectionAddr, ConnectionInfo, Pipeline, RedisConnectionInfo, RedisError, RedisFuture,
    Script, Value,
};
use tracing::{debug, warn};

use crate::config::{CacheProperties, NodeAddress};
use crate::ports::{KeyValueStore, StoreError};

const DELETE_IF_EQUALS: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// Single-node or cluster connection; both are cheap to clone.
#[derive(Clone)]
enum Connection {
    Node(MultiplexedConnection),
    Cluster(ClusterConnection),
}

impl ConnectionLike for Connection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Connection::Node(conn) => conn.req_packed_command(cmd),
            Connection::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Connection::Node(conn) => conn.req_packed_commands(cmd, offset, count),
            Connection::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Connection::Node(conn) => conn.get_db(),
            Connection::Cluster(conn) => conn.get_db(),
        }
    }
}

pub struct RedisStore {
    conn: Connection,
    delete_if_equals: Script,
}

/// Connection info for one node. Credentials travel as fields, never inside a
/// URL, so any byte sequence is a valid password.
fn connection_info(node: &NodeAddress, props: &CacheProperties) -> ConnectionInfo {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(node.host.clone(), node.port),
        redis: RedisConnectionInfo {
            db: i64::from(props.database),
            username: non_empty(&props.credential.username),
            password: non_empty(&props.credential.password),
            ..Default::default()
        },
    }
}

impl RedisStore {
    /// Connect to the node (or cluster) described by `props` and ping it once.
    ///
    /// A failed or timed-out attempt is retried `pool.max_retries` times.
    pub async fn connect(props: &CacheProperties) -> Result<Self, StoreError> {
        let mut attempt = 0;
        loop {
            match Self::connect_once(props).await {
                Ok(store) => return Ok(store),
                Err(e) if attempt < props.pool.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, addresses = ?props.addresses, "redis connect failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn connect_once(props: &CacheProperties) -> Result<Self, StoreError> {
        let infos: Vec<ConnectionInfo> = props
            .nodes()
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .iter()
            .map(|node| connection_info(node, props))
            .collect();
        let timeout = props.pool.connect_timeout();

        let conn = if props.is_cluster() {
            let mut builder = ClusterClientBuilder::new(infos).retries(props.pool.max_retries);
            if !props.credential.username.is_empty() {
                builder = builder.username(props.credential.username.clone());
            }
            if !props.credential.password.is_empty() {
                builder = builder.password(props.credential.password.clone());
            }
            let client = builder.build().map_err(|e| store_error("", e))?;
            Connection::Cluster(with_timeout(timeout, client.get_async_connection()).await?)
        } else {
            let info = infos.into_iter().next().ok_or_else(|| {
                StoreError::Connection("no redis node configured".to_string())
            })?;
            let client = redis::Client::open(info).map_err(|e| store_error("", e))?;
            Connection::Node(with_timeout(timeout, client.get_multiplexed_async_connection()).await?)
        };

        let store = Self {
            conn,
            delete_if_equals: Script::new(DELETE_IF_EQUALS),
        };
        store.ping().await?;
        debug!(addresses = ?props.addresses, cluster = props.is_cluster(), "connected to redis");
        Ok(store)
    }

    fn conn(&self) -> Connection {
        self.conn.clone()
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    connecting: impl Future<Output = Result<T, RedisError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, connecting).await {
        Ok(conn) => conn.map_err(|e| StoreError::Connection(e.to_string())),
        Err(_) => Err(StoreError::Connection(format!(
            "connect timed out after {timeout:?}"
        ))),
    }
}

fn store_error(key: &str, e: RedisError) -> StoreError {
    if e.code() == Some("WRONGTYPE") {
        StoreError::WrongType(key.to_string())
    } else if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn())
            .await
            .map_err(|e| store_error("", e))?;
        Ok(())
    }

    async fn push(&self, key: &str, values: &[String]) -> Result<u64, StoreError> {
        // RPUSH rejects an empty value list.
        if values.is_empty() {
            return self.count(key).await;
        }
        redis::cmd("RPUSH")
            .arg(key)
            .arg(values)
            .query_async::<_, u64>(&mut self.conn())
            .await
            .map_err(|e| store_error(key, e))
    }

    async fn pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        redis::cmd("LPOP")
            .arg(key)
            .query_async::<_, Option<String>>(&mut self.conn())
            .await
            .map_err(|e| store_error(key, e))
    }

    async fn count(&self, key: &str) -> Result<u64, StoreError> {
        redis::cmd("LLEN")
            .arg(key)
            .query_async::<_, u64>(&mut self.conn())
            .await
            .map_err(|e| store_error(key, e))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        // "OK" when set, nil when the key already exists.
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<_, Option<String>>(&mut self.conn())
            .await
            .map_err(|e| store_error(key, e))?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let deleted = self
            .delete_if_equals
            .key(key)
            .arg(value)
            .invoke_async::<_, i64>(&mut self.conn())
            .await
            .map_err(|e| store_error(key, e))?;
        Ok(deleted > 0)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut self.conn())
            .await
            .map_err(|e| store_error(key, e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        cmd.query_async::<_, String>(&mut self.conn())
            .await
            .map_err(|e| store_error(key, e))?;
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        redis::cmd("DEL")
            .arg(keys)
            .query_async::<_, u64>(&mut self.conn())
            .await
            .map_err(|e| store_error(keys[0], e))
    }

    async fn exists(&self, keys: &[&str]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        redis::cmd("EXISTS")
            .arg(keys)
            .query_async::<_, u64>(&mut self.conn())
            .await
            .map_err(|e| store_error(keys[0], e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use rstest::rstest;

    /// Tests against a live server skip themselves when none answers.
    async fn live_store() -> Option<RedisStore> {
        let mut props = CacheProperties::redis("127.0.0.1:6379");
        props.pool.max_retries = 0;
        props.pool.connect_timeout_ms = 500;
        RedisStore::connect(&props).await.ok()
    }

    #[rstest]
    #[case("u", "p/ss#1")]
    #[case("svc", "a@b?c%d")]
    #[case("", "only:password")]
    fn credentials_are_passed_verbatim(#[case] username: &str, #[case] password: &str) {
        let mut props = CacheProperties::redis("h:6380");
        props.database = 4;
        props.credential = Credential {
            username: username.to_string(),
            password: password.to_string(),
        };
        let node = &props.nodes().unwrap()[0];

        let info = connection_info(node, &props);
        assert!(matches!(&info.addr, ConnectionAddr::Tcp(host, 6380) if host == "h"));
        assert_eq!(info.redis.db, 4);
        assert_eq!(info.redis.username.as_deref(), (!username.is_empty()).then_some(username));
        assert_eq!(info.redis.password.as_deref(), Some(password));
        // The client accepts it as-is.
        assert!(redis::Client::open(info).is_ok());
    }

    #[test]
    fn sub_millisecond_ttl_rounds_up() {
        assert_eq!(millis(Duration::from_micros(10)), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }

    #[tokio::test]
    async fn unreachable_node_is_a_connection_error() {
        // Port 1 is reserved; nothing listens there.
        let mut props = CacheProperties::redis("127.0.0.1:1");
        props.pool.max_retries = 1;
        props.pool.connect_timeout_ms = 200;
        let err = RedisStore::connect(&props).await.err().unwrap();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn compare_and_delete_against_live_server() {
        let Some(store) = live_store().await else {
            eprintln!("redis not available, skipping");
            return;
        };
        let key = format!("tether/test/lock/{}", ulid::Ulid::new());

        assert!(store.set_if_absent(&key, "o1", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_if_absent(&key, "o2", Duration::from_secs(5)).await.unwrap());
        assert!(!store.delete_if_equals(&key, "o2").await.unwrap());
        assert!(store.delete_if_equals(&key, "o1").await.unwrap());
        assert_eq!(store.exists(&[key.as_str()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_roundtrip_against_live_server() {
        let Some(store) = live_store().await else {
            eprintln!("redis not available, skipping");
            return;
        };
        let key = format!("tether/test/queue/{}", ulid::Ulid::new());

        assert_eq!(store.push(&key, &[]).await.unwrap(), 0);
        assert_eq!(store.exists(&[key.as_str()]).await.unwrap(), 0);
        store.push(&key, &["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(store.count(&key).await.unwrap(), 2);
        assert_eq!(store.pop(&key).await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.pop(&key).await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.pop(&key).await.unwrap(), None);
    }
}
