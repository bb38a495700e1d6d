//! Pooled Tile38 client.
//!
//! Commands run on connections checked out of a bounded `r2d2` pool, one
//! command per checkout. The pub/sub stream uses its own dedicated async
//! connection that never goes back to the pool.

use crate::command::{Area, FenceSpec, SearchKind};
use crate::error::Result;
use crate::reply::{parse_id_page, parse_object_page, StoredObject};
use crate::store::{ChannelSubscriber, GeoStore};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Default number of pooled connections.
pub const DEFAULT_MAX_IDLE: u32 = 16;

/// Default idle time before a pooled connection is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on pooled connections.
    pub max_idle: u32,
    /// Idle connections older than this are dropped.
    pub idle_timeout: Duration,
    /// How long a command waits for a free connection.
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

/// A message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl From<redis::Msg> for ChannelMessage {
    fn from(msg: redis::Msg) -> Self {
        Self {
            channel: msg.get_channel_name().to_string(),
            payload: msg.get_payload_bytes().to_vec(),
        }
    }
}

/// Stream of channel messages. Ends when the subscription connection drops.
pub type ChannelStream = BoxStream<'static, ChannelMessage>;

/// Tile38 client wrapper.
#[derive(Clone)]
pub struct Tile38Client {
    client: redis::Client,
    pool: r2d2::Pool<redis::Client>,
}

impl Tile38Client {
    /// Create a client. No connection is opened until the first command.
    pub fn new(url: &str, config: &PoolConfig) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let pool = r2d2::Pool::builder()
            .max_size(config.max_idle)
            .min_idle(Some(0))
            .idle_timeout(Some(config.idle_timeout))
            .connection_timeout(config.connection_timeout)
            .build_unchecked(client.clone());
        info!(
            "Tile38 client for {} (pool size {}, idle timeout {:?})",
            url, config.max_idle, config.idle_timeout
        );
        Ok(Self { client, pool })
    }

    /// Run a single command on a pooled connection and return the raw reply.
    pub async fn execute(&self, command: &str, args: Vec<String>) -> Result<Value> {
        let pool = self.pool.clone();
        let name = command.to_string();
        tokio::task::spawn_blocking(move || -> Result<Value> {
            let mut conn = pool.get()?;
            let mut cmd = redis::cmd(&name);
            for arg in &args {
                cmd.arg(arg);
            }
            debug!("{} {:?}", name, args);
            let reply: Value = cmd.query(&mut *conn)?;
            Ok(reply)
        })
        .await?
    }

    /// Follow cursors until the backend reports the last page.
    async fn paged<T>(
        &self,
        command: &str,
        collection: &str,
        tail: &[String],
        parse: fn(Value) -> Result<(u64, Vec<T>)>,
    ) -> Result<Vec<T>> {
        let mut results = Vec::new();
        let mut cursor = 0u64;
        loop {
            let mut args = vec![collection.to_string()];
            if cursor > 0 {
                args.push("CURSOR".to_string());
                args.push(cursor.to_string());
            }
            args.extend_from_slice(tail);
            let (next, page) = parse(self.execute(command, args).await?)?;
            results.extend(page);
            if next == 0 || next == cursor {
                break;
            }
            cursor = next;
        }
        Ok(results)
    }
}

#[async_trait]
impl GeoStore for Tile38Client {
    async fn set_object(
        &self,
        collection: &str,
        id: &str,
        object: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut args = vec![collection.to_string(), id.to_string()];
        if let Some(ttl) = ttl {
            args.push("EX".to_string());
            args.push(ttl.as_secs_f64().to_string());
        }
        args.push("OBJECT".to_string());
        args.push(object.to_string());
        self.execute("SET", args).await?;
        Ok(())
    }

    async fn del_object(&self, collection: &str, id: &str) -> Result<()> {
        self.execute("DEL", vec![collection.to_string(), id.to_string()])
            .await?;
        Ok(())
    }

    async fn set_channel(&self, name: &str, fence: &FenceSpec) -> Result<()> {
        let mut args = vec![name.to_string()];
        args.extend(fence.to_args());
        self.execute("SETCHAN", args).await?;
        Ok(())
    }

    async fn del_channel(&self, name: &str) -> Result<()> {
        self.execute("DELCHAN", vec![name.to_string()]).await?;
        Ok(())
    }

    async fn scan(&self, collection: &str) -> Result<Vec<StoredObject>> {
        self.paged("SCAN", collection, &[], parse_object_page).await
    }

    async fn search_ids(
        &self,
        kind: SearchKind,
        collection: &str,
        area: &Area,
    ) -> Result<Vec<String>> {
        let mut tail = vec!["IDS".to_string()];
        tail.extend(area.to_args());
        self.paged(kind.as_str(), collection, &tail, parse_id_page)
            .await
    }
}

#[async_trait]
impl ChannelSubscriber for Tile38Client {
    /// Pattern-subscribe on a dedicated connection that never returns to
    /// the pool.
    async fn psubscribe(&self, patterns: &[String]) -> Result<ChannelStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for pattern in patterns {
            pubsub.psubscribe(pattern).await?;
        }
        info!("Subscribed to channel patterns {:?}", patterns);
        Ok(pubsub.into_on_message().map(ChannelMessage::from).boxed())
    }
}
