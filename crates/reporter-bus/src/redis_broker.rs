//! Redis Streams broker.
//!
//! Each queue is a stream. Envelopes are appended with XADD as two fields,
//! `name` and `body` (JSON). Consumers read through a consumer group with
//! XREADGROUP and acknowledge with XACK; entries read but never acknowledged
//! stay in the group's pending list and are read again on the next
//! subscription before any new entry.

use crate::{Broker, BusError, BusResult, Delivery, Envelope, Subscription};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult, Value};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

/// Read every entry of the stream that is new to the group.
const NEW_ENTRIES: &str = ">";
/// Read this consumer's pending entries from the start.
const PENDING_ENTRIES: &str = "0";

/// Connection settings for [`RedisBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisBrokerConfig {
    pub url: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub block_timeout_ms: u64,
}

/// Broker backed by Redis Streams.
pub struct RedisBroker {
    client: Client,
    conn: MultiplexedConnection,
    config: RedisBrokerConfig,
}

impl RedisBroker {
    /// Connect to Redis. Subscriptions open their own connections.
    pub async fn connect(config: RedisBrokerConfig) -> BusResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(group = %config.consumer_group, consumer = %config.consumer_name, "Connected to Redis");
        Ok(Self {
            client,
            conn,
            config,
        })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn ping(&self) -> BusResult<()> {
        let pong: String = redis::cmd("PING").query_async(&mut self.conn.clone()).await?;
        debug!(reply = %pong, "Redis ping");
        Ok(())
    }

    async fn publish(&self, queue: &str, envelope: &Envelope) -> BusResult<()> {
        let body = serde_json::to_string(&envelope.body)?;
        let id: String = self
            .conn
            .clone()
            .xadd(
                queue,
                "*",
                &[("name", envelope.name.as_str()), ("body", body.as_str())],
            )
            .await?;
        debug!(stream = %queue, id = %id, name = %envelope.name, "Appended to stream");
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> BusResult<Box<dyn Subscription>> {
        let subscription =
            RedisSubscription::connect(self.client.clone(), queue, self.config.clone()).await?;
        Ok(Box::new(subscription))
    }
}

/// Consumer group reader over one stream.
pub struct RedisSubscription {
    client: Client,
    conn: MultiplexedConnection,
    queue: String,
    config: RedisBrokerConfig,
    /// True once this consumer's pending list was read to the end.
    backlog_done: bool,
}

impl RedisSubscription {
    async fn connect(client: Client, queue: &str, config: RedisBrokerConfig) -> BusResult<Self> {
        let conn = client.get_multiplexed_async_connection().await?;
        let subscription = Self {
            client,
            conn,
            queue: queue.to_string(),
            config,
            backlog_done: false,
        };
        subscription.ensure_consumer_group().await?;
        Ok(subscription)
    }

    /// Create the consumer group, tolerating one that already exists.
    async fn ensure_consumer_group(&self) -> BusResult<()> {
        // Start at 0 so entries appended before the group existed are read.
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.queue)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.conn.clone())
            .await;

        match result {
            Ok(()) => {
                info!(stream = %self.queue, group = %self.config.consumer_group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream = %self.queue, group = %self.config.consumer_group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Subscription for RedisSubscription {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn next(&mut self) -> BusResult<Option<Delivery>> {
        let start_id = if self.backlog_done {
            NEW_ENTRIES
        } else {
            PENDING_ENTRIES
        };

        let reply: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(self.config.block_timeout_ms)
            .arg("STREAMS")
            .arg(&self.queue)
            .arg(start_id)
            .query_async(&mut self.conn)
            .await?;

        let delivery = parse_xreadgroup_reply(reply)?;
        if delivery.is_none() && !self.backlog_done {
            debug!(stream = %self.queue, "Pending list drained");
            self.backlog_done = true;
        }
        Ok(delivery)
    }

    async fn ack(&mut self, delivery_id: &str) -> BusResult<()> {
        let acked: i64 = self
            .conn
            .xack(&self.queue, &self.config.consumer_group, &[delivery_id])
            .await?;

        if acked == 1 {
            debug!(stream = %self.queue, id = %delivery_id, "Acknowledged entry");
        } else {
            warn!(stream = %self.queue, id = %delivery_id, acked, "XACK matched no pending entry");
        }
        Ok(())
    }

    async fn reconnect(&mut self) -> BusResult<()> {
        info!(stream = %self.queue, "Reconnecting to Redis");
        self.conn = self.client.get_multiplexed_async_connection().await?;
        self.ensure_consumer_group().await?;
        self.backlog_done = false;
        Ok(())
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

/// Parse `[[stream, [[id, [field, value, ...]]]]]` into at most one delivery.
///
/// Entries missing a field, or whose body is not JSON, still become a
/// delivery so the channel can park them instead of re-reading them forever.
fn parse_xreadgroup_reply(reply: Value) -> BusResult<Option<Delivery>> {
    let streams = match reply {
        Value::Nil => return Ok(None),
        Value::Array(streams) => streams,
        other => {
            return Err(BusError::Protocol(format!(
                "Unexpected XREADGROUP reply: {other:?}"
            )))
        }
    };

    let Some(stream) = streams.into_iter().next() else {
        return Ok(None);
    };
    let Value::Array(stream) = stream else {
        return Err(BusError::Protocol("Expected array for stream entry".to_string()));
    };
    let Some(Value::Array(entries)) = stream.into_iter().nth(1) else {
        return Err(BusError::Protocol("Stream entry has no entry list".to_string()));
    };
    let Some(entry) = entries.into_iter().next() else {
        return Ok(None);
    };
    let Value::Array(entry) = entry else {
        return Err(BusError::Protocol("Expected array for stream entry".to_string()));
    };

    let mut parts = entry.into_iter();
    let id = parts
        .next()
        .as_ref()
        .and_then(as_text)
        .ok_or_else(|| BusError::Protocol("Stream entry has no id".to_string()))?;

    // Trimmed entries come back with nil fields.
    let fields = match parts.next() {
        Some(Value::Array(fields)) => fields,
        _ => Vec::new(),
    };

    let mut name = None;
    let mut body = None;
    for pair in fields.chunks(2) {
        if let [key, value] = pair {
            match as_text(key).as_deref() {
                Some("name") => name = as_text(value),
                Some("body") => body = as_text(value),
                _ => {}
            }
        }
    }

    let name = name.unwrap_or_default();
    let body = match body {
        Some(raw) => serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw)),
        None => JsonValue::Null,
    };

    Ok(Some(Delivery {
        id,
        envelope: Envelope { name, body },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn reply(id: &str, fields: Vec<Value>) -> Value {
        Value::Array(vec![Value::Array(vec![
            bulk("youtrack-reporter"),
            Value::Array(vec![Value::Array(vec![bulk(id), Value::Array(fields)])]),
        ])])
    }

    #[test]
    fn test_parse_entry() {
        let value = reply(
            "1700000000000-0",
            vec![bulk("name"), bulk("a.b"), bulk("body"), bulk(r#"{"x":1}"#)],
        );
        let delivery = parse_xreadgroup_reply(value).unwrap().unwrap();
        assert_eq!(delivery.id, "1700000000000-0");
        assert_eq!(delivery.envelope, Envelope::new("a.b", json!({"x": 1})));
    }

    #[test]
    fn test_parse_timeout_and_empty_pending_list() {
        assert!(parse_xreadgroup_reply(Value::Nil).unwrap().is_none());

        let empty = Value::Array(vec![Value::Array(vec![
            bulk("youtrack-reporter"),
            Value::Array(vec![]),
        ])]);
        assert!(parse_xreadgroup_reply(empty).unwrap().is_none());
    }

    #[test]
    fn test_parse_malformed_entry_still_delivers() {
        let value = reply("2-0", vec![bulk("body"), bulk("not json")]);
        let delivery = parse_xreadgroup_reply(value).unwrap().unwrap();
        assert_eq!(delivery.envelope.name, "");
        assert_eq!(delivery.envelope.body, json!("not json"));

        let trimmed = Value::Array(vec![Value::Array(vec![
            bulk("youtrack-reporter"),
            Value::Array(vec![Value::Array(vec![bulk("3-0"), Value::Nil])]),
        ])]);
        let delivery = parse_xreadgroup_reply(trimmed).unwrap().unwrap();
        assert_eq!(delivery.id, "3-0");
        assert_eq!(delivery.envelope.body, JsonValue::Null);
    }

    #[test]
    fn test_parse_rejects_unexpected_reply() {
        assert!(matches!(
            parse_xreadgroup_reply(Value::Int(1)),
            Err(BusError::Protocol(_))
        ));
    }
}
