use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use tracing::{debug, error, info};

use crate::config::{Config, KafkaConfig, Topics};
use crate::error::{LibError, Result};
use crate::models::{EventMessage, GroupEvent};
use crate::operations::SyncOperations;

/// Broker connectivity flag shared with the health endpoint.
#[derive(Debug, Clone, Default)]
pub struct BrokerStatus {
    connected: Arc<AtomicBool>,
}

impl BrokerStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn set(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

/// Parse a raw broker message into a normalized event.
///
/// Fails on malformed JSON, an envelope topic that does not match the broker
/// topic the message arrived on, an unhandled topic, or any payload
/// validation error. None of these paths touch a store.
pub fn parse_event(topics: &Topics, broker_topic: &str, raw: &[u8]) -> Result<GroupEvent> {
    let message = EventMessage::from_slice(raw)?;

    if message.topic != broker_topic {
        return Err(LibError::invalid_with_code(
            "topic_mismatch",
            "Envelope topic does not match the broker topic",
            anyhow!(
                "envelope topic {:?} arrived on broker topic {:?}",
                message.topic,
                broker_topic
            ),
        ));
    }

    let kind = topics.kind_of(broker_topic).ok_or_else(|| {
        LibError::invalid_with_code(
            "unknown_topic",
            "Message arrived on an unhandled topic",
            anyhow!("no handler registered for topic {:?}", broker_topic),
        )
    })?;

    GroupEvent::from_message(kind, &message)
}

fn consumer_config(kafka: &KafkaConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &kafka.brokers)
        .set("group.id", &kafka.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest");

    if let (Some(cert), Some(key)) = (&kafka.client_cert, &kafka.client_cert_key) {
        config
            .set("security.protocol", "ssl")
            .set("ssl.certificate.pem", cert)
            .set("ssl.key.pem", key);
    }

    config
}

/// The consumer loop: one message at a time per partition, handlers awaited
/// in order, offset committed whether the handler succeeded or failed.
///
/// Failed messages are logged and dropped — there is no retry, redelivery,
/// or dead-letter path.
pub struct EventConsumer {
    consumer: StreamConsumer,
    topics: Topics,
    operations: SyncOperations,
    status: BrokerStatus,
}

impl EventConsumer {
    pub fn new(config: &Config, operations: SyncOperations) -> Result<Self> {
        let consumer: StreamConsumer = consumer_config(&config.kafka).create().map_err(|err| {
            LibError::external("Failed to create broker consumer", anyhow!(err))
        })?;

        let topic_refs = config.topics.all();
        consumer.subscribe(&topic_refs).map_err(|err| {
            LibError::external("Failed to subscribe to broker topics", anyhow!(err))
        })?;
        info!(topics = ?topic_refs, group_id = %config.kafka.group_id, "subscribed");

        let status = BrokerStatus::default();
        status.set(true);

        Ok(Self {
            consumer,
            topics: config.topics.clone(),
            operations,
            status,
        })
    }

    pub fn status(&self) -> BrokerStatus {
        self.status.clone()
    }

    pub async fn run(self) -> Result<()> {
        info!("starting consumer loop");
        loop {
            match self.consumer.recv().await {
                Err(err) => {
                    self.status.set(false);
                    error!(error = %err, "broker receive failed");
                }
                Ok(message) => {
                    self.status.set(true);
                    self.handle(&message).await;
                    if let Err(err) = self.consumer.commit_message(&message, CommitMode::Async) {
                        error!(error = %err, "offset commit failed");
                    }
                }
            }
        }
    }

    async fn handle(&self, message: &BorrowedMessage<'_>) {
        let topic = message.topic();
        let partition = message.partition();
        let offset = message.offset();
        info!(topic, partition, offset, "received event message");

        let Some(raw) = message.payload() else {
            error!(topic, partition, offset, "message had no payload");
            return;
        };

        let event = match parse_event(&self.topics, topic, raw) {
            Ok(event) => event,
            Err(err) => {
                error!(
                    topic,
                    partition,
                    offset,
                    code = err.code,
                    error = %err.source,
                    "{}",
                    err.public
                );
                return;
            }
        };

        match self.operations.execute(event).await {
            Ok(()) => debug!(topic, partition, offset, "successfully processed message"),
            Err(err) => error!(
                topic,
                partition,
                offset,
                code = err.code,
                error = %err.source,
                "{}",
                err.public
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::{GroupEvent, LegacyGroupId};

    fn topics() -> Topics {
        Topics {
            create_group: "groups.notification.create".to_string(),
            update_group: "groups.notification.update".to_string(),
            delete_group: "groups.notification.delete".to_string(),
            add_member: "groups.notification.member.add".to_string(),
            remove_member: "groups.notification.member.delete".to_string(),
        }
    }

    fn create_message() -> serde_json::Value {
        json!({
            "topic": "groups.notification.create",
            "originator": "groups-api",
            "timestamp": "2020-04-07T12:30:00Z",
            "mime-type": "application/json",
            "payload": {
                "id": "55ba651a-dbb5-4d72-9dc4-2ff29e7cb1f7",
                "name": "group-1",
                "description": "desc-1",
                "domain": "www.topcoder.com",
                "privateGroup": true,
                "selfRegister": true,
                "createdBy": "8547899"
            }
        })
    }

    #[test]
    fn parses_create_event() {
        let raw = create_message().to_string();
        let event = parse_event(&topics(), "groups.notification.create", raw.as_bytes())
            .expect("message should parse");

        match event {
            GroupEvent::Create(group) => {
                assert_eq!(group.name, "group-1");
                assert!(group.private_group);
            }
            other => panic!("expected create event, got {:?}", other),
        }
    }

    #[test]
    fn parses_delete_event() {
        let raw = json!({
            "topic": "groups.notification.delete",
            "originator": "groups-api",
            "timestamp": "2020-04-07T12:30:00Z",
            "mime-type": "application/json",
            "payload": { "groups": [10500] }
        })
        .to_string();

        let event = parse_event(&topics(), "groups.notification.delete", raw.as_bytes())
            .expect("message should parse");

        match event {
            GroupEvent::Delete(deletion) => {
                assert_eq!(deletion.groups, vec![LegacyGroupId(10500)]);
            }
            other => panic!("expected delete event, got {:?}", other),
        }
    }

    #[test]
    fn rejects_invalid_json() {
        let err = parse_event(&topics(), "groups.notification.create", b"not json")
            .expect_err("malformed JSON should fail");
        assert_eq!(err.code, "invalid_message_json");
    }

    #[test]
    fn rejects_envelope_topic_mismatch() {
        let raw = create_message().to_string();
        let err = parse_event(&topics(), "groups.notification.update", raw.as_bytes())
            .expect_err("mismatched topic should fail");
        assert_eq!(err.code, "topic_mismatch");
    }

    #[test]
    fn rejects_unhandled_topic() {
        let mut message = create_message();
        message["topic"] = json!("challenges.notification.create");
        let raw = message.to_string();

        let err = parse_event(&topics(), "challenges.notification.create", raw.as_bytes())
            .expect_err("unhandled topic should fail");
        assert_eq!(err.code, "unknown_topic");
    }

    #[test]
    fn rejects_payload_on_wrong_topic() {
        // A create payload arriving on the update topic must fail the update
        // schema, not be silently handled as a create.
        let mut message = create_message();
        message["topic"] = json!("groups.notification.update");
        let raw = message.to_string();

        let err = parse_event(&topics(), "groups.notification.update", raw.as_bytes())
            .expect_err("create payload should fail update validation");
        assert_eq!(err.code, "invalid_payload");
    }
}
