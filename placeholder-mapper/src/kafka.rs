use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use metrics::counter;
use placeholder_common::error::PublishError;
use placeholder_common::message::{MessageProducer, ProducerMessage, TRANSACTION_ID_HEADER};
use rdkafka::consumer::{Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{ClientConfig, ClientContext, Message};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::KafkaConfig;
use crate::handler::InboundMessage;
use crate::health::LivenessHandle;

pub struct KafkaContext {
    liveness: LivenessHandle,
}

impl From<LivenessHandle> for KafkaContext {
    fn from(liveness: LivenessHandle) -> Self {
        KafkaContext { liveness }
    }
}

impl ClientContext for KafkaContext {
    fn stats(&self, _: rdkafka::Statistics) {
        // rdkafka only calls back while its main loop is running
        self.liveness.report_healthy();
    }
}

impl ConsumerContext for KafkaContext {}

fn base_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000");

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    client_config
}

pub async fn create_kafka_producer(
    config: &KafkaConfig,
    liveness: LivenessHandle,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = base_client_config(config);
    client_config
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set("compression.codec", config.kafka_compression_codec.to_owned())
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        );

    debug!("rdkafka producer configuration: {:?}", client_config);
    let producer: FutureProducer<KafkaContext> =
        client_config.create_with_context(liveness.into())?;

    // "Ping" the brokers so a broken configuration fails at start
    match producer
        .client()
        .fetch_metadata(None, std::time::Duration::from_secs(15))
    {
        Ok(metadata) => {
            info!(
                "Successfully connected to Kafka brokers. Found {} topics.",
                metadata.topics().len()
            );
        }
        Err(error) => {
            error!("Failed to fetch metadata from Kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(producer)
}

/// Publishes event messages to a single topic, transport headers as Kafka headers.
pub struct KafkaMessageProducer {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaMessageProducer {
    pub fn new(producer: FutureProducer<KafkaContext>, topic: &str) -> Self {
        Self {
            producer,
            topic: topic.to_owned(),
        }
    }
}

fn to_kafka_headers(headers: &std::collections::BTreeMap<String, String>) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (key, value)| {
            acc.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        })
}

#[async_trait]
impl MessageProducer for KafkaMessageProducer {
    async fn send_message(&self, message: ProducerMessage) -> Result<(), PublishError> {
        let record = FutureRecord {
            topic: &self.topic,
            payload: Some(&message.body),
            partition: None,
            key: message
                .headers
                .get(TRANSACTION_ID_HEADER)
                .map(String::as_str),
            timestamp: None,
            headers: Some(to_kafka_headers(&message.headers)),
        };

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| PublishError::Produce(e.to_string()))?;

        match delivery.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err((e, _))) => {
                counter!("placeholder_kafka_produce_errors_total").increment(1);
                Err(PublishError::Produce(e.to_string()))
            }
            Err(_) => {
                counter!("placeholder_kafka_produce_errors_total").increment(1);
                Err(PublishError::Canceled)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RecvError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("received empty payload")]
    Empty,
}

#[derive(Debug, Error)]
pub enum OffsetError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("consumer gone")]
    Gone,
}

/// Consumes native records from one topic. Offsets are only stored once a message
/// has been handled, so a crash replays it.
#[derive(Clone)]
pub struct NativeRecordConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer<KafkaContext>,
    topic: String,
}

impl NativeRecordConsumer {
    pub fn new(config: &KafkaConfig, liveness: LivenessHandle) -> Result<Self, KafkaError> {
        let mut client_config = base_client_config(config);
        client_config
            .set("group.id", &config.kafka_consumer_group)
            .set("auto.offset.reset", &config.kafka_consumer_offset_reset)
            .set("enable.auto.offset.store", "false");

        let consumer: StreamConsumer<KafkaContext> =
            client_config.create_with_context(liveness.into())?;
        consumer.subscribe(&[config.kafka_consumer_topic.as_str()])?;

        Ok(Self {
            inner: Arc::new(Inner {
                consumer,
                topic: config.kafka_consumer_topic.clone(),
            }),
        })
    }

    pub async fn recv(&self) -> Result<(InboundMessage, Offset), RecvError> {
        let message = self.inner.consumer.recv().await?;

        let offset = Offset {
            handle: Arc::downgrade(&self.inner),
            partition: message.partition(),
            offset: message.offset(),
        };

        let Some(payload) = message.payload() else {
            // Nothing will ever make an empty message valid, skip past it
            if let Err(e) = offset.store() {
                error!("failed to store offset of empty message: {}", e);
            }
            return Err(RecvError::Empty);
        };

        let mut headers = HashMap::new();
        if let Some(message_headers) = message.headers() {
            for header in message_headers.iter() {
                if let Some(Ok(value)) = header.value.map(std::str::from_utf8) {
                    headers.insert(header.key.to_owned(), value.to_owned());
                }
            }
        }

        Ok((
            InboundMessage {
                headers,
                body: payload.to_vec(),
            },
            offset,
        ))
    }
}

pub struct Offset {
    handle: Weak<Inner>,
    partition: i32,
    offset: i64,
}

impl Offset {
    pub fn store(self) -> Result<(), OffsetError> {
        let inner = self.handle.upgrade().ok_or(OffsetError::Gone)?;
        // The stored offset is the next one to consume.
        inner
            .consumer
            .store_offset(&inner.topic, self.partition, self.offset + 1)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_to_kafka_headers() {
        let headers = BTreeMap::from([
            ("Message-Type".to_owned(), "cms-content-published".to_owned()),
            ("X-Request-Id".to_owned(), "tid_test123".to_owned()),
        ]);

        let kafka_headers = to_kafka_headers(&headers);

        assert_eq!(kafka_headers.count(), 2);
        let collected: Vec<(String, Option<Vec<u8>>)> = kafka_headers
            .iter()
            .map(|header| (header.key.to_owned(), header.value.map(<[u8]>::to_vec)))
            .collect();
        assert_eq!(
            collected,
            vec![
                (
                    "Message-Type".to_owned(),
                    Some(b"cms-content-published".to_vec())
                ),
                ("X-Request-Id".to_owned(), Some(b"tid_test123".to_vec())),
            ]
        );
    }
}
