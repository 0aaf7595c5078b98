//! Per-message processing of the native record topic.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use placeholder_common::error::{DecodeError, MappingError, PublishError, SerializationError};
use placeholder_common::mapper::AggregateMapper;
use placeholder_common::message::{
    to_event_message, MessageProducer, MESSAGE_TIMESTAMP_HEADER, ORIGIN_SYSTEM_HEADER,
    TRANSACTION_ID_HEADER,
};
use placeholder_common::model::METHODE_SYSTEM_ID;
use placeholder_common::native::NativeMapper;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::kafka::{NativeRecordConsumer, RecvError};

/// A message as received from the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl InboundMessage {
    fn header(&self, name: &str) -> &str {
        self.headers.get(name).map(String::as_str).unwrap_or_default()
    }
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("failed to send publication event for {uuid}: {source}")]
    Publish {
        uuid: String,
        #[source]
        source: PublishError,
    },
}

impl HandlerError {
    fn uuid(&self) -> Option<&str> {
        match self {
            HandlerError::Decode(e) => e.uuid(),
            HandlerError::Mapping(e) => Some(e.uuid()),
            HandlerError::Serialization(e) => Some(e.uuid()),
            HandlerError::Publish { uuid, .. } => Some(uuid),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            HandlerError::Decode(_) => "decode",
            HandlerError::Mapping(_) => "mapping",
            HandlerError::Serialization(_) => "serialization",
            HandlerError::Publish { .. } => "publish",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Not from the native CMS
    Ignored,
    Published(usize),
    Dropped,
}

pub struct QueueHandler {
    native_mapper: Arc<dyn NativeMapper>,
    aggregate_mapper: Arc<dyn AggregateMapper>,
    producer: Arc<dyn MessageProducer>,
}

impl QueueHandler {
    pub fn new(
        native_mapper: Arc<dyn NativeMapper>,
        aggregate_mapper: Arc<dyn AggregateMapper>,
        producer: Arc<dyn MessageProducer>,
    ) -> Self {
        Self {
            native_mapper,
            aggregate_mapper,
            producer,
        }
    }

    /// Map one native record and publish the resulting events. Failures are logged
    /// and the message dropped: nothing is retried.
    #[instrument(skip_all)]
    pub async fn handle_message(&self, message: &InboundMessage) -> HandleOutcome {
        let transaction_id = message.header(TRANSACTION_ID_HEADER);
        let origin_system_id = message.header(ORIGIN_SYSTEM_HEADER);

        if origin_system_id != METHODE_SYSTEM_ID {
            info!(
                transaction_id,
                origin_system_id, "ignoring message with different Origin-System-Id"
            );
            counter!("placeholder_messages_total", "outcome" => "ignored").increment(1);
            return HandleOutcome::Ignored;
        }

        match self.publish(message, transaction_id).await {
            Ok(count) => {
                counter!("placeholder_messages_total", "outcome" => "published").increment(1);
                counter!("placeholder_events_published_total").increment(count as u64);
                HandleOutcome::Published(count)
            }
            Err(e) => {
                error!(
                    transaction_id,
                    uuid = e.uuid().unwrap_or_default(),
                    error = %e,
                    "failed to map content placeholder"
                );
                counter!("placeholder_messages_total", "outcome" => "dropped", "error" => e.kind())
                    .increment(1);
                HandleOutcome::Dropped
            }
        }
    }

    async fn publish(
        &self,
        message: &InboundMessage,
        transaction_id: &str,
    ) -> Result<usize, HandlerError> {
        let placeholder = self.native_mapper.map(
            &message.body,
            transaction_id,
            message.header(MESSAGE_TIMESTAMP_HEADER),
        )?;

        let contents = self
            .aggregate_mapper
            .map_placeholder(&placeholder, transaction_id, &placeholder.last_modified)
            .await?;

        for content in &contents {
            let event = to_event_message(content.core(), content)?;
            self.producer
                .send_message(event)
                .await
                .map_err(|source| HandlerError::Publish {
                    uuid: content.uuid().to_owned(),
                    source,
                })?;
            info!(
                transaction_id,
                uuid = content.uuid(),
                "content mapped and sent to the queue"
            );
        }

        Ok(contents.len())
    }
}

/// Consume native records until `shutdown` flips to true.
/// Messages are handled one at a time and their offset stored once handled.
/// Pause after a failed receive so a broken broker connection isn't polled in a tight loop.
pub const RECV_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Wait for `delay`, returning false if shutdown was requested first.
async fn back_off(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.wait_for(|stop| *stop) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

pub async fn run(
    consumer: NativeRecordConsumer,
    handler: QueueHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("starting queue consumer");
    loop {
        let received = tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            received = consumer.recv() => received,
        };

        match received {
            Ok((message, offset)) => {
                handler.handle_message(&message).await;
                if let Err(e) = offset.store() {
                    error!("failed to store offset: {}", e);
                }
            }
            Err(RecvError::Empty) => warn!("received empty message, skipping"),
            Err(e) => {
                error!("failed to receive message: {}", e);
                if !back_off(&mut shutdown, RECV_ERROR_BACKOFF).await {
                    break;
                }
            }
        }
    }
    info!("queue consumer stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use placeholder_common::message::{ProducerMessage, MESSAGE_ID_HEADER};
    use placeholder_common::model::{
        NativePlaceholder, UppComplementaryContent, UppContent, UppCoreContent,
        COMPLEMENTARY_CONTENT_URI,
    };
    use placeholder_common::native::DefaultNativeMapper;

    use super::*;

    const UUID: &str = "e1f02660-d41a-4a56-8eca-d0f8f0fac068";
    const TID: &str = "tid_test123";
    const TIMESTAMP: &str = "2017-05-15T15:54:32.166Z";

    /// Maps every placeholder to `count` complementary contents.
    struct FixedMapper {
        count: usize,
        fail: bool,
        seen_last_modified: Mutex<Vec<String>>,
    }

    impl FixedMapper {
        fn new(count: usize) -> Arc<Self> {
            Arc::new(Self {
                count,
                fail: false,
                seen_last_modified: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                count: 0,
                fail: true,
                seen_last_modified: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AggregateMapper for FixedMapper {
        async fn map_placeholder(
            &self,
            placeholder: &NativePlaceholder,
            transaction_id: &str,
            last_modified: &str,
        ) -> Result<Vec<UppContent>, MappingError> {
            self.seen_last_modified
                .lock()
                .unwrap()
                .push(last_modified.to_owned());
            if self.fail {
                return Err(MappingError::Validation {
                    uuid: placeholder.uuid.clone(),
                    source: placeholder_common::error::ValidationError::MissingLink,
                });
            }
            Ok((0..self.count)
                .map(|_| {
                    UppComplementaryContent {
                        core: UppCoreContent {
                            uuid: placeholder.uuid.clone(),
                            publish_reference: transaction_id.to_owned(),
                            last_modified: last_modified.to_owned(),
                            content_uri: COMPLEMENTARY_CONTENT_URI.to_owned(),
                            is_marked_deleted: false,
                        },
                        ..Default::default()
                    }
                    .into()
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingProducer {
        sent: Mutex<Vec<ProducerMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl MessageProducer for RecordingProducer {
        async fn send_message(&self, message: ProducerMessage) -> Result<(), PublishError> {
            self.sent.lock().unwrap().push(message);
            if self.fail {
                return Err(PublishError::Canceled);
            }
            Ok(())
        }
    }

    fn native_record() -> Vec<u8> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let attributes = "<ObjectMetadata><EditorialNotes><Sources><Source><SourceCode>ContentPlaceholder</SourceCode></Source></Sources></EditorialNotes>\
            <OutputChannels><DIFTcom><DIFTcomMarkDeleted>False</DIFTcomMarkDeleted><DIFTcomLastPublication>20170329113430</DIFTcomLastPublication></DIFTcom></OutputChannels></ObjectMetadata>";
        let body = "<doc><lead><lead-headline><headline><ln><a href=\"https://www.ft.com/ig/brexit/\">Some headline</a></ln></headline></lead-headline></lead></doc>";

        serde_json::to_vec(&serde_json::json!({
            "uuid": UUID,
            "type": "EOM::CompoundStory",
            "attributes": attributes,
            "value": STANDARD.encode(body),
        }))
        .unwrap()
    }

    fn inbound(origin: &str, body: Vec<u8>) -> InboundMessage {
        InboundMessage {
            headers: HashMap::from([
                (TRANSACTION_ID_HEADER.to_owned(), TID.to_owned()),
                (ORIGIN_SYSTEM_HEADER.to_owned(), origin.to_owned()),
                (MESSAGE_TIMESTAMP_HEADER.to_owned(), TIMESTAMP.to_owned()),
            ]),
            body,
        }
    }

    #[tokio::test]
    async fn test_publishes_every_mapped_content() {
        let mapper = FixedMapper::new(2);
        let producer = Arc::new(RecordingProducer::default());
        let handler = QueueHandler::new(
            Arc::new(DefaultNativeMapper),
            mapper.clone(),
            producer.clone(),
        );

        let outcome = handler
            .handle_message(&inbound(METHODE_SYSTEM_ID, native_record()))
            .await;

        assert_eq!(outcome, HandleOutcome::Published(2));
        assert_eq!(*mapper.seen_last_modified.lock().unwrap(), vec![TIMESTAMP]);

        let sent = producer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].headers[TRANSACTION_ID_HEADER], TID);
        assert_ne!(
            sent[0].headers[MESSAGE_ID_HEADER],
            sent[1].headers[MESSAGE_ID_HEADER]
        );
        let event: serde_json::Value = serde_json::from_str(&sent[0].body).unwrap();
        assert_eq!(
            event["contentUri"],
            format!("{}{}", COMPLEMENTARY_CONTENT_URI, UUID)
        );
        assert_eq!(event["lastModified"], TIMESTAMP);
    }

    #[tokio::test]
    async fn test_ignores_other_origin_systems() {
        let mapper = FixedMapper::new(1);
        let producer = Arc::new(RecordingProducer::default());
        let handler = QueueHandler::new(
            Arc::new(DefaultNativeMapper),
            mapper.clone(),
            producer.clone(),
        );

        let outcome = handler
            .handle_message(&inbound(
                "http://cmdb.ft.com/systems/wordpress",
                native_record(),
            ))
            .await;

        assert_eq!(outcome, HandleOutcome::Ignored);
        assert!(mapper.seen_last_modified.lock().unwrap().is_empty());
        assert!(producer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drops_undecodable_messages() {
        let producer = Arc::new(RecordingProducer::default());
        let handler = QueueHandler::new(
            Arc::new(DefaultNativeMapper),
            FixedMapper::new(1),
            producer.clone(),
        );

        let outcome = handler
            .handle_message(&inbound(METHODE_SYSTEM_ID, b"{}".to_vec()))
            .await;

        assert_eq!(outcome, HandleOutcome::Dropped);
        assert!(producer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drops_unmappable_messages() {
        let producer = Arc::new(RecordingProducer::default());
        let handler = QueueHandler::new(
            Arc::new(DefaultNativeMapper),
            FixedMapper::failing(),
            producer.clone(),
        );

        let outcome = handler
            .handle_message(&inbound(METHODE_SYSTEM_ID, native_record()))
            .await;

        assert_eq!(outcome, HandleOutcome::Dropped);
        assert!(producer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stops_after_first_producer_failure() {
        let producer = Arc::new(RecordingProducer {
            fail: true,
            ..Default::default()
        });
        let handler = QueueHandler::new(
            Arc::new(DefaultNativeMapper),
            FixedMapper::new(2),
            producer.clone(),
        );

        let outcome = handler
            .handle_message(&inbound(METHODE_SYSTEM_ID, native_record()))
            .await;

        assert_eq!(outcome, HandleOutcome::Dropped);
        assert_eq!(producer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_back_off_waits_for_delay() {
        let (_stop, mut stopped) = watch::channel(false);
        let started = std::time::Instant::now();

        assert!(back_off(&mut stopped, Duration::from_millis(20)).await);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_back_off_ends_on_shutdown() {
        let (stop, mut stopped) = watch::channel(false);
        stop.send_replace(true);

        let backed_off = tokio::time::timeout(
            Duration::from_secs(5),
            back_off(&mut stopped, RECV_ERROR_BACKOFF * 60),
        )
        .await
        .expect("back off ignored shutdown");
        assert!(!backed_off);
    }
}
