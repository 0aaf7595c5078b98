//! Publication events and the messages carrying them.
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::dates::upp_date_now;
use crate::error::{PublishError, SerializationError};
use crate::model::{UppCoreContent, METHODE_SYSTEM_ID};

pub const TRANSACTION_ID_HEADER: &str = "X-Request-Id";
pub const MESSAGE_TIMESTAMP_HEADER: &str = "Message-Timestamp";
pub const MESSAGE_ID_HEADER: &str = "Message-Id";
pub const MESSAGE_TYPE_HEADER: &str = "Message-Type";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const ORIGIN_SYSTEM_HEADER: &str = "Origin-System-Id";

pub const PUBLISHED_MESSAGE_TYPE: &str = "cms-content-published";

/// A change notification for one piece of content. Deletes carry no payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicationEvent<'a, P> {
    pub content_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<&'a P>,
    pub last_modified: String,
}

pub fn to_publication_event<'a, P>(
    core: &UppCoreContent,
    payload: &'a P,
) -> PublicationEvent<'a, P> {
    PublicationEvent {
        content_uri: format!("{}{}", core.content_uri, core.uuid),
        payload: (!core.is_marked_deleted).then_some(payload),
        last_modified: core.last_modified.clone(),
    }
}

/// A serialized event plus its transport headers, ready to hand to a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerMessage {
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub fn to_event_message<P: Serialize>(
    core: &UppCoreContent,
    payload: &P,
) -> Result<ProducerMessage, SerializationError> {
    let body = serde_json::to_string(&to_publication_event(core, payload)).map_err(|source| {
        SerializationError::Payload {
            uuid: core.uuid.clone(),
            source,
        }
    })?;

    let timestamp = upp_date_now().map_err(|source| SerializationError::Timestamp {
        uuid: core.uuid.clone(),
        source,
    })?;

    let headers = BTreeMap::from([
        (
            TRANSACTION_ID_HEADER.to_owned(),
            core.publish_reference.clone(),
        ),
        (MESSAGE_TIMESTAMP_HEADER.to_owned(), timestamp),
        (MESSAGE_ID_HEADER.to_owned(), Uuid::new_v4().to_string()),
        (
            MESSAGE_TYPE_HEADER.to_owned(),
            PUBLISHED_MESSAGE_TYPE.to_owned(),
        ),
        (
            CONTENT_TYPE_HEADER.to_owned(),
            "application/json".to_owned(),
        ),
        (ORIGIN_SYSTEM_HEADER.to_owned(), METHODE_SYSTEM_ID.to_owned()),
    ]);

    Ok(ProducerMessage { headers, body })
}

#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn send_message(&self, message: ProducerMessage) -> Result<(), PublishError>;
}
