use thiserror::Error;

/// Errors decoding the XML attributes document of a native record.
#[derive(Error, Debug)]
pub enum AttributesError {
    #[error("malformed attributes document: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("{0:?} is not a valid deletion flag")]
    InvalidDeletedFlag(String),
}

/// Errors decoding the Base64 encoded XML body of a native record.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("malformed body document: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("body document ends inside <{0}>")]
    Truncated(String),
    #[error("body document has no root element")]
    MissingRoot,
}

/// Enumeration of errors turning raw bytes into a `NativePlaceholder`.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to parse native record envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("native record {uuid} has type {record_type:?}, expected EOM::CompoundStory")]
    WrongRecordType { uuid: String, record_type: String },
    #[error("native record {uuid} could not be decoded: {source}")]
    Attributes {
        uuid: String,
        #[source]
        source: AttributesError,
    },
    #[error("native record {uuid} is not a content placeholder")]
    NotAPlaceholder { uuid: String },
    #[error("native record {uuid} could not be decoded: {source}")]
    Body {
        uuid: String,
        #[source]
        source: BodyError,
    },
}

impl DecodeError {
    /// The record id, unless the envelope itself could not be parsed.
    pub fn uuid(&self) -> Option<&str> {
        match self {
            DecodeError::Envelope(_) => None,
            DecodeError::WrongRecordType { uuid, .. }
            | DecodeError::Attributes { uuid, .. }
            | DecodeError::NotAPlaceholder { uuid }
            | DecodeError::Body { uuid, .. } => Some(uuid),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("headline does not contain text")]
    MissingText,
    #[error("headline does not contain a link")]
    MissingLink,
    #[error("headline does not contain a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("headline does not contain an absolute URL")]
    NotAbsolute,
}

/// Errors talking to the document store.
#[derive(Error, Debug)]
pub enum DocStoreError {
    #[error("request to document store failed for {target}: {source}")]
    Request {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("document store answered {status} for {target}")]
    UnexpectedStatus { target: String, status: u16 },
    #[error("document store returned an unreadable body for {target}: {source}")]
    Body {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("couldn't find authority in mapping table for serviceId={service_id} refField={ref_field}")]
    UnknownAuthority {
        service_id: String,
        ref_field: String,
    },
    #[error("unexpected response code {status} while fetching canonical identifier for authority={authority} identifier={identifier}")]
    UnexpectedResponse {
        authority: String,
        identifier: String,
        status: u16,
    },
    #[error("resolved an invalid canonical identifier for authority={authority} identifier={identifier} location={location:?}")]
    InvalidResolvedIdentifier {
        authority: String,
        identifier: String,
        location: String,
    },
    #[error(transparent)]
    DocStore(#[from] DocStoreError),
}

impl ResolutionError {
    /// True when the lookup worked but there is simply nothing to resolve to,
    /// as opposed to a broken answer or a failed call.
    pub fn is_unresolvable(&self) -> bool {
        matches!(
            self,
            ResolutionError::UnknownAuthority { .. } | ResolutionError::UnexpectedResponse { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum DateError {
    #[error("invalid date: {0}")]
    Parse(#[from] time::error::Parse),
    #[error("failed to format date: {0}")]
    Format(#[from] time::error::Format),
}

/// Enumeration of errors mapping a native placeholder to publishable content.
/// Every variant names the native record it happened on.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("content placeholder {uuid} is invalid: {source}")]
    Validation {
        uuid: String,
        #[source]
        source: ValidationError,
    },
    #[error("couldn't resolve canonical content for placeholder {uuid}: {source}")]
    Resolution {
        uuid: String,
        #[source]
        source: ResolutionError,
    },
    #[error("content placeholder {uuid} has an invalid publication date {value:?}: {source}")]
    PublishedDate {
        uuid: String,
        value: String,
        #[source]
        source: DateError,
    },
    #[error("failed to retrieve brands for complementary content of {uuid}: {source}")]
    Brands {
        uuid: String,
        #[source]
        source: DocStoreError,
    },
}

impl MappingError {
    pub fn uuid(&self) -> &str {
        match self {
            MappingError::Validation { uuid, .. }
            | MappingError::Resolution { uuid, .. }
            | MappingError::PublishedDate { uuid, .. }
            | MappingError::Brands { uuid, .. } => uuid,
        }
    }
}

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("failed to serialize publication event for {uuid}: {source}")]
    Payload {
        uuid: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to timestamp publication event for {uuid}: {source}")]
    Timestamp {
        uuid: String,
        #[source]
        source: DateError,
    },
}

impl SerializationError {
    pub fn uuid(&self) -> &str {
        match self {
            SerializationError::Payload { uuid, .. } | SerializationError::Timestamp { uuid, .. } => {
                uuid
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to produce message: {0}")]
    Produce(String),
    #[error("failed to produce message (timeout)")]
    Canceled,
}
