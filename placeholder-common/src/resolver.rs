use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use tracing::debug;

use crate::docstore::DocStoreClient;
use crate::error::ResolutionError;

pub const AUTHORITY_PREFIX: &str = "http://api.ft.com/system/";

const UUID_PATTERN: &str =
    "^[a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12}$";

fn uuid_regex() -> &'static Regex {
    static UUID_REGEX: OnceLock<Regex> = OnceLock::new();
    UUID_REGEX.get_or_init(|| Regex::new(UUID_PATTERN).expect("UUID pattern is a valid regex"))
}

/// Whether `value` is a UUID in its canonical 8-4-4-4-12 textual form.
pub fn is_canonical_uuid(value: &str) -> bool {
    uuid_regex().is_match(value)
}

/// Ordered table of source domain substrings to authority names.
/// Lookups return the first entry whose domain is contained in the service id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityMappings(Vec<(String, String)>);

impl AuthorityMappings {
    pub fn new(mappings: Vec<(String, String)>) -> Self {
        Self(mappings)
    }

    pub fn find(&self, service_id: &str) -> Option<(&str, &str)> {
        self.0
            .iter()
            .find(|(domain, _)| service_id.contains(domain.as_str()))
            .map(|(domain, authority)| (domain.as_str(), authority.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AuthorityMappings {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(domain, authority)| (domain.into(), authority.into()))
                .collect(),
        )
    }
}

#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    /// Resolve the canonical uuid of the content a blog placeholder points to.
    async fn resolve_identifier(
        &self,
        service_id: &str,
        ref_field: &str,
        transaction_id: &str,
    ) -> Result<String, ResolutionError>;

    async fn content_exists(&self, uuid: &str, transaction_id: &str)
        -> Result<bool, ResolutionError>;
}

/// Resolves identifiers through the document store's content query, which redirects
/// to the canonical content when it knows the identifier.
pub struct DocStoreIdentifierResolver {
    client: Arc<dyn DocStoreClient>,
    mappings: AuthorityMappings,
}

impl DocStoreIdentifierResolver {
    pub fn new(client: Arc<dyn DocStoreClient>, mappings: AuthorityMappings) -> Self {
        Self { client, mappings }
    }
}

#[async_trait]
impl IdentifierResolver for DocStoreIdentifierResolver {
    async fn resolve_identifier(
        &self,
        service_id: &str,
        ref_field: &str,
        transaction_id: &str,
    ) -> Result<String, ResolutionError> {
        let mapping_key = service_id
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let (domain, authority) =
            self.mappings
                .find(mapping_key)
                .ok_or_else(|| ResolutionError::UnknownAuthority {
                    service_id: service_id.to_owned(),
                    ref_field: ref_field.to_owned(),
                })?;

        let authority = format!("{}{}", AUTHORITY_PREFIX, authority);
        let scheme = service_id.split("://").next().unwrap_or_default();
        let identifier = format!("{}://{}/?p={}", scheme, domain, ref_field);

        debug!(transaction_id, %authority, %identifier, "resolving blog identifier");

        let response = self
            .client
            .content_query(&authority, &identifier, transaction_id)
            .await?;

        if response.status != StatusCode::MOVED_PERMANENTLY {
            return Err(ResolutionError::UnexpectedResponse {
                authority,
                identifier,
                status: response.status.as_u16(),
            });
        }

        let location = response.location.unwrap_or_default();
        let uuid = match location.rsplit_once('/') {
            Some((_, uuid)) if is_canonical_uuid(uuid) => uuid.to_owned(),
            _ => {
                return Err(ResolutionError::InvalidResolvedIdentifier {
                    authority,
                    identifier,
                    location,
                })
            }
        };

        Ok(uuid)
    }

    async fn content_exists(
        &self,
        uuid: &str,
        transaction_id: &str,
    ) -> Result<bool, ResolutionError> {
        Ok(self.client.content_exists(uuid, transaction_id).await?)
    }
}
