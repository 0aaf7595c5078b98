//! Mapping of decoded placeholders to publishable content.
//!
//! Each `CphMapper` produces one shape of content. `DefaultAggregateMapper` decides
//! whether a placeholder stands for content the platform already knows about (internal)
//! or for something published elsewhere (external), then runs every mapper against it.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{MappingError, ResolutionError};
use crate::model::{NativePlaceholder, UppContent};
use crate::resolver::{is_canonical_uuid, IdentifierResolver};
use crate::validator::PlaceholderValidator;

pub mod complementary;
pub mod content;

pub use complementary::ComplementaryContentCphMapper;
pub use content::ContentCphMapper;

/// Categories of placeholders pointing at blog or live posts, which are resolved
/// through the identifier lookup.
pub const BLOG_CATEGORIES: [&str; 5] = [
    "blog",
    "webchat-live-blogs",
    "webchat-live-qa",
    "webchat-markets-live",
    "fastft",
];

#[async_trait]
pub trait CphMapper: Send + Sync {
    /// `resolved_uuid` is set for internal placeholders.
    async fn map_placeholder(
        &self,
        placeholder: &NativePlaceholder,
        resolved_uuid: Option<&str>,
        transaction_id: &str,
        last_modified: &str,
    ) -> Result<Vec<UppContent>, MappingError>;
}

#[async_trait]
pub trait AggregateMapper: Send + Sync {
    async fn map_placeholder(
        &self,
        placeholder: &NativePlaceholder,
        transaction_id: &str,
        last_modified: &str,
    ) -> Result<Vec<UppContent>, MappingError>;
}

pub struct DefaultAggregateMapper {
    resolver: Arc<dyn IdentifierResolver>,
    validator: Arc<dyn PlaceholderValidator>,
    mappers: Vec<Arc<dyn CphMapper>>,
    blog_categories: Vec<String>,
}

impl DefaultAggregateMapper {
    /// Mappers run in the order given and their output is concatenated in that order.
    pub fn new(
        resolver: Arc<dyn IdentifierResolver>,
        validator: Arc<dyn PlaceholderValidator>,
        mappers: Vec<Arc<dyn CphMapper>>,
    ) -> Self {
        Self {
            resolver,
            validator,
            mappers,
            blog_categories: BLOG_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn with_blog_categories(mut self, blog_categories: Vec<String>) -> Self {
        self.blog_categories = blog_categories;
        self
    }

    fn is_blog(&self, placeholder: &NativePlaceholder) -> bool {
        self.blog_categories
            .iter()
            .any(|category| *category == placeholder.attributes.category)
    }

    /// The canonical uuid this placeholder stands for, `None` if it is external.
    async fn resolve_uuid(
        &self,
        placeholder: &NativePlaceholder,
        transaction_id: &str,
    ) -> Result<Option<String>, ResolutionError> {
        let original_uuid = placeholder.attributes.original_uuid.trim().to_lowercase();
        if !original_uuid.is_empty() {
            if !is_canonical_uuid(&original_uuid) {
                warn!(
                    transaction_id,
                    uuid = %placeholder.uuid,
                    %original_uuid,
                    "ignoring malformed original uuid"
                );
            } else if self
                .resolver
                .content_exists(&original_uuid, transaction_id)
                .await?
            {
                return Ok(Some(original_uuid));
            } else {
                debug!(
                    transaction_id,
                    uuid = %placeholder.uuid,
                    %original_uuid,
                    "original uuid not found in document store"
                );
            }
        }

        if !self.is_blog(placeholder) {
            return Ok(None);
        }

        let attributes = &placeholder.attributes;
        match self
            .resolver
            .resolve_identifier(&attributes.service_id, &attributes.ref_field, transaction_id)
            .await
        {
            Ok(uuid) => Ok(Some(uuid)),
            Err(e) if e.is_unresolvable() => {
                metrics::counter!("placeholder_resolution_fallbacks_total").increment(1);
                warn!(
                    transaction_id,
                    uuid = %placeholder.uuid,
                    error = %e,
                    "couldn't resolve blog uuid, mapping as external content"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AggregateMapper for DefaultAggregateMapper {
    async fn map_placeholder(
        &self,
        placeholder: &NativePlaceholder,
        transaction_id: &str,
        last_modified: &str,
    ) -> Result<Vec<UppContent>, MappingError> {
        // Deleted placeholders may legitimately have lost their headline.
        if !placeholder.is_deleted() {
            self.validator
                .validate(placeholder)
                .map_err(|source| MappingError::Validation {
                    uuid: placeholder.uuid.clone(),
                    source,
                })?;
        }

        let resolved_uuid = self
            .resolve_uuid(placeholder, transaction_id)
            .await
            .map_err(|source| MappingError::Resolution {
                uuid: placeholder.uuid.clone(),
                source,
            })?;

        let mut contents = Vec::new();
        for mapper in &self.mappers {
            let mapped = mapper
                .map_placeholder(
                    placeholder,
                    resolved_uuid.as_deref(),
                    transaction_id,
                    last_modified,
                )
                .await?;
            contents.extend(mapped);
        }

        Ok(contents)
    }
}
