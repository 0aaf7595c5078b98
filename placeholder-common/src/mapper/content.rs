use async_trait::async_trait;

use crate::dates::native_to_upp_date;
use crate::error::MappingError;
use crate::mapper::CphMapper;
use crate::model::{
    AlternativeTitles, Brand, Identifier, NativePlaceholder, UppContent, UppContentPlaceholder,
    UppCoreContent, CONTENT_TYPE, METHODE_AUTHORITY, PLACEHOLDER_CONTENT_URI, SYNDICATION_VERIFY,
};

const FT_CONTENT_URL: &str = "https://www.ft.com/content/";

/// Publishes the placeholder as content of its own. Only external placeholders are
/// content in their own right, an internal one just decorates the content it resolved to.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentCphMapper;

#[async_trait]
impl CphMapper for ContentCphMapper {
    async fn map_placeholder(
        &self,
        placeholder: &NativePlaceholder,
        resolved_uuid: Option<&str>,
        transaction_id: &str,
        last_modified: &str,
    ) -> Result<Vec<UppContent>, MappingError> {
        if resolved_uuid.is_some() {
            return Ok(Vec::new());
        }

        let core = UppCoreContent {
            uuid: placeholder.uuid.clone(),
            publish_reference: transaction_id.to_owned(),
            last_modified: last_modified.to_owned(),
            content_uri: PLACEHOLDER_CONTENT_URI.to_owned(),
            is_marked_deleted: placeholder.is_deleted(),
        };

        if placeholder.is_deleted() {
            return Ok(vec![UppContentPlaceholder {
                core,
                ..Default::default()
            }
            .into()]);
        }

        let last_publication = &placeholder.attributes.last_publication_date;
        let published_date =
            native_to_upp_date(last_publication).map_err(|source| MappingError::PublishedDate {
                uuid: placeholder.uuid.clone(),
                value: last_publication.clone(),
                source,
            })?;

        let headline = &placeholder.body.lead_headline;
        let web_url = if headline.url.is_empty() {
            format!("{}{}", FT_CONTENT_URL, placeholder.uuid)
        } else {
            headline.url.clone()
        };

        let content_package_title = placeholder.body.package_headline.trim();
        let alternative_titles = (!content_package_title.is_empty()).then(|| AlternativeTitles {
            promotional_title: None,
            content_package_title: Some(content_package_title.to_owned()),
        });

        Ok(vec![UppContentPlaceholder {
            core,
            published_date: Some(published_date),
            title: Some(headline.text.clone()),
            identifiers: vec![Identifier {
                authority: METHODE_AUTHORITY.to_owned(),
                identifier_value: placeholder.uuid.clone(),
            }],
            brands: vec![Brand::ft()],
            alternative_titles,
            web_url: Some(web_url),
            canonical_web_url: Some(format!("{}{}", FT_CONTENT_URL, placeholder.uuid)),
            content_type: Some(CONTENT_TYPE.to_owned()),
            can_be_syndicated: Some(SYNDICATION_VERIFY.to_owned()),
            can_be_distributed: Some(SYNDICATION_VERIFY.to_owned()),
        }
        .into()])
    }
}
