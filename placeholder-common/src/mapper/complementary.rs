use std::sync::Arc;

use async_trait::async_trait;

use crate::docstore::DocStoreClient;
use crate::error::MappingError;
use crate::mapper::CphMapper;
use crate::model::{
    AlternativeImages, AlternativeStandfirsts, AlternativeTitles, Brand, NativePlaceholder,
    PromotionalImage, UppComplementaryContent, UppContent, UppCoreContent,
    COMPLEMENTARY_CONTENT_URI, CONTENT_TYPE,
};

const IMAGE_UUID_MARKER: &str = "uuid=";

/// Publishes the promotional fields of a placeholder, attached to whichever content
/// it stands for: the resolved content when there is one, the placeholder otherwise.
pub struct ComplementaryContentCphMapper {
    api_host: String,
    client: Arc<dyn DocStoreClient>,
}

impl ComplementaryContentCphMapper {
    pub fn new(api_host: &str, client: Arc<dyn DocStoreClient>) -> Self {
        Self {
            api_host: api_host.to_owned(),
            client,
        }
    }

    fn promotional_image(&self, file_ref: &str) -> Option<AlternativeImages> {
        let (_, image_uuid) = file_ref.split_once(IMAGE_UUID_MARKER)?;
        Some(AlternativeImages {
            promotional_image: PromotionalImage {
                id: format!("http://{}/content/{}", self.api_host, image_uuid),
            },
        })
    }
}

fn trimmed(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

#[async_trait]
impl CphMapper for ComplementaryContentCphMapper {
    async fn map_placeholder(
        &self,
        placeholder: &NativePlaceholder,
        resolved_uuid: Option<&str>,
        transaction_id: &str,
        last_modified: &str,
    ) -> Result<Vec<UppContent>, MappingError> {
        let core = UppCoreContent {
            uuid: resolved_uuid.unwrap_or(&placeholder.uuid).to_owned(),
            publish_reference: transaction_id.to_owned(),
            last_modified: last_modified.to_owned(),
            content_uri: COMPLEMENTARY_CONTENT_URI.to_owned(),
            is_marked_deleted: placeholder.is_deleted(),
        };

        if placeholder.is_deleted() {
            return Ok(vec![UppComplementaryContent {
                core,
                ..Default::default()
            }
            .into()]);
        }

        let brands = match resolved_uuid {
            Some(uuid) => {
                self.client
                    .get_content(uuid, transaction_id)
                    .await
                    .map_err(|source| MappingError::Brands {
                        uuid: placeholder.uuid.clone(),
                        source,
                    })?
                    .brands
            }
            None => vec![Brand::ft()],
        };

        let body = &placeholder.body;
        let alternative_titles =
            trimmed(&body.lead_headline.text).map(|title| AlternativeTitles {
                promotional_title: Some(title),
                content_package_title: None,
            });
        let alternative_standfirsts =
            trimmed(&body.long_standfirst).map(|standfirst| AlternativeStandfirsts {
                promotional_standfirst: standfirst,
            });

        Ok(vec![UppComplementaryContent {
            core,
            content_type: Some(CONTENT_TYPE.to_owned()),
            brands,
            alternative_titles,
            alternative_images: self.promotional_image(&body.lead_image_ref),
            alternative_standfirsts,
        }
        .into()])
    }
}
