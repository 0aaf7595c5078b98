use serde::{Deserialize, Serialize};

/// The only native record type this service accepts.
pub const COMPOUND_STORY_TYPE: &str = "EOM::CompoundStory";
/// Source code marking a compound story as a content placeholder.
pub const CONTENT_PLACEHOLDER_SOURCE_CODE: &str = "ContentPlaceholder";
/// Origin system of native records, and of the events we publish on their behalf.
pub const METHODE_SYSTEM_ID: &str = "http://cmdb.ft.com/systems/methode-web-pub";
pub const METHODE_AUTHORITY: &str = "http://api.ft.com/system/FTCOM-METHODE";
pub const FT_BRAND: &str = "http://api.ft.com/things/dbb0bdae-1f0c-11e4-b0cb-b2227cce2b54";
pub const CONTENT_TYPE: &str = "Content";
pub const SYNDICATION_VERIFY: &str = "verify";

pub const PLACEHOLDER_CONTENT_URI: &str =
    "http://methode-content-placeholder-mapper-iw-uk-p.svc.ft.com/content/";
pub const COMPLEMENTARY_CONTENT_URI: &str =
    "http://methode-content-placeholder-mapper-iw-uk-p.svc.ft.com/complementarycontent/";

/// The raw envelope as delivered by the native CMS. `attributes` and `value` are
/// still encoded: the first is an XML document, the second a Base64 encoded XML document.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NativeEnvelope {
    #[serde(default)]
    pub uuid: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(rename = "attributes", default)]
    pub attributes_xml: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub system_attributes: String,
    #[serde(default)]
    pub usage_tickets: String,
    #[serde(default)]
    pub workflow_status: String,
}

/// A fully decoded native content placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativePlaceholder {
    pub uuid: String,
    pub record_type: String,
    pub system_attributes: String,
    pub usage_tickets: String,
    pub workflow_status: String,
    pub attributes: Attributes,
    pub body: Body,
    /// Carried over from the transport, not part of the native payload.
    pub transaction_id: String,
    pub last_modified: String,
}

impl NativePlaceholder {
    pub fn is_deleted(&self) -> bool {
        self.attributes.is_deleted
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub source_code: String,
    pub category: String,
    pub service_id: String,
    pub ref_field: String,
    pub original_uuid: String,
    pub is_deleted: bool,
    pub last_publication_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    pub lead_headline: LeadHeadline,
    /// The `fileref` of the lead image, e.g. `/FT/Graphics/x.jpg?uuid=<uuid>`.
    pub lead_image_ref: String,
    pub long_standfirst: String,
    pub package_headline: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadHeadline {
    pub text: String,
    pub url: String,
}

/// Fields shared by every piece of content we publish.
/// `content_uri` and `is_marked_deleted` drive the publication event and never reach the payload.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UppCoreContent {
    pub uuid: String,
    pub publish_reference: String,
    pub last_modified: String,
    #[serde(skip)]
    pub content_uri: String,
    #[serde(skip)]
    pub is_marked_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Brand {
    pub id: String,
}

impl Brand {
    pub fn ft() -> Self {
        Brand {
            id: FT_BRAND.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    pub authority: String,
    pub identifier_value: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeTitles {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotional_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_package_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeImages {
    pub promotional_image: PromotionalImage,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromotionalImage {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeStandfirsts {
    pub promotional_standfirst: String,
}

/// A placeholder published as a piece of content in its own right.
/// Every field past the core is `None` (or empty) for a delete.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UppContentPlaceholder {
    #[serde(flatten)]
    pub core: UppCoreContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Placeholders have no title of their own, clients expect one anyway so the headline is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub brands: Vec<Brand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_titles: Option<AlternativeTitles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_web_url: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_be_syndicated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_be_distributed: Option<String>,
}

/// Promotional metadata attached to a piece of content, either the placeholder itself
/// or the canonical content it stands in for.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UppComplementaryContent {
    #[serde(flatten)]
    pub core: UppCoreContent,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub brands: Vec<Brand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_titles: Option<AlternativeTitles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_images: Option<AlternativeImages>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_standfirsts: Option<AlternativeStandfirsts>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum UppContent {
    Placeholder(UppContentPlaceholder),
    Complementary(UppComplementaryContent),
}

impl UppContent {
    pub fn core(&self) -> &UppCoreContent {
        match self {
            UppContent::Placeholder(content) => &content.core,
            UppContent::Complementary(content) => &content.core,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.core().uuid
    }
}

impl From<UppContentPlaceholder> for UppContent {
    fn from(content: UppContentPlaceholder) -> Self {
        UppContent::Placeholder(content)
    }
}

impl From<UppComplementaryContent> for UppContent {
    fn from(content: UppComplementaryContent) -> Self {
        UppContent::Complementary(content)
    }
}
