//! Decoding of native CMS records.
//!
//! A native record is a JSON envelope holding two nested documents: an XML attributes
//! document and a Base64 encoded XML body. Each nested document has its own decoding
//! function and error type, `NativeMapper` stitches them together.
use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use crate::error::{AttributesError, BodyError, DecodeError};
use crate::model::{
    Attributes, Body, NativeEnvelope, NativePlaceholder, COMPOUND_STORY_TYPE,
    CONTENT_PLACEHOLDER_SOURCE_CODE,
};

/// Turns the raw bytes of a native record into a `NativePlaceholder`.
pub trait NativeMapper: Send + Sync {
    fn map(
        &self,
        message_body: &[u8],
        transaction_id: &str,
        last_modified: &str,
    ) -> Result<NativePlaceholder, DecodeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNativeMapper;

impl NativeMapper for DefaultNativeMapper {
    fn map(
        &self,
        message_body: &[u8],
        transaction_id: &str,
        last_modified: &str,
    ) -> Result<NativePlaceholder, DecodeError> {
        let envelope: NativeEnvelope = serde_json::from_slice(message_body)?;

        if envelope.record_type != COMPOUND_STORY_TYPE {
            return Err(DecodeError::WrongRecordType {
                uuid: envelope.uuid,
                record_type: envelope.record_type,
            });
        }

        let attributes =
            decode_attributes(&envelope.attributes_xml).map_err(|source| {
                DecodeError::Attributes {
                    uuid: envelope.uuid.clone(),
                    source,
                }
            })?;

        if attributes.source_code != CONTENT_PLACEHOLDER_SOURCE_CODE {
            return Err(DecodeError::NotAPlaceholder {
                uuid: envelope.uuid,
            });
        }

        let body = decode_body(&envelope.value).map_err(|source| DecodeError::Body {
            uuid: envelope.uuid.clone(),
            source,
        })?;

        Ok(NativePlaceholder {
            uuid: envelope.uuid,
            record_type: envelope.record_type,
            system_attributes: envelope.system_attributes,
            usage_tickets: envelope.usage_tickets,
            workflow_status: envelope.workflow_status,
            attributes,
            body,
            transaction_id: transaction_id.to_owned(),
            last_modified: last_modified.to_owned(),
        })
    }
}

/// Decode the `ObjectMetadata` attributes document.
pub fn decode_attributes(attributes_xml: &str) -> Result<Attributes, AttributesError> {
    let metadata: ObjectMetadataXml = quick_xml::de::from_str(attributes_xml)?;

    let is_deleted = parse_flag(&metadata.output_channels.diftcom.mark_deleted)?;
    let source_code = metadata
        .editorial_notes
        .sources
        .source
        .into_iter()
        .next_back()
        .map(|source| source.source_code)
        .unwrap_or_default();

    Ok(Attributes {
        source_code,
        category: metadata.display_indexing.blog_categories,
        service_id: metadata.wires_indexing.service_id,
        ref_field: metadata.wires_indexing.ref_field,
        original_uuid: metadata.wires_indexing.original_uuid,
        is_deleted,
        last_publication_date: metadata.output_channels.diftcom.last_publication,
    })
}

const HEADLINE_PATH: &[&str] = &["lead", "lead-headline", "headline", "ln", "a"];
const LEAD_IMAGE_PATH: &[&str] = &["lead", "lead-images", "web-master"];
const STANDFIRST_PATH: &[&str] = &["lead", "web-stand-first", "p"];
const PACKAGE_HEADLINE_PATH: &[&str] = &["lead", "package-navigation-headline", "ln"];

/// Decode the Base64 encoded `doc` body document.
///
/// Text fields keep only the character data sitting directly in their element: inline
/// markup such as `<b>` is skipped, text around it is kept. A repeated element
/// overwrites the earlier one.
pub fn decode_body(body_base64: &str) -> Result<Body, BodyError> {
    let body_xml = STANDARD.decode(body_base64)?;
    let mut reader = Reader::from_reader(body_xml.as_slice());

    let mut body = Body::default();
    // Element names from the root down to the current element
    let mut path: Vec<String> = Vec::new();
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                path.push(local_name(&element));
                seen_root = true;
                open_element(&path, &element, &mut body)?;
            }
            Event::Empty(element) => {
                path.push(local_name(&element));
                seen_root = true;
                open_element(&path, &element, &mut body)?;
                path.pop();
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(text) => {
                if let Some(field) = text_field(&path, &mut body) {
                    field.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(field) = text_field(&path, &mut body) {
                    field.push_str(std::str::from_utf8(&data).map_err(quick_xml::Error::from)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = path.last() {
        return Err(BodyError::Truncated(open.clone()));
    }
    if !seen_root {
        return Err(BodyError::MissingRoot);
    }

    Ok(body)
}

fn local_name(element: &BytesStart) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

/// Whether `path` is `target` below the document root.
fn is_at(path: &[String], target: &[&str]) -> bool {
    path.len() == target.len() + 1 && path[1..].iter().zip(target).all(|(a, b)| a == b)
}

fn attribute(element: &BytesStart, name: &str) -> Result<Option<String>, quick_xml::Error> {
    match element.try_get_attribute(name)? {
        Some(attribute) => Ok(Some(attribute.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn open_element(path: &[String], element: &BytesStart, body: &mut Body) -> Result<(), BodyError> {
    if is_at(path, HEADLINE_PATH) {
        body.lead_headline.text.clear();
        if let Some(href) = attribute(element, "href")? {
            body.lead_headline.url = href;
        }
    } else if is_at(path, LEAD_IMAGE_PATH) {
        if let Some(fileref) = attribute(element, "fileref")? {
            body.lead_image_ref = fileref;
        }
    } else if let Some(field) = text_field(path, body) {
        field.clear();
    }
    Ok(())
}

fn text_field<'b>(path: &[String], body: &'b mut Body) -> Option<&'b mut String> {
    if is_at(path, HEADLINE_PATH) {
        Some(&mut body.lead_headline.text)
    } else if is_at(path, STANDFIRST_PATH) {
        Some(&mut body.long_standfirst)
    } else if is_at(path, PACKAGE_HEADLINE_PATH) {
        Some(&mut body.package_headline)
    } else {
        None
    }
}

/// Boolean text as the CMS writes it. Absent or empty means false.
fn parse_flag(value: &str) -> Result<bool, AttributesError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(false);
    }
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(AttributesError::InvalidDeletedFlag(value.to_owned())),
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ObjectMetadataXml {
    #[serde(rename = "EditorialNotes")]
    editorial_notes: EditorialNotesXml,
    #[serde(rename = "EditorialDisplayIndexing")]
    display_indexing: DisplayIndexingXml,
    #[serde(rename = "WiresIndexing")]
    wires_indexing: WiresIndexingXml,
    #[serde(rename = "OutputChannels")]
    output_channels: OutputChannelsXml,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EditorialNotesXml {
    #[serde(rename = "Sources")]
    sources: SourcesXml,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SourcesXml {
    #[serde(rename = "Source")]
    source: Vec<SourceXml>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SourceXml {
    #[serde(rename = "SourceCode")]
    source_code: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DisplayIndexingXml {
    #[serde(rename = "DIBlogCategories")]
    blog_categories: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WiresIndexingXml {
    #[serde(rename = "serviceid")]
    service_id: String,
    ref_field: String,
    original_uuid: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OutputChannelsXml {
    #[serde(rename = "DIFTcom")]
    diftcom: DiftcomXml,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DiftcomXml {
    #[serde(rename = "DIFTcomMarkDeleted")]
    mark_deleted: String,
    #[serde(rename = "DIFTcomLastPublication")]
    last_publication: String,
}

#[cfg(test)]
pub(crate) mod test_records {
    //! Native records shaped like the ones the CMS publishes, for tests across the crate.
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde_json::json;

    pub const RECORD_UUID: &str = "e1f02660-d41a-4a56-8eca-d0f8f0fac068";

    #[derive(Clone)]
    pub struct RecordBuilder {
        pub record_type: String,
        pub source_code: String,
        pub category: String,
        pub service_id: String,
        pub ref_field: String,
        pub original_uuid: String,
        pub deleted: String,
        pub last_publication: String,
        pub headline_text: String,
        pub headline_url: String,
        pub image_ref: String,
        pub standfirst: String,
        pub package_headline: String,
    }

    impl Default for RecordBuilder {
        fn default() -> Self {
            RecordBuilder {
                record_type: "EOM::CompoundStory".to_owned(),
                source_code: "ContentPlaceholder".to_owned(),
                category: "".to_owned(),
                service_id: "".to_owned(),
                ref_field: "".to_owned(),
                original_uuid: "".to_owned(),
                deleted: "False".to_owned(),
                last_publication: "20170329113430".to_owned(),
                headline_text: "Some headline".to_owned(),
                headline_url: "https://www.ft.com/ig/sites/2017/brexit-graphic/".to_owned(),
                image_ref: "/FT/Graphics/Online/Z_Undefined/2017/03/brexit.jpg?uuid=7784185e-a888-11e6-8b69-02899e8bd9d1".to_owned(),
                standfirst: "A promotional standfirst".to_owned(),
                package_headline: "".to_owned(),
            }
        }
    }

    impl RecordBuilder {
        pub fn attributes_xml(&self) -> String {
            format!(
                "<ObjectMetadata>\
                 <EditorialDisplayIndexing><DIBlogCategories>{}</DIBlogCategories></EditorialDisplayIndexing>\
                 <EditorialNotes><Language>English</Language><Sources><Source><SourceCode>{}</SourceCode></Source></Sources></EditorialNotes>\
                 <WiresIndexing><serviceid>{}</serviceid><ref_field>{}</ref_field><original_uuid>{}</original_uuid></WiresIndexing>\
                 <OutputChannels><DIFTcom><DIFTcomMarkDeleted>{}</DIFTcomMarkDeleted><DIFTcomLastPublication>{}</DIFTcomLastPublication></DIFTcom></OutputChannels>\
                 </ObjectMetadata>",
                self.category,
                self.source_code,
                self.service_id,
                self.ref_field,
                self.original_uuid,
                self.deleted,
                self.last_publication,
            )
        }

        pub fn body_xml(&self) -> String {
            format!(
                "<doc><lead>\
                 <lead-headline><headline><ln><a href=\"{}\">{}</a></ln></headline></lead-headline>\
                 <lead-images><web-master fileref=\"{}\"/></lead-images>\
                 <web-stand-first><p>{}</p></web-stand-first>\
                 <package-navigation-headline><ln>{}</ln></package-navigation-headline>\
                 </lead><story><text><body><p>Placeholder</p></body></text></story></doc>",
                self.headline_url,
                self.headline_text,
                self.image_ref,
                self.standfirst,
                self.package_headline,
            )
        }

        pub fn envelope(&self) -> serde_json::Value {
            json!({
                "uuid": RECORD_UUID,
                "type": self.record_type,
                "attributes": self.attributes_xml(),
                "value": STANDARD.encode(self.body_xml()),
                "systemAttributes": "<props><productInfo><name>FTcom</name></productInfo></props>",
                "usageTickets": "",
                "workflowStatus": "Stories/WebReady",
            })
        }

        pub fn bytes(&self) -> Vec<u8> {
            serde_json::to_vec(&self.envelope()).expect("failed to serialize test record")
        }
    }
}
