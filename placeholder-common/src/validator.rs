use url::Url;

use crate::error::ValidationError;
use crate::model::{LeadHeadline, NativePlaceholder};

pub trait PlaceholderValidator: Send + Sync {
    fn validate(&self, placeholder: &NativePlaceholder) -> Result<(), ValidationError>;
}

/// Rejects placeholders whose lead headline can't be turned into a title and a link.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlineValidator;

impl PlaceholderValidator for HeadlineValidator {
    fn validate(&self, placeholder: &NativePlaceholder) -> Result<(), ValidationError> {
        validate_headline(&placeholder.body.lead_headline)
    }
}

fn validate_headline(headline: &LeadHeadline) -> Result<(), ValidationError> {
    if headline.text.is_empty() {
        return Err(ValidationError::MissingText);
    }
    if headline.url.is_empty() {
        return Err(ValidationError::MissingLink);
    }

    match Url::parse(&headline.url) {
        Ok(_) => Ok(()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Err(ValidationError::NotAbsolute),
        Err(e) => Err(ValidationError::InvalidUrl(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Body;

    fn placeholder_with_headline(text: &str, url: &str) -> NativePlaceholder {
        NativePlaceholder {
            body: Body {
                lead_headline: LeadHeadline {
                    text: text.to_owned(),
                    url: url.to_owned(),
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_headline() {
        let placeholder = placeholder_with_headline(
            "Some headline",
            "https://www.ft.com/ig/sites/2017/brexit-graphic/",
        );
        assert_eq!(HeadlineValidator.validate(&placeholder), Ok(()));
    }

    #[test]
    fn test_missing_text() {
        let placeholder = placeholder_with_headline("", "https://www.ft.com/");
        assert_eq!(
            HeadlineValidator.validate(&placeholder),
            Err(ValidationError::MissingText)
        );
    }

    #[test]
    fn test_missing_link() {
        let placeholder = placeholder_with_headline("Some headline", "");
        let error = HeadlineValidator.validate(&placeholder).unwrap_err();

        assert_eq!(error, ValidationError::MissingLink);
        assert!(error.to_string().contains("does not contain a link"));
    }

    #[test]
    fn test_relative_link() {
        let placeholder = placeholder_with_headline("Some headline", "/content/something");
        assert_eq!(
            HeadlineValidator.validate(&placeholder),
            Err(ValidationError::NotAbsolute)
        );
    }

    #[test]
    fn test_invalid_link() {
        let placeholder = placeholder_with_headline("Some headline", "http://[::1");
        assert!(matches!(
            HeadlineValidator.validate(&placeholder),
            Err(ValidationError::InvalidUrl(_))
        ));
    }
}
