use crate::error::Error;
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

/// A parsed MIME type, e.g. `application/vnd.api+json; charset=UTF-8`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ContentType {
    pub main_type: String,
    pub sub_type: String,
    pub suffix: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl ContentType {
    pub fn json() -> Self {
        Self::simple("application", "json")
    }

    pub fn text() -> Self {
        Self::simple("text", "plain")
    }

    pub fn xml() -> Self {
        Self::simple("application", "xml")
    }

    pub fn octet_stream() -> Self {
        Self::simple("application", "octet-stream")
    }

    pub fn form_urlencoded() -> Self {
        Self::simple("application", "x-www-form-urlencoded")
    }

    fn simple(main_type: &str, sub_type: &str) -> Self {
        ContentType {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            suffix: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.main_type == "application"
            && (self.sub_type == "json"
                || self.sub_type.ends_with("-json")
                || self.suffix.as_deref() == Some("json"))
    }

    pub fn is_xml(&self) -> bool {
        (self.main_type == "application" || self.main_type == "text")
            && (self.sub_type == "xml" || self.suffix.as_deref() == Some("xml"))
    }

    pub fn is_form_urlencoded(&self) -> bool {
        self.main_type == "application" && self.sub_type == "x-www-form-urlencoded"
    }

    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    pub fn is_text(&self) -> bool {
        self.main_type == "text" || self.is_json() || self.is_xml() || self.is_form_urlencoded()
    }

    pub fn is_binary(&self) -> bool {
        !self.is_text()
    }

    /// The type without attributes, e.g. `application/json`.
    pub fn base_type(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}/{}+{}", self.main_type, self.sub_type, suffix),
            None => format!("{}/{}", self.main_type, self.sub_type),
        }
    }

    pub fn boundary(&self) -> Option<&str> {
        self.attributes.get("boundary").map(|b| b.as_str())
    }

    /// Compares main and sub type only, ignoring attributes.
    pub fn is_equivalent_to(&self, other: &ContentType) -> bool {
        self.main_type == other.main_type
            && self.sub_type == other.sub_type
            && self.suffix == other.suffix
    }

    /// Guesses the content type of some bytes from their leading characters.
    pub fn detect(data: &[u8]) -> Option<ContentType> {
        if let Some(content_type) = Self::detect_magic_bytes(data) {
            return Some(content_type);
        }

        let text = std::str::from_utf8(data).ok()?;
        let trimmed = text.trim_start();
        let lowercase = trimmed.to_lowercase();
        let is_html = lowercase.starts_with("<!doctype html") || lowercase.starts_with("<html");

        if is_html {
            Some(Self::simple("text", "html"))
        } else if trimmed.starts_with('<') {
            Some(ContentType::xml())
        } else if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
        {
            Some(ContentType::json())
        } else {
            Some(ContentType::text())
        }
    }

    fn detect_magic_bytes(data: &[u8]) -> Option<ContentType> {
        const SIGNATURES: &[(&[u8], &str, &str)] = &[
            (b"\x89PNG\r\n\x1a\n", "image", "png"),
            (b"\xFF\xD8\xFF", "image", "jpeg"),
            (b"GIF87a", "image", "gif"),
            (b"GIF89a", "image", "gif"),
            (b"%PDF-", "application", "pdf"),
            (b"PK\x03\x04", "application", "zip"),
            (b"\x1F\x8B", "application", "gzip"),
        ];

        SIGNATURES
            .iter()
            .find(|(signature, _, _)| data.starts_with(signature))
            .map(|(_, main_type, sub_type)| Self::simple(main_type, sub_type))
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(';');
        let base = parts.next().unwrap_or_default().trim().to_lowercase();
        let (main_type, rest) = base
            .split_once('/')
            .ok_or_else(|| Error::parse(format!("'{}' is not a valid content type", s)))?;
        if main_type.is_empty() || rest.is_empty() {
            return Err(Error::parse(format!("'{}' is not a valid content type", s)));
        }

        let (sub_type, suffix) = match rest.split_once('+') {
            Some((sub_type, suffix)) => (sub_type.to_string(), Some(suffix.to_string())),
            None => (rest.to_string(), None),
        };

        let attributes = parts
            .filter_map(|attribute| {
                let (key, value) = attribute.split_once('=')?;
                Some((
                    key.trim().to_lowercase(),
                    value.trim().trim_matches('"').to_string(),
                ))
            })
            .collect();

        Ok(ContentType {
            main_type: main_type.to_string(),
            sub_type,
            suffix,
            attributes,
        })
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base_type())?;
        for (key, value) in &self.attributes {
            write!(f, ";{}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffix_and_attributes() {
        let content_type: ContentType = "application/vnd.api+json; charset=UTF-8".parse().unwrap();
        assert_eq!(content_type.main_type, "application");
        assert_eq!(content_type.sub_type, "vnd.api");
        assert_eq!(content_type.suffix.as_deref(), Some("json"));
        assert_eq!(content_type.attributes.get("charset").unwrap(), "UTF-8");
        assert!(content_type.is_json());
        assert_eq!(content_type.to_string(), "application/vnd.api+json;charset=UTF-8");
    }

    #[test]
    fn rejects_garbage() {
        assert!("json".parse::<ContentType>().is_err());
        assert!("/json".parse::<ContentType>().is_err());
    }

    #[test]
    fn detects_common_formats() {
        assert!(ContentType::detect(br#"{"a": 1}"#).unwrap().is_json());
        assert!(ContentType::detect(b"<?xml version=\"1.0\"?><a/>").unwrap().is_xml());
        assert_eq!(ContentType::detect(b"hello").unwrap(), ContentType::text());
        assert_eq!(
            ContentType::detect(b"\x89PNG\r\n\x1a\nxxxx").unwrap().base_type(),
            "image/png"
        );
    }
}
