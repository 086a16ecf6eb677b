use serde::{Deserialize, Serialize};

use crate::config::PlayerConfig;
use crate::error::SpeechError;

const BUNDLED_BIOGRAPHY: &str = include_str!("../data/biography.json");

/// A biography page: title, intro and an ordered list of sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiographyDocument {
    pub title: String,
    pub intro: String,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Section {
    Paragraph { content: String },
    Image { src: String, alt: String },
}

impl BiographyDocument {
    /// Trimmed, non-empty paragraph texts in document order. Images are skipped.
    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().filter_map(|section| match section {
            Section::Paragraph { content } => {
                let trimmed = content.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            Section::Image { .. } => None,
        })
    }
}

/// The document shipped with the crate, used when the backend is unavailable.
pub fn bundled_biography() -> Result<BiographyDocument, SpeechError> {
    Ok(serde_json::from_str(BUNDLED_BIOGRAPHY)?)
}

/// Fetch `GET /api/biography`, falling back to the bundled document.
///
/// A non-success status or a transport failure both fall back; only a
/// malformed success body is reported as an error.
pub async fn fetch_biography(
    client: &reqwest::Client,
    config: &PlayerConfig,
) -> Result<BiographyDocument, SpeechError> {
    let url = config.api_url("/api/biography");
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            let document = response.json::<BiographyDocument>().await?;
            log::info!(
                "Loaded biography '{}' ({} sections) from {url}",
                document.title,
                document.sections.len()
            );
            Ok(document)
        }
        Ok(response) => {
            log::warn!(
                "{url} answered {}, using bundled biography",
                response.status()
            );
            bundled_biography()
        }
        Err(e) => {
            log::warn!("Could not reach {url} ({e}), using bundled biography");
            bundled_biography()
        }
    }
}
