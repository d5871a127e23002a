//! Request and response shapes for `POST /api/generate-lorem`.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;
use std::str::FromStr;

pub const THEME_REQUIRED: &str = "Theme is required";
pub const PARAGRAPHS_INVALID: &str = "Paragraph count must be greater than 0";
pub const LENGTH_INVALID: &str = "Paragraph length must be one of: short, medium, long, variable";

/// Body as sent by the client. Every field is optional here so that missing
/// values surface as validation messages rather than deserializer errors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateLoremRequest {
    pub theme: Option<String>,
    pub paragraphs: Option<i64>,
    pub paragraph_length: Option<String>,
    pub stream: Option<bool>,
}

/// How long each generated paragraph should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphLength {
    Short,
    Medium,
    Long,
    Variable,
}

impl ParagraphLength {
    pub const ALL: [ParagraphLength; 4] = [
        ParagraphLength::Short,
        ParagraphLength::Medium,
        ParagraphLength::Long,
        ParagraphLength::Variable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParagraphLength::Short => "short",
            ParagraphLength::Medium => "medium",
            ParagraphLength::Long => "long",
            ParagraphLength::Variable => "variable",
        }
    }

    /// Sentence-count instruction given to the model for this length.
    pub fn instruction(self) -> &'static str {
        match self {
            ParagraphLength::Short => "about 1-10 sentences per paragraph",
            ParagraphLength::Medium => "about 10-20 sentences per paragraph",
            ParagraphLength::Long => "about 20-30 sentences per paragraph",
            ParagraphLength::Variable => {
                "a variable length per paragraph, ranging from 1 to 30 sentences"
            }
        }
    }
}

impl FromStr for ParagraphLength {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParagraphLength::ALL
            .into_iter()
            .find(|length| length.as_str() == s)
            .ok_or_else(|| AppError::bad_request(LENGTH_INVALID))
    }
}

impl fmt::Display for ParagraphLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request that passed input validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub theme: String,
    pub paragraphs: u32,
    pub paragraph_length: ParagraphLength,
    pub stream: bool,
}

impl TryFrom<GenerateLoremRequest> for GenerationRequest {
    type Error = AppError;

    /// Checks theme, paragraph count and length in that order and reports
    /// only the first problem.
    fn try_from(req: GenerateLoremRequest) -> Result<Self, Self::Error> {
        let theme = req
            .theme
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::bad_request(THEME_REQUIRED))?
            .to_string();

        let paragraphs = req
            .paragraphs
            .filter(|n| *n >= 1)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| AppError::bad_request(PARAGRAPHS_INVALID))?;

        let paragraph_length: ParagraphLength = req
            .paragraph_length
            .as_deref()
            .ok_or_else(|| AppError::bad_request(LENGTH_INVALID))?
            .parse()?;

        Ok(GenerationRequest {
            theme,
            paragraphs,
            paragraph_length,
            stream: req.stream.unwrap_or(true),
        })
    }
}

/// Buffered-mode success body.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateLoremResponse {
    pub success: bool,
    pub text: String,
}

impl GenerateLoremResponse {
    pub fn new(text: String) -> Self {
        Self {
            success: true,
            text,
        }
    }
}
