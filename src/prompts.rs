//! Prompts sent alongside each page image.
//!
//! DeepSeek-OCR style models are steered by a short instruction that starts
//! with an `<image>` marker. Callers can pass any prompt to
//! [`crate::task::TaskRunner::run`]; the presets here are the ones worth
//! naming.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prompt used when neither the run nor the config supplies one.
pub const DEFAULT_PROMPT: &str = "<image>\nFree OCR.";

/// Named prompt presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptTemplate {
    /// Layout-aware conversion of a document page to Markdown.
    DocMarkdown,
    /// Layout-aware OCR of an arbitrary image.
    GeneralOcr,
    /// Plain text extraction without layout. (default)
    #[default]
    FreeOcr,
    /// Parse a chart or figure.
    ChartParse,
    /// Free-form description of the image.
    ImageDescription,
    /// Locate a given piece of text; see [`PromptTemplate::text_locate`].
    TextLocate,
}

impl PromptTemplate {
    pub const ALL: [PromptTemplate; 6] = [
        PromptTemplate::DocMarkdown,
        PromptTemplate::GeneralOcr,
        PromptTemplate::FreeOcr,
        PromptTemplate::ChartParse,
        PromptTemplate::ImageDescription,
        PromptTemplate::TextLocate,
    ];

    /// Stable identifier used on the command line.
    pub fn key(self) -> &'static str {
        match self {
            PromptTemplate::DocMarkdown => "doc-markdown",
            PromptTemplate::GeneralOcr => "general-ocr",
            PromptTemplate::FreeOcr => "free-ocr",
            PromptTemplate::ChartParse => "chart-parse",
            PromptTemplate::ImageDescription => "image-desc",
            PromptTemplate::TextLocate => "text-locate",
        }
    }

    /// The prompt text. `TextLocate` contains a `<|ref|>…<|/ref|>` placeholder.
    pub fn prompt(self) -> &'static str {
        match self {
            PromptTemplate::DocMarkdown => "<image>\n<|grounding|>Convert the document to markdown.",
            PromptTemplate::GeneralOcr => "<image>\n<|grounding|>OCR this image.",
            PromptTemplate::FreeOcr => DEFAULT_PROMPT,
            PromptTemplate::ChartParse => "<image>\nParse the figure.",
            PromptTemplate::ImageDescription => "<image>\nDescribe this image in detail.",
            PromptTemplate::TextLocate => "<image>\nLocate <|ref|>text<|/ref|> in the image.",
        }
    }

    /// Build a text-locate prompt for `target`.
    pub fn text_locate(target: &str) -> String {
        format!("<image>\nLocate <|ref|>{target}<|/ref|> in the image.")
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for PromptTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        PromptTemplate::ALL
            .into_iter()
            .find(|t| t.key() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = PromptTemplate::ALL.iter().map(|t| t.key()).collect();
                format!("unknown prompt template '{s}' (known: {})", known.join(", "))
            })
    }
}
