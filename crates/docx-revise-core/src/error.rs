//! Error types for revision sessions.

use serde::Serialize;

/// Session-level errors. Any of these aborts the whole session and no output is produced.
#[derive(Debug, thiserror::Error)]
pub enum DocxError {
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    #[error("Invalid XML in part '{part}': {source}")]
    Xml {
        part: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("Part '{part}' is not valid UTF-8")]
    Utf8 { part: String },

    #[error("Packaging failure: {0}")]
    PackagingFailure(String),
}

impl DocxError {
    pub(crate) fn xml(part: impl Into<String>, source: roxmltree::Error) -> Self {
        Self::Xml {
            part: part.into(),
            source,
        }
    }
}

/// Per-edit errors. These are collected in the batch report and never abort the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum EditError {
    #[error("Paragraph {paragraph_index} is out of range (document has {paragraph_count} paragraphs)")]
    IndexOutOfRange {
        paragraph_index: usize,
        paragraph_count: usize,
    },

    #[error("Text {text:?} not found in paragraph {paragraph_index}")]
    NotFound { paragraph_index: usize, text: String },

    #[error("Edit against paragraph {paragraph_index} has an empty target text")]
    EmptyTarget { paragraph_index: usize },

    #[error("Insertion into paragraph {paragraph_index} has no text to insert")]
    EmptyInsertion { paragraph_index: usize },

    #[error("Text {text:?} in paragraph {paragraph_index} cannot be revised: {reason}")]
    SpanConflict {
        paragraph_index: usize,
        text: String,
        reason: String,
    },

    #[error("Paragraph {paragraph_index} cannot be revised: every {kind} id is taken")]
    IdsExhausted {
        paragraph_index: usize,
        kind: &'static str,
    },

    #[error("Generated markup for paragraph {paragraph_index} could not be re-read: {message}")]
    Markup {
        paragraph_index: usize,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, DocxError>;
