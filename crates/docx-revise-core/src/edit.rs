//! Edit requests and the per-batch report.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EditError;

/// One requested change, addressed by paragraph index and exact text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditRequest {
    Deletion {
        paragraph_index: usize,
        original_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Empty `after_text` inserts at the start of the paragraph.
    Insertion {
        paragraph_index: usize,
        #[serde(default)]
        after_text: String,
        new_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Replacement {
        paragraph_index: usize,
        original_text: String,
        new_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Comment {
        paragraph_index: usize,
        target_text: String,
        comment_body: String,
    },
}

impl EditRequest {
    pub fn paragraph_index(&self) -> usize {
        match self {
            Self::Deletion {
                paragraph_index, ..
            }
            | Self::Insertion {
                paragraph_index, ..
            }
            | Self::Replacement {
                paragraph_index, ..
            }
            | Self::Comment {
                paragraph_index, ..
            } => *paragraph_index,
        }
    }

    pub fn kind(&self) -> EditKind {
        match self {
            Self::Deletion { .. } => EditKind::Deletion,
            Self::Insertion { .. } => EditKind::Insertion,
            Self::Replacement { .. } => EditKind::Replacement,
            Self::Comment { .. } => EditKind::Comment,
        }
    }

    /// Provenance note. Reported back, never written into the document.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Deletion { reason, .. }
            | Self::Insertion { reason, .. }
            | Self::Replacement { reason, .. } => reason.as_deref(),
            Self::Comment { .. } => None,
        }
    }

    /// The text this edit has to find in the paragraph.
    pub fn target_text(&self) -> &str {
        match self {
            Self::Deletion { original_text, .. } | Self::Replacement { original_text, .. } => {
                original_text
            }
            Self::Insertion { after_text, .. } => after_text,
            Self::Comment { target_text, .. } => target_text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Deletion,
    Insertion,
    Replacement,
    Comment,
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deletion => "deletion",
            Self::Insertion => "insertion",
            Self::Replacement => "replacement",
            Self::Comment => "comment",
        };
        f.write_str(name)
    }
}

/// Ids written into the document by one applied edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedEdit {
    pub revision_ids: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EditStatus {
    Applied(AppliedEdit),
    Failed { error: EditError },
}

impl From<Result<AppliedEdit, EditError>> for EditStatus {
    fn from(result: Result<AppliedEdit, EditError>) -> Self {
        match result {
            Ok(applied) => Self::Applied(applied),
            Err(error) => Self::Failed { error },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    /// Position of the edit in the batch.
    pub position: usize,
    pub paragraph_index: usize,
    pub kind: EditKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub status: EditStatus,
}

impl EditOutcome {
    pub fn new(
        position: usize,
        edit: &EditRequest,
        result: Result<AppliedEdit, EditError>,
    ) -> Self {
        Self {
            position,
            paragraph_index: edit.paragraph_index(),
            kind: edit.kind(),
            reason: edit.reason().map(str::to_string),
            status: result.into(),
        }
    }

    pub fn error(&self) -> Option<&EditError> {
        match &self.status {
            EditStatus::Failed { error } => Some(error),
            EditStatus::Applied(_) => None,
        }
    }
}

/// Outcome of a whole batch. Whether partial success is acceptable is up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub applied: usize,
    pub failed: usize,
    pub outcomes: Vec<EditOutcome>,
}

impl PatchReport {
    pub fn push(&mut self, outcome: EditOutcome) {
        match outcome.status {
            EditStatus::Applied(_) => self.applied += 1,
            EditStatus::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &EditOutcome> {
        self.outcomes.iter().filter(|o| o.error().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_requests_deserialize_from_tagged_json() {
        let json = r#"[
            {"type": "deletion", "paragraph_index": 0, "original_text": "quick ", "reason": "tone"},
            {"type": "insertion", "paragraph_index": 1, "new_text": " there"},
            {"type": "replacement", "paragraph_index": 2, "original_text": "fox", "new_text": "cat"},
            {"type": "comment", "paragraph_index": 3, "target_text": "brown", "comment_body": "Why?"}
        ]"#;
        let edits: Vec<EditRequest> = serde_json::from_str(json).unwrap();
        assert_eq!(edits.len(), 4);
        assert_eq!(edits[0].reason(), Some("tone"));
        assert_eq!(edits[1].target_text(), "");
        assert_eq!(edits[2].kind(), EditKind::Replacement);
        assert_eq!(edits[3].paragraph_index(), 3);
        assert_eq!(edits[3].target_text(), "brown");
    }

    #[test]
    fn test_report_counts_and_serializes() {
        let deletion = EditRequest::Deletion {
            paragraph_index: 0,
            original_text: "x".to_string(),
            reason: None,
        };
        let mut report = PatchReport::default();
        report.push(EditOutcome::new(
            0,
            &deletion,
            Ok(AppliedEdit {
                revision_ids: vec![1],
                comment_id: None,
            }),
        ));
        report.push(EditOutcome::new(
            1,
            &deletion,
            Err(EditError::NotFound {
                paragraph_index: 0,
                text: "x".to_string(),
            }),
        ));
        assert!(!report.is_complete());
        assert_eq!(report.failures().count(), 1);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["applied"], 1);
        assert_eq!(value["outcomes"][0]["status"], "applied");
        assert_eq!(value["outcomes"][0]["revision_ids"][0], 1);
        assert_eq!(value["outcomes"][1]["status"], "failed");
        assert_eq!(value["outcomes"][1]["error"]["code"], "not_found");
        assert_eq!(value["outcomes"][1]["kind"], "deletion");
    }
}
