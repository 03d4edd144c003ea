//! Revision sessions: open a package, apply edits in order, write the result.

use std::ops::Range;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::edit::{AppliedEdit, EditOutcome, EditRequest, PatchReport};
use crate::error::{DocxError, EditError, Result};
use crate::ids::{IdsExhausted, RevisionIds};
use crate::locate::{find, isolate, point_after, point_at_start};
use crate::markup::{self, Stamp};
use crate::model::{parse_body, Layout, Paragraph};
use crate::package::Package;
use crate::reassemble::{self, comments_part, existing_comment_max, main_document_part};
use crate::xml::FragmentContext;

pub const DEFAULT_AUTHOR: &str = "docx-revise";

/// Attribution stamped on every revision and comment of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub author: String,
    /// Derived from `author` when not given.
    pub initials: Option<String>,
    /// Defaults to the time the session is opened.
    pub date: Option<DateTime<Utc>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            author: DEFAULT_AUTHOR.to_string(),
            initials: None,
            date: None,
        }
    }
}

impl SessionOptions {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            ..Self::default()
        }
    }

    fn stamp(&self) -> Stamp {
        Stamp {
            author: self.author.clone(),
            initials: self
                .initials
                .clone()
                .unwrap_or_else(|| initials_of(&self.author)),
            date: self.date.unwrap_or_else(Utc::now),
        }
    }
}

fn initials_of(author: &str) -> String {
    author
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Accepted-reading width of inserted text: breaks and tabs become zero-width elements.
fn visible(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\n' | '\t' | '\r'))
        .collect()
}

fn splice(xml: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(xml.len() + replacement.len());
    out.push_str(&xml[..range.start]);
    out.push_str(replacement);
    out.push_str(&xml[range.end..]);
    out
}

/// Result of one edit before it is committed to the session.
struct Staged {
    xml: String,
    expected_text: String,
    applied: AppliedEdit,
    comment: Option<String>,
}

/// One editing session over an in-memory document package.
#[derive(Debug)]
pub struct RevisionSession {
    package: Package,
    main_part: String,
    document_xml: String,
    context: FragmentContext,
    paragraphs: Vec<Paragraph>,
    ids: RevisionIds,
    stamp: Stamp,
    comments: Vec<String>,
}

impl RevisionSession {
    #[instrument(skip(bytes, options), level = "debug", fields(size = bytes.len()))]
    pub fn open(bytes: Vec<u8>, options: SessionOptions) -> Result<Self> {
        let mut package = Package::from_bytes(bytes)?;
        let main_part = main_document_part(&mut package)?;
        let document_xml = package.read_string(&main_part)?.ok_or_else(|| {
            DocxError::MalformedArchive(format!("Main document part '{}' is missing", main_part))
        })?;
        let body = parse_body(&main_part, &document_xml)?;

        let comments = comments_part(&mut package, &main_part)?;
        let max_comment = match (
            body.max_comment_id,
            existing_comment_max(&mut package, &comments.part)?,
        ) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let ids = RevisionIds::starting_after(body.max_revision_id, max_comment);

        info!(
            "Opened {} with {} paragraph(s)",
            main_part,
            body.paragraphs.len()
        );
        Ok(Self {
            package,
            main_part,
            document_xml,
            context: body.context,
            paragraphs: body.paragraphs,
            ids,
            stamp: options.stamp(),
            comments: Vec::new(),
        })
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    pub fn paragraph(&self, index: usize) -> Option<&Paragraph> {
        self.paragraphs.get(index)
    }

    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    /// Apply one edit. On failure the paragraph and the id counters are left untouched.
    #[instrument(
        skip(self, edit),
        level = "debug",
        fields(kind = %edit.kind(), paragraph = edit.paragraph_index())
    )]
    pub fn apply(&mut self, edit: &EditRequest) -> std::result::Result<AppliedEdit, EditError> {
        let index = edit.paragraph_index();
        let paragraph =
            self.paragraphs
                .get(index)
                .ok_or_else(|| EditError::IndexOutOfRange {
                    paragraph_index: index,
                    paragraph_count: self.paragraphs.len(),
                })?;
        let working = paragraph.xml();
        let text = paragraph.text();
        let target = edit.target_text();
        let mut ids = self.ids.clone();

        let staged = match edit {
            EditRequest::Deletion { .. } => {
                self.stage_deletion(index, working, text, target, None, &mut ids)?
            }
            EditRequest::Replacement { new_text, .. } => {
                let new_text = Some(new_text.as_str());
                self.stage_deletion(index, working, text, target, new_text, &mut ids)?
            }
            EditRequest::Insertion { new_text, .. } => {
                self.stage_insertion(index, working, text, target, new_text, &mut ids)?
            }
            EditRequest::Comment { comment_body, .. } => {
                self.stage_comment(index, working, text, target, comment_body, &mut ids)?
            }
        };

        let layout = Layout::build(&staged.xml, &self.context).map_err(markup_error(index))?;
        if layout.readings.accepted != staged.expected_text {
            return Err(EditError::Markup {
                paragraph_index: index,
                message: "accepted text after the edit is not the expected one".to_string(),
            });
        }

        self.paragraphs[index].update(staged.xml, layout);
        self.ids = ids;
        if let Some(body) = staged.comment {
            self.comments.push(body);
        }
        debug!("Applied {} to paragraph {}", edit.kind(), index);
        Ok(staged.applied)
    }

    /// Deletion, or replacement when `new_text` is given.
    fn stage_deletion(
        &self,
        index: usize,
        working: &str,
        text: &str,
        target: &str,
        new_text: Option<&str>,
        ids: &mut RevisionIds,
    ) -> std::result::Result<Staged, EditError> {
        let range = self.locate(index, text, target)?;
        let (split, span) =
            isolate(working, &self.context, range.clone()).map_err(markup_error(index))?;

        let markup = match new_text {
            Some(new_text) if !new_text.is_empty() => {
                if span.end.blocked {
                    return Err(blocked(index, target));
                }
                markup::replacement(&span, new_text, ids, &self.stamp)
            }
            _ => markup::deletion(&span, ids, &self.stamp),
        }
        .map_err(exhausted(index))?;

        let inserted = new_text.map(visible).unwrap_or_default();
        Ok(Staged {
            xml: markup.apply_to(&split),
            expected_text: format!("{}{}{}", &text[..range.start], inserted, &text[range.end..]),
            applied: AppliedEdit {
                revision_ids: markup.revision_ids,
                comment_id: None,
            },
            comment: None,
        })
    }

    fn stage_insertion(
        &self,
        index: usize,
        working: &str,
        text: &str,
        after_text: &str,
        new_text: &str,
        ids: &mut RevisionIds,
    ) -> std::result::Result<Staged, EditError> {
        if new_text.is_empty() {
            return Err(EditError::EmptyInsertion {
                paragraph_index: index,
            });
        }
        let (split, point, offset) = if after_text.is_empty() {
            let (split, point) =
                point_at_start(working, &self.context).map_err(markup_error(index))?;
            (split, point, 0)
        } else {
            let range = self.locate(index, text, after_text)?;
            let (split, point) =
                point_after(working, &self.context, range.end).map_err(markup_error(index))?;
            (split, point, range.end)
        };
        if point.blocked {
            return Err(blocked(index, after_text));
        }

        let props = point.props.as_deref();
        let markup = markup::insertion_at(&point, new_text, props, ids, &self.stamp)
            .map_err(exhausted(index))?;
        Ok(Staged {
            xml: markup.apply_to(&split),
            expected_text: format!("{}{}{}", &text[..offset], visible(new_text), &text[offset..]),
            applied: AppliedEdit {
                revision_ids: markup.revision_ids,
                comment_id: None,
            },
            comment: None,
        })
    }

    fn stage_comment(
        &self,
        index: usize,
        working: &str,
        text: &str,
        target: &str,
        body: &str,
        ids: &mut RevisionIds,
    ) -> std::result::Result<Staged, EditError> {
        let range = self.locate(index, text, target)?;
        let (split, span) = isolate(working, &self.context, range).map_err(markup_error(index))?;
        let id = ids.next_comment().map_err(exhausted(index))?;
        let markup = markup::comment(&span, id, &self.stamp, body);
        Ok(Staged {
            xml: splice(&split, span.range.clone(), &markup.anchor),
            expected_text: text.to_string(),
            applied: AppliedEdit {
                revision_ids: Vec::new(),
                comment_id: Some(id),
            },
            comment: Some(markup.body),
        })
    }

    fn locate(
        &self,
        index: usize,
        text: &str,
        target: &str,
    ) -> std::result::Result<Range<usize>, EditError> {
        if target.is_empty() {
            return Err(EditError::EmptyTarget {
                paragraph_index: index,
            });
        }
        find(text, target).ok_or_else(|| EditError::NotFound {
            paragraph_index: index,
            text: target.to_string(),
        })
    }

    /// Apply a batch in order. Failed edits are reported and skipped.
    #[instrument(skip(self, edits), level = "debug", fields(count = edits.len()))]
    pub fn apply_all(&mut self, edits: &[EditRequest]) -> PatchReport {
        let mut report = PatchReport::default();
        for (position, edit) in edits.iter().enumerate() {
            let result = self.apply(edit);
            if let Err(error) = &result {
                warn!(
                    "Edit #{} ({} of {:?}) failed: {}",
                    position,
                    edit.kind(),
                    edit.target_text(),
                    error
                );
            }
            report.push(EditOutcome::new(position, edit, result));
        }
        info!(
            "Applied {} of {} edit(s)",
            report.applied,
            report.applied + report.failed
        );
        report
    }

    /// Write edited paragraphs and comments back and serialize the package.
    #[instrument(skip(self), level = "debug")]
    pub fn finish(mut self) -> Result<Vec<u8>> {
        reassemble::commit(
            &mut self.package,
            &self.main_part,
            &self.document_xml,
            &self.paragraphs,
            &self.comments,
        )?;
        self.package.to_bytes()
    }
}

fn markup_error(index: usize) -> impl Fn(DocxError) -> EditError {
    move |e| EditError::Markup {
        paragraph_index: index,
        message: e.to_string(),
    }
}

fn exhausted(index: usize) -> impl Fn(IdsExhausted) -> EditError {
    move |IdsExhausted(kind)| EditError::IdsExhausted {
        paragraph_index: index,
        kind,
    }
}

fn blocked(index: usize, text: &str) -> EditError {
    EditError::SpanConflict {
        paragraph_index: index,
        text: text.to_string(),
        reason: "new text would split a content control or field inside a tracked insertion"
            .to_string(),
    }
}

/// Open `bytes`, apply `edits` in order and return the new archive with its report.
pub fn patch_document(
    bytes: Vec<u8>,
    edits: &[EditRequest],
    options: SessionOptions,
) -> Result<(Vec<u8>, PatchReport)> {
    let mut session = RevisionSession::open(bytes, options)?;
    let report = session.apply_all(edits);
    let output = session.finish()?;
    Ok((output, report))
}
