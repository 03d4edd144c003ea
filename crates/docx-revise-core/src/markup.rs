//! Tracked-change and comment markup.
//!
//! Everything here is a pure string transformation over an isolated span. The result is
//! a set of splices against the fragment the span was isolated from.

use std::cmp::Reverse;
use std::ops::Range;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{NoExpand, Regex};

use crate::ids::{IdsExhausted, RevisionIds};
use crate::locate::{InsertionPoint, ReplaceableSpan, RunContent, RunSlice, SpanSegment};
use crate::xml::{escape_attr, escape_text};

static RPR_CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:rPrChange\b[^>]*/>|<w:rPrChange\b.*?</w:rPrChange>")
        .expect("rPrChange pattern is valid")
});

static REVISION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bw:id\s*=\s*("[^"]*"|'[^']*')"#).expect("w:id pattern is valid")
});

/// Who and when, stamped on every revision and comment of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub author: String,
    pub initials: String,
    pub date: DateTime<Utc>,
}

impl Stamp {
    pub fn date_attr(&self) -> String {
        self.date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    fn revision_attrs(&self, id: u32) -> String {
        format!(
            "w:id=\"{}\" w:author=\"{}\" w:date=\"{}\"",
            id,
            escape_attr(&self.author),
            self.date_attr()
        )
    }
}

/// Replace `range` of a fragment with `xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub range: Range<usize>,
    pub xml: String,
}

/// Generated revision markup and the ids it consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionMarkup {
    /// Non-overlapping, against the fragment the span or point was taken from.
    pub splices: Vec<Splice>,
    pub revision_ids: Vec<u32>,
}

impl RevisionMarkup {
    fn extend(&mut self, other: RevisionMarkup) {
        self.splices.extend(other.splices);
        self.revision_ids.extend(other.revision_ids);
    }

    /// `fragment` with every splice applied, back to front so earlier ranges stay valid.
    pub fn apply_to(&self, fragment: &str) -> String {
        let mut splices: Vec<&Splice> = self.splices.iter().collect();
        splices.sort_by_key(|s| Reverse((s.range.start, s.range.end)));
        let mut out = fragment.to_string();
        for splice in splices {
            out.replace_range(splice.range.clone(), &splice.xml);
        }
        out
    }
}

/// A comment: what goes into the paragraph and what goes into the comments part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentMarkup {
    pub anchor: String,
    pub body: String,
}

/// Wrap the span's runs in `w:del`.
///
/// Each parent group is rewritten in place, so a hyperlink or an earlier insertion gets a
/// `w:del` of its own inside it. Within a group, existing revision wrappers are emitted
/// unchanged between the new ones.
pub fn deletion(
    span: &ReplaceableSpan,
    ids: &mut RevisionIds,
    stamp: &Stamp,
) -> Result<RevisionMarkup, IdsExhausted> {
    let mut markup = RevisionMarkup::default();
    for group in &span.groups {
        let xml = deleted_group(&group.segments, ids, stamp, &mut markup.revision_ids)?;
        markup.splices.push(Splice {
            range: group.range.clone(),
            xml,
        });
    }
    Ok(markup)
}

fn deleted_group(
    segments: &[SpanSegment],
    ids: &mut RevisionIds,
    stamp: &Stamp,
    revision_ids: &mut Vec<u32>,
) -> Result<String, IdsExhausted> {
    let mut xml = String::new();
    let mut open = false;
    let mut pending = String::new();

    for segment in segments {
        match segment {
            SpanSegment::Run(run) => {
                xml.push_str(&pending);
                if !open {
                    let id = ids.next_revision()?;
                    revision_ids.push(id);
                    xml.push_str(&format!("<w:del {}>", stamp.revision_attrs(id)));
                    open = true;
                }
                pending.clear();
                xml.push_str(&deleted_run(run));
            }
            SpanSegment::Markup(markup) => pending.push_str(markup),
            SpanSegment::Revision(existing) => {
                if open {
                    xml.push_str("</w:del>");
                    open = false;
                }
                xml.push_str(&pending);
                pending.clear();
                xml.push_str(existing);
            }
        }
    }
    if open {
        xml.push_str("</w:del>");
    }
    xml.push_str(&pending);
    Ok(xml)
}

fn deleted_run(run: &RunSlice) -> String {
    let mut out = format!("{}{}", run.open, run.props);
    for content in &run.content {
        match content {
            RunContent::Text(text) => out.push_str(&format!(
                "<w:delText xml:space=\"preserve\">{}</w:delText>",
                escape_text(text)
            )),
            RunContent::Other(other) if other.starts_with("<w:instrText") => out.push_str(
                &other
                    .replacen("<w:instrText", "<w:delInstrText", 1)
                    .replace("</w:instrText>", "</w:delInstrText>"),
            ),
            RunContent::Other(other) => out.push_str(other),
        }
    }
    out.push_str(&run.close);
    out
}

/// A new run holding `text` inside one `w:ins`.
///
/// `props` is the `w:rPr` to inherit; any `w:rPrChange` in it is dropped.
pub fn insertion(text: &str, props: Option<&str>, id: u32, stamp: &Stamp) -> String {
    let props = props
        .map(|p| RPR_CHANGE.replace_all(p, "").into_owned())
        .unwrap_or_default();
    format!(
        "<w:ins {}><w:r>{}{}</w:r></w:ins>",
        stamp.revision_attrs(id),
        props,
        run_content(text)
    )
}

/// `text` as a new tracked insertion at `point`.
///
/// Inside an existing insertion, the enclosing elements are closed first and reopened
/// after the new run; each reopened insertion gets a fresh revision id.
pub fn insertion_at(
    point: &InsertionPoint,
    text: &str,
    props: Option<&str>,
    ids: &mut RevisionIds,
    stamp: &Stamp,
) -> Result<RevisionMarkup, IdsExhausted> {
    let id = ids.next_revision()?;
    let mut revision_ids = vec![id];
    let mut xml: String = point.enclosing.iter().map(|e| e.close.as_str()).collect();
    xml.push_str(&insertion(text, props, id, stamp));
    for enclosing in point.enclosing.iter().rev() {
        if enclosing.insertion {
            let reopened = ids.next_revision()?;
            revision_ids.push(reopened);
            let attr = format!("w:id=\"{}\"", reopened);
            xml.push_str(&REVISION_ID.replace(&enclosing.open, NoExpand(&attr)));
        } else {
            xml.push_str(&enclosing.open);
        }
    }
    Ok(RevisionMarkup {
        splices: vec![Splice {
            range: point.at..point.at,
            xml,
        }],
        revision_ids,
    })
}

fn run_content(text: &str) -> String {
    let mut out = String::new();
    let mut chunk = String::new();
    let flush = |chunk: &mut String, out: &mut String| {
        if !chunk.is_empty() {
            out.push_str(&format!(
                "<w:t xml:space=\"preserve\">{}</w:t>",
                escape_text(chunk)
            ));
            chunk.clear();
        }
    };
    for c in text.chars() {
        match c {
            '\n' => {
                flush(&mut chunk, &mut out);
                out.push_str("<w:br/>");
            }
            '\t' => {
                flush(&mut chunk, &mut out);
                out.push_str("<w:tab/>");
            }
            '\r' => {}
            c => chunk.push(c),
        }
    }
    flush(&mut chunk, &mut out);
    out
}

/// Deletion of the span followed by an insertion of `new_text` with the span's formatting.
///
/// The insertion goes after the last deleted group, at [`ReplaceableSpan::end`].
pub fn replacement(
    span: &ReplaceableSpan,
    new_text: &str,
    ids: &mut RevisionIds,
    stamp: &Stamp,
) -> Result<RevisionMarkup, IdsExhausted> {
    let mut markup = deletion(span, ids, stamp)?;
    if !new_text.is_empty() {
        markup.extend(insertion_at(
            &span.end,
            new_text,
            span.props.as_deref(),
            ids,
            stamp,
        )?);
    }
    Ok(markup)
}

/// Range markers around the span plus a reference run, and the matching `w:comment`.
pub fn comment(span: &ReplaceableSpan, id: u32, stamp: &Stamp, body: &str) -> CommentMarkup {
    let anchor = format!(
        concat!(
            "<w:commentRangeStart w:id=\"{id}\"/>{original}<w:commentRangeEnd w:id=\"{id}\"/>",
            "<w:r><w:rPr><w:rStyle w:val=\"CommentReference\"/></w:rPr>",
            "<w:commentReference w:id=\"{id}\"/></w:r>"
        ),
        id = id,
        original = span.original
    );

    let mut entry = format!(
        "<w:comment w:id=\"{}\" w:author=\"{}\" w:date=\"{}\"",
        id,
        escape_attr(&stamp.author),
        stamp.date_attr()
    );
    if !stamp.initials.is_empty() {
        entry.push_str(&format!(" w:initials=\"{}\"", escape_attr(&stamp.initials)));
    }
    entry.push('>');
    for (i, line) in body.split('\n').enumerate() {
        entry.push_str("<w:p><w:pPr><w:pStyle w:val=\"CommentText\"/></w:pPr>");
        if i == 0 {
            entry.push_str(concat!(
                "<w:r><w:rPr><w:rStyle w:val=\"CommentReference\"/></w:rPr>",
                "<w:annotationRef/></w:r>"
            ));
        }
        let line = line.trim_end_matches('\r');
        if !line.is_empty() {
            entry.push_str(&format!("<w:r>{}</w:r>", run_content(line)));
        }
        entry.push_str("</w:p>");
    }
    entry.push_str("</w:comment>");

    CommentMarkup {
        anchor,
        body: entry,
    }
}
