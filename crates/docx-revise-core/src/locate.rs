//! Text location and run splitting.
//!
//! Matching is exact, case-sensitive and first-occurrence against the accepted reading
//! of a paragraph. Once found, the runs at either boundary are split at the exact
//! offsets so the target becomes a sequence of whole runs, each keeping its `w:rPr`.
//!
//! A target may cross element boundaries (a hyperlink, an earlier insertion). Its runs
//! are then grouped by parent element, and each group is rewritten inside its parent.

use std::ops::Range;

use crate::error::{DocxError, Result};
use crate::model::{Layout, RunNode, Wrapper, WrapperKind};
use crate::xml::{escape_text, FragmentContext};

/// Byte range of the first occurrence of `target` in `text`.
pub fn find(text: &str, target: &str) -> Option<Range<usize>> {
    if target.is_empty() {
        return None;
    }
    text.find(target).map(|start| start..start + target.len())
}

/// Piece of run content, as needed to re-render a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunContent {
    /// Text of a `w:t`, unescaped.
    Text(String),
    /// Any other run child, verbatim.
    Other(String),
}

/// A run inside a span, broken out so markup can re-tag its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSlice {
    pub open: String,
    pub props: String,
    pub content: Vec<RunContent>,
    pub close: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanSegment {
    Run(RunSlice),
    /// Markup between runs (bookmarks, proofing marks, whitespace).
    Markup(String),
    /// An existing revision wrapper holding only deleted text. Never nested into a new one.
    Revision(String),
}

/// Consecutive target runs sharing one parent element.
///
/// `range` is balanced: it starts and ends among the children of that parent.
#[derive(Debug, Clone)]
pub struct SpanGroup {
    pub range: Range<usize>,
    /// `range` broken into runs and the markup between them.
    pub segments: Vec<SpanSegment>,
}

/// The runs composing a located target, after boundary splits.
#[derive(Debug, Clone)]
pub struct ReplaceableSpan {
    /// Byte range in the split fragment from the first to the last target run.
    pub range: Range<usize>,
    /// The target text.
    pub text: String,
    /// The fragment bytes in `range`, unchanged.
    pub original: String,
    /// Target runs by parent element, in document order.
    pub groups: Vec<SpanGroup>,
    /// `w:rPr` of the first target run.
    pub props: Option<String>,
    /// Where text replacing the target goes: after the last group, as far out as possible.
    pub end: InsertionPoint,
}

/// An enclosing element that new content has to be placed outside of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosing {
    pub open: String,
    pub close: String,
    /// A tracked insertion; the reopened half is a revision of its own.
    pub insertion: bool,
}

/// A position in a fragment where a new run may be spliced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionPoint {
    pub at: usize,
    /// `w:rPr` of the neighbouring run, for the new run to inherit.
    pub props: Option<String>,
    /// Elements to close before the new content and reopen after it, innermost first.
    /// Set when the position lies inside an existing tracked insertion.
    pub enclosing: Vec<Enclosing>,
    /// Leaving the enclosing insertion would split an element that cannot be reopened
    /// (a content control, a simple field ...).
    pub blocked: bool,
}

/// Split the run straddling `offset` (accepted-text bytes) so a run boundary falls there.
///
/// Returns the fragment unchanged when `offset` already sits on a boundary.
pub fn split_at(fragment: &str, context: &FragmentContext, offset: usize) -> Result<String> {
    let layout = Layout::build(fragment, context)?;
    let Some(entry) = layout
        .index
        .iter()
        .find(|e| e.start < offset && offset < e.end)
    else {
        return Ok(fragment.to_string());
    };
    let run = &layout.runs[entry.run];
    let (left, right) = split_run(fragment, run, offset - entry.start);

    let mut out = String::with_capacity(fragment.len() + left.len());
    out.push_str(&fragment[..run.range.start]);
    out.push_str(&left);
    out.push_str(&right);
    out.push_str(&fragment[run.range.end..]);
    Ok(out)
}

/// Split `run` after `at` bytes of its text. Both halves keep the start tag and `w:rPr`.
fn split_run(fragment: &str, run: &RunNode, at: usize) -> (String, String) {
    let head = format!(
        "{}{}",
        &fragment[run.open_tag.clone()],
        run.props.clone().map(|r| &fragment[r]).unwrap_or("")
    );
    let close = &fragment[run.close_tag.clone()];
    let mut left = head.clone();
    let mut right = head;

    let mut seen = 0;
    for part in &run.parts {
        let verbatim = &fragment[part.range.clone()];
        match &part.text {
            Some(text) => {
                let end = seen + text.len();
                if end <= at {
                    left.push_str(verbatim);
                } else if seen >= at {
                    right.push_str(verbatim);
                } else {
                    let cut = at - seen;
                    left.push_str(&text_element(&text[..cut]));
                    right.push_str(&text_element(&text[cut..]));
                }
                seen = end;
            }
            None if seen < at => left.push_str(verbatim),
            None => right.push_str(verbatim),
        }
    }

    left.push_str(close);
    right.push_str(close);
    (left, right)
}

fn text_element(text: &str) -> String {
    format!("<w:t xml:space=\"preserve\">{}</w:t>", escape_text(text))
}

/// Split both ends of `target` (accepted-text bytes) and describe the runs in between.
///
/// Returns the split fragment along with the span; the caller decides whether to keep it.
pub fn isolate(
    fragment: &str,
    context: &FragmentContext,
    target: Range<usize>,
) -> Result<(String, ReplaceableSpan)> {
    let split = split_at(fragment, context, target.start)?;
    let split = split_at(&split, context, target.end)?;
    let layout = Layout::build(&split, context)?;

    let covered: Vec<usize> = layout
        .index
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_empty() && e.start >= target.start && e.end <= target.end)
        .map(|(pos, _)| pos)
        .collect();
    let (Some(&first), Some(&last)) = (covered.first(), covered.last()) else {
        return Err(DocxError::MalformedArchive(format!(
            "No runs cover bytes {}..{} of the paragraph text",
            target.start, target.end
        )));
    };
    // Live runs from the first to the last target run, zero-width ones included.
    let live: Vec<usize> = layout.index[first..=last].iter().map(|e| e.run).collect();
    let first_run = &layout.runs[live[0]];
    let last_run = live[live.len() - 1];
    let range = first_run.range.start..layout.runs[last_run].range.end;
    let props = first_run.props.clone().map(|r| split[r].to_string());

    let groups = live
        .chunk_by(|&a, &b| layout.runs[a].parent() == layout.runs[b].parent())
        .map(|members| {
            let slice = layout.runs[members[0]].range.start
                ..layout.runs[members[members.len() - 1]].range.end;
            SpanGroup {
                segments: segments(&split, &layout, members, slice.clone()),
                range: slice,
            }
        })
        .collect();
    let end = point_after_run(&split, &layout, last_run, props.clone());

    let span = ReplaceableSpan {
        text: layout.readings.accepted[target].to_string(),
        original: split[range.clone()].to_string(),
        range,
        groups,
        props,
        end,
    };
    Ok((split, span))
}

/// Break `slice` into live runs, deleted-revision wrappers and the markup between them.
fn segments(
    fragment: &str,
    layout: &Layout,
    live: &[usize],
    slice: Range<usize>,
) -> Vec<SpanSegment> {
    enum Item {
        Run(usize),
        Revision,
    }

    let inside = |r: &Range<usize>| r.start >= slice.start && r.end <= slice.end;
    let mut items: Vec<(Range<usize>, Item)> = live
        .iter()
        .map(|&r| (layout.runs[r].range.clone(), Item::Run(r)))
        .collect();
    for run in layout.runs.iter().filter(|r| r.is_deleted() && inside(&r.range)) {
        let outermost = run
            .wrappers
            .iter()
            .rev()
            .find(|w| inside(&w.range))
            .map(|w| w.range.clone())
            .unwrap_or_else(|| run.range.clone());
        if !items.iter().any(|(r, _)| *r == outermost) {
            items.push((outermost, Item::Revision));
        }
    }
    items.sort_by_key(|(r, _)| r.start);

    let mut out = Vec::new();
    let mut cursor = slice.start;
    for (range, item) in items {
        if range.start < cursor {
            continue;
        }
        if range.start > cursor {
            out.push(SpanSegment::Markup(fragment[cursor..range.start].to_string()));
        }
        out.push(match item {
            Item::Run(r) => SpanSegment::Run(run_slice(fragment, &layout.runs[r])),
            Item::Revision => SpanSegment::Revision(fragment[range.clone()].to_string()),
        });
        cursor = range.end;
    }
    if cursor < slice.end {
        out.push(SpanSegment::Markup(fragment[cursor..slice.end].to_string()));
    }
    out
}

fn run_slice(fragment: &str, run: &RunNode) -> RunSlice {
    RunSlice {
        open: fragment[run.open_tag.clone()].to_string(),
        props: run
            .props
            .clone()
            .map(|r| fragment[r].to_string())
            .unwrap_or_default(),
        content: run
            .parts
            .iter()
            .map(|part| match &part.text {
                Some(text) => RunContent::Text(text.clone()),
                None => RunContent::Other(fragment[part.range.clone()].to_string()),
            })
            .collect(),
        close: fragment[run.close_tag.clone()].to_string(),
    }
}

/// Insertion point right after `offset` bytes of accepted text.
///
/// When the anchor text ends at the last text of a wrapper (hyperlink, insertion ...)
/// the point moves past the wrapper's end tag.
pub fn point_after(
    fragment: &str,
    context: &FragmentContext,
    offset: usize,
) -> Result<(String, InsertionPoint)> {
    let split = split_at(fragment, context, offset)?;
    let layout = Layout::build(&split, context)?;
    let Some(entry) = layout
        .text_entries()
        .filter(|e| e.end == offset)
        .last()
        .copied()
    else {
        return Err(DocxError::MalformedArchive(format!(
            "No run ends at byte {} of the paragraph text",
            offset
        )));
    };
    let props = layout.props(&split, entry.run).map(str::to_string);
    let point = point_after_run(&split, &layout, entry.run, props);
    Ok((split, point))
}

/// Right after `run`, past the end tag of every wrapper holding no later text.
///
/// When that still leaves the position inside a tracked insertion, the wrappers up to
/// the outermost such insertion are recorded so the new content can be placed between
/// a closed and a reopened half.
fn point_after_run(
    fragment: &str,
    layout: &Layout,
    run: usize,
    props: Option<String>,
) -> InsertionPoint {
    let node = &layout.runs[run];
    let mut at = node.range.end;
    let mut escaped = 0;
    for wrapper in &node.wrappers {
        let more_text = layout.text_entries().any(|e| {
            let other = &layout.runs[e.run].range;
            other.start >= at && other.end <= wrapper.range.end
        });
        if more_text {
            break;
        }
        at = wrapper.range.end;
        escaped += 1;
    }

    let remaining = &node.wrappers[escaped..];
    let inside = remaining
        .iter()
        .rposition(|w| w.kind == WrapperKind::Insertion)
        .map_or(&remaining[..0], |outermost| &remaining[..=outermost]);
    InsertionPoint {
        at,
        props,
        enclosing: inside.iter().map(|w| enclosing(fragment, w)).collect(),
        blocked: inside.iter().any(|w| !w.reopenable),
    }
}

fn enclosing(fragment: &str, wrapper: &Wrapper) -> Enclosing {
    Enclosing {
        open: fragment[wrapper.open_tag.clone()].to_string(),
        close: fragment[wrapper.close_tag.clone()].to_string(),
        insertion: wrapper.kind == WrapperKind::Insertion,
    }
}

/// Insertion point at the start of the paragraph content, after any `w:pPr`.
///
/// A self-closing `<w:p/>` is opened up so content can be placed inside it.
pub fn point_at_start(
    fragment: &str,
    context: &FragmentContext,
) -> Result<(String, InsertionPoint)> {
    let layout = Layout::build(fragment, context)?;
    let props = layout
        .text_entries()
        .next()
        .and_then(|e| layout.props(fragment, e.run))
        .map(str::to_string);

    if layout.self_closing {
        let open = fragment
            .strip_suffix("/>")
            .unwrap_or(fragment)
            .trim_end();
        let opened = format!("{}></w:p>", open);
        let at = open.len() + 1;
        return Ok((
            opened,
            InsertionPoint {
                at,
                props,
                enclosing: Vec::new(),
                blocked: false,
            },
        ));
    }

    Ok((
        fragment.to_string(),
        InsertionPoint {
            at: layout.content_start,
            props,
            enclosing: Vec::new(),
            blocked: false,
        },
    ))
}
