//! Paragraph/run model of the main document body.
//!
//! Paragraphs are captured verbatim (byte range + fragment) from the document part.
//! Each fragment can be laid out into its runs and an offset index mapping the
//! flattened text back onto those runs.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DocxError, Result};
use crate::xml::{self, element_text, is_w, start_tag_end, w_attr, FragmentContext};

/// Which reading of a paragraph's tracked changes to flatten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextView {
    /// Deletions hidden, insertions shown. Edits match against this reading.
    #[default]
    Accepted,
    /// Insertions hidden, deletions shown: the text before any tracked change.
    Rejected,
    /// Every run, deleted and inserted alike.
    Markup,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Readings {
    pub accepted: String,
    pub rejected: String,
    pub markup: String,
}

/// One addressable paragraph: a direct `w:p` child of `w:body`.
#[derive(Debug, Clone)]
pub struct Paragraph {
    index: usize,
    range: Range<usize>,
    original: String,
    working: String,
    readings: Readings,
}

impl Paragraph {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Flattened text in the accepted reading, the one edits are matched against.
    pub fn text(&self) -> &str {
        &self.readings.accepted
    }

    pub fn text_as(&self, view: TextView) -> &str {
        match view {
            TextView::Accepted => &self.readings.accepted,
            TextView::Rejected => &self.readings.rejected,
            TextView::Markup => &self.readings.markup,
        }
    }

    /// Current (working) XML of the paragraph.
    pub fn xml(&self) -> &str {
        &self.working
    }

    /// XML exactly as it appeared in the input document.
    pub fn original_xml(&self) -> &str {
        &self.original
    }

    pub fn is_modified(&self) -> bool {
        self.working != self.original
    }

    /// Byte range of the original fragment inside the document part.
    pub(crate) fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub(crate) fn update(&mut self, xml: String, layout: Layout) {
        self.working = xml;
        self.readings = layout.readings;
    }
}

/// Result of parsing the main document part.
#[derive(Debug)]
pub(crate) struct DocumentBody {
    pub paragraphs: Vec<Paragraph>,
    pub context: FragmentContext,
    /// Highest `w:id` on tracked-change elements.
    pub max_revision_id: Option<u32>,
    /// Highest `w:id` on comment range markers and references.
    pub max_comment_id: Option<u32>,
}

/// Elements whose `w:id` is a revision id. Bookmarks and the like use ids of their own.
const REVISION_ELEMENTS: &[&str] = &[
    "ins",
    "del",
    "moveFrom",
    "moveTo",
    "moveFromRangeStart",
    "moveFromRangeEnd",
    "moveToRangeStart",
    "moveToRangeEnd",
    "rPrChange",
    "pPrChange",
    "sectPrChange",
    "tblPrChange",
    "tblPrExChange",
    "tblGridChange",
    "trPrChange",
    "tcPrChange",
    "numberingChange",
    "cellIns",
    "cellDel",
    "cellMerge",
    "customXmlInsRangeStart",
    "customXmlInsRangeEnd",
    "customXmlDelRangeStart",
    "customXmlDelRangeEnd",
    "customXmlMoveFromRangeStart",
    "customXmlMoveFromRangeEnd",
    "customXmlMoveToRangeStart",
    "customXmlMoveToRangeEnd",
];

const COMMENT_ELEMENTS: &[&str] = &["commentRangeStart", "commentRangeEnd", "commentReference"];

/// Wrappers that may be closed and reopened around new content without changing meaning.
const REOPENABLE: &[&str] = &["ins", "moveTo", "hyperlink", "smartTag", "customXml", "dir", "bdo"];

fn is_any(node: roxmltree::Node, names: &[&str]) -> bool {
    names.iter().any(|name| is_w(node, name))
}

/// Parse the main document part into its addressable paragraphs.
pub(crate) fn parse_body(part: &str, document_xml: &str) -> Result<DocumentBody> {
    let (lead, text) = match document_xml.strip_prefix('\u{feff}') {
        Some(rest) => (document_xml.len() - rest.len(), rest),
        None => (0, document_xml),
    };
    let doc = xml::parse_part(part, text)?;
    let root = doc.root_element();
    if !xml::binds_w_prefix(root) {
        return Err(DocxError::MalformedArchive(format!(
            "Part '{}' does not bind the 'w' prefix to WordprocessingML",
            part
        )));
    }
    let body = root
        .children()
        .find(|n| is_w(*n, "body"))
        .ok_or_else(|| DocxError::MalformedArchive(format!("Part '{}' has no w:body", part)))?;

    let context = FragmentContext::from_root(root);
    let mut paragraphs = Vec::new();
    for node in body.children().filter(|n| is_w(*n, "p")) {
        let range = node.range();
        let range = (range.start + lead)..(range.end + lead);
        let original = document_xml[range.clone()].to_string();
        let layout = Layout::build(&original, &context)?;
        paragraphs.push(Paragraph {
            index: paragraphs.len(),
            range,
            working: original.clone(),
            original,
            readings: layout.readings,
        });
    }

    let mut max_revision_id = None;
    let mut max_comment_id = None;
    for node in doc.descendants().filter(|n| n.is_element()) {
        let Some(id) = w_attr(node, "id").and_then(|v| v.parse::<u32>().ok()) else {
            continue;
        };
        let slot = if is_any(node, COMMENT_ELEMENTS) {
            &mut max_comment_id
        } else if is_any(node, REVISION_ELEMENTS) {
            &mut max_revision_id
        } else {
            continue;
        };
        *slot = Some(slot.map_or(id, |max: u32| max.max(id)));
    }

    debug!("Parsed {} paragraphs from {}", paragraphs.len(), part);
    Ok(DocumentBody {
        paragraphs,
        context,
        max_revision_id,
        max_comment_id,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WrapperKind {
    Insertion,
    Deletion,
    Other,
}

/// An element between a run and its paragraph (hyperlink, revision, content control ...).
#[derive(Debug, Clone)]
pub(crate) struct Wrapper {
    pub range: Range<usize>,
    pub open_tag: Range<usize>,
    pub close_tag: Range<usize>,
    pub kind: WrapperKind,
    /// Splitting the wrapper in two around new content keeps the document valid.
    pub reopenable: bool,
}

/// A child of a run other than `w:rPr`. `text` is set for `w:t` and `w:delText`.
#[derive(Debug, Clone)]
pub(crate) struct RunPart {
    pub range: Range<usize>,
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct RunNode {
    pub range: Range<usize>,
    pub open_tag: Range<usize>,
    /// Empty range at `range.end` for a self-closing run.
    pub close_tag: Range<usize>,
    pub props: Option<Range<usize>>,
    pub parts: Vec<RunPart>,
    /// Innermost first, stopping below the paragraph.
    pub wrappers: Vec<Wrapper>,
}

impl RunNode {
    /// Start offset of the parent element; `None` when the run sits directly in the paragraph.
    pub fn parent(&self) -> Option<usize> {
        self.wrappers.first().map(|w| w.range.start)
    }

    pub fn is_deleted(&self) -> bool {
        self.wrappers.iter().any(|w| w.kind == WrapperKind::Deletion)
    }

    pub fn is_inserted(&self) -> bool {
        self.wrappers.iter().any(|w| w.kind == WrapperKind::Insertion)
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

/// `(run, start, end)` over the accepted reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub run: usize,
    pub start: usize,
    pub end: usize,
}

impl IndexEntry {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Run structure of one paragraph fragment.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub runs: Vec<RunNode>,
    /// Runs visible in the accepted reading, in document order (zero-width ones included).
    pub index: Vec<IndexEntry>,
    /// Where paragraph content starts: after the start tag and any `w:pPr`.
    pub content_start: usize,
    /// The fragment is a self-closing `<w:p/>`.
    pub self_closing: bool,
    pub readings: Readings,
}

impl Layout {
    pub fn build(fragment: &str, context: &FragmentContext) -> Result<Self> {
        let wrapped = context.wrap(fragment);
        let doc = roxmltree::Document::parse(&wrapped)
            .map_err(|e| DocxError::xml("paragraph fragment", e))?;
        let shift = context.offset();
        let local = |r: Range<usize>| (r.start - shift)..(r.end - shift);

        let paragraph = doc
            .root_element()
            .children()
            .find(|n| is_w(*n, "p"))
            .ok_or_else(|| DocxError::MalformedArchive("Fragment has no w:p".to_string()))?;
        let p_range = local(paragraph.range());
        let open_end = start_tag_end(fragment, p_range.start).unwrap_or(p_range.end);
        let self_closing = open_end == p_range.end;
        let content_start = paragraph
            .children()
            .find(|n| n.is_element())
            .filter(|n| is_w(*n, "pPr"))
            .map(|n| local(n.range()).end)
            .unwrap_or(open_end);

        let mut runs = Vec::new();
        'runs: for node in paragraph.descendants().filter(|n| is_w(*n, "r")) {
            let mut wrappers = Vec::new();
            let mut ancestor = node.parent_element();
            while let Some(el) = ancestor {
                if el == paragraph {
                    break;
                }
                if is_w(el, "p") {
                    // Belongs to a nested paragraph (text box content).
                    continue 'runs;
                }
                let kind = if is_w(el, "ins") || is_w(el, "moveTo") {
                    WrapperKind::Insertion
                } else if is_w(el, "del") || is_w(el, "moveFrom") {
                    WrapperKind::Deletion
                } else {
                    WrapperKind::Other
                };
                let range = local(el.range());
                let (open_tag, close_tag) = tags(fragment, &range);
                wrappers.push(Wrapper {
                    open_tag,
                    close_tag,
                    range,
                    kind,
                    reopenable: is_any(el, REOPENABLE),
                });
                ancestor = el.parent_element();
            }

            let range = local(node.range());
            let (open_tag, close_tag) = tags(fragment, &range);

            let mut props = None;
            let mut parts = Vec::new();
            for child in node.children().filter(|c| c.is_element()) {
                if is_w(child, "rPr") {
                    props = Some(local(child.range()));
                    continue;
                }
                let text =
                    (is_w(child, "t") || is_w(child, "delText")).then(|| element_text(child));
                parts.push(RunPart {
                    range: local(child.range()),
                    text,
                });
            }

            runs.push(RunNode {
                open_tag,
                close_tag,
                range,
                props,
                parts,
                wrappers,
            });
        }

        let mut readings = Readings::default();
        let mut index = Vec::new();
        for (i, run) in runs.iter().enumerate() {
            let text = run.text();
            readings.markup.push_str(&text);
            if !run.is_inserted() {
                readings.rejected.push_str(&text);
            }
            if !run.is_deleted() {
                let start = readings.accepted.len();
                readings.accepted.push_str(&text);
                index.push(IndexEntry {
                    run: i,
                    start,
                    end: readings.accepted.len(),
                });
            }
        }

        Ok(Self {
            runs,
            index,
            content_start,
            self_closing,
            readings,
        })
    }

    /// Entries that carry text, in document order.
    pub fn text_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.index.iter().filter(|e| !e.is_empty())
    }

    /// Properties (`w:rPr`) of a run, as verbatim XML.
    pub fn props<'a>(&self, fragment: &'a str, run: usize) -> Option<&'a str> {
        self.runs[run].props.clone().map(|r| &fragment[r])
    }
}

/// Start and end tag of the element at `range`; the end tag is empty when self-closing.
fn tags(fragment: &str, range: &Range<usize>) -> (Range<usize>, Range<usize>) {
    let open_end = start_tag_end(fragment, range.start).unwrap_or(range.end);
    if open_end == range.end {
        return (range.start..open_end, range.end..range.end);
    }
    let close = fragment[range.clone()]
        .rfind("</")
        .map(|i| range.start + i)
        .unwrap_or(range.end);
    (range.start..open_end, close..range.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::WML_NS;

    fn context() -> FragmentContext {
        let xml = format!(r#"<w:document xmlns:w="{}"/>"#, WML_NS);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        FragmentContext::from_root(doc.root_element())
    }

    fn document(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}"><w:body>{}</w:body></w:document>"#,
            WML_NS, body
        )
    }

    #[test]
    fn test_parse_body_keeps_only_direct_paragraphs() {
        let xml = document(concat!(
            "<w:p><w:r><w:t>One</w:t></w:r></w:p>",
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
            "<w:p><w:r><w:t xml:space=\"preserve\"> Two </w:t></w:r></w:p>",
            "<w:sectPr/>"
        ));
        let body = parse_body("word/document.xml", &xml).unwrap();
        let texts: Vec<&str> = body.paragraphs.iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["One", " Two "]);
        assert_eq!(body.paragraphs[1].index(), 1);
        let p = &body.paragraphs[1];
        assert_eq!(&xml[p.range()], p.original_xml());
    }

    #[test]
    fn test_parse_body_without_paragraphs_is_empty() {
        let body = parse_body("word/document.xml", &document("<w:sectPr/>")).unwrap();
        assert!(body.paragraphs.is_empty());
    }

    #[test]
    fn test_parse_body_requires_body() {
        let xml = format!(r#"<w:document xmlns:w="{}"/>"#, WML_NS);
        let err = parse_body("word/document.xml", &xml).unwrap_err();
        assert!(matches!(err, DocxError::MalformedArchive(_)));
    }

    #[test]
    fn test_parse_body_rejects_broken_xml() {
        let err = parse_body("word/document.xml", "<w:document><w:body>").unwrap_err();
        assert!(matches!(err, DocxError::Xml { .. }));
    }

    #[test]
    fn test_parse_body_handles_bom() {
        let xml = format!("\u{feff}{}", document("<w:p><w:r><w:t>Hi</w:t></w:r></w:p>"));
        let body = parse_body("word/document.xml", &xml).unwrap();
        let p = &body.paragraphs[0];
        assert_eq!(&xml[p.range()], "<w:p><w:r><w:t>Hi</w:t></w:r></w:p>");
    }

    #[test]
    fn test_existing_ids_are_collected_per_namespace() {
        let xml = document(concat!(
            "<w:p><w:ins w:id=\"7\" w:author=\"a\"><w:r><w:t>x</w:t></w:r></w:ins>",
            "<w:commentRangeStart w:id=\"3\"/><w:r><w:t>y</w:t></w:r>",
            "<w:commentRangeEnd w:id=\"3\"/>",
            "<w:r><w:commentReference w:id=\"3\"/></w:r></w:p>",
            "<w:p><w:bookmarkStart w:id=\"4294967295\" w:name=\"far\"/>",
            "<w:r><w:rPr><w:rPrChange w:id=\"9\" w:author=\"a\"><w:rPr/></w:rPrChange></w:rPr>",
            "<w:t>z</w:t></w:r><w:bookmarkEnd w:id=\"4294967295\"/></w:p>"
        ));
        let body = parse_body("word/document.xml", &xml).unwrap();
        assert_eq!(body.max_revision_id, Some(9));
        assert_eq!(body.max_comment_id, Some(3));
    }

    #[test]
    fn test_layout_readings_and_index() {
        let fragment = concat!(
            "<w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr>",
            "<w:r><w:t xml:space=\"preserve\">The </w:t></w:r>",
            "<w:del w:id=\"1\" w:author=\"a\"><w:r><w:delText>quick </w:delText></w:r></w:del>",
            "<w:ins w:id=\"2\" w:author=\"a\"><w:r><w:t>slow </w:t></w:r></w:ins>",
            "<w:hyperlink w:anchor=\"x\"><w:r><w:t>brown</w:t></w:r></w:hyperlink>",
            "<w:r><w:tab/><w:t>fox</w:t></w:r></w:p>"
        );
        let layout = Layout::build(fragment, &context()).unwrap();
        assert_eq!(layout.readings.accepted, "The slow brownfox");
        assert_eq!(layout.readings.rejected, "The quick brownfox");
        assert_eq!(layout.readings.markup, "The quick slow brownfox");
        assert_eq!(
            &fragment[..layout.content_start],
            "<w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr>"
        );
        assert!(!layout.self_closing);

        let spans: Vec<(usize, usize)> = layout.index.iter().map(|e| (e.start, e.end)).collect();
        assert_eq!(spans, vec![(0, 4), (4, 9), (9, 14), (14, 17)]);
        assert_eq!(layout.runs[2].wrappers[0].kind, WrapperKind::Insertion);
        assert!(layout.runs[1].is_deleted());
        assert_eq!(layout.runs[0].parent(), None);
        assert!(layout.runs[3].parent().is_some());

        let link = &layout.runs[3].wrappers[0];
        assert_eq!(&fragment[link.open_tag.clone()], "<w:hyperlink w:anchor=\"x\">");
        assert_eq!(&fragment[link.close_tag.clone()], "</w:hyperlink>");
        assert!(link.reopenable);
    }

    #[test]
    fn test_layout_skips_nested_paragraph_runs() {
        let fragment = concat!(
            "<w:p><w:r><w:t>Outer</w:t></w:r>",
            "<w:r><w:pict><w:txbxContent>",
            "<w:p><w:r><w:t>Inner</w:t></w:r></w:p>",
            "</w:txbxContent></w:pict></w:r>",
            "</w:p>"
        );
        let layout = Layout::build(fragment, &context()).unwrap();
        assert_eq!(layout.readings.accepted, "Outer");
        assert_eq!(layout.runs.len(), 2);
    }

    #[test]
    fn test_layout_run_tags() {
        let fragment =
            "<w:p><w:r w:rsidR=\"00AB\"><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r><w:r/></w:p>";
        let layout = Layout::build(fragment, &context()).unwrap();
        let run = &layout.runs[0];
        assert_eq!(&fragment[run.open_tag.clone()], "<w:r w:rsidR=\"00AB\">");
        assert_eq!(&fragment[run.close_tag.clone()], "</w:r>");
        assert_eq!(layout.props(fragment, 0), Some("<w:rPr><w:b/></w:rPr>"));
        let empty = &layout.runs[1];
        assert_eq!(&fragment[empty.open_tag.clone()], "<w:r/>");
        assert!(empty.close_tag.is_empty());
    }

    #[test]
    fn test_layout_self_closing_paragraph() {
        let layout = Layout::build("<w:p/>", &context()).unwrap();
        assert!(layout.self_closing);
        assert!(layout.runs.is_empty());
        assert_eq!(layout.readings.accepted, "");
    }

    #[test]
    fn test_layout_unescapes_text() {
        let fragment = "<w:p><w:r><w:t>A &amp; B</w:t></w:r></w:p>";
        let layout = Layout::build(fragment, &context()).unwrap();
        assert_eq!(layout.readings.accepted, "A & B");
    }
}
