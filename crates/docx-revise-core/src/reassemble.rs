//! Writing edited paragraphs and comments back into the package.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::error::{DocxError, Result};
use crate::model::Paragraph;
use crate::package::{part_dir, rels_part_for, relative_target, resolve_target, Package};
use crate::xml::{
    self, escape_attr, start_tag_end, w_attr, COMMENTS_CONTENT_TYPE, COMMENTS_REL_TYPE,
    CONTENT_TYPES_NS, PACKAGE_REL_NS, WML_NS,
};

const DEFAULT_MAIN_PART: &str = "word/document.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
    external: bool,
}

fn relationships(package: &mut Package, rels_part: &str) -> Result<Vec<Relationship>> {
    let Some(xml) = package.read_string(rels_part)? else {
        return Ok(Vec::new());
    };
    let doc = xml::parse_part(rels_part, &xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .map(|n| Relationship {
            id: n.attribute("Id").unwrap_or_default().to_string(),
            rel_type: n.attribute("Type").unwrap_or_default().to_string(),
            target: n.attribute("Target").unwrap_or_default().to_string(),
            external: n.attribute("TargetMode") == Some("External"),
        })
        .collect())
}

/// Name of the main document part, from the package relationships.
///
/// Falls back to `word/document.xml` when the package has no usable relationship.
pub fn main_document_part(package: &mut Package) -> Result<String> {
    let part = relationships(package, "_rels/.rels")?
        .into_iter()
        .find(|r| !r.external && r.rel_type.ends_with("/officeDocument"))
        .map(|r| resolve_target("", &r.target))
        .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string());
    if !package.contains(&part) {
        return Err(DocxError::MalformedArchive(format!(
            "Main document part '{}' is missing",
            part
        )));
    }
    Ok(part)
}

/// Where comments of the main part live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentsTarget {
    pub part: String,
    /// The main part already has a `comments` relationship.
    pub has_relationship: bool,
}

pub fn comments_part(package: &mut Package, main_part: &str) -> Result<CommentsTarget> {
    let dir = part_dir(main_part);
    let existing = relationships(package, &rels_part_for(main_part))?
        .into_iter()
        .find(|r| !r.external && r.rel_type.ends_with("/comments"));
    Ok(match existing {
        Some(rel) => CommentsTarget {
            part: resolve_target(dir, &rel.target),
            has_relationship: true,
        },
        None => CommentsTarget {
            part: if dir.is_empty() {
                "comments.xml".to_string()
            } else {
                format!("{}/comments.xml", dir)
            },
            has_relationship: false,
        },
    })
}

/// Highest `w:id` among the `w:comment` entries of a comments part.
pub fn existing_comment_max(package: &mut Package, part: &str) -> Result<Option<u32>> {
    let Some(xml) = package.read_string(part)? else {
        return Ok(None);
    };
    let doc = xml::parse_part(part, &xml)?;
    Ok(doc
        .descendants()
        .filter(|n| xml::is_w(*n, "comment"))
        .filter_map(|n| w_attr(n, "id").and_then(|v| v.parse::<u32>().ok()))
        .max())
}

/// Substitute every modified paragraph at its captured position.
///
/// The bytes at each position must still be the paragraph's original XML.
pub fn splice_paragraphs(document_xml: &str, paragraphs: &[Paragraph]) -> Result<String> {
    let mut out = String::with_capacity(document_xml.len());
    let mut cursor = 0;
    for paragraph in paragraphs.iter().filter(|p| p.is_modified()) {
        let range = paragraph.range();
        if range.start < cursor
            || document_xml.get(range.clone()) != Some(paragraph.original_xml())
        {
            return Err(DocxError::PackagingFailure(format!(
                "Paragraph {} no longer matches its original position",
                paragraph.index()
            )));
        }
        out.push_str(&document_xml[cursor..range.start]);
        out.push_str(paragraph.xml());
        cursor = range.end;
    }
    out.push_str(&document_xml[cursor..]);
    Ok(out)
}

/// Insert `addition` as the last content of the root element.
fn append_to_root(part: &str, xml: &str, addition: &str) -> Result<String> {
    let doc = xml::parse_part(part, xml)?;
    let range = doc.root_element().range();
    let open_end = start_tag_end(xml, range.start).unwrap_or(range.end);

    let mut out = String::with_capacity(xml.len() + addition.len());
    if open_end == range.end {
        let tag = &xml[range.clone()];
        let name_end = tag[1..]
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .map(|i| i + 1)
            .unwrap_or(tag.len());
        let open = tag.trim_end_matches('>').trim_end_matches('/').trim_end();
        out.push_str(&xml[..range.start]);
        out.push_str(open);
        out.push('>');
        out.push_str(addition);
        out.push_str(&format!("</{}>", &tag[1..name_end]));
        out.push_str(&xml[range.end..]);
    } else {
        let close = xml[..range.end].rfind("</").ok_or_else(|| {
            DocxError::PackagingFailure(format!("Cannot find the root end tag of '{}'", part))
        })?;
        out.push_str(&xml[..close]);
        out.push_str(addition);
        out.push_str(&xml[close..]);
    }
    Ok(out)
}

/// Write comment entries, wiring up the relationship and content type when needed.
pub fn add_comments(package: &mut Package, main_part: &str, entries: &[String]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let target = comments_part(package, main_part)?;
    let joined = entries.concat();

    let comments_xml = match package.read_string(&target.part)? {
        Some(existing) => {
            let doc = xml::parse_part(&target.part, &existing)?;
            if !xml::binds_w_prefix(doc.root_element()) {
                return Err(DocxError::MalformedArchive(format!(
                    "Part '{}' does not bind the 'w' prefix to WordprocessingML",
                    target.part
                )));
            }
            append_to_root(&target.part, &existing, &joined)?
        }
        None => format!(
            "{}\r\n<w:comments xmlns:w=\"{}\">{}</w:comments>",
            XML_DECLARATION, WML_NS, joined
        ),
    };
    package.put(&target.part, comments_xml.into_bytes());
    info!("Wrote {} comment(s) to {}", entries.len(), target.part);

    if !target.has_relationship {
        add_relationship(package, main_part, &target.part)?;
    }
    add_content_type_override(package, &target.part)
}

fn add_relationship(package: &mut Package, main_part: &str, comments_part: &str) -> Result<()> {
    let rels_part = rels_part_for(main_part);
    let existing = relationships(package, &rels_part)?;
    if existing
        .iter()
        .any(|r| !r.external && r.rel_type.ends_with("/comments"))
    {
        return Ok(());
    }

    let taken: HashSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
    let mut next = existing
        .iter()
        .filter_map(|r| r.id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
        .max()
        .unwrap_or(0)
        + 1;
    while taken.contains(format!("rId{}", next).as_str()) {
        next += 1;
    }
    let entry = format!(
        "<Relationship Id=\"rId{}\" Type=\"{}\" Target=\"{}\"/>",
        next,
        COMMENTS_REL_TYPE,
        escape_attr(&relative_target(part_dir(main_part), comments_part))
    );

    let xml = match package.read_string(&rels_part)? {
        Some(xml) => append_to_root(&rels_part, &xml, &entry)?,
        None => format!(
            "{}\r\n<Relationships xmlns=\"{}\">{}</Relationships>",
            XML_DECLARATION, PACKAGE_REL_NS, entry
        ),
    };
    package.put(&rels_part, xml.into_bytes());
    debug!("Added comments relationship rId{} to {}", next, rels_part);
    Ok(())
}

fn add_content_type_override(package: &mut Package, part: &str) -> Result<()> {
    let Some(xml) = package.read_string(CONTENT_TYPES_PART)? else {
        warn!("Package has no {}, comments part left undeclared", CONTENT_TYPES_PART);
        return Ok(());
    };
    let part_name = format!("/{}", part);
    let doc = xml::parse_part(CONTENT_TYPES_PART, &xml)?;
    let declared = doc.descendants().any(|n| {
        n.is_element()
            && n.tag_name().name() == "Override"
            && n.tag_name().namespace() == Some(CONTENT_TYPES_NS)
            && n.attribute("PartName")
                .is_some_and(|name| name.eq_ignore_ascii_case(&part_name))
    });
    if declared {
        return Ok(());
    }

    let entry = format!(
        "<Override PartName=\"{}\" ContentType=\"{}\"/>",
        escape_attr(&part_name),
        COMMENTS_CONTENT_TYPE
    );
    let updated = append_to_root(CONTENT_TYPES_PART, &xml, &entry)?;
    package.put(CONTENT_TYPES_PART, updated.into_bytes());
    debug!("Declared content type for {}", part_name);
    Ok(())
}

/// Write the session's results into the package.
///
/// The main part is only replaced when some paragraph changed.
pub fn commit(
    package: &mut Package,
    main_part: &str,
    document_xml: &str,
    paragraphs: &[Paragraph],
    comments: &[String],
) -> Result<()> {
    let modified = paragraphs.iter().filter(|p| p.is_modified()).count();
    if modified > 0 {
        let updated = splice_paragraphs(document_xml, paragraphs)?;
        package.put(main_part, updated.into_bytes());
        info!("Rewrote {} paragraph(s) in {}", modified, main_part);
    }
    add_comments(package, main_part, comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn package(entries: &[(&str, &str)]) -> Package {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        Package::from_bytes(writer.finish().unwrap().into_inner()).unwrap()
    }

    const ROOT_RELS: &str = r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/main.xml"/></Relationships>"#;

    #[test]
    fn test_main_part_follows_relationship() {
        let mut pkg = package(&[("_rels/.rels", ROOT_RELS), ("word/main.xml", "<x/>")]);
        assert_eq!(main_document_part(&mut pkg).unwrap(), "word/main.xml");
    }

    #[test]
    fn test_main_part_defaults_and_must_exist() {
        let mut pkg = package(&[("word/document.xml", "<x/>")]);
        assert_eq!(main_document_part(&mut pkg).unwrap(), "word/document.xml");

        let mut empty = package(&[("other.xml", "<x/>")]);
        assert!(matches!(
            main_document_part(&mut empty),
            Err(DocxError::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_append_to_root() {
        assert_eq!(
            append_to_root("a", "<?xml version=\"1.0\"?><r><x/></r>", "<y/>").unwrap(),
            "<?xml version=\"1.0\"?><r><x/><y/></r>"
        );
        assert_eq!(
            append_to_root("a", "<w:comments xmlns:w=\"u\" />", "<y/>").unwrap(),
            "<w:comments xmlns:w=\"u\"><y/></w:comments>"
        );
    }

    #[test]
    fn test_add_comments_creates_part_relationship_and_override() {
        let mut pkg = package(&[
            (
                "[Content_Types].xml",
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#,
            ),
            ("word/document.xml", "<x/>"),
            (
                "word/_rels/document.xml.rels",
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#,
            ),
        ]);
        add_comments(&mut pkg, "word/document.xml", &["<w:comment w:id=\"0\"/>".to_string()])
            .unwrap();

        let comments = pkg.read_string("word/comments.xml").unwrap().unwrap();
        assert!(comments.contains("<w:comment w:id=\"0\"/></w:comments>"));
        let rels = pkg.read_string("word/_rels/document.xml.rels").unwrap().unwrap();
        assert!(rels.contains(&format!(
            "<Relationship Id=\"rId4\" Type=\"{}\" Target=\"comments.xml\"/>",
            COMMENTS_REL_TYPE
        )));
        let types = pkg.read_string("[Content_Types].xml").unwrap().unwrap();
        assert!(types.contains("PartName=\"/word/comments.xml\""));

        // Second batch: appended, nothing declared twice.
        add_comments(&mut pkg, "word/document.xml", &["<w:comment w:id=\"1\"/>".to_string()])
            .unwrap();
        let comments = pkg.read_string("word/comments.xml").unwrap().unwrap();
        assert_eq!(comments.matches("<w:comment ").count(), 2);
        let rels = pkg.read_string("word/_rels/document.xml.rels").unwrap().unwrap();
        assert_eq!(rels.matches("/comments\"").count(), 1);
        let types = pkg.read_string("[Content_Types].xml").unwrap().unwrap();
        assert_eq!(types.matches("/word/comments.xml").count(), 1);
        assert_eq!(existing_comment_max(&mut pkg, "word/comments.xml").unwrap(), Some(1));
    }

    #[test]
    fn test_add_comments_creates_missing_rels_part() {
        let mut pkg = package(&[("word/document.xml", "<x/>")]);
        add_comments(&mut pkg, "word/document.xml", &["<w:comment w:id=\"0\"/>".to_string()])
            .unwrap();
        let rels = pkg.read_string("word/_rels/document.xml.rels").unwrap().unwrap();
        assert!(rels.contains("Id=\"rId1\""));
        assert!(!pkg.contains("[Content_Types].xml"));
    }

    #[test]
    fn test_comments_part_from_relationship() {
        let mut pkg = package(&[
            ("word/document.xml", "<x/>"),
            (
                "word/_rels/document.xml.rels",
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments" Target="notes/c.xml"/></Relationships>"#,
            ),
        ]);
        let target = comments_part(&mut pkg, "word/document.xml").unwrap();
        assert_eq!(
            target,
            CommentsTarget {
                part: "word/notes/c.xml".to_string(),
                has_relationship: true
            }
        );
    }
}
