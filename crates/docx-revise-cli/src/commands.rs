use std::fs;
use std::io::Write;

use anyhow::Context;
use docx_revise_core::{patch_document, EditRequest, PatchReport, RevisionSession, SessionOptions};
use serde::Serialize;
use tracing::info;

use crate::config::{ApplyArgs, ParagraphsArgs};

#[derive(Serialize)]
struct ParagraphEntry<'a> {
    index: usize,
    text: &'a str,
}

/// Print `[{"index", "text"}]` for every body paragraph.
pub fn paragraphs(args: &ParagraphsArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let bytes = fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let session = RevisionSession::open(bytes, SessionOptions::default())
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let view = args.view.into();
    let entries: Vec<ParagraphEntry> = session
        .paragraphs()
        .iter()
        .map(|p| ParagraphEntry {
            index: p.index(),
            text: p.text_as(view),
        })
        .collect();
    serde_json::to_writer_pretty(&mut *out, &entries)?;
    writeln!(out)?;
    Ok(())
}

/// Apply the edit batch, write the output document and the report.
pub fn apply(args: &ApplyArgs, out: &mut impl Write) -> anyhow::Result<PatchReport> {
    let bytes = fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let edits_json = fs::read_to_string(&args.edits)
        .with_context(|| format!("Failed to read {}", args.edits.display()))?;
    let edits: Vec<EditRequest> = serde_json::from_str(&edits_json)
        .with_context(|| format!("Invalid edit list in {}", args.edits.display()))?;

    info!(
        "Applying {} edit(s) to {} as {}",
        edits.len(),
        args.input.display(),
        args.author
    );
    let (document, report) = patch_document(bytes, &edits, args.session_options())
        .with_context(|| format!("Failed to revise {}", args.input.display()))?;
    fs::write(&args.output, document)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("Wrote {}", args.output.display());

    let json = serde_json::to_string_pretty(&report)?;
    match &args.report {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?,
        None => writeln!(out, "{}", json)?,
    }
    Ok(report)
}
