use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use docx_revise_core::{SessionOptions, TextView, DEFAULT_AUTHOR};

/// Apply tracked revisions and comments to .docx documents.
#[derive(Parser, Debug)]
#[command(name = "docx-revise")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the body paragraphs with their index and flattened text (JSON)
    Paragraphs(ParagraphsArgs),

    /// Apply a JSON batch of edits as tracked changes
    Apply(ApplyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ParagraphsArgs {
    /// Input .docx file
    pub input: PathBuf,

    /// Which reading of existing tracked changes to show
    #[arg(long, value_enum, default_value_t = View::Accepted)]
    pub view: View,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Accepted,
    Rejected,
    Markup,
}

impl From<View> for TextView {
    fn from(view: View) -> Self {
        match view {
            View::Accepted => TextView::Accepted,
            View::Rejected => TextView::Rejected,
            View::Markup => TextView::Markup,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Input .docx file
    #[arg(short, long)]
    pub input: PathBuf,

    /// JSON file holding the list of edits
    #[arg(short, long)]
    pub edits: PathBuf,

    /// Where to write the revised .docx
    #[arg(short, long)]
    pub output: PathBuf,

    /// Author recorded on revisions and comments
    #[arg(long, default_value = DEFAULT_AUTHOR, env = "DOCX_REVISE_AUTHOR")]
    pub author: String,

    /// Author initials for comments (derived from the author when omitted)
    #[arg(long, env = "DOCX_REVISE_INITIALS")]
    pub initials: Option<String>,

    /// Revision timestamp, RFC 3339 (defaults to now)
    #[arg(long)]
    pub date: Option<DateTime<Utc>>,

    /// Write the JSON report to this file instead of stdout
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Exit successfully even when some edits could not be applied
    #[arg(long)]
    pub allow_partial: bool,
}

impl ApplyArgs {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            author: self.author.clone(),
            initials: self.initials.clone(),
            date: self.date,
        }
    }
}
