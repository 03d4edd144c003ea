//! Tracked-revision patching for OOXML word-processing documents.
//!
//! A [`RevisionSession`] opens a `.docx` archive in memory, exposes the flattened text of
//! each body paragraph, and applies [`EditRequest`]s as tracked changes (`w:ins`/`w:del`)
//! or comments. Edits locate their target by exact text in the accepted reading of a
//! paragraph; runs are split at the match boundaries so formatting is kept on every side.
//! Everything the edits do not touch is written back byte-for-byte.
//!
//! ```no_run
//! use docx_revise_core::{patch_document, EditRequest, SessionOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = std::fs::read("contract.docx")?;
//! let edits = vec![EditRequest::Deletion {
//!     paragraph_index: 0,
//!     original_text: "quick ".to_string(),
//!     reason: None,
//! }];
//! let (output, report) = patch_document(input, &edits, SessionOptions::new("Reviewer"))?;
//! assert!(report.is_complete());
//! std::fs::write("contract.revised.docx", output)?;
//! # Ok(())
//! # }
//! ```

pub mod edit;
pub mod error;
pub mod ids;
pub mod locate;
pub mod markup;
pub mod model;
pub mod package;
pub mod reassemble;
pub mod session;
pub mod xml;

pub use edit::{AppliedEdit, EditKind, EditOutcome, EditRequest, EditStatus, PatchReport};
pub use error::{DocxError, EditError, Result};
pub use ids::RevisionIds;
pub use model::{Paragraph, TextView};
pub use session::{patch_document, RevisionSession, SessionOptions, DEFAULT_AUTHOR};
