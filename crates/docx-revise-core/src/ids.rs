//! Session-scoped id allocation for revisions and comments.

/// Every id of one namespace above the document's highest is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No {0} id is left above the ones already in the document")]
pub struct IdsExhausted(pub &'static str);

/// Hands out `w:id` values for one editing session.
///
/// Revision ids (`w:ins`, `w:del`) and comment ids live in separate namespaces; each
/// sequence is strictly increasing and starts above any id already in the document.
/// `None` marks a sequence that has run past `u32::MAX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionIds {
    next_revision: Option<u32>,
    next_comment: Option<u32>,
}

impl Default for RevisionIds {
    fn default() -> Self {
        Self::new()
    }
}

impl RevisionIds {
    pub fn new() -> Self {
        Self {
            next_revision: Some(1),
            next_comment: Some(0),
        }
    }

    /// Continue after the highest ids already present, if any.
    pub fn starting_after(max_revision: Option<u32>, max_comment: Option<u32>) -> Self {
        let fresh = Self::new();
        Self {
            next_revision: max_revision.map_or(fresh.next_revision, |max| max.checked_add(1)),
            next_comment: max_comment.map_or(fresh.next_comment, |max| max.checked_add(1)),
        }
    }

    pub fn next_revision(&mut self) -> Result<u32, IdsExhausted> {
        take(&mut self.next_revision).ok_or(IdsExhausted("revision"))
    }

    pub fn next_comment(&mut self) -> Result<u32, IdsExhausted> {
        take(&mut self.next_comment).ok_or(IdsExhausted("comment"))
    }
}

fn take(next: &mut Option<u32>) -> Option<u32> {
    let id = (*next)?;
    *next = id.checked_add(1);
    Some(id)
}
