//! Map notes: located comment threads that live outside the graph.

use std::sync::atomic::{AtomicI64, Ordering};

use geo::Coord;

use crate::extent::Extent;

static NEXT_NOTE: AtomicI64 = AtomicI64::new(-1);

/// Whether a note still awaits resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NoteStatus {
    /// Open for discussion.
    #[default]
    Open,
    /// Resolved.
    Closed,
}

/// One entry in a note's discussion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteComment {
    /// Author, absent for anonymous comments.
    pub user: Option<String>,
    /// What the comment did: `opened`, `commented`, `closed`, `reopened`.
    pub action: String,
    /// Comment body.
    pub text: String,
    /// Timestamp as reported by the server.
    pub date: String,
}

/// A located discussion thread.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osm_edit_core::{Note, NoteStatus};
///
/// let note = Note::create(Coord { x: 1.0, y: 2.0 });
/// assert!(note.is_new());
/// assert_eq!(note.status, NoteStatus::Open);
/// let moved = note.move_to(Coord { x: 3.0, y: 4.0 });
/// assert_eq!(moved.id, note.id);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    /// Server id; negative for notes not yet submitted.
    pub id: i64,
    /// Longitude (`x`) and latitude (`y`).
    pub loc: Coord<f64>,
    /// Open or closed.
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: NoteStatus,
    /// Discussion so far, oldest first.
    #[cfg_attr(feature = "serde", serde(default))]
    pub comments: Vec<NoteComment>,
    /// Draft comment not yet submitted.
    #[cfg_attr(feature = "serde", serde(default))]
    pub new_comment: Option<String>,
}

impl Note {
    /// An open note without comments.
    #[must_use]
    pub const fn new(id: i64, loc: Coord<f64>) -> Self {
        Self {
            id,
            loc,
            status: NoteStatus::Open,
            comments: Vec::new(),
            new_comment: None,
        }
    }

    /// A note with a freshly issued negative id.
    #[must_use]
    pub fn create(loc: Coord<f64>) -> Self {
        Self::new(NEXT_NOTE.fetch_sub(1, Ordering::Relaxed), loc)
    }

    /// True if the note has not been submitted.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.id < 0
    }

    /// A copy at `loc`.
    #[must_use]
    pub fn move_to(&self, loc: Coord<f64>) -> Self {
        self.update(|note| note.loc = loc)
    }

    /// A copy with `edit` applied; the receiver is unchanged.
    #[must_use]
    pub fn update(&self, edit: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        edit(&mut next);
        next
    }

    /// A zero-area extent at the note.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        Extent::from_point(self.loc)
    }
}
