//! Page identifiers for Burrow storage.

use serde::{Deserialize, Serialize};

/// Page size in bytes (8 KB).
pub const PAGE_SIZE: usize = 8 * 1024;

/// Number of a page within a paged file (1-indexed).
///
/// Page 0 of every file is reserved and never handed out, which lets the
/// zero value double as the "no page" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel denoting "no page".
    pub const INVALID: PageId = PageId(0);

    /// Size of a page number on disk.
    pub const SIZE: usize = 4;

    /// Creates a page id from a raw page number.
    pub fn new(page_no: u32) -> Self {
        Self(page_no)
    }

    /// Returns true if this id refers to a real page.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Identifier of an open paged file within the file manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "file:{}", self.0)
    }
}
