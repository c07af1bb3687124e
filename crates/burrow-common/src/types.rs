//! Record locators and key datatypes.

use crate::page::PageId;
use serde::{Deserialize, Serialize};

/// Locator for a record in a heap relation.
///
/// Combines the page holding the record with its slot number on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Page containing this record.
    pub page_no: PageId,
    /// Slot number within the page.
    pub slot: u16,
}

impl RecordId {
    /// Size of a record id on disk (page_no:4 + slot:2 + reserved:2).
    pub const SIZE: usize = 8;

    /// Invalid record id.
    pub const INVALID: RecordId = RecordId {
        page_no: PageId::INVALID,
        slot: u16::MAX,
    };

    /// Creates a new record id.
    pub fn new(page_no: PageId, slot: u16) -> Self {
        Self { page_no, slot }
    }

    /// Returns true if this is a valid record id.
    pub fn is_valid(&self) -> bool {
        self.page_no.is_valid()
    }

    /// Serializes the record id to its on-disk form.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_no.0.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot.to_le_bytes());
        // bytes 6..8 reserved
        buf
    }

    /// Deserializes a record id from its on-disk form.
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            page_no: PageId(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            slot: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_no, self.slot)
    }
}

/// Datatype of an indexed attribute.
///
/// Only fixed-width signed integers are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyType {
    /// 32-bit signed integer, little-endian on disk.
    Integer = 0,
}

impl KeyType {
    /// Width of a key of this type in bytes.
    pub fn width(&self) -> usize {
        match self {
            KeyType::Integer => 4,
        }
    }

    /// Decodes a key type from its on-disk tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(KeyType::Integer),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::Integer => write!(f, "INTEGER"),
        }
    }
}
