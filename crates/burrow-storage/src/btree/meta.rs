//! Index header page layout.

use burrow_common::{BurrowError, KeyType, PageId, Result};

/// Page number of the index header page.
pub const META_PAGE_NO: PageId = PageId(1);

/// Maximum length of a relation name stored in the header.
pub const MAX_RELATION_NAME: usize = 64;

/// Magic word guarding against opening a non-index file.
const MAGIC: u32 = 0x4255_5231; // "BUR1"

// Header layout offsets
const OFF_MAGIC: usize = 0;
const OFF_NAME_LEN: usize = 4;
const OFF_NAME: usize = 6;
const OFF_ATTR_OFFSET: usize = OFF_NAME + MAX_RELATION_NAME;
const OFF_KEY_TYPE: usize = OFF_ATTR_OFFSET + 4;
const OFF_ROOT: usize = OFF_KEY_TYPE + 1;
const OFF_HEIGHT: usize = OFF_ROOT + 4;
const OFF_LEAF_OCC: usize = OFF_HEIGHT + 4;
const OFF_NODE_OCC: usize = OFF_LEAF_OCC + 2;

/// Metadata stored in the index header page.
///
/// Identifies the relation and attribute the index was built over, and
/// carries the state needed to resume: root page, tree height, and the node
/// geometry chosen at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Name of the indexed relation.
    pub relation_name: String,
    /// Byte offset of the indexed attribute within each record.
    pub attr_byte_offset: u32,
    /// Datatype of the indexed attribute.
    pub key_type: KeyType,
    /// Current root page of the tree.
    pub root_page_no: PageId,
    /// Tree height; 0 means the root is a leaf.
    pub height: u32,
    /// Maximum entries per leaf.
    pub leaf_occupancy: u16,
    /// Maximum keys per internal node.
    pub node_occupancy: u16,
}

impl IndexMeta {
    /// Encodes the metadata into the header page.
    ///
    /// The relation name must fit `MAX_RELATION_NAME` bytes; callers
    /// validate that before constructing the meta.
    pub fn write_to(&self, data: &mut [u8]) {
        debug_assert!(self.relation_name.len() <= MAX_RELATION_NAME);

        data[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(&MAGIC.to_le_bytes());

        let name = self.relation_name.as_bytes();
        data[OFF_NAME_LEN..OFF_NAME_LEN + 2].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data[OFF_NAME..OFF_NAME + MAX_RELATION_NAME].fill(0);
        data[OFF_NAME..OFF_NAME + name.len()].copy_from_slice(name);

        data[OFF_ATTR_OFFSET..OFF_ATTR_OFFSET + 4]
            .copy_from_slice(&self.attr_byte_offset.to_le_bytes());
        data[OFF_KEY_TYPE] = self.key_type as u8;
        data[OFF_ROOT..OFF_ROOT + 4].copy_from_slice(&self.root_page_no.0.to_le_bytes());
        data[OFF_HEIGHT..OFF_HEIGHT + 4].copy_from_slice(&self.height.to_le_bytes());
        data[OFF_LEAF_OCC..OFF_LEAF_OCC + 2].copy_from_slice(&self.leaf_occupancy.to_le_bytes());
        data[OFF_NODE_OCC..OFF_NODE_OCC + 2].copy_from_slice(&self.node_occupancy.to_le_bytes());
    }

    /// Decodes metadata from the header page.
    pub fn read_from(data: &[u8]) -> Result<Self> {
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != MAGIC {
            return Err(BurrowError::Corrupted(
                "index header magic mismatch".to_string(),
            ));
        }

        let name_len = u16::from_le_bytes([data[OFF_NAME_LEN], data[OFF_NAME_LEN + 1]]) as usize;
        if name_len > MAX_RELATION_NAME {
            return Err(BurrowError::Corrupted(format!(
                "relation name length {} exceeds maximum {}",
                name_len, MAX_RELATION_NAME
            )));
        }
        let relation_name = std::str::from_utf8(&data[OFF_NAME..OFF_NAME + name_len])
            .map_err(|_| BurrowError::Corrupted("relation name is not valid UTF-8".to_string()))?
            .to_string();

        let key_tag = data[OFF_KEY_TYPE];
        let key_type = KeyType::from_tag(key_tag).ok_or_else(|| {
            BurrowError::Corrupted(format!("unknown key type tag {}", key_tag))
        })?;

        Ok(Self {
            relation_name,
            attr_byte_offset: u32::from_le_bytes([
                data[OFF_ATTR_OFFSET],
                data[OFF_ATTR_OFFSET + 1],
                data[OFF_ATTR_OFFSET + 2],
                data[OFF_ATTR_OFFSET + 3],
            ]),
            key_type,
            root_page_no: PageId(u32::from_le_bytes([
                data[OFF_ROOT],
                data[OFF_ROOT + 1],
                data[OFF_ROOT + 2],
                data[OFF_ROOT + 3],
            ])),
            height: u32::from_le_bytes([
                data[OFF_HEIGHT],
                data[OFF_HEIGHT + 1],
                data[OFF_HEIGHT + 2],
                data[OFF_HEIGHT + 3],
            ]),
            leaf_occupancy: u16::from_le_bytes([data[OFF_LEAF_OCC], data[OFF_LEAF_OCC + 1]]),
            node_occupancy: u16::from_le_bytes([data[OFF_NODE_OCC], data[OFF_NODE_OCC + 1]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_common::PAGE_SIZE;

    fn sample_meta() -> IndexMeta {
        IndexMeta {
            relation_name: "orders".to_string(),
            attr_byte_offset: 12,
            key_type: KeyType::Integer,
            root_page_no: PageId(2),
            height: 3,
            leaf_occupancy: 682,
            node_occupancy: 1023,
        }
    }

    #[test]
    fn test_meta_roundtrip() {
        let meta = sample_meta();
        let mut page = [0u8; PAGE_SIZE];
        meta.write_to(&mut page);

        let decoded = IndexMeta::read_from(&page).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_meta_rejects_bad_magic() {
        let page = [0u8; PAGE_SIZE];
        let result = IndexMeta::read_from(&page);
        assert!(matches!(result, Err(BurrowError::Corrupted(_))));
    }

    #[test]
    fn test_meta_empty_name() {
        let mut meta = sample_meta();
        meta.relation_name = String::new();

        let mut page = [0u8; PAGE_SIZE];
        meta.write_to(&mut page);
        let decoded = IndexMeta::read_from(&page).unwrap();
        assert_eq!(decoded.relation_name, "");
    }

    #[test]
    fn test_meta_max_length_name() {
        let mut meta = sample_meta();
        meta.relation_name = "x".repeat(MAX_RELATION_NAME);

        let mut page = [0u8; PAGE_SIZE];
        meta.write_to(&mut page);
        let decoded = IndexMeta::read_from(&page).unwrap();
        assert_eq!(decoded.relation_name.len(), MAX_RELATION_NAME);
    }

    #[test]
    fn test_meta_rewrite_overwrites_longer_name() {
        let mut page = [0u8; PAGE_SIZE];

        let mut meta = sample_meta();
        meta.relation_name = "a_rather_long_relation_name".to_string();
        meta.write_to(&mut page);

        meta.relation_name = "short".to_string();
        meta.write_to(&mut page);

        let decoded = IndexMeta::read_from(&page).unwrap();
        assert_eq!(decoded.relation_name, "short");
    }
}
