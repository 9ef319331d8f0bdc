//! Metadata records.
//!
//! Every exported item is accompanied by a `<entry>.meta` record carrying
//! enough to rebuild it on import: the item header and type-specific details,
//! its logical path, and an optional `extra` string (for messages, the ids of
//! linked calendar items). Records are JSON and carry an explicit
//! `format_version`; a record written by an unknown version is rejected as
//! invalid format rather than guessed at.

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};
use crate::model::{Item, ItemType};

pub const RECORD_FORMAT_VERSION: u32 = 1;

/// Suffix of metadata entries.
pub const META_SUFFIX: &str = ".meta";

/// Suffix of the empty marker written after a truncated content entry.
pub const ERR_SUFFIX: &str = ".err";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub format_version: u32,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    pub item: Item,
}

impl ItemRecord {
    pub fn new(item: Item, path: impl Into<String>, extra: Option<String>) -> Self {
        Self {
            format_version: RECORD_FORMAT_VERSION,
            path: path.into(),
            extra,
            item,
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.item.item_type()
    }

    pub fn flag_string(&self) -> String {
        self.item.flags.to_flag_string()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn decode(bytes: &[u8], entry_name: &str) -> Result<Self> {
        let record: ItemRecord = serde_json::from_slice(bytes)
            .map_err(|e| ArchiveError::InvalidFormat(format!("{}: {}", entry_name, e)))?;
        if record.format_version != RECORD_FORMAT_VERSION {
            return Err(ArchiveError::InvalidFormat(format!(
                "{}: unsupported record version {}",
                entry_name, record.format_version
            )));
        }
        Ok(record)
    }

    /// Checks a record against the content entry paired with it.
    ///
    /// A zero type code means the container could not carry one.
    pub fn matches_entry(&self, type_code: u8, size: Option<u64>) -> bool {
        let type_ok = type_code == 0 || self.item_type().code() == type_code;
        let size_ok = match (&self.item.digest, size) {
            (Some(_), Some(size)) => self.item.size == size,
            _ => true,
        };
        type_ok && size_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Flags, ItemDetails, MessageInfo};

    fn message_record() -> ItemRecord {
        let mut item = Item::draft(2, "", ItemDetails::Message(MessageInfo::default()));
        item.id = 300;
        item.subject = "hello".into();
        item.size = 42;
        item.digest = Some("abc".into());
        item.flags = Flags::UNREAD;
        item.tags = vec!["work".into()];
        ItemRecord::new(item, "/Inbox", Some("calendar=400".into()))
    }

    #[test]
    fn test_encode_decode() {
        let record = message_record();
        let bytes = record.encode().unwrap();
        let decoded = ItemRecord::decode(&bytes, "Inbox/x.eml.meta").unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.flag_string(), "u");
    }

    #[test]
    fn test_unknown_version_is_invalid_format() {
        let mut record = message_record();
        record.format_version = 99;
        let bytes = serde_json::to_vec(&record).unwrap();
        match ItemRecord::decode(&bytes, "x.meta") {
            Err(ArchiveError::InvalidFormat(msg)) => assert!(msg.contains("version 99")),
            other => panic!("expected InvalidFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_invalid_format() {
        assert!(matches!(
            ItemRecord::decode(b"not json", "x.meta"),
            Err(ArchiveError::InvalidFormat(_))
        ));
        assert!(matches!(
            ItemRecord::decode(b"", "x.meta"),
            Err(ArchiveError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_matches_entry() {
        let record = message_record();
        assert!(record.matches_entry(5, Some(42)));
        assert!(record.matches_entry(0, Some(42)));
        assert!(!record.matches_entry(6, Some(42)));
        assert!(!record.matches_entry(5, Some(41)));
        assert!(record.matches_entry(5, None));

        let mut undigested = record.clone();
        undigested.item.digest = None;
        assert!(undigested.matches_entry(5, Some(7)));
    }
}
