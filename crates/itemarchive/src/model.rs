//! # Item Model
//!
//! A mailbox holds typed items arranged under folders. Every item shares a
//! common header (identity, parent folder, name, size, digest, version, flags,
//! tags, color, date) and carries type-specific details in [`ItemDetails`].
//!
//! Item ids are small integers. Ids below [`ids::FIRST_USER_ID`] are reserved
//! for system folders, which exist in every mailbox:
//!
//! ```text
//! ROOT (11)
//! ├── USER_ROOT (1)  "/"
//! │   ├── Inbox (2), Trash (3), Junk (4), Sent (5), Drafts (6)
//! │   ├── Contacts (7), Emailed Contacts (13), Calendar (10), Tasks (15)
//! │   └── Notebook (12), Briefcase (16), Chats (14)
//! ├── Tags (8)
//! └── Conversations (9)
//! ```
//!
//! ## Logical path
//!
//! Folder-like items (folders, search folders, mountpoints) are addressed by
//! their own path, documents by their folder path joined with their name, and
//! everything else by the path of the folder containing them. The archive
//! metadata record stores this path and the importer resolves it against the
//! destination folder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ArchiveError;

pub type ItemId = i32;

/// Reserved item ids.
pub mod ids {
    use super::ItemId;

    pub const USER_ROOT: ItemId = 1;
    pub const INBOX: ItemId = 2;
    pub const TRASH: ItemId = 3;
    pub const JUNK: ItemId = 4;
    pub const SENT: ItemId = 5;
    pub const DRAFTS: ItemId = 6;
    pub const CONTACTS: ItemId = 7;
    pub const TAGS: ItemId = 8;
    pub const CONVERSATIONS: ItemId = 9;
    pub const CALENDAR: ItemId = 10;
    pub const ROOT: ItemId = 11;
    pub const NOTEBOOK: ItemId = 12;
    pub const AUTO_CONTACTS: ItemId = 13;
    pub const CHATS: ItemId = 14;
    pub const TASKS: ItemId = 15;
    pub const BRIEFCASE: ItemId = 16;

    pub const FIRST_USER_ID: ItemId = 256;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Folder,
    SearchFolder,
    Tag,
    Conversation,
    Message,
    Contact,
    Document,
    Note,
    Flag,
    Appointment,
    VirtualConversation,
    Mountpoint,
    Wiki,
    Task,
    Chat,
}

impl ItemType {
    pub const ALL: [ItemType; 15] = [
        ItemType::Folder,
        ItemType::SearchFolder,
        ItemType::Tag,
        ItemType::Conversation,
        ItemType::Message,
        ItemType::Contact,
        ItemType::Document,
        ItemType::Note,
        ItemType::Flag,
        ItemType::Appointment,
        ItemType::VirtualConversation,
        ItemType::Mountpoint,
        ItemType::Wiki,
        ItemType::Task,
        ItemType::Chat,
    ];

    /// Types that are enumerated directly rather than found through search.
    pub const SYSTEM: [ItemType; 5] = [
        ItemType::Folder,
        ItemType::SearchFolder,
        ItemType::Tag,
        ItemType::Flag,
        ItemType::Mountpoint,
    ];

    /// Numeric code carried in tar headers.
    pub fn code(self) -> u8 {
        match self {
            ItemType::Folder => 1,
            ItemType::SearchFolder => 2,
            ItemType::Tag => 3,
            ItemType::Conversation => 4,
            ItemType::Message => 5,
            ItemType::Contact => 6,
            ItemType::Document => 8,
            ItemType::Note => 9,
            ItemType::Flag => 10,
            ItemType::Appointment => 11,
            ItemType::VirtualConversation => 12,
            ItemType::Mountpoint => 13,
            ItemType::Wiki => 14,
            ItemType::Task => 15,
            ItemType::Chat => 16,
        }
    }

    pub fn from_code(code: u8) -> Option<ItemType> {
        ItemType::ALL.iter().copied().find(|t| t.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ItemType::Folder => "folder",
            ItemType::SearchFolder => "search folder",
            ItemType::Tag => "tag",
            ItemType::Conversation => "conversation",
            ItemType::Message => "message",
            ItemType::Contact => "contact",
            ItemType::Document => "document",
            ItemType::Note => "note",
            ItemType::Flag => "flag",
            ItemType::Appointment => "appointment",
            ItemType::VirtualConversation => "virtual conversation",
            ItemType::Mountpoint => "mountpoint",
            ItemType::Wiki => "wiki",
            ItemType::Task => "task",
            ItemType::Chat => "chat",
        }
    }

    pub fn is_folder_like(self) -> bool {
        matches!(
            self,
            ItemType::Folder | ItemType::SearchFolder | ItemType::Mountpoint
        )
    }

    pub fn is_calendar(self) -> bool {
        matches!(self, ItemType::Appointment | ItemType::Task)
    }

    pub fn is_document_like(self) -> bool {
        matches!(self, ItemType::Document | ItemType::Wiki)
    }

    /// Whether items of type `self` may live in a folder whose default view is `view`.
    pub fn fits_view(self, view: ItemType) -> bool {
        self == view || (self.is_document_like() && view.is_document_like())
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ItemType {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        let alias = match wanted.as_str() {
            "search" | "searchfolder" | "search_folder" => Some(ItemType::SearchFolder),
            "appt" | "calendar" => Some(ItemType::Appointment),
            "conv" => Some(ItemType::Conversation),
            "briefcase" => Some(ItemType::Document),
            _ => None,
        };
        alias
            .or_else(|| ItemType::ALL.iter().copied().find(|t| t.name() == wanted))
            .ok_or_else(|| ArchiveError::UnknownItemType(s.to_string()))
    }
}

pub type TypeSet = BTreeSet<ItemType>;

/// Parses a comma separated list of type names.
pub fn parse_type_set(s: &str) -> Result<TypeSet, ArchiveError> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ItemType::from_str)
        .collect()
}

/// Item flag bitmask with a compact one-character-per-flag string form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u32);

impl Flags {
    pub const FROM_ME: Flags = Flags(1 << 1);
    pub const ATTACHED: Flags = Flags(1 << 2);
    pub const REPLIED: Flags = Flags(1 << 3);
    pub const FORWARDED: Flags = Flags(1 << 4);
    pub const FLAGGED: Flags = Flags(1 << 6);
    pub const DRAFT: Flags = Flags(1 << 7);
    pub const DELETED: Flags = Flags(1 << 8);
    pub const NOTIFIED: Flags = Flags(1 << 9);
    pub const UNREAD: Flags = Flags(1 << 10);
    pub const HIGH_PRIORITY: Flags = Flags(1 << 11);
    pub const LOW_PRIORITY: Flags = Flags(1 << 12);
    pub const VERSIONED: Flags = Flags(1 << 13);
    pub const SUBSCRIBED: Flags = Flags(1 << 21);
    pub const EXCLUDE_FREEBUSY: Flags = Flags(1 << 22);
    pub const CHECKED: Flags = Flags(1 << 23);
    pub const NO_INHERIT: Flags = Flags(1 << 24);

    const CHARS: [(Flags, char); 16] = [
        (Flags::FROM_ME, 's'),
        (Flags::ATTACHED, 'a'),
        (Flags::REPLIED, 'r'),
        (Flags::FORWARDED, 'w'),
        (Flags::FLAGGED, 'f'),
        (Flags::DRAFT, 'd'),
        (Flags::DELETED, 'x'),
        (Flags::NOTIFIED, 'n'),
        (Flags::UNREAD, 'u'),
        (Flags::HIGH_PRIORITY, '!'),
        (Flags::LOW_PRIORITY, '?'),
        (Flags::VERSIONED, '/'),
        (Flags::SUBSCRIBED, '*'),
        (Flags::EXCLUDE_FREEBUSY, 'b'),
        (Flags::CHECKED, '#'),
        (Flags::NO_INHERIT, 'i'),
    ];

    pub fn empty() -> Self {
        Flags(0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    pub fn to_flag_string(self) -> String {
        Flags::CHARS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, c)| *c)
            .collect()
    }

    /// Unknown characters are ignored.
    pub fn from_flag_string(s: &str) -> Self {
        let mut flags = Flags::empty();
        for c in s.chars() {
            if let Some((flag, _)) = Flags::CHARS.iter().find(|(_, fc)| *fc == c) {
                flags.insert(*flag);
            }
        }
        flags
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Access grant on a shared folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: String,
    pub rights: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderInfo {
    /// `None` means the folder accepts any item type.
    pub default_view: Option<ItemType>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub acl: Option<Acl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchInfo {
    pub query: String,
    #[serde(default)]
    pub types: String,
    #[serde(default)]
    pub sort: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    pub owner_id: String,
    pub owner_uuid: Option<Uuid>,
    pub remote_id: ItemId,
    pub default_view: Option<ItemType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    #[serde(default)]
    pub sender: String,
    /// Calendar items created from invites carried by this message.
    #[serde(default)]
    pub calendar_items: Vec<ItemId>,
}

pub mod fields {
    pub const EMAIL: &str = "email";
    pub const EMAIL2: &str = "email2";
    pub const EMAIL3: &str = "email3";
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const FULL_NAME: &str = "fullName";
    pub const COMPANY: &str = "company";
    pub const PHONE: &str = "workPhone";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub fields: BTreeMap<String, String>,
}

impl ContactInfo {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn email_addresses(&self) -> Vec<String> {
        [fields::EMAIL, fields::EMAIL2, fields::EMAIL3]
            .iter()
            .filter_map(|k| self.get(k))
            .map(str::to_lowercase)
            .collect()
    }

    /// Display name used when the contact is written as a named entry.
    pub fn file_as(&self) -> String {
        if let Some(full) = self.get(fields::FULL_NAME) {
            return full.to_string();
        }
        match (self.get(fields::LAST_NAME), self.get(fields::FIRST_NAME)) {
            (Some(last), Some(first)) => format!("{}, {}", last, first),
            (Some(name), None) | (None, Some(name)) => name.to_string(),
            (None, None) => self
                .get(fields::COMPANY)
                .or_else(|| self.get(fields::EMAIL))
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// True when the fields used to recognise a duplicate contact agree.
    pub fn same_identity(&self, other: &ContactInfo) -> bool {
        [fields::EMAIL, fields::FIRST_NAME, fields::FULL_NAME]
            .iter()
            .all(|k| self.get(k) == other.get(k))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub uid: String,
    #[serde(default = "default_true")]
    pub public: bool,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteInfo {
    pub bounds: Option<Bounds>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemDetails {
    Folder(FolderInfo),
    SearchFolder(SearchInfo),
    Tag,
    Conversation,
    Message(MessageInfo),
    Contact(ContactInfo),
    Document(DocumentInfo),
    Note(NoteInfo),
    Flag,
    Appointment(CalendarInfo),
    VirtualConversation,
    Mountpoint(MountInfo),
    Wiki(DocumentInfo),
    Task(CalendarInfo),
    Chat(ChatInfo),
}

impl ItemDetails {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemDetails::Folder(_) => ItemType::Folder,
            ItemDetails::SearchFolder(_) => ItemType::SearchFolder,
            ItemDetails::Tag => ItemType::Tag,
            ItemDetails::Conversation => ItemType::Conversation,
            ItemDetails::Message(_) => ItemType::Message,
            ItemDetails::Contact(_) => ItemType::Contact,
            ItemDetails::Document(_) => ItemType::Document,
            ItemDetails::Note(_) => ItemType::Note,
            ItemDetails::Flag => ItemType::Flag,
            ItemDetails::Appointment(_) => ItemType::Appointment,
            ItemDetails::VirtualConversation => ItemType::VirtualConversation,
            ItemDetails::Mountpoint(_) => ItemType::Mountpoint,
            ItemDetails::Wiki(_) => ItemType::Wiki,
            ItemDetails::Task(_) => ItemType::Task,
            ItemDetails::Chat(_) => ItemType::Chat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub folder_id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject: String,
    pub size: u64,
    pub digest: Option<String>,
    pub version: u32,
    pub flags: Flags,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub color: u8,
    pub date: DateTime<Utc>,
    pub details: ItemDetails,
}

impl Item {
    /// A not-yet-stored item, used as a template for store mutations.
    pub fn draft(folder_id: ItemId, name: impl Into<String>, details: ItemDetails) -> Self {
        Self {
            id: 0,
            folder_id,
            name: name.into(),
            subject: String::new(),
            size: 0,
            digest: None,
            version: 1,
            flags: Flags::empty(),
            tags: Vec::new(),
            color: 0,
            date: Utc::now(),
            details,
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.details.item_type()
    }

    pub fn is_folder_like(&self) -> bool {
        self.item_type().is_folder_like()
    }

    pub fn is_versioned(&self) -> bool {
        self.flags.contains(Flags::VERSIONED)
    }

    pub fn is_unread(&self) -> bool {
        self.flags.contains(Flags::UNREAD)
    }

    /// Default view for folder-like items.
    pub fn default_view(&self) -> Option<ItemType> {
        match &self.details {
            ItemDetails::Folder(f) => f.default_view,
            ItemDetails::Mountpoint(m) => m.default_view,
            ItemDetails::SearchFolder(_) => Some(ItemType::Message),
            _ => None,
        }
    }

    pub fn calendar(&self) -> Option<&CalendarInfo> {
        match &self.details {
            ItemDetails::Appointment(c) | ItemDetails::Task(c) => Some(c),
            _ => None,
        }
    }

    pub fn contact(&self) -> Option<&ContactInfo> {
        match &self.details {
            ItemDetails::Contact(c) => Some(c),
            _ => None,
        }
    }

    /// Tag names compared as a set.
    pub fn tag_set(&self) -> BTreeSet<&str> {
        self.tags.iter().map(String::as_str).collect()
    }
}

/// Joins a folder path and a child name into an absolute path.
pub fn join_path(parent: &str, child: &str) -> String {
    let child = child.trim_matches('/');
    let parent = parent.trim_end_matches('/');
    match (parent.is_empty(), child.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", child),
        (false, true) => parent.to_string(),
        (false, false) => format!("{}/{}", parent, child),
    }
}

/// Splits an absolute path into its parent path and final segment.
pub fn split_path(path: &str) -> (String, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => ("/".to_string(), trimmed.trim_start_matches('/')),
        Some(idx) => (trimmed[..idx].to_string(), &trimmed[idx + 1..]),
    }
}
