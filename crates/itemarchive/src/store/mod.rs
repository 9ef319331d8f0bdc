//! # Store Boundary
//!
//! The archive engine never owns item state. Everything it reads or changes
//! goes through [`ItemStore`], a narrow view of the mailbox:
//!
//! - **Lookups** return `Option` for expected absence; errors are reserved
//!   for real failures.
//! - **Content** is streamed out with [`ItemStore::open_content`] and streamed
//!   in through the `&mut dyn Read` arguments of the mutation methods.
//! - **Formats** (iCalendar, vCard, CSV, MIME parts) are rendered and parsed
//!   by the store; the engine only moves bytes.
//! - **Maintenance** brackets an export that asked for an exclusive lock.
//!
//! [`memory::MemStore`] is the in-memory implementation used by tests.

pub mod memory;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Read;

use crate::error::StoreResult;
use crate::model::{
    join_path, Acl, ContactInfo, Flags, Item, ItemId, ItemType, SearchInfo, TypeSet,
};

/// Search request issued by the export pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub types: TypeSet,
    /// Restricts results to this folder path and everything below it.
    pub under: Option<String>,
    /// Free text matched against item subject and name.
    pub text: Option<String>,
    /// Item date bounds: `after` inclusive, `before` exclusive.
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    /// Calendar instance bounds.
    pub appt_start: Option<DateTime<Utc>>,
    pub appt_end: Option<DateTime<Utc>>,
    /// Excludes items reached through mountpoints.
    pub local_only: bool,
}

impl SearchQuery {
    pub fn is_unrestricted(&self) -> bool {
        self.under.is_none()
            && self.text.as_deref().map_or(true, str::is_empty)
            && self.after.is_none()
            && self.before.is_none()
            && self.appt_start.is_none()
            && self.appt_end.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderOptions {
    pub default_view: Option<ItemType>,
    pub flags: Flags,
    pub color: u8,
    pub url: String,
}

/// A single MIME part pulled out of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Hints for iCalendar rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarCompat {
    pub outlook: bool,
}

pub trait ItemStore {
    // --- lookups ---

    fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>>;

    fn folder_path(&self, folder_id: ItemId) -> StoreResult<String>;

    fn folder_by_path(&self, path: &str) -> StoreResult<Option<Item>>;

    /// Any item addressed by path: folders by their own path, other items by
    /// their folder path joined with their name.
    fn item_by_path(&self, path: &str) -> StoreResult<Option<Item>>;

    fn tag_by_name(&self, name: &str) -> StoreResult<Option<Item>>;

    fn calendar_by_uid(&self, uid: &str) -> StoreResult<Option<Item>>;

    /// The folder itself followed by every folder below it.
    fn subfolder_hierarchy(&self, folder_id: ItemId) -> StoreResult<Vec<Item>>;

    /// Items of one type, optionally restricted to a single folder.
    fn list_items(&self, item_type: ItemType, folder_id: Option<ItemId>) -> StoreResult<Vec<Item>>;

    /// Ids of items directly inside a folder.
    fn list_item_ids(&self, folder_id: ItemId, types: Option<&TypeSet>) -> StoreResult<Vec<ItemId>>;

    fn search(&self, query: &SearchQuery, offset: usize, limit: usize) -> StoreResult<Vec<ItemId>>;

    /// Every stored revision of a versioned item, current one included.
    fn all_revisions(&self, id: ItemId) -> StoreResult<Vec<Item>>;

    /// Content digest to message id, for messages directly in a folder.
    fn message_digests(&self, folder_id: ItemId) -> StoreResult<HashMap<String, ItemId>>;

    fn is_immutable_system_folder(&self, folder_id: ItemId) -> bool;

    /// Logical archive path of an item.
    fn item_path(&self, item: &Item) -> StoreResult<String> {
        let kind = item.item_type();
        if kind.is_folder_like() {
            self.folder_path(item.id)
        } else if kind.is_document_like() {
            Ok(join_path(&self.folder_path(item.folder_id)?, &item.name))
        } else {
            self.folder_path(item.folder_id)
        }
    }

    // --- content ---

    /// Raw content of an item; `None` for items without a blob.
    fn open_content(&self, item: &Item) -> StoreResult<Option<Box<dyn Read + '_>>>;

    fn mime_part(&self, item: &Item, part: &str) -> StoreResult<Option<MimePart>>;

    /// Number of calendar instances overlapping the range.
    fn calendar_instances(
        &self,
        item: &Item,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> StoreResult<usize>;

    // --- formats ---

    fn render_icalendar(&self, item: &Item, compat: CalendarCompat) -> StoreResult<Vec<u8>>;

    fn render_vcard(&self, item: &Item) -> StoreResult<Vec<u8>>;

    fn parse_vcards(&self, text: &str) -> StoreResult<Vec<ContactInfo>>;

    fn parse_csv_contacts(&self, text: &str) -> StoreResult<Vec<ContactInfo>>;

    /// Imports every event or task in an iCalendar payload.
    fn import_icalendar(
        &mut self,
        folder_id: ItemId,
        data: &[u8],
        tasks: bool,
    ) -> StoreResult<Vec<Item>>;

    // --- mutations ---

    fn create_folder(
        &mut self,
        parent_id: ItemId,
        name: &str,
        opts: &FolderOptions,
    ) -> StoreResult<Item>;

    /// Creates every missing folder along `path`; the options apply to the leaf.
    fn create_folder_path(&mut self, path: &str, opts: &FolderOptions) -> StoreResult<Item>;

    fn delete(&mut self, ids: &[ItemId]) -> StoreResult<()>;

    /// Empties the queue of deleted items; returns how many were dropped.
    fn purge(&mut self) -> StoreResult<usize>;

    fn add_message(
        &mut self,
        folder_id: ItemId,
        content: &mut dyn Read,
        date: Option<DateTime<Utc>>,
        flags: Flags,
        tags: &[String],
    ) -> StoreResult<Item>;

    fn create_contact(
        &mut self,
        folder_id: ItemId,
        contact: &ContactInfo,
        blob: Option<&[u8]>,
        tags: &[String],
    ) -> StoreResult<Item>;

    fn modify_contact(
        &mut self,
        id: ItemId,
        contact: &ContactInfo,
        blob: Option<&[u8]>,
    ) -> StoreResult<Item>;

    /// Creates a calendar item, or updates the one sharing its UID.
    fn set_calendar_item(
        &mut self,
        folder_id: ItemId,
        template: &Item,
        blob: Option<&[u8]>,
    ) -> StoreResult<Item>;

    fn create_document(
        &mut self,
        folder_id: ItemId,
        template: &Item,
        content: &mut dyn Read,
    ) -> StoreResult<Item>;

    fn add_document_revision(
        &mut self,
        id: ItemId,
        template: &Item,
        content: &mut dyn Read,
    ) -> StoreResult<Item>;

    fn set_date(&mut self, id: ItemId, date: DateTime<Utc>) -> StoreResult<()>;

    fn create_note(&mut self, folder_id: ItemId, text: &str, template: &Item) -> StoreResult<Item>;

    fn edit_note(&mut self, id: ItemId, text: &str) -> StoreResult<Item>;

    fn create_chat(
        &mut self,
        folder_id: ItemId,
        template: &Item,
        content: &[u8],
    ) -> StoreResult<Item>;

    fn update_chat(&mut self, id: ItemId, content: &[u8]) -> StoreResult<Item>;

    fn create_mountpoint(&mut self, parent_id: ItemId, template: &Item) -> StoreResult<Item>;

    fn create_search_folder(&mut self, parent_id: ItemId, template: &Item) -> StoreResult<Item>;

    fn modify_search_folder(&mut self, id: ItemId, search: &SearchInfo) -> StoreResult<Item>;

    fn create_tag(&mut self, name: &str, color: u8) -> StoreResult<Item>;

    fn set_folder_url(&mut self, id: ItemId, url: &str) -> StoreResult<()>;

    fn set_permissions(&mut self, id: ItemId, acl: Option<&Acl>) -> StoreResult<()>;

    fn set_color(&mut self, id: ItemId, color: u8) -> StoreResult<()>;

    /// Replaces flags and tags; unknown tag names are created.
    fn set_tags(&mut self, id: ItemId, flags: Flags, tags: &[String]) -> StoreResult<()>;

    // --- maintenance ---

    fn begin_maintenance(&mut self) -> StoreResult<()>;

    fn end_maintenance(&mut self) -> StoreResult<()>;
}
