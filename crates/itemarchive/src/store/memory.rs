use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;

use super::{CalendarCompat, FolderOptions, ItemStore, MimePart, SearchQuery};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    fields, ids, join_path, split_path, Acl, CalendarInfo, ChatInfo, ContactInfo, Flags,
    FolderInfo, Item, ItemDetails, ItemId, ItemType, MessageInfo, NoteInfo, SearchInfo, TypeSet,
};

/// SHA-256 of the content, URL-safe base64.
pub fn content_digest(data: &[u8]) -> String {
    URL_SAFE.encode(Sha256::digest(data))
}

const ICAL_TIME: &str = "%Y%m%dT%H%M%SZ";

/// In-memory mailbox.
///
/// Starts out with the standard system folders. Besides the [`ItemStore`]
/// operations it offers `put_*` helpers for seeding content and a few
/// switches for simulating store faults (quota, unreadable blobs, failing
/// deletes, blobs shorter than their declared size).
#[derive(Debug)]
pub struct MemStore {
    items: BTreeMap<ItemId, Item>,
    blobs: HashMap<ItemId, Vec<u8>>,
    history: HashMap<ItemId, Vec<(Item, Vec<u8>)>>,
    next_id: ItemId,
    tombstones: Vec<ItemId>,
    quota: Option<u64>,
    maintenance: bool,
    broken_content: HashSet<ItemId>,
    failing_delete_folders: HashSet<ItemId>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        let mut store = Self {
            items: BTreeMap::new(),
            blobs: HashMap::new(),
            history: HashMap::new(),
            next_id: ids::FIRST_USER_ID,
            tombstones: Vec::new(),
            quota: None,
            maintenance: false,
            broken_content: HashSet::new(),
            failing_delete_folders: HashSet::new(),
        };
        let system = [
            (ids::ROOT, ids::ROOT, "", None),
            (ids::USER_ROOT, ids::ROOT, "", None),
            (ids::TAGS, ids::ROOT, "Tags", Some(ItemType::Tag)),
            (ids::CONVERSATIONS, ids::ROOT, "Conversations", Some(ItemType::Conversation)),
            (ids::INBOX, ids::USER_ROOT, "Inbox", Some(ItemType::Message)),
            (ids::TRASH, ids::USER_ROOT, "Trash", None),
            (ids::JUNK, ids::USER_ROOT, "Junk", Some(ItemType::Message)),
            (ids::SENT, ids::USER_ROOT, "Sent", Some(ItemType::Message)),
            (ids::DRAFTS, ids::USER_ROOT, "Drafts", Some(ItemType::Message)),
            (ids::CONTACTS, ids::USER_ROOT, "Contacts", Some(ItemType::Contact)),
            (ids::CALENDAR, ids::USER_ROOT, "Calendar", Some(ItemType::Appointment)),
            (ids::NOTEBOOK, ids::USER_ROOT, "Notebook", Some(ItemType::Wiki)),
            (ids::AUTO_CONTACTS, ids::USER_ROOT, "Emailed Contacts", Some(ItemType::Contact)),
            (ids::CHATS, ids::USER_ROOT, "Chats", Some(ItemType::Chat)),
            (ids::TASKS, ids::USER_ROOT, "Tasks", Some(ItemType::Task)),
            (ids::BRIEFCASE, ids::USER_ROOT, "Briefcase", Some(ItemType::Document)),
        ];
        for (id, parent, name, view) in system {
            let mut folder = Item::draft(
                parent,
                name,
                ItemDetails::Folder(FolderInfo {
                    default_view: view,
                    ..Default::default()
                }),
            );
            folder.id = id;
            store.items.insert(id, folder);
        }
        store
    }

    // --- fault simulation ---

    /// Limits the total size of stored blobs.
    pub fn set_quota(&mut self, bytes: Option<u64>) {
        self.quota = bytes;
    }

    /// Makes `open_content` fail for this item.
    pub fn break_content(&mut self, id: ItemId) {
        self.broken_content.insert(id);
    }

    /// Overrides the recorded size without touching the blob.
    pub fn set_declared_size(&mut self, id: ItemId, size: u64) {
        if let Some(item) = self.items.get_mut(&id) {
            item.size = size;
        }
    }

    /// Makes deleting any item inside this folder fail.
    pub fn fail_deletes_in(&mut self, folder_id: ItemId) {
        self.failing_delete_folders.insert(folder_id);
    }

    // --- inspection ---

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn items_in(&self, folder_id: ItemId, item_type: ItemType) -> Vec<&Item> {
        self.items
            .values()
            .filter(|i| i.folder_id == folder_id && i.id != folder_id && i.item_type() == item_type)
            .collect()
    }

    pub fn blob(&self, id: ItemId) -> Option<&[u8]> {
        self.blobs.get(&id).map(Vec::as_slice)
    }

    pub fn in_maintenance(&self) -> bool {
        self.maintenance
    }

    // --- seeding ---

    pub fn put_folder(&mut self, path: &str, view: Option<ItemType>) -> StoreResult<Item> {
        self.create_folder_path(
            path,
            &FolderOptions {
                default_view: view,
                ..Default::default()
            },
        )
    }

    pub fn put_message(&mut self, folder_id: ItemId, raw: &str) -> StoreResult<Item> {
        self.add_message(folder_id, &mut raw.as_bytes(), None, Flags::empty(), &[])
    }

    pub fn put_document(&mut self, folder_id: ItemId, name: &str, body: &str) -> StoreResult<Item> {
        let template = Item::draft(folder_id, name, ItemDetails::Document(Default::default()));
        self.create_document(folder_id, &template, &mut body.as_bytes())
    }

    pub fn put_contact(&mut self, folder_id: ItemId, pairs: &[(&str, &str)]) -> StoreResult<Item> {
        let contact = ContactInfo {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.create_contact(folder_id, &contact, None, &[])
    }

    pub fn put_appointment(
        &mut self,
        folder_id: ItemId,
        uid: &str,
        subject: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Item> {
        let mut template = Item::draft(
            folder_id,
            "",
            ItemDetails::Appointment(CalendarInfo {
                uid: uid.to_string(),
                public: true,
                start: Some(start),
                end: Some(end),
            }),
        );
        template.subject = subject.to_string();
        let ics = render_ical(&template, CalendarCompat::default());
        self.set_calendar_item(folder_id, &template, Some(&ics))
    }

    pub fn put_note(&mut self, folder_id: ItemId, text: &str) -> StoreResult<Item> {
        let template = Item::draft(folder_id, "", ItemDetails::Note(NoteInfo::default()));
        self.create_note(folder_id, text, &template)
    }

    // --- internals ---

    fn alloc_id(&mut self) -> ItemId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn used_bytes(&self) -> u64 {
        let current: usize = self.blobs.values().map(Vec::len).sum();
        let old: usize = self
            .history
            .values()
            .flat_map(|revs| revs.iter().map(|(_, b)| b.len()))
            .sum();
        (current + old) as u64
    }

    fn check_quota(&self, extra: usize) -> StoreResult<()> {
        match self.quota {
            Some(limit) if self.used_bytes() + extra as u64 > limit => {
                Err(StoreError::QuotaExceeded)
            }
            _ => Ok(()),
        }
    }

    fn folder(&self, id: ItemId) -> StoreResult<&Item> {
        self.items
            .get(&id)
            .filter(|i| i.is_folder_like())
            .ok_or_else(|| StoreError::NoSuchFolder(id.to_string()))
    }

    fn item_mut(&mut self, id: ItemId) -> StoreResult<&mut Item> {
        self.items.get_mut(&id).ok_or(StoreError::NoSuchItem(id))
    }

    fn child_named(&self, parent: ItemId, name: &str) -> Option<&Item> {
        let wanted = name.to_lowercase();
        self.items.values().find(|i| {
            i.folder_id == parent
                && i.id != parent
                && i.id != ids::USER_ROOT
                && !i.name.is_empty()
                && i.name.to_lowercase() == wanted
        })
    }

    fn ensure_unique_name(&self, parent: ItemId, name: &str) -> StoreResult<()> {
        if self.child_named(parent, name).is_some() {
            let path = join_path(&self.folder_path(parent)?, name);
            return Err(StoreError::AlreadyExists(path));
        }
        Ok(())
    }

    fn store_blob(&mut self, item: &mut Item, data: Vec<u8>) -> StoreResult<()> {
        let previous = self.blobs.get(&item.id).map_or(0, Vec::len);
        self.check_quota(data.len().saturating_sub(previous))?;
        item.size = data.len() as u64;
        item.digest = Some(content_digest(&data));
        self.blobs.insert(item.id, data);
        Ok(())
    }

    fn insert_new(&mut self, mut item: Item, blob: Option<Vec<u8>>) -> StoreResult<Item> {
        item.id = self.alloc_id();
        if let Some(data) = blob {
            if let Err(e) = self.store_blob(&mut item, data) {
                self.next_id -= 1;
                return Err(e);
            }
        }
        self.items.insert(item.id, item.clone());
        Ok(item)
    }

    fn descendants(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            let parent = out[i];
            out.extend(
                self.items
                    .values()
                    .filter(|c| c.folder_id == parent && c.id != parent)
                    .map(|c| c.id),
            );
            i += 1;
        }
        out
    }

    fn read_all(content: &mut dyn Read) -> StoreResult<Vec<u8>> {
        let mut data = Vec::new();
        content
            .read_to_end(&mut data)
            .map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(data)
    }

    fn ensure_tags(&mut self, tags: &[String]) -> StoreResult<()> {
        for tag in tags {
            if self.tag_by_name(tag)?.is_none() {
                self.create_tag(tag, 0)?;
            }
        }
        Ok(())
    }
}

impl ItemStore for MemStore {
    fn get_item(&self, id: ItemId) -> StoreResult<Option<Item>> {
        Ok(self.items.get(&id).cloned())
    }

    fn folder_path(&self, folder_id: ItemId) -> StoreResult<String> {
        if folder_id == ids::ROOT || folder_id == ids::USER_ROOT {
            return Ok("/".to_string());
        }
        let folder = self.folder(folder_id)?;
        let parent = self.folder_path(folder.folder_id)?;
        Ok(join_path(&parent, &folder.name))
    }

    fn folder_by_path(&self, path: &str) -> StoreResult<Option<Item>> {
        let mut current = ids::USER_ROOT;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            match self.child_named(current, segment) {
                Some(child) if child.is_folder_like() => current = child.id,
                _ => return Ok(None),
            }
        }
        self.get_item(current)
    }

    fn item_by_path(&self, path: &str) -> StoreResult<Option<Item>> {
        if let Some(folder) = self.folder_by_path(path)? {
            return Ok(Some(folder));
        }
        let (parent, name) = split_path(path);
        match self.folder_by_path(&parent)? {
            Some(folder) => Ok(self.child_named(folder.id, name).cloned()),
            None => Ok(None),
        }
    }

    fn tag_by_name(&self, name: &str) -> StoreResult<Option<Item>> {
        let wanted = name.to_lowercase();
        Ok(self
            .items
            .values()
            .find(|i| i.item_type() == ItemType::Tag && i.name.to_lowercase() == wanted)
            .cloned())
    }

    fn calendar_by_uid(&self, uid: &str) -> StoreResult<Option<Item>> {
        Ok(self
            .items
            .values()
            .find(|i| i.calendar().is_some_and(|c| c.uid == uid))
            .cloned())
    }

    fn subfolder_hierarchy(&self, folder_id: ItemId) -> StoreResult<Vec<Item>> {
        self.folder(folder_id)?;
        Ok(self
            .descendants(folder_id)
            .into_iter()
            .filter_map(|id| self.items.get(&id))
            .filter(|i| i.is_folder_like())
            .cloned()
            .collect())
    }

    fn list_items(&self, item_type: ItemType, folder_id: Option<ItemId>) -> StoreResult<Vec<Item>> {
        Ok(self
            .items
            .values()
            .filter(|i| i.item_type() == item_type)
            .filter(|i| folder_id.map_or(true, |f| i.folder_id == f && i.id != f))
            .cloned()
            .collect())
    }

    fn list_item_ids(
        &self,
        folder_id: ItemId,
        types: Option<&TypeSet>,
    ) -> StoreResult<Vec<ItemId>> {
        self.folder(folder_id)?;
        Ok(self
            .items
            .values()
            .filter(|i| i.folder_id == folder_id && i.id != folder_id)
            .filter(|i| types.map_or(true, |t| t.contains(&i.item_type())))
            .map(|i| i.id)
            .collect())
    }

    fn search(&self, query: &SearchQuery, offset: usize, limit: usize) -> StoreResult<Vec<ItemId>> {
        let under = query.under.as_ref().map(|u| u.trim_end_matches('/').to_lowercase());
        let text = query.text.as_ref().map(|t| t.to_lowercase());
        let mut hits = Vec::new();
        for item in self.items.values() {
            if !query.types.contains(&item.item_type()) {
                continue;
            }
            if let Some(under) = &under {
                let path = self.folder_path(item.folder_id)?.to_lowercase();
                let inside = under.is_empty()
                    || path == *under
                    || path.starts_with(&format!("{}/", under));
                if !inside {
                    continue;
                }
            }
            if let Some(text) = text.as_ref().filter(|t| !t.is_empty()) {
                if !item.subject.to_lowercase().contains(text.as_str())
                    && !item.name.to_lowercase().contains(text.as_str())
                {
                    continue;
                }
            }
            if query.after.is_some_and(|a| item.date < a)
                || query.before.is_some_and(|b| item.date >= b)
            {
                continue;
            }
            if (query.appt_start.is_some() || query.appt_end.is_some())
                && self.calendar_instances(item, query.appt_start, query.appt_end)? == 0
            {
                continue;
            }
            hits.push(item.id);
        }
        Ok(hits.into_iter().skip(offset).take(limit).collect())
    }

    fn all_revisions(&self, id: ItemId) -> StoreResult<Vec<Item>> {
        let current = self.items.get(&id).ok_or(StoreError::NoSuchItem(id))?;
        let mut revisions: Vec<Item> = self
            .history
            .get(&id)
            .map(|revs| revs.iter().map(|(item, _)| item.clone()).collect())
            .unwrap_or_default();
        revisions.push(current.clone());
        Ok(revisions)
    }

    fn message_digests(&self, folder_id: ItemId) -> StoreResult<HashMap<String, ItemId>> {
        Ok(self
            .items
            .values()
            .filter(|i| i.folder_id == folder_id && i.item_type() == ItemType::Message)
            .filter_map(|i| i.digest.clone().map(|d| (d, i.id)))
            .collect())
    }

    fn is_immutable_system_folder(&self, folder_id: ItemId) -> bool {
        folder_id == ids::ROOT || folder_id == ids::CONVERSATIONS
    }

    fn open_content(&self, item: &Item) -> StoreResult<Option<Box<dyn Read + '_>>> {
        if self.broken_content.contains(&item.id) {
            return Err(StoreError::Other(format!("blob for item {} is unreadable", item.id)));
        }
        let current = self.items.get(&item.id).map(|i| i.version);
        let blob = if current == Some(item.version) {
            self.blobs.get(&item.id)
        } else {
            self.history
                .get(&item.id)
                .and_then(|revs| revs.iter().find(|(rev, _)| rev.version == item.version))
                .map(|(_, blob)| blob)
        };
        Ok(blob.map(|b| Box::new(b.as_slice()) as Box<dyn Read + '_>))
    }

    fn mime_part(&self, item: &Item, part: &str) -> StoreResult<Option<MimePart>> {
        let Some(raw) = self.blobs.get(&item.id) else {
            return Ok(None);
        };
        let index: usize = match part.parse() {
            Ok(n) if n > 0 => n,
            _ => return Ok(None),
        };
        Ok(mime_parts(raw).into_iter().nth(index - 1))
    }

    fn calendar_instances(
        &self,
        item: &Item,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> StoreResult<usize> {
        let Some(cal) = item.calendar() else {
            return Ok(0);
        };
        let begins_before_end = match (cal.start, end) {
            (Some(s), Some(e)) => s < e,
            _ => true,
        };
        let ends_after_start = match (cal.end.or(cal.start), start) {
            (Some(e), Some(s)) => e > s,
            _ => true,
        };
        Ok(usize::from(begins_before_end && ends_after_start))
    }

    fn render_icalendar(&self, item: &Item, compat: CalendarCompat) -> StoreResult<Vec<u8>> {
        Ok(render_ical(item, compat))
    }

    fn render_vcard(&self, item: &Item) -> StoreResult<Vec<u8>> {
        let contact = item
            .contact()
            .ok_or_else(|| StoreError::Other(format!("item {} is not a contact", item.id)))?;
        let mut out = String::from("BEGIN:VCARD\r\nVERSION:3.0\r\n");
        out.push_str(&format!("FN:{}\r\n", contact.file_as()));
        out.push_str(&format!(
            "N:{};{};;;\r\n",
            contact.get(fields::LAST_NAME).unwrap_or_default(),
            contact.get(fields::FIRST_NAME).unwrap_or_default()
        ));
        for email in contact.email_addresses() {
            out.push_str(&format!("EMAIL;TYPE=internet:{}\r\n", email));
        }
        if let Some(org) = contact.get(fields::COMPANY) {
            out.push_str(&format!("ORG:{}\r\n", org));
        }
        if let Some(tel) = contact.get(fields::PHONE) {
            out.push_str(&format!("TEL;TYPE=work:{}\r\n", tel));
        }
        out.push_str("END:VCARD\r\n");
        Ok(out.into_bytes())
    }

    fn parse_vcards(&self, text: &str) -> StoreResult<Vec<ContactInfo>> {
        Ok(parse_vcard_text(text))
    }

    fn parse_csv_contacts(&self, text: &str) -> StoreResult<Vec<ContactInfo>> {
        Ok(parse_csv(text))
    }

    fn import_icalendar(
        &mut self,
        folder_id: ItemId,
        data: &[u8],
        tasks: bool,
    ) -> StoreResult<Vec<Item>> {
        self.folder(folder_id)?;
        let text = String::from_utf8_lossy(data);
        let mut created = Vec::new();
        for block in ical_components(&text) {
            let info = CalendarInfo {
                uid: block
                    .prop("UID")
                    .map(str::to_string)
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                public: block.prop("CLASS") != Some("PRIVATE"),
                start: block.prop("DTSTART").and_then(parse_ical_time),
                end: block.prop("DTEND").and_then(parse_ical_time),
            };
            let details = if tasks {
                ItemDetails::Task(info)
            } else {
                ItemDetails::Appointment(info)
            };
            let mut template = Item::draft(folder_id, "", details);
            template.subject = block.prop("SUMMARY").unwrap_or_default().to_string();
            created.push(self.set_calendar_item(folder_id, &template, Some(block.raw.as_bytes()))?);
        }
        Ok(created)
    }

    fn create_folder(
        &mut self,
        parent_id: ItemId,
        name: &str,
        opts: &FolderOptions,
    ) -> StoreResult<Item> {
        self.folder(parent_id)?;
        if name.trim().is_empty() || name.contains('/') {
            return Err(StoreError::Other(format!("invalid folder name: {:?}", name)));
        }
        self.ensure_unique_name(parent_id, name)?;
        let mut folder = Item::draft(
            parent_id,
            name,
            ItemDetails::Folder(FolderInfo {
                default_view: opts.default_view,
                url: opts.url.clone(),
                acl: None,
            }),
        );
        folder.flags = opts.flags;
        folder.color = opts.color;
        self.insert_new(folder, None)
    }

    fn create_folder_path(&mut self, path: &str, opts: &FolderOptions) -> StoreResult<Item> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = self.folder(ids::USER_ROOT)?.clone();
        for (i, segment) in segments.iter().enumerate() {
            current = match self.child_named(current.id, segment) {
                Some(child) if child.is_folder_like() => child.clone(),
                Some(_) => {
                    return Err(StoreError::AlreadyExists(join_path(
                        &self.folder_path(current.id)?,
                        segment,
                    )))
                }
                None if i + 1 == segments.len() => self.create_folder(current.id, segment, opts)?,
                None => self.create_folder(current.id, segment, &FolderOptions::default())?,
            };
        }
        Ok(current)
    }

    fn delete(&mut self, targets: &[ItemId]) -> StoreResult<()> {
        for &id in targets {
            let item = self.items.get(&id).ok_or(StoreError::NoSuchItem(id))?;
            if id < ids::FIRST_USER_ID && item.is_folder_like() {
                return Err(StoreError::ImmutableFolder(id));
            }
            if self.failing_delete_folders.contains(&item.folder_id) {
                return Err(StoreError::Other(format!("cannot delete item {}", id)));
            }
            for gone in self.descendants(id) {
                self.items.remove(&gone);
                self.blobs.remove(&gone);
                self.history.remove(&gone);
                self.tombstones.push(gone);
            }
        }
        Ok(())
    }

    fn purge(&mut self) -> StoreResult<usize> {
        let count = self.tombstones.len();
        self.tombstones.clear();
        Ok(count)
    }

    fn add_message(
        &mut self,
        folder_id: ItemId,
        content: &mut dyn Read,
        date: Option<DateTime<Utc>>,
        flags: Flags,
        tags: &[String],
    ) -> StoreResult<Item> {
        self.folder(folder_id)?;
        let raw = Self::read_all(content)?;
        let text = String::from_utf8_lossy(&raw).into_owned();
        let mut message = Item::draft(
            folder_id,
            "",
            ItemDetails::Message(MessageInfo {
                sender: header_value(&text, "From").unwrap_or_default(),
                calendar_items: Vec::new(),
            }),
        );
        message.subject = header_value(&text, "Subject").unwrap_or_default();
        message.date = date.unwrap_or_else(Utc::now);
        message.flags = flags;
        message.tags = tags.to_vec();
        self.ensure_tags(tags)?;
        self.insert_new(message, Some(raw))
    }

    fn create_contact(
        &mut self,
        folder_id: ItemId,
        contact: &ContactInfo,
        blob: Option<&[u8]>,
        tags: &[String],
    ) -> StoreResult<Item> {
        self.folder(folder_id)?;
        let mut item = Item::draft(folder_id, "", ItemDetails::Contact(contact.clone()));
        item.subject = contact.file_as();
        item.tags = tags.to_vec();
        self.ensure_tags(tags)?;
        self.insert_new(item, blob.filter(|b| !b.is_empty()).map(<[u8]>::to_vec))
    }

    fn modify_contact(
        &mut self,
        id: ItemId,
        contact: &ContactInfo,
        blob: Option<&[u8]>,
    ) -> StoreResult<Item> {
        let mut item = self.item_mut(id)?.clone();
        item.details = ItemDetails::Contact(contact.clone());
        item.subject = contact.file_as();
        if let Some(data) = blob.filter(|b| !b.is_empty()) {
            self.store_blob(&mut item, data.to_vec())?;
        }
        self.items.insert(id, item.clone());
        Ok(item)
    }

    fn set_calendar_item(
        &mut self,
        folder_id: ItemId,
        template: &Item,
        blob: Option<&[u8]>,
    ) -> StoreResult<Item> {
        self.folder(folder_id)?;
        let uid = template
            .calendar()
            .map(|c| c.uid.clone())
            .ok_or_else(|| StoreError::Other("not a calendar item".into()))?;
        match self.calendar_by_uid(&uid)? {
            Some(mut existing) => {
                existing.folder_id = folder_id;
                existing.subject = template.subject.clone();
                existing.details = template.details.clone();
                existing.version += 1;
                if let Some(data) = blob {
                    self.store_blob(&mut existing, data.to_vec())?;
                }
                self.items.insert(existing.id, existing.clone());
                Ok(existing)
            }
            None => {
                let mut item =
                    Item::draft(folder_id, template.name.clone(), template.details.clone());
                item.subject = template.subject.clone();
                item.date = template.date;
                self.insert_new(item, blob.map(<[u8]>::to_vec))
            }
        }
    }

    fn create_document(
        &mut self,
        folder_id: ItemId,
        template: &Item,
        content: &mut dyn Read,
    ) -> StoreResult<Item> {
        self.folder(folder_id)?;
        if !template.item_type().is_document_like() || template.name.is_empty() {
            return Err(StoreError::Other("invalid document".into()));
        }
        self.ensure_unique_name(folder_id, &template.name)?;
        let data = Self::read_all(content)?;
        let mut doc = Item::draft(folder_id, template.name.clone(), template.details.clone());
        doc.subject = template.subject.clone();
        doc.flags = Flags::VERSIONED;
        self.insert_new(doc, Some(data))
    }

    fn add_document_revision(
        &mut self,
        id: ItemId,
        template: &Item,
        content: &mut dyn Read,
    ) -> StoreResult<Item> {
        let old = self.item_mut(id)?.clone();
        if !old.item_type().is_document_like() {
            return Err(StoreError::Other(format!("item {} is not a document", id)));
        }
        let data = Self::read_all(content)?;
        let old_blob = self.blobs.get(&id).cloned().unwrap_or_default();
        self.check_quota(data.len())?;

        let mut doc = old.clone();
        if template.item_type() == old.item_type() {
            doc.details = template.details.clone();
        }
        doc.version = old.version + 1;
        doc.date = Utc::now();
        self.store_blob(&mut doc, data)?;
        self.history.entry(id).or_default().push((old, old_blob));
        self.items.insert(id, doc.clone());
        Ok(doc)
    }

    fn set_date(&mut self, id: ItemId, date: DateTime<Utc>) -> StoreResult<()> {
        self.item_mut(id)?.date = date;
        Ok(())
    }

    fn create_note(&mut self, folder_id: ItemId, text: &str, template: &Item) -> StoreResult<Item> {
        self.folder(folder_id)?;
        let details = match &template.details {
            ItemDetails::Note(n) => ItemDetails::Note(n.clone()),
            _ => ItemDetails::Note(NoteInfo::default()),
        };
        let mut note = Item::draft(folder_id, "", details);
        note.subject = text.to_string();
        self.insert_new(note, Some(text.as_bytes().to_vec()))
    }

    fn edit_note(&mut self, id: ItemId, text: &str) -> StoreResult<Item> {
        let mut note = self.item_mut(id)?.clone();
        note.subject = text.to_string();
        self.store_blob(&mut note, text.as_bytes().to_vec())?;
        self.items.insert(id, note.clone());
        Ok(note)
    }

    fn create_chat(
        &mut self,
        folder_id: ItemId,
        template: &Item,
        content: &[u8],
    ) -> StoreResult<Item> {
        self.folder(folder_id)?;
        let details = match &template.details {
            ItemDetails::Chat(c) => ItemDetails::Chat(c.clone()),
            _ => ItemDetails::Chat(ChatInfo::default()),
        };
        let mut chat = Item::draft(folder_id, "", details);
        chat.subject = template.subject.clone();
        chat.date = template.date;
        self.insert_new(chat, Some(content.to_vec()))
    }

    fn update_chat(&mut self, id: ItemId, content: &[u8]) -> StoreResult<Item> {
        let mut chat = self.item_mut(id)?.clone();
        self.store_blob(&mut chat, content.to_vec())?;
        self.items.insert(id, chat.clone());
        Ok(chat)
    }

    fn create_mountpoint(&mut self, parent_id: ItemId, template: &Item) -> StoreResult<Item> {
        self.folder(parent_id)?;
        self.ensure_unique_name(parent_id, &template.name)?;
        let mut mount = Item::draft(parent_id, template.name.clone(), template.details.clone());
        mount.flags = template.flags;
        mount.color = template.color;
        self.insert_new(mount, None)
    }

    fn create_search_folder(&mut self, parent_id: ItemId, template: &Item) -> StoreResult<Item> {
        self.folder(parent_id)?;
        self.ensure_unique_name(parent_id, &template.name)?;
        let search = match &template.details {
            ItemDetails::SearchFolder(s) => s.clone(),
            _ => return Err(StoreError::Other("not a search folder".into())),
        };
        let mut folder = Item::draft(
            parent_id,
            template.name.clone(),
            ItemDetails::SearchFolder(search),
        );
        folder.flags = template.flags;
        folder.color = template.color;
        self.insert_new(folder, None)
    }

    fn modify_search_folder(&mut self, id: ItemId, search: &SearchInfo) -> StoreResult<Item> {
        let item = self.item_mut(id)?;
        item.details = ItemDetails::SearchFolder(search.clone());
        Ok(item.clone())
    }

    fn create_tag(&mut self, name: &str, color: u8) -> StoreResult<Item> {
        if name.trim().is_empty() {
            return Err(StoreError::Other("invalid tag name".into()));
        }
        if self.tag_by_name(name)?.is_some() {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let mut tag = Item::draft(ids::TAGS, name, ItemDetails::Tag);
        tag.color = color;
        self.insert_new(tag, None)
    }

    fn set_folder_url(&mut self, id: ItemId, url: &str) -> StoreResult<()> {
        match &mut self.item_mut(id)?.details {
            ItemDetails::Folder(f) => {
                f.url = url.to_string();
                Ok(())
            }
            _ => Err(StoreError::NoSuchFolder(id.to_string())),
        }
    }

    fn set_permissions(&mut self, id: ItemId, acl: Option<&Acl>) -> StoreResult<()> {
        match &mut self.item_mut(id)?.details {
            ItemDetails::Folder(f) => {
                f.acl = acl.cloned();
                Ok(())
            }
            _ => Err(StoreError::NoSuchFolder(id.to_string())),
        }
    }

    fn set_color(&mut self, id: ItemId, color: u8) -> StoreResult<()> {
        self.item_mut(id)?.color = color;
        Ok(())
    }

    fn set_tags(&mut self, id: ItemId, flags: Flags, tags: &[String]) -> StoreResult<()> {
        self.ensure_tags(tags)?;
        let item = self.item_mut(id)?;
        item.flags = flags;
        item.tags = tags.to_vec();
        Ok(())
    }

    fn begin_maintenance(&mut self) -> StoreResult<()> {
        if self.maintenance {
            return Err(StoreError::MaintenanceUnavailable(
                "mailbox already in maintenance".into(),
            ));
        }
        self.maintenance = true;
        Ok(())
    }

    fn end_maintenance(&mut self) -> StoreResult<()> {
        self.maintenance = false;
        Ok(())
    }
}

// --- format helpers ---

fn split_headers(text: &str) -> (&str, &str) {
    if let Some(idx) = text.find("\r\n\r\n") {
        (&text[..idx], &text[idx + 4..])
    } else if let Some(idx) = text.find("\n\n") {
        (&text[..idx], &text[idx + 2..])
    } else {
        (text, "")
    }
}

fn header_value(text: &str, name: &str) -> Option<String> {
    let (headers, _) = split_headers(text);
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

fn header_param(header: &str, name: &str) -> Option<String> {
    header.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn mime_parts(raw: &[u8]) -> Vec<MimePart> {
    let text = String::from_utf8_lossy(raw);
    let content_type = header_value(&text, "Content-Type").unwrap_or_else(|| "text/plain".into());
    let (_, body) = split_headers(&text);
    let Some(boundary) = header_param(&content_type, "boundary") else {
        return vec![MimePart {
            filename: None,
            content_type,
            data: body.as_bytes().to_vec(),
        }];
    };
    let delimiter = format!("--{}", boundary);
    body.split(delimiter.as_str())
        .skip(1)
        .take_while(|chunk| !chunk.starts_with("--"))
        .map(|chunk| {
            let chunk = chunk.trim_start_matches("\r\n").trim_start_matches('\n');
            let ctype = header_value(chunk, "Content-Type").unwrap_or_else(|| "text/plain".into());
            let filename = header_value(chunk, "Content-Disposition")
                .and_then(|d| header_param(&d, "filename"))
                .or_else(|| header_param(&ctype, "name"));
            let (_, data) = split_headers(chunk);
            let data = data
                .strip_suffix("\r\n")
                .or_else(|| data.strip_suffix('\n'))
                .unwrap_or(data);
            MimePart {
                filename,
                content_type: ctype.split(';').next().unwrap_or_default().trim().to_string(),
                data: data.as_bytes().to_vec(),
            }
        })
        .collect()
}

fn render_ical(item: &Item, compat: CalendarCompat) -> Vec<u8> {
    let component = if item.item_type() == ItemType::Task {
        "VTODO"
    } else {
        "VEVENT"
    };
    let mut out =
        String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//itemarchive//MemStore//EN\r\n");
    if compat.outlook {
        out.push_str("METHOD:PUBLISH\r\n");
    }
    out.push_str(&format!("BEGIN:{}\r\n", component));
    if let Some(cal) = item.calendar() {
        out.push_str(&format!("UID:{}\r\n", cal.uid));
        if let Some(start) = cal.start {
            out.push_str(&format!("DTSTART:{}\r\n", start.format(ICAL_TIME)));
        }
        if let Some(end) = cal.end {
            out.push_str(&format!("DTEND:{}\r\n", end.format(ICAL_TIME)));
        }
        if !cal.public {
            out.push_str("CLASS:PRIVATE\r\n");
        }
    }
    out.push_str(&format!("SUMMARY:{}\r\n", item.subject));
    out.push_str(&format!("END:{}\r\nEND:VCALENDAR\r\n", component));
    out.into_bytes()
}

struct IcalComponent {
    raw: String,
    props: Vec<(String, String)>,
}

impl IcalComponent {
    fn prop(&self, name: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn ical_components(text: &str) -> Vec<IcalComponent> {
    let mut out = Vec::new();
    let mut current: Option<IcalComponent> = None;
    for line in text.lines() {
        let line = line.trim_end();
        match line {
            "BEGIN:VEVENT" | "BEGIN:VTODO" => {
                current = Some(IcalComponent {
                    raw: format!("{}\r\n", line),
                    props: Vec::new(),
                });
            }
            "END:VEVENT" | "END:VTODO" => {
                if let Some(mut comp) = current.take() {
                    comp.raw.push_str(line);
                    comp.raw.push_str("\r\n");
                    out.push(comp);
                }
            }
            _ => {
                if let Some(comp) = current.as_mut() {
                    comp.raw.push_str(line);
                    comp.raw.push_str("\r\n");
                    if let Some((key, value)) = line.split_once(':') {
                        let key = key.split(';').next().unwrap_or_default();
                        comp.props.push((key.to_string(), value.to_string()));
                    }
                }
            }
        }
    }
    out
}

fn parse_ical_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, ICAL_TIME)
        .ok()
        .map(|t| t.and_utc())
}

fn parse_vcard_text(text: &str) -> Vec<ContactInfo> {
    let mut cards = Vec::new();
    let mut current: Option<ContactInfo> = None;
    for line in text.lines().map(str::trim_end) {
        if line.eq_ignore_ascii_case("BEGIN:VCARD") {
            current = Some(ContactInfo::default());
            continue;
        }
        if line.eq_ignore_ascii_case("END:VCARD") {
            cards.extend(current.take());
            continue;
        }
        let (Some(card), Some((key, value))) = (current.as_mut(), line.split_once(':')) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let key = key.split(';').next().unwrap_or_default().to_ascii_uppercase();
        let mut set = |field: &str, v: &str| {
            if !v.is_empty() {
                card.fields.insert(field.to_string(), v.to_string());
            }
        };
        match key.as_str() {
            "FN" => set(fields::FULL_NAME, value),
            "N" => {
                let mut parts = value.split(';');
                set(fields::LAST_NAME, parts.next().unwrap_or_default());
                set(fields::FIRST_NAME, parts.next().unwrap_or_default());
            }
            "EMAIL" => {
                let slot = [fields::EMAIL, fields::EMAIL2, fields::EMAIL3]
                    .into_iter()
                    .find(|k| !card.fields.contains_key(*k));
                if let Some(slot) = slot {
                    card.fields.insert(slot.to_string(), value.to_string());
                }
            }
            "ORG" => set(fields::COMPANY, value.trim_end_matches(';')),
            "TEL" => set(fields::PHONE, value),
            _ => {}
        }
    }
    cards
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => out.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    out.push(field);
    out
}

fn parse_csv(text: &str) -> Vec<ContactInfo> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns = split_csv_line(header);
    lines
        .map(|line| ContactInfo {
            fields: columns
                .iter()
                .zip(split_csv_line(line))
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect(),
        })
        .filter(|c| !c.fields.is_empty())
        .collect()
}

// --- Test Fixtures ---

#[cfg(any(test, feature = "test_utils"))]
pub mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub struct MailboxFixture {
        pub store: MemStore,
    }

    impl Default for MailboxFixture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MailboxFixture {
        pub fn new() -> Self {
            Self {
                store: MemStore::new(),
            }
        }

        pub fn with_messages(mut self, folder_id: ItemId, count: usize) -> Self {
            for i in 0..count {
                let raw = format!(
                    "From: sender{i}@example.com\r\nSubject: Message {i}\r\n\r\nBody of message {i}\r\n"
                );
                self.store.put_message(folder_id, &raw).unwrap();
            }
            self
        }

        pub fn with_message(mut self, folder_id: ItemId, subject: &str, body: &str) -> Self {
            let raw = format!("From: a@example.com\r\nSubject: {subject}\r\n\r\n{body}");
            self.store.put_message(folder_id, &raw).unwrap();
            self
        }

        pub fn with_folder(mut self, path: &str, view: Option<ItemType>) -> Self {
            self.store.put_folder(path, view).unwrap();
            self
        }

        pub fn with_document(mut self, folder_id: ItemId, name: &str, body: &str) -> Self {
            self.store.put_document(folder_id, name, body).unwrap();
            self
        }

        pub fn with_contact(mut self, email: &str, first: &str, last: &str) -> Self {
            self.store
                .put_contact(
                    ids::CONTACTS,
                    &[
                        (fields::EMAIL, email),
                        (fields::FIRST_NAME, first),
                        (fields::LAST_NAME, last),
                    ],
                )
                .unwrap();
            self
        }

        pub fn with_appointment(mut self, uid: &str, subject: &str, day: u32) -> Self {
            let start = Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap();
            let end = Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap();
            self.store
                .put_appointment(ids::CALENDAR, uid, subject, start, end)
                .unwrap();
            self
        }

        /// Notes go to `/Notes`, a folder without a default view.
        pub fn with_note(mut self, text: &str) -> Self {
            let notes = self.store.put_folder("/Notes", None).unwrap();
            self.store.put_note(notes.id, text).unwrap();
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::MailboxFixture;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_system_folders_resolve_by_path() {
        let store = MemStore::new();
        assert_eq!(store.folder_by_path("/").unwrap().unwrap().id, ids::USER_ROOT);
        assert_eq!(store.folder_by_path("/inbox").unwrap().unwrap().id, ids::INBOX);
        assert_eq!(store.folder_path(ids::BRIEFCASE).unwrap(), "/Briefcase");
        assert_eq!(store.folder_path(ids::TAGS).unwrap(), "/Tags");
        assert!(store.folder_by_path("/Nope").unwrap().is_none());
    }

    #[test]
    fn test_create_folder_path_creates_missing_segments() {
        let mut store = MemStore::new();
        let leaf = store.put_folder("/Projects/2024/Q1", Some(ItemType::Document)).unwrap();
        assert_eq!(store.folder_path(leaf.id).unwrap(), "/Projects/2024/Q1");
        assert_eq!(leaf.default_view(), Some(ItemType::Document));
        let parent = store.folder_by_path("/Projects/2024").unwrap().unwrap();
        assert_eq!(parent.default_view(), None);

        let again = store.put_folder("/projects/2024/q1", None).unwrap();
        assert_eq!(again.id, leaf.id);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut store = MemStore::new();
        store.put_document(ids::BRIEFCASE, "a.txt", "1").unwrap();
        match store.put_document(ids::BRIEFCASE, "A.TXT", "2") {
            Err(StoreError::AlreadyExists(path)) => assert_eq!(path, "/Briefcase/A.TXT"),
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
    }

    #[test]
    fn test_message_digest_and_headers() {
        let mut store = MemStore::new();
        let raw = "From: bob@example.com\r\nSubject: Lunch\r\n\r\nnoon?";
        let msg = store.put_message(ids::INBOX, raw).unwrap();
        assert_eq!(msg.subject, "Lunch");
        assert_eq!(msg.size, raw.len() as u64);
        assert_eq!(msg.digest.as_deref(), Some(content_digest(raw.as_bytes()).as_str()));
        let digests = store.message_digests(ids::INBOX).unwrap();
        assert_eq!(digests.get(msg.digest.as_deref().unwrap()), Some(&msg.id));
    }

    #[test]
    fn test_document_revisions() {
        let mut store = MemStore::new();
        let doc = store.put_document(ids::BRIEFCASE, "a.txt", "one").unwrap();
        assert!(doc.is_versioned());
        let rev = store
            .add_document_revision(doc.id, &doc, &mut "two".as_bytes())
            .unwrap();
        assert_eq!(rev.version, 2);

        let revisions = store.all_revisions(doc.id).unwrap();
        assert_eq!(revisions.len(), 2);
        let mut old = String::new();
        store
            .open_content(&revisions[0])
            .unwrap()
            .unwrap()
            .read_to_string(&mut old)
            .unwrap();
        assert_eq!(old, "one");
    }

    #[test]
    fn test_delete_is_recursive_and_queued() {
        let mut store = MemStore::new();
        let folder = store.put_folder("/Work", None).unwrap();
        store.put_document(folder.id, "a.txt", "x").unwrap();
        store.delete(&[folder.id]).unwrap();
        assert!(store.folder_by_path("/Work").unwrap().is_none());
        assert_eq!(store.purge().unwrap(), 2);
        assert_eq!(store.purge().unwrap(), 0);
    }

    #[test]
    fn test_system_folders_cannot_be_deleted() {
        let mut store = MemStore::new();
        assert!(matches!(
            store.delete(&[ids::INBOX]),
            Err(StoreError::ImmutableFolder(ids::INBOX))
        ));
    }

    #[test]
    fn test_quota() {
        let mut store = MemStore::new();
        store.set_quota(Some(10));
        store.put_document(ids::BRIEFCASE, "a.txt", "12345").unwrap();
        assert!(matches!(
            store.put_document(ids::BRIEFCASE, "b.txt", "123456"),
            Err(StoreError::QuotaExceeded)
        ));
    }

    #[test]
    fn test_search_under_and_text() {
        let fixture = MailboxFixture::new()
            .with_folder("/Inbox/Lists", Some(ItemType::Message))
            .with_message(ids::INBOX, "Quarterly report", "numbers")
            .with_message(ids::SENT, "Re: report", "thanks");
        let store = fixture.store;
        let lists = store.folder_by_path("/Inbox/Lists").unwrap().unwrap();
        let mut store = store;
        store
            .put_message(lists.id, "Subject: Digest\r\n\r\nweekly")
            .unwrap();

        let query = SearchQuery {
            types: [ItemType::Message].into_iter().collect(),
            under: Some("/Inbox".into()),
            ..Default::default()
        };
        assert_eq!(store.search(&query, 0, 100).unwrap().len(), 2);

        let query = SearchQuery {
            types: [ItemType::Message].into_iter().collect(),
            text: Some("REPORT".into()),
            ..Default::default()
        };
        assert_eq!(store.search(&query, 0, 100).unwrap().len(), 2);
        assert_eq!(store.search(&query, 1, 100).unwrap().len(), 1);
    }

    #[test]
    fn test_calendar_instances_in_range() {
        let fixture = MailboxFixture::new().with_appointment("uid-1", "Standup", 10);
        let store = fixture.store;
        let appt = store.calendar_by_uid("uid-1").unwrap().unwrap();
        let jan = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        assert_eq!(store.calendar_instances(&appt, Some(jan(1)), Some(jan(31))).unwrap(), 1);
        assert_eq!(store.calendar_instances(&appt, Some(jan(11)), Some(jan(31))).unwrap(), 0);
        assert_eq!(store.calendar_instances(&appt, None, None).unwrap(), 1);
    }

    #[test]
    fn test_icalendar_round_trip() {
        let mut store = MailboxFixture::new().with_appointment("uid-9", "Review", 3).store;
        let appt = store.calendar_by_uid("uid-9").unwrap().unwrap();
        let ics = store.render_icalendar(&appt, CalendarCompat::default()).unwrap();
        store.delete(&[appt.id]).unwrap();

        let created = store.import_icalendar(ids::CALENDAR, &ics, false).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].subject, "Review");
        assert_eq!(created[0].calendar().unwrap().uid, "uid-9");
        assert_eq!(created[0].calendar().unwrap().start, appt.calendar().unwrap().start);
    }

    #[test]
    fn test_vcard_and_csv_parsing() {
        let store = MemStore::new();
        let cards = store
            .parse_vcards("BEGIN:VCARD\r\nFN:Ada King\r\nN:King;Ada;;;\r\nEMAIL;TYPE=home:ada@example.com\r\nEND:VCARD\r\nBEGIN:VCARD\r\nEND:VCARD\r\n")
            .unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].get(fields::FIRST_NAME), Some("Ada"));
        assert_eq!(cards[0].get(fields::EMAIL), Some("ada@example.com"));
        assert!(cards[1].fields.is_empty());

        let rows = store
            .parse_csv_contacts("email,firstName,company\n\"x@y.z\",Xavier,\"Acme, Inc\"\n,,\n")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(fields::COMPANY), Some("Acme, Inc"));
    }

    #[test]
    fn test_mime_parts() {
        let mut store = MemStore::new();
        let raw = "Subject: files\r\nContent-Type: multipart/mixed; boundary=\"XX\"\r\n\r\n--XX\r\nContent-Type: text/plain\r\n\r\nhello\r\n--XX\r\nContent-Type: application/pdf; name=\"r.pdf\"\r\nContent-Disposition: attachment; filename=\"report.pdf\"\r\n\r\nPDFDATA\r\n--XX--\r\n";
        let msg = store.put_message(ids::INBOX, raw).unwrap();
        let part = store.mime_part(&msg, "2").unwrap().unwrap();
        assert_eq!(part.filename.as_deref(), Some("report.pdf"));
        assert_eq!(part.data, b"PDFDATA");
        let first = store.mime_part(&msg, "1").unwrap().unwrap();
        assert_eq!(first.filename, None);
        assert_eq!(first.data, b"hello");
        assert!(store.mime_part(&msg, "3").unwrap().is_none());
    }

    #[test]
    fn test_set_tags_creates_missing_tags() {
        let mut store = MailboxFixture::new().with_message(ids::INBOX, "s", "b").store;
        let msg = store.items_in(ids::INBOX, ItemType::Message)[0].clone();
        store
            .set_tags(msg.id, Flags::FLAGGED, &["urgent".to_string()])
            .unwrap();
        assert!(store.tag_by_name("URGENT").unwrap().is_some());
        let msg = store.get_item(msg.id).unwrap().unwrap();
        assert_eq!(msg.flags, Flags::FLAGGED);
    }

    #[test]
    fn test_maintenance_is_exclusive() {
        let mut store = MemStore::new();
        store.begin_maintenance().unwrap();
        assert!(store.begin_maintenance().is_err());
        store.end_maintenance().unwrap();
        assert!(!store.in_maintenance());
    }
}
