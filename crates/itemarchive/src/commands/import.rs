//! Import pass.
//!
//! Entries are consumed in order. A `.meta` entry is paired with the entry
//! right after it; a meta followed by another meta (or by the end of the
//! archive) stands alone. Entries with no meta in front of them are loose
//! and classified by extension. Each pairing is matched against the store
//! with a type-specific rule and merged under the pass's [`Resolve`] policy.
//!
//! Failures are per entry: they land in the [`ImportReport`] and the pass
//! moves on. Only a full store (quota) or a broken container ends it.

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Seek};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::{id_list, interval_param, param, switch, type_filter, KeepAlive, Params, Resolve};
use crate::charset::Charset;
use crate::config::ArchiveConfig;
use crate::container::{read_archive, ArchiveReader, Format, InputEntry};
use crate::error::{ArchiveError, Result, StoreError, StoreResult};
use crate::model::{
    ids, join_path, split_path, CalendarInfo, ChatInfo, ContactInfo, DocumentInfo, FolderInfo,
    Flags, Item, ItemDetails, ItemId, ItemType, SearchInfo, TypeSet,
};
use crate::record::{ItemRecord, ERR_SUFFIX, META_SUFFIX};
use crate::report::ImportReport;
use crate::store::{FolderOptions, ItemStore};

/// Entries written by archive managers rather than by an export.
const JUNK_PREFIXES: [&str; 1] = ["__MACOSX/"];

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub destination: ItemId,
    pub resolve: Resolve,
    pub types: Option<TypeSet>,
    /// Created below the destination and used as the effective destination.
    pub subfolder: Option<String>,
    /// Restricts meta-described items to these source ids.
    pub ids: Option<BTreeSet<ItemId>>,
    pub format: Format,
    pub charset: Charset,
    /// Date loose entries with the container's modification time.
    pub use_entry_mtime: bool,
    /// Apply folder permissions carried in the records.
    pub sync_acl: bool,
    pub keep_alive: Duration,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            destination: ids::USER_ROOT,
            resolve: Resolve::Skip,
            types: None,
            subfolder: None,
            ids: None,
            format: Format::Tgz,
            charset: Charset::Utf8,
            use_entry_mtime: true,
            sync_acl: true,
            keep_alive: Duration::from_millis(45_000),
        }
    }
}

impl ImportOptions {
    /// Builds options from request parameters: `resolve`, `types`,
    /// `subfolder`, `list`, `fmt`, `filename`, `charset`, `timestamp`,
    /// `acl`, `timeout`.
    pub fn from_params(
        destination: ItemId,
        params: &Params,
        config: &ArchiveConfig,
    ) -> Result<Self> {
        let format = match (param(params, "fmt"), param(params, "filename")) {
            (Some(fmt), _) => Format::from_extension(fmt),
            (None, Some(name)) => Format::from_filename(name),
            (None, None) => Format::Tgz,
        };
        Ok(Self {
            destination,
            resolve: param(params, "resolve")
                .map(str::parse::<Resolve>)
                .transpose()?
                .unwrap_or_default(),
            types: type_filter(params)?,
            subfolder: param(params, "subfolder").map(str::to_string),
            ids: id_list(params, "list")?.map(|ids| ids.into_iter().collect()),
            format,
            charset: param(params, "charset")
                .unwrap_or(config.charset.as_str())
                .parse::<Charset>()?,
            use_entry_mtime: param(params, "timestamp") != Some("0"),
            sync_acl: switch(params, "acl", true),
            keep_alive: interval_param(params, config.keep_alive_interval_ms)?,
        })
    }
}

/// Runs an import pass over the container in `input`.
pub fn run<S, R>(
    store: &mut S,
    input: R,
    opts: &ImportOptions,
    config: &ArchiveConfig,
    keep_alive: KeepAlive<'_>,
) -> Result<ImportReport>
where
    S: ItemStore,
    R: Read + Seek,
{
    read_archive(opts.format, input, opts.charset, |reader| {
        let mut dest = store
            .get_item(opts.destination)?
            .filter(Item::is_folder_like)
            .ok_or_else(|| StoreError::NoSuchFolder(opts.destination.to_string()))?;
        if let Some(sub) = &opts.subfolder {
            let path = join_path(&store.folder_path(dest.id)?, sub);
            dest = store.create_folder_path(&path, &FolderOptions::default())?;
        }
        let dest_path = store.folder_path(dest.id)?;
        info!(
            destination = %dest_path,
            resolve = %opts.resolve,
            format = opts.format.extension(),
            "import started"
        );

        let mut importer = Importer {
            store,
            opts,
            config,
            resolve: opts.resolve,
            dest_id: dest.id,
            dest_is_root: dest.id == ids::ROOT || dest.id == ids::USER_ROOT,
            dest_path,
            folders: HashMap::new(),
            id_map: HashMap::new(),
            digest_folder: None,
            digests: HashMap::new(),
            contacts: HashMap::new(),
            report: ImportReport::new(),
            keep_alive: keep_alive.every(opts.keep_alive),
        };
        importer.snapshot_folders()?;
        if importer.resolve == Resolve::Reset {
            importer.reset_destination()?;
        }
        importer.read_entries(reader)?;

        let report = importer.report;
        info!(
            imported = report.imported,
            skipped = report.skipped,
            errors = report.errors.len(),
            "import finished"
        );
        Ok(report)
    })
}

fn read_entry(reader: &mut dyn ArchiveReader) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(data)
}

/// Wraps failures outside the import taxonomy as `UnknownError`.
fn classify(err: ArchiveError, path: &str) -> ArchiveError {
    let path = Some(path.to_string());
    match err {
        ArchiveError::Io(e) => ArchiveError::unknown(path, e),
        ArchiveError::Serialization(e) => ArchiveError::unknown(path, e),
        ArchiveError::Zip(e) => ArchiveError::unknown(path, e),
        ArchiveError::Container(msg) | ArchiveError::InvalidRequest(msg) => {
            ArchiveError::unknown(path, msg)
        }
        ArchiveError::Config(e) => ArchiveError::unknown(path, e.to_string()),
        other => other,
    }
}

/// Default folder for loose entries of each type.
fn default_folder(kind: ItemType) -> ItemId {
    match kind {
        ItemType::Contact => ids::CONTACTS,
        ItemType::Message => ids::INBOX,
        ItemType::Appointment => ids::CALENDAR,
        ItemType::Task => ids::TASKS,
        ItemType::Wiki => ids::NOTEBOOK,
        _ => ids::BRIEFCASE,
    }
}

struct Importer<'a, 'k, S: ItemStore> {
    store: &'a mut S,
    opts: &'a ImportOptions,
    config: &'a ArchiveConfig,
    /// Starts as the requested policy; a failed reset downgrades it.
    resolve: Resolve,
    dest_id: ItemId,
    dest_path: String,
    dest_is_root: bool,
    /// Known folders by lower-cased path.
    folders: HashMap<String, Item>,
    /// Source id to created id, for documents imported in this pass.
    id_map: HashMap<ItemId, ItemId>,
    digest_folder: Option<ItemId>,
    digests: HashMap<String, ItemId>,
    contacts: HashMap<ItemId, Vec<Item>>,
    report: ImportReport,
    keep_alive: KeepAlive<'k>,
}

impl<'a, 'k, S: ItemStore> Importer<'a, 'k, S> {
    fn snapshot_folders(&mut self) -> Result<()> {
        self.folders.clear();
        for folder in self.store.subfolder_hierarchy(self.dest_id)? {
            let path = self.store.folder_path(folder.id)?;
            self.folders.insert(path.to_lowercase(), folder);
        }
        Ok(())
    }

    /// Empties every deletable folder under the destination.
    ///
    /// A folder that cannot be emptied is reported and left alone; the rest
    /// of the import then runs as `Replace`.
    fn reset_destination(&mut self) -> Result<()> {
        let mut deleted = 0;
        for folder in self.store.subfolder_hierarchy(self.dest_id)? {
            if self.store.is_immutable_system_folder(folder.id) {
                continue;
            }
            match self.clear_folder(folder.id) {
                Ok(n) => deleted += n,
                Err(StoreError::QuotaExceeded) => return Err(StoreError::QuotaExceeded.into()),
                Err(e) => {
                    warn!(folder = folder.id, error = %e, "reset failed; continuing as replace");
                    self.resolve = Resolve::Replace;
                    let path = self.store.folder_path(folder.id).unwrap_or_default();
                    self.report
                        .record(&ArchiveError::Store(e), Some(ItemType::Folder), Some(&path));
                }
            }
        }
        let purged = self.store.purge()?;
        info!(deleted, purged, "destination reset");
        self.digest_folder = None;
        self.contacts.clear();
        self.snapshot_folders()
    }

    fn clear_folder(&mut self, folder_id: ItemId) -> StoreResult<usize> {
        let types = self.opts.types.as_ref();
        let found = match self.store.list_item_ids(folder_id, types) {
            Ok(found) => found,
            Err(StoreError::NoSuchFolder(_)) => return Ok(0),
            Err(e) => return Err(e),
        };
        let found: Vec<ItemId> = found
            .into_iter()
            .filter(|id| *id >= ids::FIRST_USER_ID)
            .collect();
        for batch in found.chunks(self.config.folder_batch_size.max(1)) {
            self.keep_alive.tick();
            match self.store.delete(batch) {
                Ok(()) | Err(StoreError::NoSuchItem(_)) | Err(StoreError::NoSuchFolder(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(found.len())
    }

    fn read_entries(&mut self, reader: &mut dyn ArchiveReader) -> Result<()> {
        let mut pending: Option<ItemRecord> = None;
        let mut saw_meta = false;

        while let Some(entry) = reader.next_entry()? {
            self.keep_alive.tick();
            let name = entry.name.clone();
            if name.ends_with('/') || JUNK_PREFIXES.iter().any(|p| name.starts_with(p)) {
                debug!(entry = %name, "ignoring entry");
                continue;
            }

            if name.ends_with(META_SUFFIX) {
                saw_meta = true;
                if let Some(record) = pending.take() {
                    self.apply(record, None)?;
                }
                let data = read_entry(reader)?;
                match ItemRecord::decode(&data, &name) {
                    Ok(record) => pending = Some(record),
                    Err(e) => self.report.record(&e, None, Some(&name)),
                }
                continue;
            }

            match pending.take() {
                _ if name.ends_with(ERR_SUFFIX) => {
                    self.report
                        .record(&ArchiveError::MismatchedSize(name.clone()), None, Some(&name));
                }
                None if saw_meta => {
                    self.report
                        .record(&ArchiveError::MissingMeta(name.clone()), None, Some(&name));
                }
                None => {
                    let data = read_entry(reader)?;
                    let result = self.add_loose(&entry, &data);
                    self.settle(result, None, &name)?;
                }
                Some(record) if !record.matches_entry(entry.type_code, entry.size) => {
                    self.report.record(
                        &ArchiveError::MismatchedMeta(name.clone()),
                        Some(record.item_type()),
                        Some(&name),
                    );
                }
                Some(record) => {
                    let data = read_entry(reader)?;
                    self.apply(record, Some(data))?;
                }
            }
        }

        if let Some(record) = pending.take() {
            self.apply(record, None)?;
        }
        Ok(())
    }

    fn apply(&mut self, record: ItemRecord, content: Option<Vec<u8>>) -> Result<()> {
        let result = self.add_item(&record, content.as_deref());
        self.settle(result, Some(record.item_type()), &record.path)
    }

    /// Counts the outcome of one pairing. Only fatal errors are returned.
    fn settle(&mut self, result: Result<bool>, kind: Option<ItemType>, path: &str) -> Result<()> {
        match result {
            Ok(true) => self.report.imported += 1,
            Ok(false) => self.report.skipped += 1,
            Err(e) if e.is_fatal() => {
                error!(path, error = %e, "import aborted");
                return Err(e);
            }
            Err(ArchiveError::Store(StoreError::AlreadyExists(what)))
                if self.resolve == Resolve::Skip =>
            {
                debug!(path, existing = %what, "already exists; skipped");
                self.report.skipped += 1;
            }
            Err(e) => self.report.record(&classify(e, path), kind, Some(path)),
        }
        Ok(())
    }

    /// Store path for a record path, and whether the record was rooted.
    fn target_path(&self, record_path: &str) -> (bool, String) {
        let root =
            self.dest_is_root || record_path.starts_with(&format!("{}/", self.dest_path));
        if root {
            (true, join_path("/", record_path))
        } else {
            (false, join_path(&self.dest_path, record_path))
        }
    }

    /// Finds or creates the folder at `path`, checking that it can hold `view`.
    fn create_path(&mut self, path: &str, view: Option<ItemType>) -> Result<Item> {
        let key = path.to_lowercase();
        let folder = match self.folders.get(&key) {
            Some(folder) => folder.clone(),
            None => {
                let folder = match self.store.folder_by_path(path)? {
                    Some(folder) => folder,
                    None => {
                        debug!(path, "creating folder");
                        let opts = FolderOptions {
                            default_view: view,
                            ..Default::default()
                        };
                        self.store.create_folder_path(path, &opts)?
                    }
                };
                self.folders.insert(key, folder.clone());
                folder
            }
        };
        if let (Some(view), Some(existing)) = (view, folder.default_view()) {
            if !view.fits_view(existing) {
                return Err(ArchiveError::InvalidType {
                    view: view.name().to_string(),
                    path: path.to_string(),
                });
            }
        }
        Ok(folder)
    }

    fn delete_item(&mut self, item: &Item) -> Result<()> {
        self.store.delete(&[item.id])?;
        if item.is_folder_like() {
            let path = self.store.folder_path(item.folder_id).unwrap_or_default();
            self.folders.remove(&join_path(&path, &item.name).to_lowercase());
        }
        if let Some(cached) = self.contacts.get_mut(&item.folder_id) {
            cached.retain(|c| c.id != item.id);
        }
        if let Some(digest) = &item.digest {
            if self.digest_folder == Some(item.folder_id) {
                self.digests.remove(digest);
            }
        }
        Ok(())
    }

    /// Brings color, flags and tags of `current` in line with `wanted`.
    fn reconcile(&mut self, current: &Item, wanted: &Item) -> Result<()> {
        if current.color != wanted.color {
            self.store.set_color(current.id, wanted.color)?;
        }
        if current.item_type() != ItemType::Tag
            && (current.flags != wanted.flags || current.tag_set() != wanted.tag_set())
        {
            self.store.set_tags(current.id, wanted.flags, &wanted.tags)?;
        }
        Ok(())
    }

    /// Merges one meta-described item. `Ok(false)` means nothing changed.
    fn add_item(&mut self, record: &ItemRecord, content: Option<&[u8]>) -> Result<bool> {
        let item = &record.item;
        let kind = item.item_type();
        if self.opts.ids.as_ref().is_some_and(|wanted| !wanted.contains(&item.id)) {
            return Ok(false);
        }
        if self.opts.types.as_ref().is_some_and(|t| !t.contains(&kind)) {
            return Ok(false);
        }
        if item.digest.is_some() && content.is_none() {
            return Err(ArchiveError::MissingBlob(record.path.clone()));
        }
        if self.store.is_immutable_system_folder(item.folder_id) {
            debug!(path = %record.path, "inside an immutable folder; skipped");
            return Ok(false);
        }

        let (root, path) = self.target_path(&record.path);
        match &item.details {
            ItemDetails::Appointment(cal) | ItemDetails::Task(cal) => {
                self.import_calendar(item, cal, &path, content)
            }
            ItemDetails::Chat(chat) => self.import_chat(item, chat, &path, content),
            ItemDetails::Contact(contact) => self.import_contact(item, contact, &path, content),
            ItemDetails::Document(_) | ItemDetails::Wiki(_) => {
                self.import_document(item, &path, content)
            }
            ItemDetails::Message(_) => self.import_message(item, root, &path, content),
            ItemDetails::Note(_) => self.import_note(item, &path, content),
            ItemDetails::Folder(info) => self.import_folder(item, info, &path),
            ItemDetails::SearchFolder(search) => self.import_search_folder(item, search, &path),
            ItemDetails::Mountpoint(_) => self.import_mountpoint(item, &path),
            ItemDetails::Tag => self.import_tag(item),
            ItemDetails::Flag | ItemDetails::Conversation | ItemDetails::VirtualConversation => {
                Ok(false)
            }
        }
    }

    fn import_calendar(
        &mut self,
        item: &Item,
        cal: &CalendarInfo,
        path: &str,
        content: Option<&[u8]>,
    ) -> Result<bool> {
        let folder = self.create_path(path, Some(item.item_type()))?;
        let target = match self.store.calendar_by_uid(&cal.uid)? {
            Some(_) if self.resolve == Resolve::Skip => return Ok(false),
            Some(old) if self.resolve == Resolve::Modify => old.folder_id,
            Some(old) => {
                self.delete_item(&old)?;
                folder.id
            }
            None => folder.id,
        };
        let saved = self.store.set_calendar_item(target, item, content)?;
        self.reconcile(&saved, item)?;
        Ok(true)
    }

    fn import_chat(
        &mut self,
        item: &Item,
        chat: &ChatInfo,
        path: &str,
        content: Option<&[u8]>,
    ) -> Result<bool> {
        let folder = self.create_path(path, Some(ItemType::Chat))?;
        let existing = self.store.get_item(item.id)?.filter(|old| {
            old.folder_id == folder.id
                && old.subject == item.subject
                && matches!(&old.details, ItemDetails::Chat(c) if c.sender == chat.sender)
        });
        let data = content.unwrap_or_default();
        let saved = match existing {
            Some(_) if self.resolve == Resolve::Skip => return Ok(false),
            Some(old) if self.resolve == Resolve::Modify => self.store.update_chat(old.id, data)?,
            Some(old) => {
                self.delete_item(&old)?;
                self.store.create_chat(folder.id, item, data)?
            }
            None => self.store.create_chat(folder.id, item, data)?,
        };
        self.reconcile(&saved, item)?;
        Ok(true)
    }

    fn cached_contacts(&mut self, folder_id: ItemId) -> Result<&mut Vec<Item>> {
        if !self.contacts.contains_key(&folder_id) {
            let found = self.store.list_items(ItemType::Contact, Some(folder_id))?;
            self.contacts.insert(folder_id, found);
        }
        Ok(self.contacts.entry(folder_id).or_default())
    }

    fn import_contact(
        &mut self,
        item: &Item,
        contact: &ContactInfo,
        path: &str,
        content: Option<&[u8]>,
    ) -> Result<bool> {
        let folder = self.create_path(path, Some(ItemType::Contact))?;
        let same = |old: &Item| old.contact().is_some_and(|c| c.same_identity(contact));
        let mut existing = self
            .store
            .get_item(item.id)?
            .filter(|old| old.folder_id == folder.id && same(old));
        if existing.is_none() {
            existing = self
                .cached_contacts(folder.id)?
                .iter()
                .find(|&c| same(c))
                .cloned();
        }

        let saved = match existing {
            Some(_) if self.resolve == Resolve::Skip => return Ok(false),
            Some(old) if self.resolve == Resolve::Modify => {
                let updated = self.store.modify_contact(old.id, contact, content)?;
                if let Some(cached) = self.contacts.get_mut(&folder.id) {
                    cached.retain(|c| c.id != old.id);
                    cached.push(updated.clone());
                }
                updated
            }
            Some(old) => {
                self.delete_item(&old)?;
                self.create_contact(folder.id, item, contact, content)?
            }
            None => self.create_contact(folder.id, item, contact, content)?,
        };
        self.reconcile(&saved, item)?;
        Ok(true)
    }

    fn create_contact(
        &mut self,
        folder_id: ItemId,
        item: &Item,
        contact: &ContactInfo,
        content: Option<&[u8]>,
    ) -> Result<Item> {
        let created = self
            .store
            .create_contact(folder_id, contact, content, &item.tags)?;
        if let Some(cached) = self.contacts.get_mut(&folder_id) {
            cached.push(created.clone());
        }
        Ok(created)
    }

    fn import_document(
        &mut self,
        item: &Item,
        path: &str,
        content: Option<&[u8]>,
    ) -> Result<bool> {
        let kind = item.item_type();
        let (parent, leaf) = split_path(path);
        let folder = self.create_path(&parent, Some(kind))?;

        let mapped = self.id_map.get(&item.id).copied();
        let existing = match mapped {
            Some(id) => self.store.get_item(id)?,
            None => self.store.item_by_path(path)?,
        };
        if let Some(old) = &existing {
            if old.item_type() != kind {
                return Err(ArchiveError::MismatchedType(path.to_string()));
            }
        }

        let mut template = item.clone();
        template.name = leaf.to_string();
        let mut data = content.unwrap_or_default();
        let saved = match existing {
            Some(old) if self.resolve == Resolve::Replace && mapped.is_none() => {
                self.delete_item(&old)?;
                self.store.create_document(folder.id, &template, &mut data)?
            }
            Some(old) if item.version < old.version => {
                debug!(
                    path,
                    incoming = item.version,
                    stored = old.version,
                    "older revision ignored"
                );
                return Ok(false);
            }
            // newer revisions are taken under every policy
            Some(old) if item.version > old.version => {
                self.store.add_document_revision(old.id, &template, &mut data)?
            }
            Some(old) => {
                self.id_map.insert(item.id, old.id);
                if self.resolve == Resolve::Skip {
                    return Ok(false);
                }
                self.reconcile(&old, item)?;
                return Ok(true);
            }
            None => self.store.create_document(folder.id, &template, &mut data)?,
        };
        self.id_map.insert(item.id, saved.id);
        self.store.set_date(saved.id, item.date)?;
        self.reconcile(&saved, item)?;
        Ok(true)
    }

    fn message_digests(&mut self, folder_id: ItemId) -> Result<&HashMap<String, ItemId>> {
        if self.digest_folder != Some(folder_id) {
            self.digests = self.store.message_digests(folder_id)?;
            self.digest_folder = Some(folder_id);
        }
        Ok(&self.digests)
    }

    fn import_message(
        &mut self,
        item: &Item,
        root: bool,
        path: &str,
        content: Option<&[u8]>,
    ) -> Result<bool> {
        let folder = self.create_path(path, Some(ItemType::Message))?;
        let mut existing = None;
        if root && self.resolve != Resolve::Reset {
            existing = self.store.get_item(item.id)?.filter(|old| {
                old.item_type() == ItemType::Message
                    && old.folder_id == folder.id
                    && old.digest == item.digest
            });
        }
        if existing.is_none() {
            if let Some(digest) = &item.digest {
                if let Some(id) = self.message_digests(folder.id)?.get(digest).copied() {
                    existing = self.store.get_item(id)?;
                }
            }
        }

        match existing {
            Some(_) if self.resolve == Resolve::Skip => return Ok(false),
            Some(old) if self.resolve == Resolve::Modify => {
                self.reconcile(&old, item)?;
                return Ok(true);
            }
            Some(old) => self.delete_item(&old)?,
            None => {}
        }

        let mut data = content.unwrap_or_default();
        let saved =
            self.store
                .add_message(folder.id, &mut data, Some(item.date), item.flags, &item.tags)?;
        if let Some(digest) = &saved.digest {
            if self.digest_folder == Some(folder.id) {
                self.digests.insert(digest.clone(), saved.id);
            }
        }
        self.reconcile(&saved, item)?;
        Ok(true)
    }

    fn import_note(&mut self, item: &Item, path: &str, content: Option<&[u8]>) -> Result<bool> {
        let folder = self.create_path(path, Some(ItemType::Note))?;
        let text = content
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .unwrap_or_else(|| item.subject.clone());
        let existing = self
            .store
            .list_items(ItemType::Note, Some(folder.id))?
            .into_iter()
            .find(|n| n.subject == item.subject);
        let saved = match existing {
            Some(_) if self.resolve == Resolve::Skip => return Ok(false),
            Some(old) if self.resolve == Resolve::Modify => self.store.edit_note(old.id, &text)?,
            Some(old) => {
                self.delete_item(&old)?;
                self.store.create_note(folder.id, &text, item)?
            }
            None => self.store.create_note(folder.id, &text, item)?,
        };
        self.reconcile(&saved, item)?;
        Ok(true)
    }

    /// Folders are updated in place, never recreated.
    fn import_folder(&mut self, item: &Item, info: &FolderInfo, path: &str) -> Result<bool> {
        if matches!(
            info.default_view,
            Some(ItemType::Conversation | ItemType::Flag | ItemType::Tag)
        ) {
            return Ok(false);
        }
        match self.store.item_by_path(path)? {
            Some(old) if old.item_type() != ItemType::Folder => {
                Err(ArchiveError::MismatchedType(path.to_string()))
            }
            Some(_) if self.resolve == Resolve::Skip => Ok(false),
            Some(old) => {
                self.store.set_folder_url(old.id, &info.url)?;
                if self.opts.sync_acl {
                    self.store.set_permissions(old.id, info.acl.as_ref())?;
                }
                self.reconcile(&old, item)?;
                Ok(true)
            }
            None => {
                let opts = FolderOptions {
                    default_view: info.default_view,
                    flags: item.flags,
                    color: item.color,
                    url: info.url.clone(),
                };
                let created = self.store.create_folder_path(path, &opts)?;
                if self.opts.sync_acl && info.acl.is_some() {
                    self.store.set_permissions(created.id, info.acl.as_ref())?;
                }
                self.reconcile(&created, item)?;
                self.folders.insert(path.to_lowercase(), created);
                Ok(true)
            }
        }
    }

    /// Creates a search folder or mountpoint at `path`.
    fn create_folder_like(&mut self, item: &Item, path: &str) -> Result<Item> {
        let (parent_path, leaf) = split_path(path);
        let parent = self.create_path(&parent_path, None)?;
        let mut template = item.clone();
        template.name = leaf.to_string();
        template.folder_id = parent.id;
        let created = match item.item_type() {
            ItemType::SearchFolder => self.store.create_search_folder(parent.id, &template)?,
            _ => self.store.create_mountpoint(parent.id, &template)?,
        };
        self.reconcile(&created, item)?;
        Ok(created)
    }

    fn import_search_folder(
        &mut self,
        item: &Item,
        search: &SearchInfo,
        path: &str,
    ) -> Result<bool> {
        match self.store.item_by_path(path)? {
            Some(old) if old.item_type() != ItemType::SearchFolder => {
                return Err(ArchiveError::MismatchedType(path.to_string()))
            }
            Some(_) if self.resolve == Resolve::Skip => return Ok(false),
            Some(old) if self.resolve == Resolve::Modify => {
                let updated = self.store.modify_search_folder(old.id, search)?;
                self.reconcile(&updated, item)?;
                return Ok(true);
            }
            Some(old) => self.delete_item(&old)?,
            None => {}
        }
        self.create_folder_like(item, path)?;
        Ok(true)
    }

    fn import_mountpoint(&mut self, item: &Item, path: &str) -> Result<bool> {
        match self.store.item_by_path(path)? {
            Some(old) if old.item_type() != ItemType::Mountpoint => {
                return Err(ArchiveError::MismatchedType(path.to_string()))
            }
            Some(_) if self.resolve == Resolve::Skip => return Ok(false),
            Some(old) => self.delete_item(&old)?,
            None => {}
        }
        self.create_folder_like(item, path)?;
        Ok(true)
    }

    fn import_tag(&mut self, item: &Item) -> Result<bool> {
        match self.store.tag_by_name(&item.name)? {
            Some(_) if self.resolve == Resolve::Skip => Ok(false),
            Some(old) if self.resolve == Resolve::Modify => {
                self.reconcile(&old, item)?;
                Ok(true)
            }
            Some(old) => {
                self.delete_item(&old)?;
                self.store.create_tag(&item.name, item.color)?;
                Ok(true)
            }
            None => {
                self.store.create_tag(&item.name, item.color)?;
                Ok(true)
            }
        }
    }

    /// Imports an entry that has no metadata record.
    fn add_loose(&mut self, entry: &InputEntry, data: &[u8]) -> Result<bool> {
        let name = entry.name.trim_start_matches('/');
        let (dir, file) = match name.rfind('/') {
            Some(i) => (&name[..i], &name[i + 1..]),
            None => ("", name),
        };
        let ext = file
            .rfind('.')
            .map(|i| file[i + 1..].to_ascii_lowercase())
            .unwrap_or_default();
        let kind = match ext.as_str() {
            "csv" | "vcf" => ItemType::Contact,
            "eml" => ItemType::Message,
            "ics" if name.to_lowercase().starts_with("tasks/") => ItemType::Task,
            "ics" => ItemType::Appointment,
            "wiki" => ItemType::Wiki,
            _ => ItemType::Document,
        };
        if self.opts.types.as_ref().is_some_and(|t| !t.contains(&kind)) {
            return Ok(false);
        }

        let folder_path = if dir.is_empty() {
            if self.dest_is_root {
                self.store.folder_path(default_folder(kind))?
            } else {
                self.dest_path.clone()
            }
        } else {
            let dest_dir = self.dest_path.trim_start_matches('/');
            let rel = match dir.get(..dest_dir.len()) {
                Some(head)
                    if !dest_dir.is_empty()
                        && head.to_lowercase() == dest_dir.to_lowercase()
                        && dir[dest_dir.len()..].starts_with('/') =>
                {
                    &dir[dest_dir.len() + 1..]
                }
                _ => dir,
            };
            join_path(&self.dest_path, rel)
        };
        let folder = self.create_path(&folder_path, Some(kind))?;
        let mtime = self.opts.use_entry_mtime.then_some(entry.mod_time);

        match kind {
            ItemType::Contact => {
                let text = String::from_utf8_lossy(data);
                let cards = if ext == "csv" {
                    self.store.parse_csv_contacts(&text)?
                } else {
                    self.store.parse_vcards(&text)?
                };
                if cards.is_empty() {
                    return Err(ArchiveError::MissingVcardFields(entry.name.clone()));
                }
                for card in &cards {
                    if card.fields.is_empty() {
                        return Err(ArchiveError::MissingVcardFields(entry.name.clone()));
                    }
                    self.store.create_contact(folder.id, card, None, &[])?;
                }
            }
            ItemType::Message => {
                let flags = if entry.unread {
                    Flags::UNREAD
                } else {
                    Flags::empty()
                };
                self.store
                    .add_message(folder.id, &mut &data[..], mtime, flags, &[])?;
            }
            ItemType::Appointment | ItemType::Task => {
                self.store
                    .import_icalendar(folder.id, data, kind == ItemType::Task)?;
            }
            _ => return self.add_loose_document(kind, &folder, &folder_path, file, data, mtime),
        }
        Ok(true)
    }

    fn add_loose_document(
        &mut self,
        kind: ItemType,
        folder: &Item,
        folder_path: &str,
        file: &str,
        data: &[u8],
        mtime: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let path = join_path(folder_path, file);
        let details = match kind {
            ItemType::Wiki => ItemDetails::Wiki(DocumentInfo::default()),
            _ => ItemDetails::Document(DocumentInfo::default()),
        };
        let template = Item::draft(folder.id, file, details);
        let mut content = data;
        let saved = match self.store.item_by_path(&path)? {
            Some(old) if old.item_type() != kind => {
                return Err(ArchiveError::MismatchedType(path));
            }
            Some(_) if self.resolve == Resolve::Skip => return Ok(false),
            Some(old) if self.resolve == Resolve::Replace => {
                self.delete_item(&old)?;
                self.store.create_document(folder.id, &template, &mut content)?
            }
            Some(old) => self
                .store
                .add_document_revision(old.id, &template, &mut content)?,
            None => self.store.create_document(folder.id, &template, &mut content)?,
        };
        if let Some(mtime) = mtime {
            self.store.set_date(saved.id, mtime)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::open_writer;
    use crate::store::memory::fixtures::MailboxFixture;
    use crate::store::memory::MemStore;
    use std::io::Cursor;

    /// Content of one archive entry: name, type code, bytes, unread.
    type Entry = (String, u8, Vec<u8>, bool);

    fn archive(entries: Vec<Entry>) -> Cursor<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = open_writer(Format::Tar, &mut buf, Charset::Utf8);
            let when = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
            for (name, code, data, unread) in entries {
                let mut entry = writer.new_entry(&name, "item", code, when);
                entry.set_size(data.len() as u64);
                if unread {
                    entry.set_unread();
                }
                writer.put_next_entry(&entry).unwrap();
                writer.write(&data).unwrap();
                writer.close_entry().unwrap();
            }
            writer.close().unwrap();
        }
        buf.set_position(0);
        buf
    }

    fn meta(name: &str, item: &Item, path: &str) -> Entry {
        let record = ItemRecord::new(item.clone(), path, None);
        (
            format!("{}{}", name, META_SUFFIX),
            item.item_type().code(),
            record.encode().unwrap(),
            false,
        )
    }

    fn content(name: &str, item: &Item, data: &[u8]) -> Entry {
        (name.to_string(), item.item_type().code(), data.to_vec(), false)
    }

    fn loose(name: &str, data: &str) -> Entry {
        (name.to_string(), 0, data.as_bytes().to_vec(), false)
    }

    fn tar_opts(resolve: Resolve) -> ImportOptions {
        ImportOptions {
            format: Format::Tar,
            resolve,
            ..Default::default()
        }
    }

    fn import(
        store: &mut MemStore,
        entries: Vec<Entry>,
        opts: &ImportOptions,
    ) -> Result<ImportReport> {
        run(
            store,
            archive(entries),
            opts,
            &ArchiveConfig::default(),
            KeepAlive::silent(),
        )
    }

    /// A message from a separate source mailbox, with its raw content.
    fn source_message(subject: &str) -> (Item, Vec<u8>) {
        let raw = format!("From: a@example.com\r\nSubject: {}\r\n\r\nhello", subject);
        let mut source = MemStore::new();
        let msg = source.put_message(ids::INBOX, &raw).unwrap();
        (msg, raw.into_bytes())
    }

    #[test]
    fn test_message_pair_then_skip_is_idempotent() {
        let (msg, raw) = source_message("msg1");
        let entries = || {
            vec![
                meta("Inbox/msg1.eml", &msg, "/Inbox"),
                content("Inbox/msg1.eml", &msg, &raw),
            ]
        };
        let mut store = MemStore::new();
        let report = import(&mut store, entries(), &tar_opts(Resolve::Skip)).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(report.imported, 1);
        assert_eq!(store.items_in(ids::INBOX, ItemType::Message).len(), 1);

        let report = import(&mut store, entries(), &tar_opts(Resolve::Skip)).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.imported, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.items_in(ids::INBOX, ItemType::Message).len(), 1);
    }

    #[test]
    fn test_missing_blob_is_recorded_and_import_continues() {
        let (first, _) = source_message("lost");
        let (second, raw) = source_message("kept");
        let entries = vec![
            meta("Inbox/a.eml", &first, "/Inbox"),
            meta("Inbox/b.eml", &second, "/Inbox"),
            content("Inbox/b.eml", &second, &raw),
        ];
        let mut store = MemStore::new();
        let report = import(&mut store, entries, &tar_opts(Resolve::Skip)).unwrap();
        assert_eq!(report.codes(), vec!["formatter.MISSING_BLOB"]);
        assert_eq!(report.errors[0].path.as_deref(), Some("/Inbox"));
        assert_eq!(report.errors[0].item_type, Some(ItemType::Message));
        let inbox = store.items_in(ids::INBOX, ItemType::Message);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].subject, "kept");
    }

    #[test]
    fn test_quota_aborts_the_import() {
        let (first, raw1) = source_message("one");
        let (second, raw2) = source_message("two");
        let entries = vec![
            meta("Inbox/1.eml", &first, "/Inbox"),
            content("Inbox/1.eml", &first, &raw1),
            meta("Inbox/2.eml", &second, "/Inbox"),
            content("Inbox/2.eml", &second, &raw2),
        ];
        let mut store = MemStore::new();
        store.set_quota(Some(raw1.len() as u64 + 5));
        let err = import(&mut store, entries, &tar_opts(Resolve::Skip)).unwrap_err();
        assert!(matches!(err, ArchiveError::Store(StoreError::QuotaExceeded)));
        let inbox = store.items_in(ids::INBOX, ItemType::Message);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].subject, "one");
    }

    #[test]
    fn test_pairing_errors() {
        let (msg, raw) = source_message("x");
        let mut wrong_size = msg.clone();
        wrong_size.size += 7;
        let entries = vec![
            meta("Inbox/x.eml", &msg, "/Inbox"),
            content("Inbox/x.eml", &msg, &raw),
            ("Inbox/x.eml.err".to_string(), 0, Vec::new(), false),
            meta("Inbox/y.eml", &wrong_size, "/Inbox"),
            content("Inbox/y.eml", &wrong_size, &raw),
            loose("Inbox/stray.eml", "Subject: stray\r\n\r\n"),
            loose("__MACOSX/._x.eml", "junk"),
        ];
        let mut store = MemStore::new();
        let report = import(&mut store, entries, &tar_opts(Resolve::Skip)).unwrap();
        assert_eq!(
            report.codes(),
            vec![
                "formatter.MISMATCHED_SIZE",
                "formatter.MISMATCHED_META",
                "formatter.MISSING_META"
            ]
        );
        assert_eq!(report.imported, 1);
    }

    #[test]
    fn test_trailing_meta_without_content() {
        let mut source = MemStore::new();
        let folder = source.put_folder("/Archive/2023", Some(ItemType::Message)).unwrap();
        let mut store = MemStore::new();
        let report = import(
            &mut store,
            vec![meta("Archive/2023", &folder, "/Archive/2023")],
            &tar_opts(Resolve::Skip),
        )
        .unwrap();
        assert!(report.is_clean());
        let created = store.folder_by_path("/Archive/2023").unwrap().unwrap();
        assert_eq!(created.default_view(), Some(ItemType::Message));
    }

    #[test]
    fn test_destination_and_subfolder_prefix_paths() {
        let (msg, raw) = source_message("moved");
        let mut store = MemStore::new();
        let backup = store.put_folder("/Backup", None).unwrap();
        let opts = ImportOptions {
            destination: backup.id,
            subfolder: Some("2024".into()),
            ..tar_opts(Resolve::Skip)
        };
        let report = import(
            &mut store,
            vec![
                meta("Inbox/m.eml", &msg, "/Inbox"),
                content("Inbox/m.eml", &msg, &raw),
            ],
            &opts,
        )
        .unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        let inbox = store.folder_by_path("/Backup/2024/Inbox").unwrap().unwrap();
        assert_eq!(store.items_in(inbox.id, ItemType::Message).len(), 1);
        assert!(store.items_in(ids::INBOX, ItemType::Message).is_empty());
    }

    #[test]
    fn test_incompatible_folder_view() {
        let (msg, raw) = source_message("misfiled");
        let mut store = MemStore::new();
        let report = import(
            &mut store,
            vec![
                meta("Briefcase/m.eml", &msg, "/Briefcase"),
                content("Briefcase/m.eml", &msg, &raw),
            ],
            &tar_opts(Resolve::Skip),
        )
        .unwrap();
        assert_eq!(report.codes(), vec!["formatter.INVALID_TYPE"]);
        assert!(report.errors[0].message.contains("/Briefcase"));
    }

    #[test]
    fn test_reset_clears_destination_first() {
        let mut store = MailboxFixture::new()
            .with_messages(ids::INBOX, 3)
            .with_folder("/Projects", None)
            .with_document(ids::BRIEFCASE, "old.txt", "stale")
            .store;
        let (msg, raw) = source_message("fresh");
        let report = import(
            &mut store,
            vec![
                meta("Inbox/f.eml", &msg, "/Inbox"),
                content("Inbox/f.eml", &msg, &raw),
            ],
            &tar_opts(Resolve::Reset),
        )
        .unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        let inbox = store.items_in(ids::INBOX, ItemType::Message);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].subject, "fresh");
        assert!(store.folder_by_path("/Projects").unwrap().is_none());
        assert!(store.items_in(ids::BRIEFCASE, ItemType::Document).is_empty());
        // system folders survive
        assert!(store.folder_by_path("/Briefcase").unwrap().is_some());
        assert!(store.get_item(ids::ROOT).unwrap().is_some());
    }

    #[test]
    fn test_reset_honours_type_filter() {
        let mut store = MailboxFixture::new()
            .with_messages(ids::INBOX, 2)
            .with_document(ids::BRIEFCASE, "keep.txt", "x")
            .store;
        let opts = ImportOptions {
            types: Some([ItemType::Message].into_iter().collect()),
            ..tar_opts(Resolve::Reset)
        };
        import(&mut store, Vec::new(), &opts).unwrap();
        assert!(store.items_in(ids::INBOX, ItemType::Message).is_empty());
        assert_eq!(store.items_in(ids::BRIEFCASE, ItemType::Document).len(), 1);
    }

    #[test]
    fn test_reset_downgrades_to_replace_on_delete_failure() {
        let mut store = MailboxFixture::new().with_messages(ids::INBOX, 1).store;
        store.fail_deletes_in(ids::INBOX);
        let (msg, raw) = source_message("after");
        let report = import(
            &mut store,
            vec![
                meta("Junk/a.eml", &msg, "/Junk"),
                content("Junk/a.eml", &msg, &raw),
            ],
            &tar_opts(Resolve::Reset),
        )
        .unwrap();
        assert_eq!(report.codes(), vec!["service.FAILURE"]);
        assert_eq!(report.imported, 1);
        assert_eq!(store.items_in(ids::INBOX, ItemType::Message).len(), 1);
    }

    #[test]
    fn test_reset_keeps_clearing_after_a_failed_folder() {
        let mut store = MailboxFixture::new()
            .with_messages(ids::INBOX, 1)
            .with_messages(ids::SENT, 2)
            .with_document(ids::BRIEFCASE, "old.txt", "stale")
            .store;
        store.fail_deletes_in(ids::INBOX);
        let report = import(&mut store, Vec::new(), &tar_opts(Resolve::Reset)).unwrap();
        assert_eq!(report.codes(), vec!["service.FAILURE"]);
        assert_eq!(store.items_in(ids::INBOX, ItemType::Message).len(), 1);
        assert!(store.items_in(ids::SENT, ItemType::Message).is_empty());
        assert!(store.items_in(ids::BRIEFCASE, ItemType::Document).is_empty());
    }

    #[test]
    fn test_document_versions_never_go_backwards() {
        let mut source = MemStore::new();
        let v1 = source.put_document(ids::BRIEFCASE, "plan.txt", "one").unwrap();
        let v2 = source
            .add_document_revision(v1.id, &v1, &mut &b"two"[..])
            .unwrap();
        let entries = || {
            vec![
                meta("Briefcase/plan-00001.txt", &v1, "/Briefcase/plan.txt"),
                content("Briefcase/plan-00001.txt", &v1, b"one"),
                meta("Briefcase/plan-00002.txt", &v2, "/Briefcase/plan.txt"),
                content("Briefcase/plan-00002.txt", &v2, b"two"),
            ]
        };

        let mut store = MemStore::new();
        let report = import(&mut store, entries(), &tar_opts(Resolve::Replace)).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        let doc = store.items_in(ids::BRIEFCASE, ItemType::Document)[0].clone();
        assert_eq!(doc.version, 2);
        assert_eq!(store.blob(doc.id).unwrap(), b"two");

        let report = import(&mut store, entries(), &tar_opts(Resolve::Skip)).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.imported, 0);

        import(&mut store, entries(), &tar_opts(Resolve::Modify)).unwrap();
        let after = store.get_item(doc.id).unwrap().unwrap();
        assert_eq!(after.version, 2);
        assert_eq!(store.items_in(ids::BRIEFCASE, ItemType::Document).len(), 1);
    }

    /// Source document `plan.txt` at versions 1 and 2, with their contents.
    fn plan_revisions() -> (Item, Item) {
        let mut source = MemStore::new();
        let v1 = source.put_document(ids::BRIEFCASE, "plan.txt", "one").unwrap();
        let v2 = source
            .add_document_revision(v1.id, &v1, &mut &b"two"[..])
            .unwrap();
        (v1, v2)
    }

    #[test]
    fn test_modify_with_the_same_revision_adds_nothing() {
        let (v1, _) = plan_revisions();
        let entries = || {
            vec![
                meta("Briefcase/plan-00001.txt", &v1, "/Briefcase/plan.txt"),
                content("Briefcase/plan-00001.txt", &v1, b"one"),
            ]
        };
        let mut store = MemStore::new();
        import(&mut store, entries(), &tar_opts(Resolve::Skip)).unwrap();
        for _ in 0..2 {
            let report = import(&mut store, entries(), &tar_opts(Resolve::Modify)).unwrap();
            assert!(report.is_clean(), "{:?}", report.errors);
        }
        let docs = store.items_in(ids::BRIEFCASE, ItemType::Document);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].version, 1);
        assert_eq!(store.blob(docs[0].id).unwrap(), b"one");
    }

    #[test]
    fn test_skip_still_takes_newer_revisions() {
        let (v1, v2) = plan_revisions();
        let mut store = MemStore::new();
        import(
            &mut store,
            vec![
                meta("Briefcase/plan-00001.txt", &v1, "/Briefcase/plan.txt"),
                content("Briefcase/plan-00001.txt", &v1, b"one"),
            ],
            &tar_opts(Resolve::Skip),
        )
        .unwrap();

        let report = import(
            &mut store,
            vec![
                meta("Briefcase/plan-00001.txt", &v1, "/Briefcase/plan.txt"),
                content("Briefcase/plan-00001.txt", &v1, b"one"),
                meta("Briefcase/plan-00002.txt", &v2, "/Briefcase/plan.txt"),
                content("Briefcase/plan-00002.txt", &v2, b"two"),
            ],
            &tar_opts(Resolve::Skip),
        )
        .unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        let docs = store.items_in(ids::BRIEFCASE, ItemType::Document);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].version, 2);
        assert_eq!(store.blob(docs[0].id).unwrap(), b"two");
    }

    #[test]
    fn test_document_over_folder_is_mismatched_type() {
        let mut source = MemStore::new();
        let doc = source.put_document(ids::BRIEFCASE, "specs", "x").unwrap();
        let mut store = MailboxFixture::new().with_folder("/Briefcase/specs", None).store;
        let report = import(
            &mut store,
            vec![
                meta("Briefcase/specs", &doc, "/Briefcase/specs"),
                content("Briefcase/specs", &doc, b"x"),
            ],
            &tar_opts(Resolve::Replace),
        )
        .unwrap();
        assert_eq!(report.codes(), vec!["formatter.MISMATCHED_TYPE"]);
    }

    #[test]
    fn test_contacts_match_by_identity() {
        let source = MailboxFixture::new()
            .with_contact("ada@example.com", "Ada", "Lovelace")
            .store;
        let mut contact = source.items_in(ids::CONTACTS, ItemType::Contact)[0].clone();
        contact.color = 4;

        let mut store = MailboxFixture::new()
            .with_contact("ada@example.com", "Ada", "Lovelace")
            .store;
        let entries = || vec![meta("Contacts/Lovelace, Ada", &contact, "/Contacts")];

        let report = import(&mut store, entries(), &tar_opts(Resolve::Skip)).unwrap();
        assert_eq!(report.skipped, 1);

        import(&mut store, entries(), &tar_opts(Resolve::Modify)).unwrap();
        let stored = store.items_in(ids::CONTACTS, ItemType::Contact);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].color, 4);

        import(&mut store, entries(), &tar_opts(Resolve::Replace)).unwrap();
        assert_eq!(store.items_in(ids::CONTACTS, ItemType::Contact).len(), 1);
    }

    #[test]
    fn test_calendar_matches_by_uid() {
        let source = MailboxFixture::new()
            .with_appointment("uid-1", "Standup", 3)
            .store;
        let appt = source.items_in(ids::CALENDAR, ItemType::Appointment)[0].clone();
        let ics = source.blob(appt.id).unwrap().to_vec();
        let entries = || {
            vec![
                meta("Calendar/standup.appt", &appt, "/Calendar"),
                content("Calendar/standup.appt", &appt, &ics),
            ]
        };
        let mut store = MemStore::new();
        import(&mut store, entries(), &tar_opts(Resolve::Skip)).unwrap();
        let report = import(&mut store, entries(), &tar_opts(Resolve::Skip)).unwrap();
        assert_eq!(report.skipped, 1);
        import(&mut store, entries(), &tar_opts(Resolve::Modify)).unwrap();
        let stored = store.items_in(ids::CALENDAR, ItemType::Appointment);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].version, 2);
    }

    #[test]
    fn test_notes_and_tags() {
        let source = MailboxFixture::new().with_note("call back").store;
        let notes = source.folder_by_path("/Notes").unwrap().unwrap();
        let note = source.items_in(notes.id, ItemType::Note)[0].clone();
        let mut tag = Item::draft(ids::TAGS, "urgent", ItemDetails::Tag);
        tag.color = 2;
        let entries = |tag: &Item| {
            vec![
                meta("Tags/urgent", tag, "/Tags"),
                meta("Notes/note", &note, "/Notes"),
                content("Notes/note", &note, b"call back"),
            ]
        };
        let mut store = MemStore::new();
        let report = import(&mut store, entries(&tag), &tar_opts(Resolve::Skip)).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(store.tag_by_name("urgent").unwrap().unwrap().color, 2);
        let imported_notes = store.folder_by_path("/Notes").unwrap().unwrap();
        assert_eq!(imported_notes.default_view(), Some(ItemType::Note));
        assert_eq!(store.items_in(imported_notes.id, ItemType::Note).len(), 1);

        tag.color = 5;
        import(&mut store, entries(&tag), &tar_opts(Resolve::Modify)).unwrap();
        assert_eq!(store.tag_by_name("urgent").unwrap().unwrap().color, 5);
        assert_eq!(store.items_in(imported_notes.id, ItemType::Note).len(), 1);
    }

    #[test]
    fn test_system_folder_views_never_created() {
        let source = MemStore::new();
        let conversations = source.get_item(ids::CONVERSATIONS).unwrap().unwrap();
        let mut fake = conversations.clone();
        fake.folder_id = ids::USER_ROOT;
        let mut store = MemStore::new();
        let report = import(
            &mut store,
            vec![meta("Threads", &fake, "/Threads")],
            &tar_opts(Resolve::Replace),
        )
        .unwrap();
        assert!(report.is_clean());
        assert!(store.folder_by_path("/Threads").unwrap().is_none());
    }

    #[test]
    fn test_loose_entries_are_classified_by_extension() {
        let vcards = "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Grace Hopper\r\nN:Hopper;Grace;;;\r\nEMAIL:grace@example.com\r\nEND:VCARD\r\n";
        let task = "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nUID:t-1\r\nSUMMARY:File taxes\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        let entries = vec![
            loose("people.vcf", vcards),
            loose("Tasks/todo.ics", task),
            loose("hello.eml", "Subject: loose\r\n\r\nbody"),
            loose("Projects/readme.txt", "read me"),
        ];
        let mut store = MemStore::new();
        let report = import(&mut store, entries, &tar_opts(Resolve::Skip)).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(report.imported, 4);

        assert_eq!(store.items_in(ids::CONTACTS, ItemType::Contact).len(), 1);
        assert_eq!(store.items_in(ids::TASKS, ItemType::Task).len(), 1);
        let inbox = store.items_in(ids::INBOX, ItemType::Message);
        assert_eq!(inbox[0].subject, "loose");
        assert_eq!(inbox[0].date.timestamp(), 1_700_000_000);
        let projects = store.folder_by_path("/Projects").unwrap().unwrap();
        let docs = store.items_in(projects.id, ItemType::Document);
        assert_eq!(docs[0].name, "readme.txt");
    }

    #[test]
    fn test_loose_entry_failures() {
        let entries = vec![
            loose("empty.vcf", ""),
            loose("Inbox/readme.txt", "a document in a mail folder"),
        ];
        let mut store = MemStore::new();
        let report = import(&mut store, entries, &tar_opts(Resolve::Skip)).unwrap();
        assert_eq!(
            report.codes(),
            vec!["formatter.MISSING_VCARD_FIELDS", "formatter.INVALID_TYPE"]
        );
    }

    #[test]
    fn test_loose_document_policies() {
        let mut store = MailboxFixture::new()
            .with_document(ids::BRIEFCASE, "notes.txt", "v1")
            .store;
        let entries = || vec![loose("notes.txt", "v2")];

        let report = import(&mut store, entries(), &tar_opts(Resolve::Skip)).unwrap();
        assert_eq!(report.skipped, 1);

        import(&mut store, entries(), &tar_opts(Resolve::Modify)).unwrap();
        let doc = store.items_in(ids::BRIEFCASE, ItemType::Document)[0].clone();
        assert_eq!(doc.version, 2);
        assert_eq!(store.blob(doc.id).unwrap(), b"v2");

        import(&mut store, entries(), &tar_opts(Resolve::Replace)).unwrap();
        let docs = store.items_in(ids::BRIEFCASE, ItemType::Document);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].version, 1);
    }

    #[test]
    fn test_unread_loose_message() {
        let mut store = MemStore::new();
        let entry = (
            "Inbox/new.eml".to_string(),
            0,
            b"Subject: unread\r\n\r\n.".to_vec(),
            true,
        );
        let opts = ImportOptions {
            use_entry_mtime: false,
            ..tar_opts(Resolve::Skip)
        };
        import(&mut store, vec![entry], &opts).unwrap();
        let msg = store.items_in(ids::INBOX, ItemType::Message)[0].clone();
        assert!(msg.is_unread());
        assert_ne!(msg.date.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_filters() {
        let (msg, raw) = source_message("filtered");
        let entries = || {
            vec![
                loose("x.txt", "doc"),
                meta("Inbox/m.eml", &msg, "/Inbox"),
                content("Inbox/m.eml", &msg, &raw),
            ]
        };
        let mut store = MemStore::new();
        let opts = ImportOptions {
            types: Some([ItemType::Document].into_iter().collect()),
            ..tar_opts(Resolve::Skip)
        };
        let report = import(&mut store, entries(), &opts).unwrap();
        assert_eq!((report.imported, report.skipped), (1, 1));

        let opts = ImportOptions {
            ids: Some([msg.id + 1].into_iter().collect()),
            ..tar_opts(Resolve::Skip)
        };
        let mut store = MemStore::new();
        import(&mut store, entries(), &opts).unwrap();
        assert!(store.items_in(ids::INBOX, ItemType::Message).is_empty());
    }

    #[test]
    fn test_unknown_destination() {
        let mut store = MemStore::new();
        let opts = ImportOptions {
            destination: 9999,
            ..tar_opts(Resolve::Skip)
        };
        assert!(matches!(
            import(&mut store, Vec::new(), &opts),
            Err(ArchiveError::Store(StoreError::NoSuchFolder(_)))
        ));
    }

    #[test]
    fn test_from_params() {
        let params: Params = [
            ("resolve", "Replace"),
            ("types", "message,conv"),
            ("subfolder", "restored"),
            ("timestamp", "0"),
            ("acl", "0"),
            ("filename", "backup.zip"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let opts =
            ImportOptions::from_params(ids::INBOX, &params, &ArchiveConfig::default()).unwrap();
        assert_eq!(opts.destination, ids::INBOX);
        assert_eq!(opts.resolve, Resolve::Replace);
        assert_eq!(opts.types, Some([ItemType::Message].into_iter().collect()));
        assert_eq!(opts.subfolder.as_deref(), Some("restored"));
        assert!(!opts.use_entry_mtime);
        assert!(!opts.sync_acl);
        assert_eq!(opts.format, Format::Zip);

        let defaults =
            ImportOptions::from_params(ids::USER_ROOT, &Params::new(), &ArchiveConfig::default())
                .unwrap();
        assert_eq!(defaults.resolve, Resolve::Skip);
        assert!(defaults.use_entry_mtime && defaults.sync_acl);
    }
}
