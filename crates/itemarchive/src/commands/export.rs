//! Export pass.
//!
//! Items are written in the order they are found. Each one becomes a
//! `<path>.meta` record (unless metadata is switched off) followed by its
//! content entry, or one entry per requested MIME part. Revisions of a
//! versioned item are written before the item itself.
//!
//! The container is opened on the first entry. A pass that finds nothing
//! reports [`ArchiveError::NoData`] and leaves the output untouched, unless
//! an empty archive was explicitly asked for.

use std::io::{Read, Seek, Write};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::{
    id_list, interval_param, param, switch, time_param, type_filter, KeepAlive, Params,
};
use crate::charset::Charset;
use crate::config::ArchiveConfig;
use crate::container::{open_writer, ArchiveWriter, Format, OutputEntry};
use crate::error::{ArchiveError, Result, StoreError};
use crate::model::{ids, Item, ItemDetails, ItemId, ItemType, TypeSet};
use crate::naming::{clean_leaf, entry_path, folder_segment, leaf_name, FolderDirs, UniqueNames};
use crate::record::{ItemRecord, ERR_SUFFIX, META_SUFFIX};
use crate::report::ExportSummary;
use crate::store::{CalendarCompat, ItemStore, SearchQuery};

/// Item types searched when the caller did not name any.
pub const DEFAULT_SEARCH_TYPES: [ItemType; 8] = [
    ItemType::Message,
    ItemType::Contact,
    ItemType::Document,
    ItemType::Wiki,
    ItemType::Note,
    ItemType::Chat,
    ItemType::Appointment,
    ItemType::Task,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedItem {
    pub id: ItemId,
    /// A specific revision. `None` exports the item with all its revisions.
    pub version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Items(Vec<RequestedItem>),
    /// One item; a folder is exported as a scope.
    Item(ItemId),
    /// A folder (the user root when `None`) with everything under it,
    /// optionally narrowed by a query.
    Scope {
        folder: Option<ItemId>,
        query: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub selection: Selection,
    pub format: Format,
    pub charset: Charset,
    /// Write a `.meta` record before each item's content.
    pub include_meta: bool,
    /// `false` keeps only the header block of messages.
    pub include_body: bool,
    /// MIME parts to export instead of whole messages.
    pub parts: Vec<String>,
    pub types: Option<TypeSet>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Hold the store's maintenance lock for the whole pass.
    pub lock: bool,
    pub no_hierarchy: bool,
    pub allow_private: bool,
    /// Produce an empty archive rather than `NoData`.
    pub emptyname: bool,
    pub filename: Option<String>,
    pub calendar_compat: CalendarCompat,
    pub keep_alive: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            selection: Selection::Scope {
                folder: None,
                query: None,
            },
            format: Format::Tgz,
            charset: Charset::Utf8,
            include_meta: true,
            include_body: true,
            parts: Vec::new(),
            types: None,
            start: None,
            end: None,
            lock: false,
            no_hierarchy: false,
            allow_private: false,
            emptyname: false,
            filename: None,
            calendar_compat: CalendarCompat::default(),
            keep_alive: Duration::from_millis(45_000),
        }
    }
}

impl ExportOptions {
    /// Builds options from request parameters:
    /// `list`, `id`, `version`, `folder`, `query`, `fmt`, `filename`,
    /// `charset`, `meta`, `body`, `part`, `types`, `start`, `end`, `lock`,
    /// `nohierarchy`, `private`, `emptyname`, `outlook`, `timeout`.
    pub fn from_params(params: &Params, config: &ArchiveConfig) -> Result<Self> {
        let version = param(params, "version")
            .map(|v| {
                v.parse::<u32>()
                    .map_err(|_| ArchiveError::InvalidRequest(format!("invalid version: {}", v)))
            })
            .transpose()?;

        let single = |key: &str| -> Result<Option<ItemId>> {
            Ok(id_list(params, key)?.and_then(|ids| ids.first().copied()))
        };
        let selection = if let Some(list) = id_list(params, "list")? {
            Selection::Items(
                list.into_iter()
                    .map(|id| RequestedItem { id, version: None })
                    .collect(),
            )
        } else if let Some(id) = single("id")? {
            match version {
                Some(v) => Selection::Items(vec![RequestedItem { id, version: Some(v) }]),
                None => Selection::Item(id),
            }
        } else {
            Selection::Scope {
                folder: single("folder")?,
                query: param(params, "query").map(str::to_string),
            }
        };

        let filename = param(params, "filename").map(str::to_string);
        let format = match (param(params, "fmt"), filename.as_deref()) {
            (Some(fmt), _) => Format::from_extension(fmt),
            (None, Some(name)) => Format::from_filename(name),
            (None, None) => Format::Tgz,
        };

        let charset = param(params, "charset")
            .unwrap_or(config.charset.as_str())
            .parse::<Charset>()?;

        Ok(Self {
            selection,
            format,
            charset,
            include_meta: switch(params, "meta", true),
            include_body: switch(params, "body", true),
            parts: param(params, "part")
                .map(|p| {
                    p.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            types: type_filter(params)?,
            start: time_param(params, "start")?,
            end: time_param(params, "end")?,
            lock: switch(params, "lock", false),
            no_hierarchy: switch(params, "nohierarchy", false),
            allow_private: switch(params, "private", false),
            emptyname: switch(params, "emptyname", false),
            filename,
            calendar_compat: CalendarCompat {
                outlook: switch(params, "outlook", false),
            },
            keep_alive: interval_param(params, config.keep_alive_interval_ms)?,
        })
    }
}

/// Runs an export pass, writing the container to `output`.
pub fn run<S, W>(
    store: &mut S,
    output: W,
    opts: &ExportOptions,
    config: &ArchiveConfig,
    keep_alive: KeepAlive<'_>,
) -> Result<ExportSummary>
where
    S: ItemStore,
    W: Write + Seek,
{
    if opts.lock {
        store.begin_maintenance()?;
    }
    let result = export(&*store, output, opts, config, keep_alive);
    if opts.lock {
        if let Err(e) = store.end_maintenance() {
            warn!(error = %e, "failed to release maintenance lock");
        }
    }
    result
}

fn export<S, W>(
    store: &S,
    output: W,
    opts: &ExportOptions,
    config: &ArchiveConfig,
    keep_alive: KeepAlive<'_>,
) -> Result<ExportSummary>
where
    S: ItemStore,
    W: Write + Seek,
{
    info!(format = opts.format.extension(), "export started");
    let mut exporter = Exporter {
        store,
        opts,
        config,
        dirs: FolderDirs::new(config.folder_batch_size),
        names: UniqueNames::new(),
        strip: None,
        out: LazyWriter::new(opts.format, output, opts.charset),
        summary: ExportSummary::default(),
        keep_alive: keep_alive.every(opts.keep_alive),
    };

    match &opts.selection {
        Selection::Items(requested) => {
            for req in requested {
                exporter.export_requested(*req)?;
            }
        }
        Selection::Item(id) => {
            let item = exporter.require(*id)?;
            if item.is_folder_like() {
                exporter.export_scope(Some(item.id), None)?;
            } else {
                exporter.export_one(&item, false)?;
            }
        }
        Selection::Scope { folder, query } => exporter.export_scope(*folder, query.as_deref())?,
    }

    exporter.finish()
}

/// Opens the container on first use.
struct LazyWriter<'w, W: Write + Seek + 'w> {
    format: Format,
    charset: Charset,
    output: Option<W>,
    writer: Option<Box<dyn ArchiveWriter + 'w>>,
}

impl<'w, W: Write + Seek + 'w> LazyWriter<'w, W> {
    fn new(format: Format, output: W, charset: Charset) -> Self {
        Self {
            format,
            charset,
            output: Some(output),
            writer: None,
        }
    }

    fn get(&mut self) -> Result<&mut (dyn ArchiveWriter + 'w)> {
        if let Some(output) = self.output.take() {
            self.writer = Some(open_writer(self.format, output, self.charset));
        }
        self.writer
            .as_deref_mut()
            .ok_or_else(|| ArchiveError::Container("archive writer unavailable".into()))
    }

    /// Closes the container. Returns `false` if it was never opened and
    /// `empty_ok` did not force it open.
    fn close(&mut self, empty_ok: bool) -> Result<bool> {
        if self.writer.is_none() && !empty_ok {
            return Ok(false);
        }
        self.get()?.close()?;
        Ok(true)
    }
}

/// Prefix lengths removed in no-hierarchy mode.
#[derive(Debug, Clone, Copy)]
struct Strip {
    dir: usize,
    path: usize,
}

impl Strip {
    fn new(target_path: &str, charset: Charset) -> Self {
        let target_dir = folder_segment(target_path, charset);
        Self {
            dir: target_dir.rfind('/').map_or(0, |i| i + 1),
            path: target_path.rfind('/').map_or(0, |i| i + 1),
        }
    }

    fn dir(&self, dir: &str) -> String {
        dir.get(self.dir..).unwrap_or_default().to_string()
    }

    fn path(&self, path: &str) -> String {
        format!("/{}", path.get(self.path..).unwrap_or_default())
    }
}

enum Content<'s> {
    Nothing,
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + 's>, u64),
}

/// How an item is named in the archive.
struct Naming {
    name: Option<String>,
    ext: Option<&'static str>,
    prefix: bool,
    unique: bool,
    extra: Option<String>,
}

struct Exporter<'a, 'k, 'w, S: ItemStore, W: Write + Seek + 'w> {
    store: &'a S,
    opts: &'a ExportOptions,
    config: &'a ArchiveConfig,
    dirs: FolderDirs,
    names: UniqueNames,
    strip: Option<Strip>,
    out: LazyWriter<'w, W>,
    summary: ExportSummary,
    keep_alive: KeepAlive<'k>,
}

impl<'a, 'k, 'w, S: ItemStore, W: Write + Seek + 'w> Exporter<'a, 'k, 'w, S, W> {
    fn require(&self, id: ItemId) -> Result<Item> {
        self.store
            .get_item(id)?
            .ok_or_else(|| StoreError::NoSuchItem(id).into())
    }

    fn finish(mut self) -> Result<ExportSummary> {
        if !self.out.close(self.opts.emptyname)? {
            info!("export found nothing to write");
            return Err(ArchiveError::NoData);
        }
        info!(
            items = self.summary.items,
            entries = self.summary.entries,
            truncated = self.summary.truncated,
            skipped = self.summary.skipped,
            "export finished"
        );
        Ok(self.summary)
    }

    fn export_requested(&mut self, req: RequestedItem) -> Result<()> {
        let item = self.require(req.id)?;
        match req.version {
            Some(version) if version != item.version => {
                let revision = self
                    .store
                    .all_revisions(item.id)?
                    .into_iter()
                    .find(|r| r.version == version)
                    .ok_or(StoreError::NoSuchItem(item.id))?;
                self.export_one(&revision, true)
            }
            Some(_) => self.export_one(&item, true),
            None => self.export_one(&item, false),
        }
    }

    /// Exports one item, and its other revisions first unless `this_revision_only`.
    ///
    /// Per-item failures are logged and skipped; only failures of the
    /// container itself end the pass.
    fn export_one(&mut self, item: &Item, this_revision_only: bool) -> Result<()> {
        self.keep_alive.tick();
        if item.is_versioned() && !this_revision_only {
            match self.store.all_revisions(item.id) {
                Ok(revisions) => {
                    for revision in revisions.iter().filter(|r| r.version != item.version) {
                        self.export_one(revision, true)?;
                    }
                }
                Err(e) => warn!(id = item.id, error = %e, "cannot list revisions"),
            }
        }

        match self.save_item(item) {
            Ok(true) => self.summary.items += 1,
            Ok(false) => self.summary.skipped += 1,
            Err(e) if e.is_container_failure() => return Err(e),
            // a requested part fails the whole request
            Err(e @ ArchiveError::Store(StoreError::NoSuchPart { .. })) => return Err(e),
            Err(e) => {
                warn!(id = item.id, item_type = %item.item_type(), error = %e, "skipping item");
                self.summary.skipped += 1;
            }
        }
        Ok(())
    }

    fn check_period(&self) -> Result<()> {
        let max_days = self.config.export_max_days;
        if max_days == 0 {
            return Ok(());
        }
        let (Some(start), Some(end)) = (self.opts.start, self.opts.end) else {
            return Err(ArchiveError::ExportPeriodNotSpecified { max_days });
        };
        let requested_days = (end - start).num_days();
        if requested_days > i64::from(max_days) {
            return Err(ArchiveError::ExportPeriodTooLong {
                requested_days,
                max_days,
            });
        }
        Ok(())
    }

    fn export_scope(&mut self, folder: Option<ItemId>, query: Option<&str>) -> Result<()> {
        let target = self.require(folder.unwrap_or(ids::USER_ROOT))?;
        if !target.is_folder_like() {
            return Err(ArchiveError::InvalidRequest(format!(
                "item {} is not a folder",
                target.id
            )));
        }
        self.check_period()?;

        let target_path = self.store.folder_path(target.id)?;
        let at_root = target.id == ids::USER_ROOT || target.id == ids::ROOT;
        if self.opts.no_hierarchy {
            self.strip = Some(Strip::new(&target_path, self.opts.charset));
        }
        let mut pending_target = (!at_root).then(|| target.clone());
        let text = query.map(str::trim).filter(|q| !q.is_empty()).map(str::to_string);

        let mut local_only = false;
        if text.is_none() && self.opts.types.is_none() {
            self.export_system_items(&target_path, at_root, &mut pending_target)?;
            local_only = true;
        }

        let base = SearchQuery {
            under: (!at_root).then(|| target_path.clone()),
            text,
            local_only,
            ..Default::default()
        };
        let types: TypeSet = self
            .opts
            .types
            .clone()
            .unwrap_or_else(|| DEFAULT_SEARCH_TYPES.into_iter().collect());

        let content: TypeSet = types.iter().copied().filter(|t| !t.is_calendar()).collect();
        if !content.is_empty() {
            let query = SearchQuery {
                types: content,
                after: self.opts.start,
                before: self.opts.end,
                ..base.clone()
            };
            self.export_search(&query, &mut pending_target)?;
        }
        if types.contains(&ItemType::Appointment) {
            let query = SearchQuery {
                types: [ItemType::Appointment].into_iter().collect(),
                appt_start: self.opts.start,
                appt_end: self.opts.end,
                ..base.clone()
            };
            self.export_search(&query, &mut pending_target)?;
        }
        if types.contains(&ItemType::Task) {
            let query = SearchQuery {
                types: [ItemType::Task].into_iter().collect(),
                ..base
            };
            self.export_search(&query, &mut pending_target)?;
        }
        Ok(())
    }

    /// Folders, tags and other structural items, ordered by path then name.
    fn export_system_items(
        &mut self,
        target_path: &str,
        at_root: bool,
        pending_target: &mut Option<Item>,
    ) -> Result<()> {
        let below = format!("{}/", target_path);
        let mut found = Vec::new();
        for kind in ItemType::SYSTEM {
            for item in self.store.list_items(kind, None)? {
                let path = self.store.item_path(&item)?;
                if at_root || path == target_path || path.starts_with(&below) {
                    found.push((path, item));
                }
            }
        }
        found.sort_by(|(pa, a), (pb, b)| pa.cmp(pb).then_with(|| a.name.cmp(&b.name)));

        debug!(count = found.len(), "exporting structural items");
        for (_, item) in found {
            if pending_target.as_ref().is_some_and(|t| t.id == item.id) {
                *pending_target = None;
            }
            self.export_one(&item, false)?;
        }
        Ok(())
    }

    fn export_search(
        &mut self,
        query: &SearchQuery,
        pending_target: &mut Option<Item>,
    ) -> Result<()> {
        let chunk = self.config.search_chunk_size.max(1);
        let mut offset = 0;
        loop {
            let hits = self.store.search(query, offset, chunk)?;
            for id in &hits {
                let Some(item) = self.store.get_item(*id)? else {
                    continue;
                };
                if let Some(target) = pending_target.take() {
                    self.export_one(&target, false)?;
                }
                self.export_one(&item, false)?;
            }
            if hits.len() < chunk {
                return Ok(());
            }
            offset += chunk;
        }
    }

    fn naming(&self, item: &Item) -> Result<Option<Naming>> {
        let opts = self.opts;
        let mut naming = Naming {
            name: None,
            ext: None,
            prefix: true,
            unique: false,
            extra: None,
        };
        match &item.details {
            ItemDetails::Flag | ItemDetails::Conversation | ItemDetails::VirtualConversation => {
                return Ok(None)
            }
            ItemDetails::Appointment(cal) | ItemDetails::Task(cal) => {
                if !cal.public && !opts.allow_private {
                    debug!(id = item.id, "skipping private calendar item");
                    return Ok(None);
                }
                if (opts.start.is_some() || opts.end.is_some())
                    && self.store.calendar_instances(item, opts.start, opts.end)? == 0
                {
                    debug!(id = item.id, "calendar item has no instances in range");
                    return Ok(None);
                }
                naming.ext = Some(match (opts.include_meta, item.item_type()) {
                    (false, _) => "ics",
                    (true, ItemType::Task) => "task",
                    (true, _) => "appt",
                });
            }
            ItemDetails::Chat(_) => naming.ext = Some("chat"),
            ItemDetails::Contact(contact) => {
                naming.name = Some(contact.file_as());
                naming.prefix = false;
                naming.unique = true;
                if !opts.include_meta {
                    naming.ext = Some("vcf");
                }
            }
            ItemDetails::Folder(_) | ItemDetails::SearchFolder(_) | ItemDetails::Mountpoint(_) => {
                naming.prefix = false;
                naming.name = Some(match item.id {
                    ids::ROOT => "ROOT".to_string(),
                    ids::USER_ROOT => "USER_ROOT".to_string(),
                    _ => item.name.clone(),
                });
            }
            ItemDetails::Message(msg) => {
                naming.ext = Some("eml");
                if !msg.calendar_items.is_empty() {
                    let linked: Vec<String> =
                        msg.calendar_items.iter().map(ItemId::to_string).collect();
                    naming.extra = Some(format!("calendar={}", linked.join(",")));
                }
            }
            ItemDetails::Note(_) => naming.ext = Some("note"),
            ItemDetails::Wiki(_) => {
                naming.ext = Some("wiki");
                naming.prefix = false;
            }
            ItemDetails::Document(_) | ItemDetails::Tag => naming.prefix = false,
        }
        Ok(Some(naming))
    }

    /// Writes one item. `Ok(false)` means it was deliberately left out.
    fn save_item(&mut self, item: &Item) -> Result<bool> {
        let Some(naming) = self.naming(item)? else {
            return Ok(false);
        };
        let kind = item.item_type();
        let opts = self.opts;
        let store = self.store;

        if kind == ItemType::Message && !opts.parts.is_empty() {
            return self.save_parts(item);
        }

        let mut dir = self.dirs.dir_for(item, || {
            store
                .folder_path(item.folder_id)
                .map(|p| folder_segment(&p, opts.charset))
        })?;
        let mut record_path = store.item_path(item)?;
        if let Some(strip) = self.strip {
            dir = strip.dir(&dir);
            record_path = strip.path(&record_path);
        }

        let leaf = leaf_name(
            item,
            naming.name.as_deref(),
            opts.charset,
            naming.prefix,
            self.config.max_name_length,
        );
        let path = if naming.unique {
            self.names.claim(&dir, &leaf, naming.ext)
        } else {
            entry_path(&dir, &leaf, naming.ext)
        };

        let content = if !opts.include_meta && kind.is_calendar() {
            Content::Bytes(store.render_icalendar(item, opts.calendar_compat)?)
        } else if !opts.include_meta && kind == ItemType::Contact {
            Content::Bytes(store.render_vcard(item)?)
        } else if item.size == 0 && item.digest.is_some() {
            error!(id = item.id, path = %path, "item has a digest but no content; skipping");
            return Ok(false);
        } else {
            match store.open_content(item) {
                Err(e) => {
                    error!(id = item.id, path = %path, error = %e, "cannot open content; skipping");
                    return Ok(false);
                }
                Ok(None) => Content::Nothing,
                Ok(Some(stream)) if !opts.include_body => {
                    Content::Bytes(header_block(stream, item.size)?)
                }
                Ok(Some(stream)) => Content::Stream(stream, item.size),
            }
        };

        if opts.include_meta {
            let record = ItemRecord::new(item.clone(), record_path, naming.extra);
            let meta_path = format!("{}{}", path, META_SUFFIX);
            self.write_bytes(&meta_path, item, &record.encode()?)?;
        }
        match content {
            Content::Nothing => {}
            Content::Bytes(data) => self.write_bytes(&path, item, &data)?,
            Content::Stream(stream, size) => self.copy_stream(&path, item, stream, size)?,
        }
        Ok(true)
    }

    /// Writes each requested MIME part as its own entry.
    fn save_parts(&mut self, item: &Item) -> Result<bool> {
        let mut wrote = false;
        for part in &self.opts.parts {
            let Some(mime) = self.store.mime_part(item, part)? else {
                return Err(StoreError::NoSuchPart {
                    item: item.id,
                    part: part.clone(),
                }
                .into());
            };
            let filename = mime
                .filename
                .as_deref()
                .map(|f| clean_leaf(f, self.opts.charset))
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| "attachment".to_string());
            let (leaf, ext) = match filename.rfind('.') {
                Some(dot) if dot > 0 => (&filename[..dot], Some(&filename[dot + 1..])),
                _ => (filename.as_str(), None),
            };
            let path = self.names.claim("", leaf, ext);
            self.write_bytes(&path, item, &mime.data)?;
            wrote = true;
        }
        Ok(wrote)
    }

    fn write_bytes(&mut self, path: &str, item: &Item, data: &[u8]) -> Result<()> {
        let writer = self.out.get()?;
        let entry = output_entry(writer, path, item, data.len() as u64);
        writer.put_next_entry(&entry)?;
        writer.write(data)?;
        writer.close_entry()?;
        self.summary.entries += 1;
        Ok(())
    }

    /// Copies exactly `size` bytes. A short or failing stream is padded
    /// with spaces and followed by an empty `.err` marker entry.
    fn copy_stream(
        &mut self,
        path: &str,
        item: &Item,
        mut stream: Box<dyn Read + '_>,
        size: u64,
    ) -> Result<()> {
        let writer = self.out.get()?;
        let entry = output_entry(writer, path, item, size);
        writer.put_next_entry(&entry)?;

        let mut buf = vec![0u8; writer.record_size() * 20];
        let mut remaining = size;
        let mut truncated = false;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            match stream.read(&mut buf[..want]) {
                Ok(0) => {
                    truncated = true;
                    break;
                }
                Ok(n) => {
                    writer.write(&buf[..n])?;
                    remaining -= n as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(path, error = %e, "error reading item content");
                    truncated = true;
                    break;
                }
            }
        }

        if truncated {
            error!(path, declared = size, missing = remaining, "item content truncated; padding");
            buf.fill(b' ');
            while remaining > 0 {
                let n = remaining.min(buf.len() as u64) as usize;
                writer.write(&buf[..n])?;
                remaining -= n as u64;
            }
        }
        writer.close_entry()?;
        self.summary.entries += 1;

        if truncated {
            let marker = output_entry(writer, &format!("{}{}", path, ERR_SUFFIX), item, 0);
            writer.put_next_entry(&marker)?;
            writer.close_entry()?;
            self.summary.entries += 1;
            self.summary.truncated += 1;
        }
        Ok(())
    }
}

fn output_entry(writer: &dyn ArchiveWriter, path: &str, item: &Item, size: u64) -> OutputEntry {
    let kind = item.item_type();
    let mut entry = writer.new_entry(path, kind.name(), kind.code(), item.date);
    entry.set_size(size);
    if kind == ItemType::Message && item.is_unread() {
        entry.set_unread();
    }
    entry
}

/// Content up to and including the first blank line.
fn header_block(stream: Box<dyn Read + '_>, limit: u64) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    stream.take(limit).read_to_end(&mut data)?;
    let end = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .or_else(|| data.windows(2).position(|w| w == b"\n\n").map(|i| i + 2))
        .unwrap_or(data.len());
    data.truncate(end);
    Ok(data)
}
