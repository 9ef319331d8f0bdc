//! # Entry Naming
//!
//! Archive entry paths are derived from item identity and must be safe for
//! every container backend: bounded in length, free of filesystem-illegal
//! characters, and unique within one archive even when names only differ
//! by case.
//!
//! Two schemes are used:
//!
//! - **Prefixed**: the leaf is the item's name (or subject), prefixed with a
//!   zero-padded 10 digit item id. Items without any name become
//!   `<type>-<id>`. Versioned items carry a `-NNNNN` version suffix. The id
//!   prefix makes names unique without tracking what has been used.
//! - **Unique set**: the leaf is used as given, and a `-NN` counter is added
//!   until the lower-cased path has not been seen before in this pass.
//!
//! Folder path segments go through a separate filter that keeps `/`.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use crate::charset::Charset;
use crate::container::Format;
use crate::model::{Item, ItemId};

/// Characters not allowed in entry leaf names.
pub const ILLEGAL_FILE_CHARS: &[char] = &['/', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Characters not allowed in folder path segments.
pub const ILLEGAL_FOLDER_CHARS: &[char] = &[':', '*', '?', '"', '<', '>', '|', '\0'];

pub const DEFAULT_MAX_NAME_LENGTH: usize = 120;

/// User supplied download names never keep these extensions.
static BLOCKED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "TAR", "ZIP", "TGZ", "A6P", "AC", "AS", "ACR", "ACTION", "AIR", "APP", "AWK", "BAT",
        "CGI", "CMD", "COM", "CSH", "DEK", "DLD", "DS", "EBM", "ESH", "EXE", "EZS", "FKY", "FRS",
        "FXP", "GADGET", "HMS", "HTA", "ICD", "INX", "IPF", "ISU", "JAR", "JS", "JSE", "JSX",
        "KIX", "LUA", "MCR", "MEM", "MPX", "MS", "MSI", "MST", "OBS", "PAF", "PEX", "PIF", "PRC",
        "PRG", "PVD", "PWC", "PY", "PYC", "PYO", "QPX", "RBX", "REG", "RGS", "ROX", "RPJ", "SCAR",
        "SCR", "SCRIPT", "SCT", "SHB", "SHS", "SPR", "TLB", "TMS", "U3P", "UDF", "VB", "VBE",
        "VBS", "VBSCRIPT", "WCM", "WPK", "WS", "WSF", "XQT",
    ]
    .into_iter()
    .collect()
});

fn replace_chars(s: &str, illegal: &[char]) -> String {
    s.chars()
        .map(|c| if illegal.contains(&c) { '_' } else { c })
        .collect()
}

fn truncate_bytes(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Normalises a folder path into an archive directory segment.
///
/// The leading `/` is dropped; the user root becomes the empty string.
pub fn folder_segment(path: &str, charset: Charset) -> String {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    replace_chars(&charset.sanitize(trimmed), ILLEGAL_FOLDER_CHARS)
}

/// Builds the leaf name of an entry, without folder or extension.
///
/// `name` overrides the item's own name when non-empty. With `prefix`, the
/// item id is prepended to any non-empty name.
pub fn leaf_name(
    item: &Item,
    name: Option<&str>,
    charset: Charset,
    prefix: bool,
    max_len: usize,
) -> String {
    let base = [name.unwrap_or_default(), item.name.as_str(), item.subject.as_str()]
        .into_iter()
        .find(|n| !n.is_empty())
        .unwrap_or_default();

    let mut leaf = charset.sanitize(base).into_owned();
    if leaf.is_empty() {
        leaf = format!("{}-{}", item.item_type().name(), item.id);
    } else {
        if prefix {
            leaf = format!("{:010}-{}", item.id, leaf);
        }
        truncate_bytes(&mut leaf, max_len);
    }

    if item.is_versioned() {
        let suffix = format!("-{:05}", item.version);
        match leaf.rfind('.') {
            Some(dot) if leaf.len() - dot <= 5 => leaf.insert_str(dot, &suffix),
            _ => leaf.push_str(&suffix),
        }
    }

    let mut leaf = replace_chars(&leaf, ILLEGAL_FILE_CHARS).trim().to_string();
    while leaf.ends_with('.') {
        leaf.pop();
        leaf = leaf.trim_end().to_string();
    }
    leaf
}

/// Cleans a caller-supplied leaf, such as an attachment filename.
pub fn clean_leaf(name: &str, charset: Charset) -> String {
    replace_chars(&charset.sanitize(name), ILLEGAL_FILE_CHARS)
        .trim()
        .to_string()
}

/// Joins folder, leaf and optional extension into an entry path.
pub fn entry_path(folder: &str, leaf: &str, ext: Option<&str>) -> String {
    let mut path = if folder.is_empty() {
        leaf.to_string()
    } else {
        format!("{}/{}", folder, leaf)
    };
    if let Some(ext) = ext.filter(|e| !e.is_empty()) {
        path.push('.');
        path.push_str(ext);
    }
    path
}

/// Set of entry paths already handed out, compared case-insensitively.
#[derive(Debug, Default)]
pub struct UniqueNames {
    used: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `folder/leaf[-NN][.ext]`, the first candidate not yet used.
    pub fn claim(&mut self, folder: &str, leaf: &str, ext: Option<&str>) -> String {
        let mut counter = 0u32;
        loop {
            let candidate = if counter == 0 {
                entry_path(folder, leaf, ext)
            } else {
                entry_path(folder, &format!("{}-{:02}", leaf, counter), ext)
            };
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

/// Per-pass cache of archive directory names keyed by folder id.
///
/// Once a folder has handed out more than `batch_size` non-folder entries,
/// later entries land in `<dir>!<batch>` so no directory grows unbounded.
#[derive(Debug)]
pub struct FolderDirs {
    batch_size: usize,
    dirs: HashMap<ItemId, String>,
    counts: HashMap<ItemId, usize>,
}

impl FolderDirs {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            dirs: HashMap::new(),
            counts: HashMap::new(),
        }
    }

    /// Directory for `item`, computing it with `lookup` the first time its
    /// folder is seen.
    pub fn dir_for<E>(
        &mut self,
        item: &Item,
        lookup: impl FnOnce() -> Result<String, E>,
    ) -> Result<String, E> {
        let folder_id = item.folder_id;
        let dir = match self.dirs.get(&folder_id) {
            Some(dir) => dir.clone(),
            None => {
                let dir = lookup()?;
                self.dirs.insert(folder_id, dir.clone());
                dir
            }
        };
        if item.is_folder_like() {
            return Ok(dir);
        }
        let count = self.counts.entry(folder_id).or_insert(0);
        let batch = *count / self.batch_size;
        *count += 1;
        if batch > 0 {
            Ok(format!("{}!{}", dir, batch))
        } else {
            Ok(dir)
        }
    }
}

/// Download name for an export.
///
/// A user supplied name loses a blocked extension; without one, the name is
/// `attachments` for part exports or `<account>.<date>.<H-m-s>` otherwise.
/// The container extension is always present on the result.
pub fn archive_filename(
    requested: Option<&str>,
    has_parts: bool,
    account: &str,
    format: Format,
    now: DateTime<Utc>,
) -> String {
    let ext = format!(".{}", format.extension());
    let mut filename = match requested.filter(|f| !f.is_empty()) {
        None if has_parts => "attachments".to_string(),
        None => format!("{}.{}", account, now.format("%Y-%m-%d.%-H-%-M-%-S")),
        Some(name) => match name.rfind('.') {
            Some(dot) if BLOCKED_EXTENSIONS.contains(name[dot + 1..].to_uppercase().as_str()) => {
                name[..dot].to_string()
            }
            _ => name.to_string(),
        },
    };
    if !filename.ends_with(&ext) {
        filename.push_str(&ext);
    }
    filename
}
