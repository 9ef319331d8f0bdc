//! # Containers
//!
//! A container is an ordered sequence of named, sized, timestamped entries.
//! Export writes entries through [`ArchiveWriter`] and import reads them back
//! through [`ArchiveReader`]; neither side knows which backend it talks to.
//!
//! Backends differ in how much entry metadata survives:
//!
//! | | tar / tgz | zip |
//! |---|---|---|
//! | type code | device major number | not stored (reads as `0`) |
//! | unread bit | owner write permission cleared | `-unread` comment suffix |
//! | label | group name | entry comment |
//!
//! Every backend needs the entry size before the entry is started. Readers
//! are scoped: [`read_archive`] hands one to a callback, since a tar reader
//! borrows the archive it walks.

pub mod tar;
pub mod zip;

use chrono::{DateTime, Utc};
use std::io::{Read, Seek, Write};

use crate::charset::Charset;
use crate::error::{ArchiveError, Result};

pub use self::tar::{read_tar, read_tgz, TarReader, TarWriter};
pub use self::zip::{ZipReader, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Tar,
    Tgz,
    Zip,
}

impl Format {
    /// Maps a file extension (with or without the dot) to a format.
    ///
    /// Anything that is neither tar nor tgz is treated as zip.
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "tar" => Format::Tar,
            "tgz" | "gz" | "tar.gz" => Format::Tgz,
            _ => Format::Zip,
        }
    }

    pub fn from_filename(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") {
            return Format::Tgz;
        }
        match lower.rfind('.') {
            Some(dot) => Format::from_extension(&lower[dot + 1..]),
            None => Format::Zip,
        }
    }

    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        match mime.to_ascii_lowercase().as_str() {
            "application/x-tar" => Format::Tar,
            "application/x-compressed-tar" | "application/x-gzip" | "application/gzip" => {
                Format::Tgz
            }
            _ => Format::Zip,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Tar => "tar",
            Format::Tgz => "tgz",
            Format::Zip => "zip",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Tar => "application/x-tar",
            Format::Tgz => "application/x-compressed-tar",
            Format::Zip => "application/zip",
        }
    }
}

/// An entry about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    pub path: String,
    /// Human readable item type name.
    pub label: String,
    pub type_code: u8,
    pub mod_time: DateTime<Utc>,
    pub size: Option<u64>,
    pub unread: bool,
}

impl OutputEntry {
    pub fn new(
        path: impl Into<String>,
        label: impl Into<String>,
        type_code: u8,
        mod_time: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
            type_code,
            mod_time,
            size: None,
            unread: false,
        }
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = Some(size);
    }

    pub fn set_unread(&mut self) {
        self.unread = true;
    }

    pub(crate) fn declared_size(&self) -> Result<u64> {
        self.size.ok_or_else(|| {
            ArchiveError::Container(format!("entry {} started without a size", self.path))
        })
    }
}

/// An entry read back from a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEntry {
    pub name: String,
    /// `None` when the container does not know the size up front.
    pub size: Option<u64>,
    /// Zero when the container cannot carry a type code.
    pub type_code: u8,
    pub mod_time: DateTime<Utc>,
    pub unread: bool,
}

/// Forward-only entry reader. Reading yields the current entry's content.
///
/// Advancing skips whatever was left unread of the previous entry.
pub trait ArchiveReader: Read {
    fn next_entry(&mut self) -> Result<Option<InputEntry>>;
}

pub trait ArchiveWriter {
    fn new_entry(
        &self,
        path: &str,
        label: &str,
        type_code: u8,
        mod_time: DateTime<Utc>,
    ) -> OutputEntry {
        OutputEntry::new(path, label, type_code, mod_time)
    }

    /// Starts an entry, closing the previous one if still open.
    fn put_next_entry(&mut self, entry: &OutputEntry) -> Result<()>;

    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Ends the current entry. Fails if fewer bytes than declared were written.
    fn close_entry(&mut self) -> Result<()>;

    /// Finishes the container. No entries may be written afterwards.
    fn close(&mut self) -> Result<()>;

    /// Natural write granularity, used to size copy buffers.
    fn record_size(&self) -> usize;
}

/// Opens `input` as a `format` container and passes its reader to `read`.
pub fn read_archive<R, T, F>(format: Format, input: R, charset: Charset, read: F) -> Result<T>
where
    R: Read + Seek,
    F: FnOnce(&mut dyn ArchiveReader) -> Result<T>,
{
    match format {
        Format::Tar => read_tar(input, charset, read),
        Format::Tgz => read_tgz(input, charset, read),
        Format::Zip => {
            let mut reader = ZipReader::open(input, charset)?;
            read(&mut reader)
        }
    }
}

pub fn open_writer<'a, W>(
    format: Format,
    output: W,
    charset: Charset,
) -> Box<dyn ArchiveWriter + 'a>
where
    W: Write + Seek + 'a,
{
    match format {
        Format::Tar => Box::new(TarWriter::new(output, charset)),
        Format::Tgz => Box::new(TarWriter::gzip(output, charset)),
        Format::Zip => Box::new(ZipWriter::new(output, charset)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_format_mapping() {
        assert_eq!(Format::from_extension("tar"), Format::Tar);
        assert_eq!(Format::from_extension(".TGZ"), Format::Tgz);
        assert_eq!(Format::from_extension("zip"), Format::Zip);
        assert_eq!(Format::from_extension("bin"), Format::Zip);
        assert_eq!(Format::from_filename("backup.tar.gz"), Format::Tgz);
        assert_eq!(Format::from_filename("export"), Format::Zip);
        assert_eq!(
            Format::from_content_type("application/x-tar; charset=binary"),
            Format::Tar
        );
        assert_eq!(Format::from_content_type("application/zip"), Format::Zip);
    }

    fn round_trip(format: Format) {
        let when = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = open_writer(format, &mut buf, Charset::Utf8);
            let mut entry = writer.new_entry("Inbox/0000000300-hi.eml", "message", 5, when);
            entry.set_size(5);
            entry.set_unread();
            writer.put_next_entry(&entry).unwrap();
            writer.write(b"hello").unwrap();
            writer.close_entry().unwrap();

            let mut empty = writer.new_entry("Inbox/x.err", "message", 5, when);
            empty.set_size(0);
            writer.put_next_entry(&empty).unwrap();
            writer.close().unwrap();
        }

        buf.set_position(0);
        read_archive(format, buf, Charset::Utf8, |reader| {
            let first = reader.next_entry()?.unwrap();
            assert_eq!(first.name, "Inbox/0000000300-hi.eml");
            assert_eq!(first.size, Some(5));
            assert!(first.unread);
            assert_eq!(first.mod_time.timestamp(), when.timestamp());
            let mut body = String::new();
            reader.read_to_string(&mut body)?;
            assert_eq!(body, "hello");

            let second = reader.next_entry()?.unwrap();
            assert_eq!(second.name, "Inbox/x.err");
            assert_eq!(second.size, Some(0));
            assert!(!second.unread);
            assert!(reader.next_entry()?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_tar_round_trip() {
        round_trip(Format::Tar);
    }

    #[test]
    fn test_tgz_round_trip() {
        round_trip(Format::Tgz);
    }

    #[test]
    fn test_zip_round_trip() {
        round_trip(Format::Zip);
    }

    #[test]
    fn test_put_requires_size() {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = open_writer(Format::Tar, &mut buf, Charset::Utf8);
        let entry = writer.new_entry("a", "document", 8, Utc::now());
        assert!(matches!(
            writer.put_next_entry(&entry),
            Err(ArchiveError::Container(_))
        ));
    }
}
