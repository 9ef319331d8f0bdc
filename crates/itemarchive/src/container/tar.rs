//! Tar and gzip-compressed tar backends.
//!
//! Writing goes through [`tar::Builder::append_data`], which also takes care
//! of GNU long names for paths over 100 bytes. The content of the open entry
//! is held until `close_entry`, since the builder appends whole entries.
//! Reading walks [`tar::Archive::entries`]; the entries borrow the archive,
//! so a reader only exists inside [`read_tar`].
//!
//! The item type code travels in the device major number and the unread bit
//! as a cleared owner-write permission. Names are written as UTF-8 after the
//! pass charset has replaced what it cannot represent; names that are not
//! valid UTF-8 are decoded with the pass charset.

use ::tar::{Archive, Builder, Entries, Entry, EntryType, Header};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

use super::{ArchiveReader, ArchiveWriter, InputEntry, OutputEntry};
use crate::charset::Charset;
use crate::error::{ArchiveError, Result};

const RECORD_SIZE: usize = 512 * 20;
/// Upper bound on the buffer reserved from a declared entry size.
const MAX_PREALLOC: u64 = 1 << 20;

const MODE_READ: u32 = 0o644;
const OWNER_WRITE: u32 = 0o200;

enum Sink<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> Sink<W> {
    fn finish(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(gz) => gz.try_finish(),
        }
    }
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(gz) => gz.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(gz) => gz.flush(),
        }
    }
}

struct OpenEntry {
    header: Header,
    path: String,
    declared: u64,
    data: Vec<u8>,
}

pub struct TarWriter<W: Write> {
    builder: Builder<Sink<W>>,
    charset: Charset,
    current: Option<OpenEntry>,
    closed: bool,
}

impl<W: Write> TarWriter<W> {
    pub fn new(out: W, charset: Charset) -> Self {
        Self::with_sink(Sink::Plain(out), charset)
    }

    pub fn gzip(out: W, charset: Charset) -> Self {
        Self::with_sink(Sink::Gzip(GzEncoder::new(out, Compression::default())), charset)
    }

    fn with_sink(out: Sink<W>, charset: Charset) -> Self {
        Self {
            builder: Builder::new(out),
            charset,
            current: None,
            closed: false,
        }
    }
}

impl<W: Write> ArchiveWriter for TarWriter<W> {
    fn put_next_entry(&mut self, entry: &OutputEntry) -> Result<()> {
        if self.closed {
            return Err(ArchiveError::Container("archive already closed".into()));
        }
        if self.current.is_some() {
            self.close_entry()?;
        }
        let size = entry.declared_size()?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(size);
        header.set_mode(if entry.unread {
            MODE_READ & !OWNER_WRITE
        } else {
            MODE_READ
        });
        header.set_mtime(entry.mod_time.timestamp().max(0) as u64);
        header.set_device_major(u32::from(entry.type_code))?;
        header.set_device_minor(0)?;
        let label: String = entry.label.chars().take(31).collect();
        header.set_groupname(&label)?;

        self.current = Some(OpenEntry {
            header,
            path: self.charset.sanitize(&entry.path).into_owned(),
            declared: size,
            data: Vec::with_capacity(size.min(MAX_PREALLOC) as usize),
        });
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| ArchiveError::Container("write outside of an entry".into()))?;
        if current.data.len() as u64 + buf.len() as u64 > current.declared {
            return Err(ArchiveError::Container(format!(
                "entry {} exceeds its declared size of {} bytes",
                current.path, current.declared
            )));
        }
        current.data.extend_from_slice(buf);
        Ok(())
    }

    fn close_entry(&mut self) -> Result<()> {
        let Some(mut current) = self.current.take() else {
            return Ok(());
        };
        if current.data.len() as u64 != current.declared {
            return Err(ArchiveError::Container(format!(
                "entry {} closed after {} of {} bytes",
                current.path,
                current.data.len(),
                current.declared
            )));
        }
        self.builder
            .append_data(&mut current.header, &current.path, current.data.as_slice())?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.close_entry()?;
        self.builder.finish()?;
        self.builder.get_mut().finish()?;
        self.closed = true;
        Ok(())
    }

    fn record_size(&self) -> usize {
        RECORD_SIZE
    }
}

enum Source<R: Read> {
    Plain(R),
    Gzip(GzDecoder<R>),
}

impl<R: Read> Read for Source<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Plain(r) => r.read(buf),
            Source::Gzip(gz) => gz.read(buf),
        }
    }
}

/// Reader over the entries of an open [`Archive`].
pub struct TarReader<'a, R: Read + 'a> {
    entries: Entries<'a, Source<R>>,
    current: Option<Entry<'a, Source<R>>>,
    charset: Charset,
    started: bool,
}

impl<'a, R: Read + 'a> TarReader<'a, R> {
    fn advance(&mut self) -> Result<Option<InputEntry>> {
        self.current = None;
        for entry in self.entries.by_ref() {
            let entry = entry?;
            let header = entry.header();
            if !matches!(
                header.entry_type(),
                EntryType::Regular | EntryType::Continuous
            ) {
                continue;
            }
            let mode = header.mode().unwrap_or(MODE_READ);
            let type_code = header
                .device_major()
                .ok()
                .flatten()
                .and_then(|major| u8::try_from(major).ok())
                .unwrap_or(0);
            let mtime = header.mtime().unwrap_or(0);
            let name_bytes = entry.path_bytes();
            let name = match std::str::from_utf8(&name_bytes) {
                Ok(name) => name.to_string(),
                Err(_) => self.charset.decode(&name_bytes),
            };
            let input = InputEntry {
                name,
                size: Some(entry.size()),
                type_code,
                mod_time: DateTime::<Utc>::from_timestamp(mtime as i64, 0).unwrap_or_default(),
                unread: mode & OWNER_WRITE == 0,
            };
            self.current = Some(entry);
            return Ok(Some(input));
        }
        Ok(None)
    }
}

impl<'a, R: Read + 'a> ArchiveReader for TarReader<'a, R> {
    fn next_entry(&mut self) -> Result<Option<InputEntry>> {
        let first = !self.started;
        self.started = true;
        match self.advance() {
            // an unreadable first header means this is not a tar stream at all
            Err(ArchiveError::Io(e)) if first => Err(ArchiveError::InvalidFormat(e.to_string())),
            other => other,
        }
    }
}

impl<'a, R: Read + 'a> Read for TarReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.current.as_mut() {
            Some(entry) => entry.read(buf),
            None => Ok(0),
        }
    }
}

fn read_source<R, T, F>(source: Source<R>, charset: Charset, read: F) -> Result<T>
where
    R: Read,
    F: FnOnce(&mut dyn ArchiveReader) -> Result<T>,
{
    let mut archive = Archive::new(source);
    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::InvalidFormat(e.to_string()))?;
    let mut reader = TarReader {
        entries,
        current: None,
        charset,
        started: false,
    };
    read(&mut reader)
}

/// Reads a plain tar stream.
pub fn read_tar<R, T, F>(input: R, charset: Charset, read: F) -> Result<T>
where
    R: Read,
    F: FnOnce(&mut dyn ArchiveReader) -> Result<T>,
{
    read_source(Source::Plain(input), charset, read)
}

/// Reads a gzip-compressed tar stream.
pub fn read_tgz<R, T, F>(input: R, charset: Charset, read: F) -> Result<T>
where
    R: Read,
    F: FnOnce(&mut dyn ArchiveReader) -> Result<T>,
{
    read_source(Source::Gzip(GzDecoder::new(input)), charset, read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_entries(entries: &[(&str, &[u8], u8, bool)]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = TarWriter::new(&mut out, Charset::Utf8);
            for (path, data, code, unread) in entries {
                let mut entry = writer.new_entry(path, "document", *code, Utc::now());
                entry.set_size(data.len() as u64);
                if *unread {
                    entry.set_unread();
                }
                writer.put_next_entry(&entry).unwrap();
                writer.write(data).unwrap();
                writer.close_entry().unwrap();
            }
            writer.close().unwrap();
        }
        out
    }

    /// Every entry with its content, in archive order.
    fn read_all(bytes: Vec<u8>) -> Result<Vec<(InputEntry, Vec<u8>)>> {
        read_tar(Cursor::new(bytes), Charset::Utf8, |reader| {
            let mut out = Vec::new();
            while let Some(entry) = reader.next_entry()? {
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                out.push((entry, data));
            }
            Ok(out)
        })
    }

    #[test]
    fn test_long_names_survive() {
        let long = format!("Briefcase/{}/file.txt", "deep".repeat(40));
        let entries = read_all(write_entries(&[(&long, b"abc", 8, false)])).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.name, long);
        assert_eq!(entries[0].0.type_code, 8);
        assert_eq!(entries[0].1, b"abc");
    }

    #[test]
    fn test_unread_entries_skip_without_reading() {
        let bytes = write_entries(&[
            ("a.eml", &[b'x'; 700], 5, true),
            ("b.eml", b"second", 5, false),
        ]);
        read_tar(Cursor::new(bytes), Charset::Utf8, |reader| {
            let a = reader.next_entry()?.unwrap();
            assert!(a.unread);
            assert_eq!(a.size, Some(700));
            let b = reader.next_entry()?.unwrap();
            assert_eq!(b.name, "b.eml");
            assert!(!b.unread);
            let mut data = String::new();
            reader.read_to_string(&mut data)?;
            assert_eq!(data, "second");
            assert!(reader.next_entry()?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_garbage_is_invalid_format() {
        let result = read_tar(Cursor::new(vec![7u8; 1024]), Charset::Utf8, |reader| {
            reader.next_entry().map(|_| ())
        });
        assert!(matches!(result, Err(ArchiveError::InvalidFormat(_))));

        let result = read_tgz(Cursor::new(b"not gzip".to_vec()), Charset::Utf8, |reader| {
            reader.next_entry().map(|_| ())
        });
        assert!(matches!(result, Err(ArchiveError::InvalidFormat(_))));
    }

    #[test]
    fn test_short_entry_is_rejected() {
        let mut out = Vec::new();
        let mut writer = TarWriter::new(&mut out, Charset::Utf8);
        let mut entry = writer.new_entry("a", "note", 9, Utc::now());
        entry.set_size(10);
        writer.put_next_entry(&entry).unwrap();
        writer.write(b"short").unwrap();
        assert!(matches!(
            writer.close_entry(),
            Err(ArchiveError::Container(_))
        ));
    }

    #[test]
    fn test_overlong_write_is_rejected() {
        let mut out = Vec::new();
        let mut writer = TarWriter::new(&mut out, Charset::Utf8);
        let mut entry = writer.new_entry("a", "note", 9, Utc::now());
        entry.set_size(2);
        writer.put_next_entry(&entry).unwrap();
        assert!(writer.write(b"abc").is_err());
    }

    #[test]
    fn test_reads_archives_from_tar_builder() {
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "Briefcase/plain.txt", &b"data"[..])
            .unwrap();
        let mut dir = Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_size(0);
        builder
            .append_data(&mut dir, "Briefcase/sub/", io::empty())
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        let entries = read_all(bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.name, "Briefcase/plain.txt");
        assert_eq!(entries[0].0.type_code, 0);
        assert_eq!(entries[0].1, b"data");
    }

    #[test]
    fn test_output_is_readable_by_tar_archive() {
        let mut out = Vec::new();
        {
            let mut writer = TarWriter::gzip(&mut out, Charset::Utf8);
            let mut entry = writer.new_entry("Notes/0000000301-call.note", "note", 9, Utc::now());
            entry.set_size(4);
            writer.put_next_entry(&entry).unwrap();
            writer.write(b"call").unwrap();
            writer.close().unwrap();
        }
        let mut archive = Archive::new(GzDecoder::new(Cursor::new(out)));
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(&*entry.path_bytes(), b"Notes/0000000301-call.note");
        assert_eq!(entry.header().groupname().unwrap(), Some("note"));
        let mut data = String::new();
        entry.read_to_string(&mut data).unwrap();
        assert_eq!(data, "call");
        drop(entry);
        assert!(entries.next().is_none());
    }
}
