//! Zip backend.
//!
//! Zip has no slot for a type code, so entries read back with type `0`.
//! The label and unread bit travel as the entry comment (`message-unread`),
//! stored in the Info-ZIP Unicode Comment extra field since the writer has
//! no per-file comment of its own. Entry names are always stored as UTF-8;
//! the pass charset only sanitizes them.

use ::zip::read::ZipArchive;
use ::zip::write::FileOptions;
use ::zip::CompressionMethod;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::io::{self, Cursor, Read, Seek, Write};

use super::{ArchiveReader, ArchiveWriter, InputEntry, OutputEntry};
use crate::charset::Charset;
use crate::error::{ArchiveError, Result};

pub const UNREAD_SUFFIX: &str = "-unread";

const UNICODE_COMMENT_FIELD: u16 = 0x6375;
const RECORD_SIZE: usize = 2048;

/// Upper bound on the buffer reserved from a declared entry size.
const MAX_PREALLOC: usize = 1 << 20;

fn comment_field(comment: &str) -> Vec<u8> {
    let text = comment.as_bytes();
    let mut field = Vec::with_capacity(9 + text.len());
    field.extend_from_slice(&UNICODE_COMMENT_FIELD.to_le_bytes());
    field.extend_from_slice(&((5 + text.len()) as u16).to_le_bytes());
    field.push(1);
    // crc of the plain comment field, which is always empty
    field.extend_from_slice(&crc32fast::hash(b"").to_le_bytes());
    field.extend_from_slice(text);
    field
}

fn find_comment(extra: &[u8]) -> Option<String> {
    let mut rest = extra;
    while rest.len() >= 4 {
        let id = u16::from_le_bytes([rest[0], rest[1]]);
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        let data = rest.get(4..4 + len)?;
        if id == UNICODE_COMMENT_FIELD && data.len() >= 5 && data[0] == 1 {
            return Some(String::from_utf8_lossy(&data[5..]).into_owned());
        }
        rest = &rest[4 + len..];
    }
    None
}

fn to_zip_time(time: DateTime<Utc>) -> ::zip::DateTime {
    ::zip::DateTime::from_date_and_time(
        u16::try_from(time.year()).unwrap_or(1980),
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .unwrap_or_default()
}

fn from_zip_time(time: ::zip::DateTime) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )
    .single()
    .unwrap_or_default()
}

struct OpenEntry {
    path: String,
    declared: u64,
    written: u64,
}

pub struct ZipWriter<W: Write + Seek> {
    zip: ::zip::ZipWriter<W>,
    charset: Charset,
    current: Option<OpenEntry>,
    closed: bool,
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(out: W, charset: Charset) -> Self {
        Self {
            zip: ::zip::ZipWriter::new(out),
            charset,
            current: None,
            closed: false,
        }
    }
}

impl<W: Write + Seek> ArchiveWriter for ZipWriter<W> {
    fn put_next_entry(&mut self, entry: &OutputEntry) -> Result<()> {
        if self.closed {
            return Err(ArchiveError::Container("archive already closed".into()));
        }
        if self.current.is_some() {
            self.close_entry()?;
        }
        let size = entry.declared_size()?;
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(to_zip_time(entry.mod_time))
            .large_file(size >= u64::from(u32::MAX));
        let comment = if entry.unread {
            format!("{}{}", entry.label, UNREAD_SUFFIX)
        } else {
            entry.label.clone()
        };

        let name = self.charset.sanitize(&entry.path).into_owned();
        self.zip.start_file_with_extra_data(name, options)?;
        self.zip.write_all(&comment_field(&comment))?;
        self.zip.end_extra_data()?;

        self.current = Some(OpenEntry {
            path: entry.path.clone(),
            declared: size,
            written: 0,
        });
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| ArchiveError::Container("write outside of an entry".into()))?;
        if current.written + buf.len() as u64 > current.declared {
            return Err(ArchiveError::Container(format!(
                "entry {} exceeds its declared size of {} bytes",
                current.path, current.declared
            )));
        }
        current.written += buf.len() as u64;
        self.zip.write_all(buf)?;
        Ok(())
    }

    fn close_entry(&mut self) -> Result<()> {
        match self.current.take() {
            Some(current) if current.written != current.declared => {
                Err(ArchiveError::Container(format!(
                    "entry {} closed after {} of {} bytes",
                    current.path, current.written, current.declared
                )))
            }
            _ => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.close_entry()?;
        self.zip.finish()?;
        self.closed = true;
        Ok(())
    }

    fn record_size(&self) -> usize {
        RECORD_SIZE
    }
}

pub struct ZipReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    index: usize,
    current: Cursor<Vec<u8>>,
}

impl<R: Read + Seek> ZipReader<R> {
    pub fn open(input: R, _charset: Charset) -> Result<Self> {
        let archive =
            ZipArchive::new(input).map_err(|e| ArchiveError::InvalidFormat(e.to_string()))?;
        Ok(Self {
            archive,
            index: 0,
            current: Cursor::new(Vec::new()),
        })
    }
}

impl<R: Read + Seek> ArchiveReader for ZipReader<R> {
    fn next_entry(&mut self) -> Result<Option<InputEntry>> {
        while self.index < self.archive.len() {
            let mut file = self.archive.by_index(self.index)?;
            self.index += 1;
            if file.is_dir() {
                continue;
            }
            let comment = find_comment(file.extra_data())
                .unwrap_or_else(|| file.comment().to_string());
            let entry = InputEntry {
                name: file.name().to_string(),
                size: Some(file.size()),
                type_code: 0,
                mod_time: from_zip_time(file.last_modified()),
                unread: comment.ends_with(UNREAD_SUFFIX),
            };
            let declared = usize::try_from(file.size()).unwrap_or(usize::MAX);
            let mut data = Vec::with_capacity(declared.min(MAX_PREALLOC));
            file.read_to_end(&mut data)?;
            self.current = Cursor::new(data);
            return Ok(Some(entry));
        }
        self.current = Cursor::new(Vec::new());
        Ok(None)
    }
}

impl<R: Read + Seek> Read for ZipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.current.read(buf)
    }
}
