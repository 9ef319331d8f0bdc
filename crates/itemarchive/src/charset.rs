//! Charsets for archive entry names.
//!
//! Entry names are encoded with the charset requested for the archive.
//! Characters the charset cannot represent are replaced with `#` before
//! encoding, so names survive the round trip in a recognisable form.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::ArchiveError;

pub const REPLACEMENT: char = '#';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    pub fn can_encode(self, c: char) -> bool {
        match self {
            Charset::Utf8 => true,
            Charset::Latin1 => (c as u32) <= 0xFF,
            Charset::Ascii => c.is_ascii(),
        }
    }

    /// Replaces unencodable characters with `#`.
    pub fn sanitize(self, s: &str) -> Cow<'_, str> {
        if s.chars().all(|c| self.can_encode(c)) {
            Cow::Borrowed(s)
        } else {
            Cow::Owned(
                s.chars()
                    .map(|c| if self.can_encode(c) { c } else { REPLACEMENT })
                    .collect(),
            )
        }
    }

    pub fn encode(self, s: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => s.as_bytes().to_vec(),
            Charset::Latin1 | Charset::Ascii => self
                .sanitize(s)
                .chars()
                .map(|c| c as u32 as u8)
                .collect(),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 => bytes.iter().map(|b| *b as char).collect(),
            Charset::Ascii => bytes
                .iter()
                .map(|b| if b.is_ascii() { *b as char } else { REPLACEMENT })
                .collect(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Ascii => "US-ASCII",
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" => Ok(Charset::Latin1),
            "us-ascii" | "ascii" => Ok(Charset::Ascii),
            other => Err(ArchiveError::InvalidFormat(format!(
                "unsupported charset: {}",
                other
            ))),
        }
    }
}
