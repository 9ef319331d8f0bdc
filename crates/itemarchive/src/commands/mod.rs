//! # Command Layer
//!
//! The two passes of the engine live here, each in its own submodule:
//!
//! - [`export`]: walks a selection of items and writes them, with their
//!   metadata records, into a container.
//! - [`import`]: reads a container back and merges every entry into the
//!   store under a [`Resolve`] policy.
//!
//! Commands operate on an [`ItemStore`](crate::store::ItemStore) and the
//! container traits only. They do not parse requests or touch the network;
//! per-pass options are plain structs, built either directly or from the
//! caller's string parameters with `from_params`.
//!
//! ## Testing Strategy
//!
//! Command tests run against [`MemStore`](crate::store::memory::MemStore)
//! and in-memory containers. They cover every policy branch and every
//! reported error kind.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::{ArchiveError, Result};
use crate::model::{parse_type_set, ItemId, ItemType, TypeSet};

pub mod export;
pub mod import;

/// Caller-level parameters, as received by the front end.
pub type Params = HashMap<String, String>;

/// Trimmed, non-empty parameter value.
pub(crate) fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Boolean switch: `0`, `false` and `no` turn it off, anything else on.
pub(crate) fn switch(params: &Params, key: &str, default: bool) -> bool {
    match param(params, key) {
        None => default,
        Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"),
    }
}

/// Milliseconds since the epoch; `0` counts as unset.
pub(crate) fn time_param(params: &Params, key: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = param(params, key) else {
        return Ok(None);
    };
    let millis: i64 = raw
        .parse()
        .map_err(|_| ArchiveError::InvalidRequest(format!("{}: not a timestamp: {}", key, raw)))?;
    if millis == 0 {
        return Ok(None);
    }
    DateTime::from_timestamp_millis(millis)
        .map(Some)
        .ok_or_else(|| ArchiveError::InvalidRequest(format!("{}: out of range: {}", key, raw)))
}

/// Comma separated item ids.
pub(crate) fn id_list(params: &Params, key: &str) -> Result<Option<Vec<ItemId>>> {
    let Some(raw) = param(params, key) else {
        return Ok(None);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| {
                ArchiveError::InvalidRequest(format!("{}: invalid item id: {}", key, s))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// The `types` filter. Conversations are never part of it.
pub(crate) fn type_filter(params: &Params) -> Result<Option<TypeSet>> {
    let Some(raw) = param(params, "types") else {
        return Ok(None);
    };
    let mut types = parse_type_set(raw)?;
    types.remove(&ItemType::Conversation);
    Ok((!types.is_empty()).then_some(types))
}

/// Keep-alive interval from `timeout`, in milliseconds.
pub(crate) fn interval_param(params: &Params, default_ms: u64) -> Result<Duration> {
    let ms = match param(params, "timeout") {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ArchiveError::InvalidRequest(format!("invalid timeout: {}", raw)))?,
        None => default_ms,
    };
    Ok(Duration::from_millis(ms))
}

/// How an incoming item is reconciled with an existing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Resolve {
    /// Update tags, flags, color and revision-able content in place.
    Modify,
    /// Delete the existing item and create the incoming one.
    Replace,
    /// Empty the destination first, then behave like `Replace`.
    Reset,
    /// Leave existing items untouched.
    #[default]
    Skip,
}

impl FromStr for Resolve {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modify" => Ok(Resolve::Modify),
            "replace" => Ok(Resolve::Replace),
            "reset" => Ok(Resolve::Reset),
            "skip" | "" => Ok(Resolve::Skip),
            other => Err(ArchiveError::InvalidRequest(format!(
                "unknown resolve policy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Resolve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resolve::Modify => "modify",
            Resolve::Replace => "replace",
            Resolve::Reset => "reset",
            Resolve::Skip => "skip",
        })
    }
}

/// Rate-limited "still working" signal for long passes.
///
/// A pass paces the signal with its own `keep_alive` interval, so callers
/// only supply the callback.
pub struct KeepAlive<'a> {
    interval: Duration,
    last: Instant,
    signal: Option<&'a mut dyn FnMut()>,
}

impl<'a> KeepAlive<'a> {
    /// Fires on every tick until paced with [`KeepAlive::every`].
    pub fn new(signal: &'a mut dyn FnMut()) -> Self {
        Self {
            interval: Duration::ZERO,
            last: Instant::now(),
            signal: Some(signal),
        }
    }

    pub fn silent() -> Self {
        Self {
            interval: Duration::MAX,
            last: Instant::now(),
            signal: None,
        }
    }

    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fires the signal if the interval has elapsed since the last one.
    pub fn tick(&mut self) {
        let Some(signal) = self.signal.as_mut() else {
            return;
        };
        if self.last.elapsed() >= self.interval {
            signal();
            self.last = Instant::now();
        }
    }
}

impl fmt::Debug for KeepAlive<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlive")
            .field("interval", &self.interval)
            .field("armed", &self.signal.is_some())
            .finish()
    }
}
