//! Pass outcomes handed back to the caller.
//!
//! An import never fails because individual entries failed: each problem is
//! recorded in [`ImportReport`] and the pass moves on. Only fatal conditions
//! surface as an `Err` from the command itself.

use serde::Serialize;
use tracing::warn;

use crate::error::ArchiveError;
use crate::model::ItemType;

/// One recovered failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    pub message: String,
    pub item_type: Option<ItemType>,
    pub path: Option<String>,
    pub code: &'static str,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    /// Items created or updated.
    pub imported: usize,
    /// Items matched against existing ones and left alone, or filtered out.
    pub skipped: usize,
    pub errors: Vec<ReportedError>,
}

impl ImportReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, err: &ArchiveError, item_type: Option<ItemType>, path: Option<&str>) {
        warn!(
            code = err.code(),
            path = path.unwrap_or_default(),
            item_type = item_type.map(ItemType::name).unwrap_or_default(),
            "import error: {}",
            err
        );
        self.errors.push(ReportedError {
            message: err.to_string(),
            item_type,
            path: path.map(str::to_string),
            code: err.code(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.errors.iter().map(|e| e.code).collect()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Items that produced at least one entry.
    pub items: usize,
    pub entries: usize,
    /// Content entries padded because the store returned fewer bytes than declared.
    pub truncated: usize,
    /// Items left out because of a store fault or a filter.
    pub skipped: usize,
}
