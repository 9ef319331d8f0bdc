//! # API Facade
//!
//! The API layer is a **thin facade** over the command layer. It is the single
//! entry point for export and import, whatever transport sits in front of it.
//!
//! ## Role and Responsibilities
//!
//! The API facade:
//! - **Owns** the store handle and the loaded [`ArchiveConfig`]
//! - **Builds options** from the caller's string parameters (`*_options`)
//! - **Dispatches** to [`commands::export`] and [`commands::import`]
//! - **Returns structured types** (`ExportSummary`, `ImportReport`)
//!
//! ## What the API Does NOT Do
//!
//! - **Merge logic**: that belongs in `commands/*.rs`
//! - **Transport**: no HTTP, no response headers; the caller supplies the
//!   byte streams and, if it wants one, the keep-alive callback
//! - **Formats**: rendering and parsing of iCalendar, vCard and MIME is the
//!   store's job
//!
//! ## Outcomes
//!
//! An export either fills the output stream or fails with
//! [`ArchiveError::NoData`] when nothing matched. An import returns an
//! [`ImportReport`] even when individual entries failed; only a full store or
//! an unreadable container turns into an `Err`.
//!
//! ## Generic Over ItemStore
//!
//! `ArchiveApi<S: ItemStore>` is generic over the store:
//! - Production: the mailbox implementation of the embedding service
//! - Testing: `ArchiveApi<MemStore>`
//!
//! ## Testing Strategy
//!
//! API tests check that parameters reach the right command and that outcomes
//! come back unchanged. Policy branches are tested in the command modules.

use std::io::{Read, Seek, Write};

use chrono::{DateTime, Utc};

use crate::commands::export::{self, ExportOptions};
use crate::commands::import::{self, ImportOptions};
use crate::commands::{KeepAlive, Params};
use crate::config::ArchiveConfig;
use crate::error::Result;
use crate::model::ItemId;
use crate::naming;
use crate::report::{ExportSummary, ImportReport};
use crate::store::ItemStore;

/// The main facade for archive operations.
pub struct ArchiveApi<S: ItemStore> {
    store: S,
    config: ArchiveConfig,
}

impl<S: ItemStore> ArchiveApi<S> {
    pub fn new(store: S, config: ArchiveConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn export_options(&self, params: &Params) -> Result<ExportOptions> {
        ExportOptions::from_params(params, &self.config)
    }

    pub fn import_options(&self, destination: ItemId, params: &Params) -> Result<ImportOptions> {
        ImportOptions::from_params(destination, params, &self.config)
    }

    pub fn export<W: Write + Seek>(
        &mut self,
        output: W,
        opts: &ExportOptions,
        keep_alive: KeepAlive<'_>,
    ) -> Result<ExportSummary> {
        export::run(&mut self.store, output, opts, &self.config, keep_alive)
    }

    pub fn import<R: Read + Seek>(
        &mut self,
        input: R,
        opts: &ImportOptions,
        keep_alive: KeepAlive<'_>,
    ) -> Result<ImportReport> {
        import::run(&mut self.store, input, opts, &self.config, keep_alive)
    }

    /// Download name for an export of `account`'s mailbox.
    pub fn archive_filename(
        &self,
        opts: &ExportOptions,
        account: &str,
        now: DateTime<Utc>,
    ) -> String {
        naming::archive_filename(
            opts.filename.as_deref(),
            !opts.parts.is_empty(),
            account,
            opts.format,
            now,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Resolve;
    use crate::container::Format;
    use crate::error::ArchiveError;
    use crate::model::{ids, ItemType};
    use crate::store::memory::fixtures::MailboxFixture;
    use crate::store::memory::MemStore;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_export_then_import_through_the_facade() {
        let source = MailboxFixture::new()
            .with_message(ids::INBOX, "hello", "world")
            .store;
        let mut api = ArchiveApi::new(source, ArchiveConfig::default());
        let opts = api.export_options(&params(&[("fmt", "zip")])).unwrap();
        let mut buf = Cursor::new(Vec::new());
        let summary = api.export(&mut buf, &opts, KeepAlive::silent()).unwrap();
        assert!(summary.items > 0);

        let mut target = ArchiveApi::new(MemStore::new(), ArchiveConfig::default());
        let opts = target
            .import_options(ids::USER_ROOT, &params(&[("fmt", "zip"), ("resolve", "replace")]))
            .unwrap();
        assert_eq!(opts.resolve, Resolve::Replace);
        buf.set_position(0);
        let report = target.import(buf, &opts, KeepAlive::silent()).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        let inbox = target.store().items_in(ids::INBOX, ItemType::Message);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].subject, "hello");
    }

    #[test]
    fn test_empty_export_is_no_data() {
        let mut api = ArchiveApi::new(MemStore::new(), ArchiveConfig::default());
        let opts = api.export_options(&params(&[("query", "quarterly")])).unwrap();
        let mut buf = Cursor::new(Vec::new());
        assert!(matches!(
            api.export(&mut buf, &opts, KeepAlive::silent()),
            Err(ArchiveError::NoData)
        ));
        assert!(buf.get_ref().is_empty());
    }

    #[test]
    fn test_garbage_input_is_invalid_format() {
        let mut api = ArchiveApi::new(MemStore::new(), ArchiveConfig::default());
        let opts = ImportOptions {
            format: Format::Zip,
            ..Default::default()
        };
        let err = api
            .import(Cursor::new(b"not an archive".to_vec()), &opts, KeepAlive::silent())
            .unwrap_err();
        assert_eq!(err.code(), "formatter.INVALID_FORMAT");
    }

    #[test]
    fn test_archive_filename() {
        let api = ArchiveApi::new(MemStore::new(), ArchiveConfig::default());
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let opts = api.export_options(&Params::new()).unwrap();
        assert_eq!(
            api.archive_filename(&opts, "user@example.com", now),
            "user@example.com.2024-03-05.7-8-9.tgz"
        );
        let opts = api
            .export_options(&params(&[("filename", "backup.exe"), ("fmt", "zip")]))
            .unwrap();
        assert_eq!(api.archive_filename(&opts, "user", now), "backup.zip");
    }
}
