//! # Item Archive Architecture
//!
//! `itemarchive` moves the contents of a hierarchical mailbox (folders,
//! messages, contacts, calendar entries, documents, notes, tags) in and out of
//! tar, tgz and zip archives. Export writes every item as a metadata record
//! plus its content; import reads an archive back and merges it into an
//! existing mailbox under a conflict policy.
//!
//! The crate is a library. It owns no mailbox state and speaks no transport.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (api.rs)                                         │
//! │  - ArchiveApi facade, options from caller parameters        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Command Layer (commands/)                                  │
//! │  - export: selection, naming, revisions, truncation marks   │
//! │  - import: pairing, matching, Resolve policies, report      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │  Containers (container/) │   │  Store boundary (store/)     │
//! │  tar, tgz, zip entries   │   │  ItemStore trait, MemStore   │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! Shared pieces: [`model`] (item types and paths), [`record`] (the `.meta`
//! record), [`naming`] (entry names), [`charset`], [`config`], [`error`] and
//! [`report`].
//!
//! ## Archive Layout
//!
//! - `<path>.meta`: metadata record for the entry that follows it
//! - `<path>`: the content
//! - `<path>.err`: empty marker after a content entry that came out short
//!
//! ## Testing Strategy
//!
//! - **Unit tests** sit next to the code in `#[cfg(test)]` modules and run
//!   against [`store::memory::MemStore`].
//! - **Integration tests** in `tests/` export and re-import whole mailboxes
//!   through every container format, in memory and on disk.

pub mod api;
pub mod charset;
pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod model;
pub mod naming;
pub mod record;
pub mod report;
pub mod store;

pub use api::ArchiveApi;
pub use commands::export::{ExportOptions, RequestedItem, Selection};
pub use commands::import::ImportOptions;
pub use commands::{KeepAlive, Params, Resolve};
pub use config::ArchiveConfig;
pub use container::Format;
pub use error::{ArchiveError, Result, StoreError};
pub use report::{ExportSummary, ImportReport, ReportedError};
pub use store::ItemStore;
