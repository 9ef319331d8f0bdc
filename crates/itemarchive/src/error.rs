use crate::model::ItemId;
use thiserror::Error;

/// Failures raised by an [`ItemStore`](crate::store::ItemStore) implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("mailbox quota exceeded")]
    QuotaExceeded,

    #[error("no such item: {0}")]
    NoSuchItem(ItemId),

    #[error("no such folder: {0}")]
    NoSuchFolder(String),

    #[error("object with that name already exists: {0}")]
    AlreadyExists(String),

    #[error("cannot modify immutable folder: {0}")]
    ImmutableFolder(ItemId),

    #[error("no such part {part} in item {item}")]
    NoSuchPart { item: ItemId, part: String },

    #[error("maintenance mode unavailable: {0}")]
    MaintenanceUnavailable(String),

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::QuotaExceeded => "mail.QUOTA_EXCEEDED",
            StoreError::NoSuchItem(_) => "mail.NO_SUCH_ITEM",
            StoreError::NoSuchFolder(_) => "mail.NO_SUCH_FOLDER",
            StoreError::AlreadyExists(_) => "mail.ALREADY_EXISTS",
            StoreError::ImmutableFolder(_) => "mail.IMMUTABLE_OBJECT",
            StoreError::NoSuchPart { .. } => "mail.NO_SUCH_PART",
            StoreError::MaintenanceUnavailable(_) => "mail.MAINTENANCE",
            StoreError::Other(_) => "service.FAILURE",
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors produced by archive export and import.
///
/// The first group mirrors the import error taxonomy reported per entry;
/// the rest cover request validation and the underlying plumbing.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("invalid import format: {0}")]
    InvalidFormat(String),

    #[error("invalid item type {view} for folder {path}")]
    InvalidType { view: String, path: String },

    #[error("mismatched meta data for entry {0}")]
    MismatchedMeta(String),

    #[error("mismatched size for entry {0}")]
    MismatchedSize(String),

    #[error("mismatched type for entry {0}")]
    MismatchedType(String),

    #[error("missing blob for {0}")]
    MissingBlob(String),

    #[error("missing meta data for entry {0}")]
    MissingMeta(String),

    #[error("missing vcard fields in {0}")]
    MissingVcardFields(String),

    #[error("unknown error importing {}: {source}", .path.as_deref().unwrap_or("archive"))]
    UnknownError {
        path: Option<String>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("unknown item type: {0}")]
    UnknownItemType(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no data found")]
    NoData,

    #[error("export period not specified; the limit is {max_days} days")]
    ExportPeriodNotSpecified { max_days: u32 },

    #[error("export period of {requested_days} days exceeds the limit of {max_days} days")]
    ExportPeriodTooLong { requested_days: i64, max_days: u32 },

    #[error("container error: {0}")]
    Container(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Config error: {0}")]
    Config(#[from] confique::Error),
}

impl ArchiveError {
    /// Stable error code, as reported to the caller of an import.
    pub fn code(&self) -> &'static str {
        match self {
            ArchiveError::InvalidFormat(_) => "formatter.INVALID_FORMAT",
            ArchiveError::InvalidType { .. } => "formatter.INVALID_TYPE",
            ArchiveError::MismatchedMeta(_) => "formatter.MISMATCHED_META",
            ArchiveError::MismatchedSize(_) => "formatter.MISMATCHED_SIZE",
            ArchiveError::MismatchedType(_) => "formatter.MISMATCHED_TYPE",
            ArchiveError::MissingBlob(_) => "formatter.MISSING_BLOB",
            ArchiveError::MissingMeta(_) => "formatter.MISSING_META",
            ArchiveError::MissingVcardFields(_) => "formatter.MISSING_VCARD_FIELDS",
            ArchiveError::UnknownError { .. } => "formatter.UNKNOWN_ERROR",
            ArchiveError::UnknownItemType(_) => "formatter.UNKNOWN_TYPE",
            ArchiveError::InvalidRequest(_) => "service.INVALID_REQUEST",
            ArchiveError::NoData => "formatter.NO_DATA",
            ArchiveError::ExportPeriodNotSpecified { .. } => {
                "formatter.EXPORT_PERIOD_NOT_SPECIFIED"
            }
            ArchiveError::ExportPeriodTooLong { .. } => "formatter.EXPORT_PERIOD_TOO_LONG",
            ArchiveError::Store(e) => e.code(),
            ArchiveError::Container(_)
            | ArchiveError::Io(_)
            | ArchiveError::Serialization(_)
            | ArchiveError::Zip(_)
            | ArchiveError::Config(_) => "service.FAILURE",
        }
    }

    /// Fatal errors abort an import; everything else is recorded and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ArchiveError::Store(StoreError::QuotaExceeded))
    }

    /// True for failures of the archive stream itself, which end an export.
    pub fn is_container_failure(&self) -> bool {
        matches!(
            self,
            ArchiveError::Container(_) | ArchiveError::Io(_) | ArchiveError::Zip(_)
        )
    }

    pub fn unknown(
        path: Option<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ArchiveError::UnknownError {
            path,
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
