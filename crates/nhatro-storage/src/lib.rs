//! Persistence sinks for nhatro: the flat-file snapshot and the batched
//! relational upsert.

pub mod flat_file;
pub mod import;
pub mod postgres;
pub mod retry;

pub use flat_file::{FlatFileError, FlatFileSnapshot, FlatFileStore, FLAT_FILE_COLUMNS};
pub use import::{
    import_records, run_import, DbError, ImportError, ImportReport, ImportSettings,
    UpsertOutcome, UpsertSession,
};
pub use postgres::{classify_sqlx_error, PgSession, LISTING_TABLE};
pub use retry::{RetryDisposition, RetryPolicy};

pub const CRATE_NAME: &str = "nhatro-storage";
