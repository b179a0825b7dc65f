/// File-backed record ledger for batch digitization pipelines
///
/// A ledger is a UTF-8 text file with one record per line, fields separated
/// by tabs. The first non-comment, non-blank line is the header; lines
/// starting with `#` and blank lines are carried through verbatim but never
/// parsed. By convention the first field identifies the record, the
/// second-to-last holds its processing state and the last the timestamp of
/// the most recent state change.
///
/// ## Architecture
///
/// [`RecordHandler`] owns one ledger file: it loads all lines at
/// construction, builds an identifier index and persists every mutation by
/// rewriting the whole file. The ledger file is a single-writer resource by
/// convention — there is no cross-process locking, concurrent writers race
/// and the last full rewrite wins. Run one coordination service per ledger
/// (see [`crate::service`]) or hand out disjoint [`RecordHandler::frame`]
/// partitions instead of sharing a file.
///
/// ## Usage
///
/// ```rust,ignore
/// use ledgerbox::ledger::RecordHandler;
///
/// let mut handler = RecordHandler::load("data/ocr_list.tsv")?;
/// if let Some(record) = handler.next_record(None) {
///     handler.save_record_state(record.identifier(), None, &[])?;
/// }
/// ```
pub mod criteria;
pub mod error;
pub mod handler;
pub mod info;
pub mod record;
pub mod schema;

pub use criteria::{Criteria, Datetime};
pub use error::{LedgerError, Result};
pub use handler::{MergeOptions, MergeOutcome, RecordHandler};
pub use info::Info;
pub use record::Record;
pub use schema::{RowView, Schema};

/// Sentinel for any field without a value, including the default open state.
pub const UNSET: &str = "n.a.";

/// Default exclusive lease label.
pub const MARK_LOCK: &str = "busy";

/// State written to records masked out by [`RecordHandler::frame`].
pub const MARK_FRAME: &str = "other_load";

/// Lines starting with this character are passed through unparsed.
pub const COMMENT_MARK: char = '#';

/// Format of the state-time field, `YYYY-MM-DD_HH:MM:SS`.
///
/// Orders lexicographically, which the merge algorithm relies on.
pub const STATE_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

pub use schema::{
    FIELD_CREATED, FIELD_IDENTIFIER, FIELD_INFO, FIELD_SPEC, FIELD_STATE, FIELD_STATE_TIME,
};
