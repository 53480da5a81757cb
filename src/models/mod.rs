pub mod audit_type;
pub mod history;
pub mod item;
pub mod job;
pub mod table;
pub mod verdict;

pub use audit_type::AuditType;
pub use history::HistoryRecord;
pub use item::{ItemInput, ItemOutcome};
pub use job::{AuditJob, JobSnapshot, JobStatus, MessageEntry, Statistics};
pub use table::{AuditTable, Row};
pub use verdict::{dedup_tags, format_tags, Verdict, NO_TAG_SENTINEL};
