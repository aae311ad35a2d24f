//!  Storage is organized through [log_store::CsvLogStore].
//!  The basic idea is:
//!   - There is a directory with all the activity logs.
//!   - Every local calendar day gets its own CSV file.
//!   - Entries are stored as closed intervals, one record per line, and are attributed to the day
//!     they started on.

pub mod entities;
pub mod log_store;
mod record;
