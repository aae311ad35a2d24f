use anyhow::Result;

use crate::daemon::storage::entities::ActivityEntry;

/// Consumer of finalized entries. Realistically this should be able to abstract over different
/// options: local storage, remote server saving.
pub trait EventProcessor {
    fn process_next(&mut self, entry: ActivityEntry) -> impl std::future::Future<Output = Result<()>>;

    /// Called once after the last entry.
    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
