use anyhow::Result;

/// The tracker is driven by a single logical thread, so everything runs on a current-thread
/// runtime.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
