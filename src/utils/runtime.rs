use anyhow::Result;

/// The daemon runs everything on one thread; ticks are sequential by
/// construction anyway.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
