use tokio::select;
use tokio_util::sync::CancellationToken;

/// Waits for a shutdown signal and cancels the tracking loop. Works with
/// limited success on Windows, where detached processes can't detect
/// signals sent to them; `tracksy stop` terminates the process there
/// instead.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
    };
}
