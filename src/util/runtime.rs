use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Spawns `future` on the ambient tokio runtime.
///
/// Returns `None` when called outside a runtime so callers can surface a
/// proper error instead of panicking.
pub fn try_spawn<F>(future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    Handle::try_current().ok().map(|handle| handle.spawn(future))
}

/// Asynchronously waits for the provided duration.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::time::sleep(duration).await;
}
