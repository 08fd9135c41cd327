//! Supervisor subcommands.

pub mod pod;
pub mod rc;
pub mod run;

use std::future::Future;
use std::time::Duration;

use crate::error::SuperviseResult;

/// Run the given operation, repeating it after `delay` while it fails with a transient error,
/// at most `retries` additional times.
pub(crate) async fn retry_transient<T, F, Fut>(retries: u32, delay: Duration, mut op: F) -> SuperviseResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SuperviseResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < retries => {
                attempt += 1;
                tracing::warn!(error = %err, attempt, retries, "transient error, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
            res => return res,
        }
    }
}
