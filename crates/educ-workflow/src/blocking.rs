//! CPU-bound crypto off the async runtime
//!
//! Key generation and RSA operations run on tokio's blocking pool. A
//! timeout gives up on the result but leaves the primitive running until it
//! finishes on its own, so callers that own the runtime shut it down with
//! [`block_on_detached`] instead of joining the blocking pool.

use std::future::Future;
use std::time::Duration;

use educ_crypto::CryptoError;
use tracing::warn;

use crate::error::{FlowError, FlowResult};

/// Run `f` on the blocking pool and wait for it, at most `limit` if given.
///
/// A panicked or cancelled task is reported as `CryptoUnavailable`.
pub async fn run_blocking<T, E, F>(
    operation: &'static str,
    limit: Option<Duration>,
    f: F,
) -> FlowResult<T>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<FlowError> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);

    let joined = match limit {
        Some(limit) => tokio::time::timeout(limit, handle).await.map_err(|_| {
            warn!(operation, timeout_secs = limit.as_secs(), "crypto operation timed out");
            FlowError::Timeout {
                operation,
                secs: limit.as_secs(),
            }
        })?,
        None => handle.await,
    };

    joined
        .map_err(|e| {
            FlowError::Crypto(CryptoError::CryptoUnavailable(format!(
                "{operation} task failed: {e}"
            )))
        })?
        .map_err(Into::into)
}

/// Drive `future` on a fresh multi-threaded runtime, then shut the runtime
/// down without waiting for blocking-pool threads.
///
/// A timed-out key generation keeps its thread busy; dropping the runtime
/// normally would join that thread before the `Timeout` reaches the user.
pub fn block_on_detached<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}
