// src/deadline.rs
use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::{ProviderError, Result};

/// Runs `call` under an optional deadline.
///
/// `call` receives a fresh token that is cancelled when the deadline fires.
/// The attempt future is dropped at that point, so the in-flight request is
/// aborted rather than left running, and the result is `ProviderError::Timeout`.
/// With no deadline the attempt runs to completion.
pub async fn guarded<T, F, Fut>(deadline: Option<Duration>, call: F) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let cancel = CancellationToken::new();
    let attempt = call(cancel.clone());

    let Some(limit) = deadline else {
        return attempt.await;
    };

    tokio::select! {
        biased;
        res = attempt => res,
        _ = tokio::time::sleep(limit) => {
            cancel.cancel();
            debug!("deadline of {}ms reached, attempt cancelled", limit.as_millis());
            Err(ProviderError::Timeout)
        }
    }
}
