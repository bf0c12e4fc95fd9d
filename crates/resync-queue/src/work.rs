//! # Work Hook
//!
//! The caller-supplied unit of work the queue coalesces. The queue never
//! looks inside it: it is a zero-argument async function returning
//! [`QueueResult<()>`].

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::{QueueError, QueueResult};

/// Type-erased work hook, shareable with the loop task.
pub type WorkFn = Arc<dyn Fn() -> BoxFuture<'static, QueueResult<()>> + Send + Sync>;

/// Boxes an async closure into a [`WorkFn`].
///
/// ```rust,ignore
/// let hook = work_fn(move || {
///     let db = db.clone();
///     async move { db.push_pending().await.map_err(QueueError::work) }
/// });
/// ```
pub fn work_fn<F, Fut>(f: F) -> WorkFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QueueResult<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Runs the hook once, turning panics into [`QueueError::WorkPanicked`].
///
/// Both the synchronous call that builds the future and the future itself
/// are guarded.
pub(crate) async fn invoke(work: &WorkFn) -> QueueResult<()> {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| work())) {
        Ok(future) => future,
        Err(payload) => return Err(QueueError::WorkPanicked(panic_message(payload.as_ref()))),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(QueueError::WorkPanicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
