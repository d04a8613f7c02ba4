//! Cancellation handles for relayed streams.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures_util::StreamExt;

use crate::stream::RelayStream;

/// A handle that requests cancellation of an in-flight stream.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Request cancellation. The wrapped stream stops at the next item
    /// boundary; dropping it closes the upstream HTTP connection so the
    /// provider stops generating tokens.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Wrap a stream so it can be aborted via the returned handle.
pub fn make_cancellable_stream(stream: RelayStream) -> (RelayStream, CancelHandle) {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = CancelHandle::new(flag.clone());
    let mut inner = stream;
    let wrapped = async_stream::stream! {
        while let Some(item) = inner.next().await {
            if flag.load(Ordering::SeqCst) {
                break;
            }
            yield item;
        }
    };
    (Box::pin(wrapped), handle)
}
