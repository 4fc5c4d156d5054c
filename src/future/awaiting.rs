//! `.await` support for engine futures.
//!
//! Awaiting registers a callback that sends the result through a oneshot
//! channel, so any executor can drive it.
//!
//! ```ignore
//! use futures::executor::block_on;
//!
//! let bytes = block_on(async { stream.read_some(1024).await })?;
//! ```

use crate::future::{Future, ResultStorage};
use crate::status::{Error, ErrorCode, Result};

use futures::channel::oneshot;
use std::future::{Future as StdFuture, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by `.await`ing an engine [`Future`].
#[must_use = "futures do nothing unless polled"]
pub struct Awaiting<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

impl<S: ResultStorage> IntoFuture for Future<S> {
    type Output = Result<S::Output>;
    type IntoFuture = Awaiting<S::Output>;

    fn into_future(self) -> Self::IntoFuture {
        let (sender, receiver) = oneshot::channel();

        self.callback(move |future| {
            // The receiver may be gone if the awaiting task was dropped.
            let _ = sender.send(future.get_result());
        });

        Awaiting { receiver }
    }
}

impl<T> StdFuture for Awaiting<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The guard always runs the callback; a cancelled channel means it
            // unwound before sending.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::from(ErrorCode::Aborted))),
            Poll::Pending => Poll::Pending,
        }
    }
}
