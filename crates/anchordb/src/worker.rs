//! Running work on a background thread.
//!
//! [`run_on_worker`] opens a fresh session on a dedicated thread, runs a
//! closure with it and hands the result back through a [`WorkerTask`].
//! The task can be awaited from async code or waited on synchronously.
//! Only `Send` values cross back; to return an object or collection, wrap
//! it in a [`ThreadSafeReference`](crate::ThreadSafeReference).

use crate::config::Config;
use crate::error::{Error, Result, WriteError};
use crate::session::Session;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The pending result of [`run_on_worker`].
#[derive(Debug)]
#[must_use = "a worker task does nothing useful unless its result is awaited"]
pub struct WorkerTask<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> WorkerTask<T> {
    /// Blocks the current thread until the worker finishes.
    ///
    /// Must not be called from inside an async runtime; await the task
    /// there instead.
    pub fn wait(self) -> Result<T> {
        self.rx.blocking_recv().unwrap_or_else(|_| Err(lost()))
    }
}

impl<T> Future for WorkerTask<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(lost())))
    }
}

fn lost() -> Error {
    Error::worker("worker exited without a result")
}

/// Runs `f` on a new thread with its own session opened from `config`.
///
/// The session is closed when `f` returns. A panic in `f` is reported as
/// [`Error::Worker`].
pub fn run_on_worker<T, F>(config: Config, f: F) -> WorkerTask<T>
where
    T: Send + 'static,
    F: FnOnce(&Session) -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let span = tracing::Span::current();
    let spawned = thread::Builder::new()
        .name("anchordb-worker".into())
        .spawn(move || {
            let _guard = span.enter();
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                let session = Session::open(config)?;
                let result = f(&session);
                session.close();
                result
            }))
            .unwrap_or_else(|_| Err(Error::worker("worker panicked")));
            if tx.send(result).is_err() {
                debug!("worker result dropped; the task was abandoned");
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "failed to spawn worker thread");
    }
    WorkerTask { rx }
}

impl Session {
    /// Runs `f` inside a write on a worker thread, then refreshes this
    /// session so the result is visible here.
    ///
    /// # Errors
    ///
    /// - [`Error::ObjectDisposed`] if this session is closed
    /// - [`Error::InvalidTransaction`] if this session is inside a write,
    ///   since the worker could never acquire the writer
    /// - whatever `f`, the commit or the worker returned
    pub async fn write_on_worker<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
    {
        self.ensure_open()?;
        if self.is_in_write() {
            return Err(Error::invalid_transaction(
                "cannot wait for a worker write while holding a write",
            ));
        }
        let config = self.config().clone();
        let value = run_on_worker(config, move |session| {
            session.write(f).map_err(WriteError::flatten)
        })
        .await?;
        self.refresh()?;
        Ok(value)
    }
}
