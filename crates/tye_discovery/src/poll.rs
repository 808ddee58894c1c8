//! Building blocks shared by the polling loops: switch-latest in-flight work,
//! a distinct gate over a replay-one `watch` channel, and task ownership.

use futures_util::future::BoxFuture;
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// At most one piece of in-flight work; starting new work abandons the old.
///
/// Each start bumps a generation. Abandoned work is cancelled through its token
/// and its future dropped, so a stale result can never be observed.
pub(crate) struct SwitchLatest<T> {
    generation: u64,
    cancel: Option<CancellationToken>,
    inflight: Option<BoxFuture<'static, T>>,
}

impl<T> SwitchLatest<T> {
    pub(crate) fn new() -> Self {
        Self {
            generation: 0,
            cancel: None,
            inflight: None,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.inflight.is_none()
    }

    pub(crate) fn start<F>(&mut self, make: impl FnOnce(CancellationToken) -> F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.abandon();
        self.generation += 1;

        let token = CancellationToken::new();
        self.inflight = Some(Box::pin(make(token.clone())));
        self.cancel = Some(token);
    }

    pub(crate) fn abandon(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if self.inflight.take().is_some() {
            tracing::trace!(generation = self.generation, "abandoned in-flight work");
        }
    }

    /// Resolves with the current work's output; pends forever while idle.
    ///
    /// Cancel-safe: dropping this future leaves the work in place.
    pub(crate) async fn next(&mut self) -> T {
        let output = match self.inflight.as_mut() {
            Some(work) => work.await,
            None => std::future::pending().await,
        };
        self.inflight = None;
        self.cancel = None;
        output
    }
}

impl<T> Drop for SwitchLatest<T> {
    fn drop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

/// Replaces the published value unless `same` says it is unchanged.
///
/// `None` in the channel means "not known yet"; the first value always publishes.
pub(crate) fn publish_distinct<T>(
    tx: &watch::Sender<Option<T>>,
    value: T,
    same: impl Fn(&T, &T) -> bool,
) -> bool {
    tx.send_if_modified(|current| match current {
        Some(previous) if same(previous, &value) => false,
        _ => {
            *current = Some(value);
            true
        }
    })
}

/// Aborts the owned background task when the last handle goes away.
#[derive(Debug)]
pub(crate) struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    pub(crate) fn spawn(task: impl Future<Output = ()> + Send + 'static) -> Self {
        Self(tokio::spawn(task))
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Waits for the first known value on a replay-one channel.
pub(crate) async fn first_value<T: Clone>(rx: &watch::Receiver<Option<T>>) -> Option<T> {
    let mut rx = rx.clone();
    let value = rx.wait_for(Option::is_some).await.ok()?;
    value.clone()
}
