//! Shared, cancellable handles for in-flight server requests.
//!
//! A [`ServerRequest`] is created once (usually by a fetch function on a cache
//! miss) and then handed out to every interested party: the request cache
//! keeps one clone so the work completes even if the original caller stops
//! listening, and each caller gets another. All clones observe the same
//! terminal state and the same progress updates.
//!
//! ## Example
//!
//! ```rust,ignore
//! use modindex::request::{ServerProgress, ServerRequest};
//!
//! let request = ServerRequest::spawn("Download", |progress| async move {
//!     progress.report(ServerProgress::with_percentage("Downloading", 50));
//!     Ok(42)
//! });
//! assert_eq!(request.wait().await, Ok(42));
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::types::errors::{ServerError, ServerResult};

/// Progress update reported by a running request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProgress {
    /// What the request is doing.
    pub message: String,
    /// Completion percentage, when the transport knows the total size.
    pub percentage: Option<u8>,
}

impl ServerProgress {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            percentage: None,
        }
    }

    pub fn with_percentage(message: impl Into<String>, percentage: u8) -> Self {
        Self {
            message: message.into(),
            percentage: Some(percentage.min(100)),
        }
    }
}

impl std::fmt::Display for ServerProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.percentage {
            Some(p) => write!(f, "{} ({}%)", self.message, p),
            None => f.write_str(&self.message),
        }
    }
}

/// Lifecycle of a request. Leaves `Pending` exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState<T> {
    Pending,
    Finished(ServerResult<T>),
    Cancelled,
}

impl<T> RequestState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending)
    }

    fn into_result(self) -> ServerResult<T> {
        match self {
            RequestState::Finished(result) => result,
            RequestState::Pending | RequestState::Cancelled => Err(ServerError::Cancelled),
        }
    }
}

/// Handle given to a request body for publishing progress.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<Option<ServerProgress>>>,
}

impl ProgressReporter {
    pub fn report(&self, progress: ServerProgress) {
        self.tx.send_replace(Some(progress));
    }
}

struct Shared<T> {
    id: Uuid,
    name: String,
    state: watch::Sender<RequestState<T>>,
    progress: Arc<watch::Sender<Option<ServerProgress>>>,
}

/// A shareable, cancellable, progress-reporting asynchronous request.
pub struct ServerRequest<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ServerRequest<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for ServerRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.shared.state.borrow() {
            RequestState::Pending => "pending",
            RequestState::Finished(Ok(_)) => "finished",
            RequestState::Finished(Err(_)) => "failed",
            RequestState::Cancelled => "cancelled",
        };
        f.debug_struct("ServerRequest")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &state)
            .finish()
    }
}

impl<T> ServerRequest<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn with_state(name: impl Into<String>, state: RequestState<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                name: name.into(),
                state: watch::Sender::new(state),
                progress: Arc::new(watch::Sender::new(None)),
            }),
        }
    }

    /// Creates a request that is already finished with `result`.
    pub fn immediate(name: impl Into<String>, result: ServerResult<T>) -> Self {
        Self::with_state(name, RequestState::Finished(result))
    }

    /// Runs `body` on the tokio runtime and returns a handle to it.
    ///
    /// Must be called from within a runtime. Cancelling the handle drops the
    /// body at its next suspension point.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(ProgressReporter) -> Fut,
        Fut: Future<Output = ServerResult<T>> + Send + 'static,
    {
        let request = Self::with_state(name, RequestState::Pending);
        let work = body(ProgressReporter {
            tx: Arc::clone(&request.shared.progress),
        });

        let task = request.clone();
        tokio::spawn(async move {
            let mut state = task.shared.state.subscribe();
            tokio::select! {
                result = work => {
                    task.settle(RequestState::Finished(result));
                }
                () = until_settled(&mut state) => {
                    tracing::trace!(request_id = %task.id(), "Dropping body of cancelled request");
                }
            }
        });

        request
    }

    /// Transitions out of `Pending`; returns false if already settled.
    fn settle(&self, next: RequestState<T>) -> bool {
        self.shared.state.send_if_modified(|state| {
            if state.is_pending() {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Cancels the request if it is still pending.
    pub fn cancel(&self) {
        if self.settle(RequestState::Cancelled) {
            tracing::debug!(request_id = %self.id(), name = %self.name(), "Request cancelled");
        }
    }

    /// Waits for the request to settle.
    pub async fn wait(&self) -> ServerResult<T> {
        let mut rx = self.shared.state.subscribe();
        let settled = match rx.wait_for(|state| !state.is_pending()).await {
            Ok(state) => state.clone(),
            Err(_) => RequestState::Cancelled,
        };
        settled.into_result()
    }

    /// Like [`wait`](Self::wait), but dropping the returned future before the
    /// request settles cancels the request.
    ///
    /// This is how an outer request forwards its own cancellation to the
    /// request it is currently waiting on.
    pub async fn wait_linked(&self) -> ServerResult<T> {
        let _link = CancelOnDrop(self);
        self.wait().await
    }

    /// Derives a request that transforms this one's value.
    ///
    /// Progress is forwarded; cancelling the derived request cancels this one.
    /// Use it when the derived request is this one's only consumer.
    pub fn map<U, F>(&self, name: impl Into<String>, f: F) -> ServerRequest<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> ServerResult<U> + Send + 'static,
    {
        self.derive(name, true, f)
    }

    /// Like [`map`](Self::map), but cancelling the derived request leaves this
    /// one running for its other holders.
    pub fn map_shared<U, F>(&self, name: impl Into<String>, f: F) -> ServerRequest<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> ServerResult<U> + Send + 'static,
    {
        self.derive(name, false, f)
    }

    fn derive<U, F>(&self, name: impl Into<String>, linked: bool, f: F) -> ServerRequest<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> ServerResult<U> + Send + 'static,
    {
        let source = self.clone();
        ServerRequest::spawn(name, move |reporter| async move {
            if let Some(current) = source.progress() {
                reporter.report(current);
            }
            let mut updates = source.subscribe_progress();
            let forward = async move {
                while updates.changed().await.is_ok() {
                    let latest = updates.borrow_and_update().clone();
                    if let Some(progress) = latest {
                        reporter.report(progress);
                    }
                }
                std::future::pending::<Infallible>().await
            };

            let result = async {
                if linked {
                    source.wait_linked().await
                } else {
                    source.wait().await
                }
            };

            tokio::select! {
                result = result => f(result?),
                never = forward => match never {},
            }
        })
    }

    /// Current state snapshot.
    pub fn state(&self) -> RequestState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.shared.state.borrow().is_pending()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.shared.state.borrow(), RequestState::Cancelled)
    }

    pub fn is_finished(&self) -> bool {
        matches!(*self.shared.state.borrow(), RequestState::Finished(_))
    }

    /// Latest progress reported by the body.
    pub fn progress(&self) -> Option<ServerProgress> {
        self.shared.progress.borrow().clone()
    }

    /// Receiver notified on every progress update.
    pub fn subscribe_progress(&self) -> watch::Receiver<Option<ServerProgress>> {
        self.shared.progress.subscribe()
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether both handles refer to the same underlying request.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

async fn until_settled<T>(rx: &mut watch::Receiver<RequestState<T>>) {
    let _ = rx.wait_for(|state| !state.is_pending()).await;
}

struct CancelOnDrop<'a, T>(&'a ServerRequest<T>)
where
    T: Clone + Send + Sync + 'static;

impl<T> Drop for CancelOnDrop<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // no-op once settled
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn never_finishing(dropped: Arc<AtomicBool>) -> ServerRequest<u32> {
        let flag = DropFlag(dropped);
        ServerRequest::spawn("never", move |_| async move {
            let _flag = flag;
            std::future::pending::<()>().await;
            Ok(0)
        })
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn test_immediate_request() {
        let request = ServerRequest::immediate("ready", Ok(vec![1, 2, 3]));
        assert!(request.is_finished());
        assert_eq!(request.wait().await, Ok(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_spawned_request_completes() {
        let request = ServerRequest::spawn("sum", |_| async { Ok(2 + 2) });
        assert_eq!(request.wait().await, Ok(4));
        assert!(request.is_finished());
    }

    #[tokio::test]
    async fn test_error_is_shared_by_clones() {
        let request: ServerRequest<u32> =
            ServerRequest::spawn("fail", |_| async { Err(ServerError::transport(500, "boom")) });
        let other = request.clone();

        assert_eq!(request.wait().await, Err(ServerError::transport(500, "boom")));
        assert_eq!(other.wait().await, Err(ServerError::transport(500, "boom")));
        assert!(request.same_as(&other));
    }

    #[tokio::test]
    async fn test_cancel_drops_body() {
        let dropped = Arc::new(AtomicBool::new(false));
        let request = never_finishing(dropped.clone());

        tokio::task::yield_now().await;
        request.cancel();

        assert!(request.is_cancelled());
        assert_eq!(request.wait().await, Err(ServerError::Cancelled));
        assert!(eventually(|| dropped.load(Ordering::SeqCst)).await);
    }

    #[tokio::test]
    async fn test_cancel_after_finish_is_noop() {
        let request = ServerRequest::immediate("done", Ok(7u32));
        request.cancel();
        assert!(!request.is_cancelled());
        assert_eq!(request.wait().await, Ok(7));
    }

    #[tokio::test]
    async fn test_progress_is_visible() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let request = ServerRequest::spawn("progress", move |progress| async move {
            progress.report(ServerProgress::with_percentage("Downloading", 40));
            let _ = release_rx.await;
            Ok(())
        });

        assert!(eventually(|| request.progress().is_some()).await);
        assert_eq!(
            request.progress(),
            Some(ServerProgress::with_percentage("Downloading", 40))
        );

        let _ = release_tx.send(());
        assert_eq!(request.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_dropping_linked_wait_cancels() {
        let dropped = Arc::new(AtomicBool::new(false));
        let request = never_finishing(dropped.clone());

        let timed_out = tokio::time::timeout(Duration::from_millis(20), request.wait_linked())
            .await
            .is_err();

        assert!(timed_out);
        assert!(request.is_cancelled());
        assert!(eventually(|| dropped.load(Ordering::SeqCst)).await);
    }

    #[tokio::test]
    async fn test_plain_wait_does_not_cancel() {
        let request = never_finishing(Arc::new(AtomicBool::new(false)));
        let _ = tokio::time::timeout(Duration::from_millis(20), request.wait()).await;
        assert!(request.is_pending());
        request.cancel();
    }

    #[tokio::test]
    async fn test_map_transforms_value() {
        let source = ServerRequest::immediate("numbers", Ok(vec![1u32, 2, 3]));
        let total = source.map("total", |values| Ok(values.iter().sum::<u32>()));
        assert_eq!(total.wait().await, Ok(6));
    }

    #[tokio::test]
    async fn test_cancelling_mapped_request_cancels_source() {
        let source = never_finishing(Arc::new(AtomicBool::new(false)));
        let mapped = source.map("double", |v| Ok(v * 2));

        tokio::time::sleep(Duration::from_millis(10)).await;
        mapped.cancel();

        assert!(eventually(|| source.is_cancelled()).await);
    }

    #[tokio::test]
    async fn test_cancelling_shared_map_leaves_source_running() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let source = ServerRequest::spawn("shared", |_| async move {
            let _ = release_rx.await;
            Ok(21u32)
        });
        let first = source.map_shared("first", |v| Ok(v * 2));
        let second = source.map_shared("second", |v| Ok(v + 1));

        tokio::time::sleep(Duration::from_millis(10)).await;
        first.cancel();
        let _ = release_tx.send(());

        assert_eq!(second.wait().await, Ok(22));
        assert_eq!(source.wait().await, Ok(21));
        assert_eq!(first.wait().await, Err(ServerError::Cancelled));
    }

    #[test]
    fn test_progress_display() {
        assert_eq!(ServerProgress::new("Checking").to_string(), "Checking");
        assert_eq!(
            ServerProgress::with_percentage("Downloading", 150).to_string(),
            "Downloading (100%)"
        );
    }
}
