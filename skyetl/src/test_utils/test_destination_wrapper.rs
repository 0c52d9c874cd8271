use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{BatchFile, PostRow};

#[derive(Debug, Default)]
struct Inner {
    persist_calls: usize,
    reload_calls: usize,
    persisted_rows: usize,
    shutdown_called: bool,
    fail_next_persist: Option<ErrorKind>,
    fail_next_reload: Option<ErrorKind>,
    row_conditions: Vec<(usize, Arc<Notify>)>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let persisted_rows = self.persisted_rows;
        self.row_conditions.retain(|(rows, notify)| {
            let should_retain = persisted_rows < *rows;
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// Test wrapper for [`Destination`] implementations that counts calls and injects failures.
#[derive(Debug, Clone)]
pub struct TestDestinationWrapper<D> {
    wrapped_destination: D,
    inner: Arc<Mutex<Inner>>,
}

impl<D> TestDestinationWrapper<D> {
    pub fn wrap(destination: D) -> Self {
        Self {
            wrapped_destination: destination,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("test destination lock poisoned")
    }

    pub fn wrapped(&self) -> &D {
        &self.wrapped_destination
    }

    pub fn persist_calls(&self) -> usize {
        self.inner().persist_calls
    }

    pub fn reload_calls(&self) -> usize {
        self.inner().reload_calls
    }

    /// Rows written by successful persists.
    pub fn persisted_rows(&self) -> usize {
        self.inner().persisted_rows
    }

    pub fn shutdown_called(&self) -> bool {
        self.inner().shutdown_called
    }

    /// Makes the next persist carrying rows fail with `kind` without reaching the wrapped
    /// destination.
    pub fn fail_next_persist(&self, kind: ErrorKind) {
        self.inner().fail_next_persist = Some(kind);
    }

    /// Makes the next reload fail with `kind` without reaching the wrapped destination.
    pub fn fail_next_reload(&self, kind: ErrorKind) {
        self.inner().fail_next_reload = Some(kind);
    }

    /// Returns a notification fired once at least `rows` rows were persisted.
    pub fn wait_for_persisted_rows(&self, rows: usize) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner();
        inner.row_conditions.push((rows, notify.clone()));
        inner.check_conditions();

        notify
    }
}

impl<D> Destination for TestDestinationWrapper<D>
where
    D: Destination + Send + Sync,
{
    fn name() -> &'static str {
        D::name()
    }

    async fn shutdown(&self) -> EtlResult<()> {
        self.inner().shutdown_called = true;
        self.wrapped_destination.shutdown().await
    }

    async fn persist(&self, rows: Vec<PostRow>) -> EtlResult<Option<BatchFile>> {
        let failure = {
            let mut inner = self.inner();
            inner.persist_calls += 1;
            if rows.is_empty() {
                None
            } else {
                inner.fail_next_persist.take()
            }
        };
        if let Some(kind) = failure {
            return Err(etl_error!(kind, "Injected persist failure"));
        }

        let file = self.wrapped_destination.persist(rows).await?;

        let mut inner = self.inner();
        inner.persisted_rows += file.as_ref().map(|file| file.rows).unwrap_or_default();
        inner.check_conditions();

        Ok(file)
    }

    async fn reload(&self) -> EtlResult<u64> {
        let failure = {
            let mut inner = self.inner();
            inner.reload_calls += 1;
            inner.fail_next_reload.take()
        };
        if let Some(kind) = failure {
            return Err(etl_error!(kind, "Injected reload failure"));
        }

        self.wrapped_destination.reload().await
    }
}
