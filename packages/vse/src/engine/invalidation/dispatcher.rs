use super::batch::{ChangeBatch, ChangeNotification};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

/// Receives collapsed change batches on the dispatcher task.
pub trait InvalidationListener: Send + Sync {
    fn name(&self) -> &str;

    /// Returns how many cached entries or views were affected.
    fn on_batch(&self, batch: &ChangeBatch) -> anyhow::Result<usize>;
}

enum Message {
    Batch(ChangeBatch),
    Subscribe(Arc<dyn InvalidationListener>),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Background worker fanning change batches out to listeners.
pub struct InvalidationDispatcher {
    rx: mpsc::UnboundedReceiver<Message>,
    listeners: Vec<Arc<dyn InvalidationListener>>,
}

impl InvalidationDispatcher {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(listeners: Vec<Arc<dyn InvalidationListener>>) -> DispatcherHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self { rx, listeners };
        let task = tokio::spawn(dispatcher.run());
        DispatcherHandle {
            tx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(mut self) {
        info!("Invalidation dispatcher started");
        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Batch(batch) => self.dispatch(&batch),
                Message::Subscribe(listener) => {
                    debug!("Listener '{}' subscribed", listener.name());
                    self.listeners.push(listener);
                }
                Message::Flush(done) => {
                    let _ = done.send(());
                }
                Message::Shutdown => break,
            }
        }
        info!("Invalidation dispatcher stopped");
    }

    #[instrument(skip_all)]
    fn dispatch(&self, batch: &ChangeBatch) {
        if batch.is_empty() {
            return;
        }
        for listener in &self.listeners {
            match listener.on_batch(batch) {
                Ok(affected) => trace!("Listener '{}' affected {} entries", listener.name(), affected),
                // One failing listener must not starve the others.
                Err(e) => warn!("Listener '{}' failed to apply invalidation: {:#}", listener.name(), e),
            }
        }
    }
}

/// Cheap, cloneable sender side of the dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Message>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DispatcherHandle {
    pub fn subscribe(&self, listener: Arc<dyn InvalidationListener>) {
        if self.tx.send(Message::Subscribe(listener)).is_err() {
            warn!("Dispatcher is stopped; subscription dropped");
        }
    }

    /// Queues a batch; never blocks the caller.
    pub fn submit(&self, batch: ChangeBatch) {
        if batch.is_empty() {
            return;
        }
        if self.tx.send(Message::Batch(batch)).is_err() {
            warn!("Dispatcher is stopped; change batch dropped");
        }
    }

    /// Single change outside any unit of work.
    pub fn notify(&self, notification: ChangeNotification) {
        self.submit(ChangeBatch::of([notification]));
    }

    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork {
            handle: self.clone(),
            batch: ChangeBatch::new(),
            committed: false,
        }
    }

    /// Resolves once every batch submitted before this call was dispatched.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Drains pending batches and stops the worker.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Collects notifications of one writer transaction. They are dispatched on
/// [`commit`](UnitOfWork::commit) only; rollback or drop discards them.
pub struct UnitOfWork {
    handle: DispatcherHandle,
    batch: ChangeBatch,
    committed: bool,
}

impl UnitOfWork {
    pub fn collect(&mut self, notification: ChangeNotification) {
        self.batch.add(notification);
    }

    pub fn commit(mut self) {
        self.committed = true;
        let batch = std::mem::take(&mut self.batch);
        debug!("Unit of work committed");
        self.handle.submit(batch);
    }

    pub fn rollback(mut self) {
        self.committed = true;
        self.batch = ChangeBatch::new();
        debug!("Unit of work rolled back; pending notifications discarded");
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.committed && !self.batch.is_empty() {
            debug!("Unit of work dropped without commit; pending notifications discarded");
        }
    }
}
