use super::{Notification, NotificationSink, NotifyError};
use crate::shared::logging::{append_log_event, lifecycle_log_path};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

#[derive(Default)]
struct Progress {
    counts: Mutex<(u64, u64)>,
    delivered: Condvar,
}

/// FIFO queue between the lifecycle controller and the real notification targets.
///
/// `publish` only enqueues; a dispatcher thread delivers to every target in order.
/// A failing or panicking target is logged and skipped.
pub struct Outbox {
    sender: Mutex<Option<Sender<Notification>>>,
    progress: Arc<Progress>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Outbox {
    pub fn start(
        targets: Vec<Arc<dyn NotificationSink>>,
        state_root: impl Into<PathBuf>,
    ) -> Result<Self, NotifyError> {
        let (sender, receiver) = mpsc::channel::<Notification>();
        let progress = Arc::new(Progress::default());
        let worker_progress = Arc::clone(&progress);
        let state_root: PathBuf = state_root.into();
        let log_path = lifecycle_log_path(&state_root);

        let dispatcher = thread::Builder::new()
            .name("preingest-outbox".to_string())
            .spawn(move || {
                for notification in receiver {
                    for target in &targets {
                        let error = match panic::catch_unwind(AssertUnwindSafe(|| {
                            target.publish(&notification)
                        })) {
                            Ok(Ok(())) => continue,
                            Ok(Err(err)) => err.to_string(),
                            Err(_) => "notification target panicked".to_string(),
                        };
                        append_log_event(
                            &log_path,
                            "warn",
                            "notify.delivery_failed",
                            &[
                                ("method", Value::String(notification.method().to_string())),
                                ("error", Value::String(error)),
                            ],
                        );
                    }
                    let mut counts = worker_progress
                        .counts
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    counts.1 += 1;
                    worker_progress.delivered.notify_all();
                }
            })
            .map_err(|source| NotifyError::Spawn { source })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            progress,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Blocks until everything enqueued so far has been delivered.
    pub fn flush(&self) {
        let counts = self
            .progress
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let target = counts.0;
        let _done = self
            .progress
            .delivered
            .wait_while(counts, |counts| counts.1 < target)
            .unwrap_or_else(PoisonError::into_inner);
    }


    /// Stops accepting notifications, drains the queue and joins the dispatcher.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl NotificationSink for Outbox {
    fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(NotifyError::OutboxClosed);
        };
        let mut counts = self
            .progress
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sender
            .send(notification.clone())
            .map_err(|_| NotifyError::OutboxClosed)?;
        counts.0 += 1;
        Ok(())
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        self.shutdown();
    }
}
