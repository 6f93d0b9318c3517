use super::{Notification, NotificationSink, NotifyError};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

/// Fan-out to connected viewers. Disconnected viewers are dropped on the next publish.
#[derive(Debug, Default)]
pub struct ViewerHub {
    viewers: Mutex<Vec<Sender<Notification>>>,
}

impl ViewerHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        let (sender, receiver) = mpsc::channel();
        self.viewers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl NotificationSink for ViewerHub {
    fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        if !notification.is_for_viewers() {
            return Ok(());
        }
        self.viewers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|viewer| viewer.send(notification.clone()).is_ok());
        Ok(())
    }
}
