//! Set-once shutdown flag shared by every task of the simulation.
//!
//! Tasks never sleep unconditionally: they wait on a [`ShutdownSignal`], which wakes them as soon
//! as the flag is raised, so stopping takes at most the time for the runtime to schedule them.

use tokio::{
    select,
    sync::watch,
    time::{sleep_until, Duration, Instant},
};

/// Why a wait on a [`ShutdownSignal`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    Elapsed,
    Shutdown,
}

/// Raises the flag. Dropping the trigger counts as raising it.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

/// Observes the flag, cheap to clone, one per task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, ShutdownSignal { receiver })
}

impl ShutdownTrigger {
    /// Raises the flag and wakes every waiting task. Returns false if it was already raised.
    pub fn trigger(&self) -> bool {
        !self.sender.send_replace(true)
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        // a dropped trigger means nobody is left to keep us running
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Resolves once the flag is raised.
    pub async fn triggered(&mut self) {
        // Err means the trigger was dropped
        let _ = self.receiver.wait_for(|raised| *raised).await;
    }

    pub async fn sleep(&mut self, duration: Duration) -> Wakeup {
        self.sleep_until(Instant::now() + duration).await
    }

    /// Waits until `deadline` unless the flag is raised first.
    pub async fn sleep_until(&mut self, deadline: Instant) -> Wakeup {
        if self.is_triggered() {
            return Wakeup::Shutdown;
        }
        select! {
            _ = sleep_until(deadline) => {
                if self.is_triggered() {
                    Wakeup::Shutdown
                } else {
                    Wakeup::Elapsed
                }
            }
            _ = self.triggered() => Wakeup::Shutdown,
        }
    }
}
