//! Progress reporting for long running computations.
//!
//! Implementations are shared between worker threads, so every method takes `&self`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationStatus {
    Continue,
    Abort,
}

pub trait ProgressNotification: Send + Sync {
    /// Restart the progress at zero with `total` expected ticks
    fn reset(&self, total: u64);

    /// Jump to an absolute position, e.g. after skipping work that was already done
    fn set_position(&self, position: u64) -> Result;

    /// Advance the progress by one step.
    /// Returns `Error::Cancelled` if the receiver requested the computation to stop.
    fn tick(&self) -> Result;
}

impl<P: ProgressNotification + ?Sized> ProgressNotification for &P {
    fn reset(&self, total: u64) {
        (**self).reset(total);
    }

    fn set_position(&self, position: u64) -> Result {
        (**self).set_position(position)
    }

    fn tick(&self) -> Result {
        (**self).tick()
    }
}

/// Progress sink that ignores all notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyProgress;

impl ProgressNotification for DummyProgress {
    fn reset(&self, _total: u64) {}

    fn set_position(&self, _position: u64) -> Result {
        Ok(())
    }

    fn tick(&self) -> Result {
        Ok(())
    }
}

/// Forwards the progress as a fraction in the range [0, 1] to a callback.
/// The payload is handed to the callback unchanged on every notification.
pub struct CallbackProgress<Payload, F>
where
    F: Fn(f64, &Payload) -> ComputationStatus,
{
    current: AtomicU64,
    total: AtomicU64,
    payload: Payload,
    cb: F,
}

impl<Payload: Default, F> CallbackProgress<Payload, F>
where
    F: Fn(f64, &Payload) -> ComputationStatus,
{
    pub fn with_cb(cb: F) -> Self {
        Self::with_payload(Payload::default(), cb)
    }
}

impl<Payload, F> CallbackProgress<Payload, F>
where
    F: Fn(f64, &Payload) -> ComputationStatus,
{
    pub fn with_payload(payload: Payload, cb: F) -> Self {
        CallbackProgress {
            current: AtomicU64::new(0),
            total: AtomicU64::new(0),
            payload,
            cb,
        }
    }

    pub fn position(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    fn notify(&self, position: u64) -> Result {
        let total = self.total.load(Ordering::Relaxed);
        let fraction = if total == 0 {
            1.0
        } else {
            (position as f64 / total as f64).min(1.0)
        };

        match (self.cb)(fraction, &self.payload) {
            ComputationStatus::Continue => Ok(()),
            ComputationStatus::Abort => Err(Error::Cancelled),
        }
    }
}

impl<Payload, F> ProgressNotification for CallbackProgress<Payload, F>
where
    Payload: Send + Sync,
    F: Fn(f64, &Payload) -> ComputationStatus + Send + Sync,
{
    fn reset(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.current.store(0, Ordering::Relaxed);
    }

    fn set_position(&self, position: u64) -> Result {
        self.current.store(position, Ordering::Relaxed);
        self.notify(position)
    }

    fn tick(&self) -> Result {
        let position = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.notify(position)
    }
}
