//! User interrupts that can wake a reply stalled on the network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A shared interrupt flag.
///
/// The signal handler calls [`Interrupt::trigger`]; the stream consumer waits on
/// [`Interrupt::triggered`] alongside the next line, so an interrupt is seen even when the
/// endpoint has stopped sending.  Clones share state.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    armed: AtomicBool,
    triggered: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    /// Creates a disarmed, untriggered interrupt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears any earlier trigger and starts listening for a new one.
    pub fn arm(&self) {
        self.inner.triggered.store(false, Ordering::SeqCst);
        self.inner.armed.store(true, Ordering::SeqCst);
    }

    /// Stops listening.  A trigger while disarmed is reported back to the caller.
    pub fn disarm(&self) {
        self.inner.armed.store(false, Ordering::SeqCst);
    }

    /// True between [`Interrupt::arm`] and [`Interrupt::disarm`].
    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    /// Raises the interrupt and wakes a waiting consumer.
    ///
    /// Returns false if nothing was armed to receive it.
    pub fn trigger(&self) -> bool {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
        self.is_armed()
    }

    /// True once the interrupt has been raised.
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once the interrupt has been raised.
    pub async fn triggered(&self) {
        // A permit left over from an earlier trigger wakes us spuriously; the flag decides.
        while !self.is_triggered() {
            self.inner.notify.notified().await;
        }
    }
}
