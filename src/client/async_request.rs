//! `AsyncRequest`: a cancellable handle wrapping one in-flight RPC
//! response plus a completion callback.
//!
//! Mirrors the original's shared-ownership, wait-on-drop contract:
//! cloning an `AsyncRequest` shares the same inner state, and only the
//! last surviving handle triggers an implicit `wait()` on drop.
//! `wait()` itself is idempotent and `completed()` polls readiness
//! without consuming the response.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Error, Result};

type Completion = Box<dyn FnOnce(serde_json::Value) -> Result<()> + Send>;

enum Slot {
    Pending,
    Ready(serde_json::Value),
    Taken,
}

struct Inner {
    slot: Mutex<Slot>,
    ready: Notify,
    callback: Mutex<Option<Completion>>,
    waited: Mutex<bool>,
}

/// A sender-side handle used by whatever dispatches the RPC to resolve
/// a pending [`AsyncRequest`] once the response arrives.
///
/// Holds only a [`Weak`] reference: the dispatching task must never be
/// the thing keeping an `Inner` alive, or [`AsyncRequest`]'s Drop-time
/// "am I the last handle" check could never observe a strong count of
/// one while the RPC is still in flight.
pub(crate) struct Resolver {
    inner: Weak<Inner>,
}

impl Resolver {
    pub(crate) fn resolve(self, value: serde_json::Value) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        *inner.slot.lock() = Slot::Ready(value);
        inner.ready.notify_waiters();
    }
}

/// A value-type handle over one in-flight operation. Clone shares the
/// same underlying request; the request is only waited on implicitly
/// when the last clone is dropped.
#[derive(Clone)]
pub struct AsyncRequest {
    inner: Option<Arc<Inner>>,
}

impl AsyncRequest {
    pub(crate) fn new(callback: Completion) -> (Self, Resolver) {
        let inner = Arc::new(Inner {
            slot: Mutex::new(Slot::Pending),
            ready: Notify::new(),
            callback: Mutex::new(Some(callback)),
            waited: Mutex::new(false),
        });
        let resolver = Resolver {
            inner: Arc::downgrade(&inner),
        };
        (AsyncRequest { inner: Some(inner) }, resolver)
    }

    /// A default-constructed request is explicitly invalid: `wait()`
    /// and `completed()` both fail on it.
    pub fn invalid() -> Self {
        AsyncRequest { inner: None }
    }

    /// Block until the wrapped operation completes, running the
    /// completion callback at most once. A no-op if already waited.
    pub fn wait(&self) -> Result<()> {
        let inner = self
            .inner
            .as_ref()
            .ok_or_else(|| Error::Invalid("invalid AsyncRequest".into()))?;

        if *inner.waited.lock() {
            return Ok(());
        }

        loop {
            let notified = inner.ready.notified();
            if matches!(&*inner.slot.lock(), Slot::Ready(_)) {
                break;
            }
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(notified);
            });
        }
        let value = match std::mem::replace(&mut *inner.slot.lock(), Slot::Taken) {
            Slot::Ready(v) => v,
            _ => return Err(Error::Internal("AsyncRequest resolved with no value".into())),
        };

        *inner.waited.lock() = true;

        let callback = inner
            .callback
            .lock()
            .take()
            .ok_or_else(|| Error::Internal("AsyncRequest already consumed".into()))?;
        callback(value)
    }

    /// Poll readiness without consuming the response.
    pub fn completed(&self) -> Result<bool> {
        let inner = self
            .inner
            .as_ref()
            .ok_or_else(|| Error::Invalid("invalid AsyncRequest".into()))?;
        if *inner.waited.lock() {
            return Ok(true);
        }
        Ok(matches!(&*inner.slot.lock(), Slot::Ready(_)))
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for AsyncRequest {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Drop for AsyncRequest {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            if Arc::strong_count(&inner) == 1 && !*inner.waited.lock() {
                let req = AsyncRequest { inner: Some(inner) };
                let _ = req.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_the_last_handle_still_runs_the_callback() {
        let out = Arc::new(parking_lot::Mutex::new(None));
        let out2 = out.clone();
        let (request, resolver) = AsyncRequest::new(Box::new(move |v| {
            *out2.lock() = Some(v);
            Ok(())
        }));

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            resolver.resolve(serde_json::json!(42));
        });

        // Dropping without calling wait()/completed() must still block
        // until the resolver fires and run the callback exactly once,
        // not leave `out` permanently empty.
        drop(request);
        assert_eq!(*out.lock(), Some(serde_json::json!(42)));
    }

    #[test]
    fn invalid_request_reports_errors() {
        let invalid = AsyncRequest::invalid();
        assert!(!invalid.is_valid());
        assert!(invalid.wait().is_err());
        assert!(invalid.completed().is_err());
    }
}
