//! Per-Key Expiry Timers
//!
//! Each key with a TTL owns one [`TimerHandle`]: a Tokio task sleeping until
//! the key's deadline. When the deadline passes the task deletes the key from
//! its container, exactly like an explicit [`Container::del`], so the eviction
//! callback runs through a single path whether the key timed out or was
//! deleted.
//!
//! ## Lifecycle
//!
//! ```text
//!  no timer ──set_expired──> armed ──set_expired──> armed (deadline moved)
//!                              │
//!                              ├── deadline passes ──> expired  (key deleted, callback)
//!                              ├── del / reset ──────> cancelled (key deleted, callback)
//!                              └── set_expired(0) ───> disarmed  (key kept, no callback)
//! ```
//!
//! ## Design
//!
//! - The deadline lives in a `watch` channel, so a reset is a single send and
//!   the task picks the new deadline up without being respawned.
//! - Dropping the handle closes the channel, which ends the task.
//! - A firing task re-checks, under the container's bookkeeping lock, that it is
//!   still the registered timer for its key and that its deadline really passed.
//!   A timer that was replaced, removed or pushed back in the meantime does
//!   nothing.
//! - Callbacks are dispatched with `spawn_blocking` and never run while a
//!   container lock is held, so they may freely use the container again.
//! - Tasks hold only a weak reference to their container.

use crate::error::{Error, Result};
use crate::storage::engine::{Container, Inner};
use crate::value::{Key, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Callback invoked with the evicted value when a key with an armed timer
/// expires, is deleted, or is cleared by [`Container::reset`].
pub type EvictionCallback = Box<dyn FnOnce(Value) + Send + 'static>;

/// Configuration for expiry timers.
#[derive(Debug, Clone, Default)]
pub struct ExpiryConfig {
    /// Runtime that drives timer tasks and callbacks.
    ///
    /// When unset, the runtime current at arming time is used, and outside of
    /// any runtime a shared background runtime is started on first use.
    pub runtime: Option<Handle>,
}

impl ExpiryConfig {
    /// Runs timers on the given runtime.
    pub fn with_runtime(handle: Handle) -> Self {
        Self {
            runtime: Some(handle),
        }
    }

    fn handle(&self) -> Result<Handle> {
        if let Some(handle) = &self.runtime {
            return Ok(handle.clone());
        }
        if let Ok(handle) = Handle::try_current() {
            return Ok(handle);
        }
        background_runtime()
    }
}

static BACKGROUND: OnceLock<std::result::Result<Runtime, String>> = OnceLock::new();

fn background_runtime() -> Result<Handle> {
    BACKGROUND
        .get_or_init(|| {
            debug!("Starting background timer runtime");
            Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("flashmap-timer")
                .enable_time()
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map(|rt| rt.handle().clone())
        .map_err(|e| Error::Runtime(e.clone()))
}

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// A single-shot countdown for one key.
pub(crate) struct TimerHandle {
    id: u64,
    deadline: watch::Sender<Instant>,
    callback: Option<EvictionCallback>,
    runtime: Handle,
}

impl TimerHandle {
    /// Spawns the countdown task. `on_fire` is called once the deadline passes
    /// and returns `false` if the timer was re-armed and should keep waiting.
    fn arm<F>(
        id: u64,
        ttl: Duration,
        runtime: Handle,
        callback: Option<EvictionCallback>,
        on_fire: F,
    ) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (deadline, rx) = watch::channel(Instant::now() + ttl);
        runtime.spawn(countdown(rx, on_fire));

        Self {
            id,
            deadline,
            callback,
            runtime,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn is_due(&self) -> bool {
        *self.deadline.borrow() <= Instant::now()
    }

    /// Moves the deadline to `ttl` from now.
    ///
    /// Returns `false` if the countdown task is gone and the handle is stale.
    fn reset(&mut self, ttl: Duration) -> bool {
        self.deadline.send(Instant::now() + ttl).is_ok()
    }

    fn into_callback(mut self) -> Option<EvictionCallback> {
        self.callback.take()
    }

    /// Stops the countdown without running the callback.
    fn stop(self) {
        trace!(timer = self.id, "Timer stopped");
    }

    /// Stops the countdown and dispatches the callback with the evicted value.
    pub(crate) fn evict(mut self, value: Value) {
        if let Some(callback) = self.callback.take() {
            trace!(timer = self.id, "Dispatching eviction callback");
            drop(self.runtime.spawn_blocking(move || callback(value)));
        }
    }
}

async fn countdown<F>(mut deadline: watch::Receiver<Instant>, mut on_fire: F)
where
    F: FnMut() -> bool,
{
    loop {
        let at = *deadline.borrow_and_update();

        tokio::select! {
            _ = time::sleep_until(at) => {
                if on_fire() {
                    return;
                }
            }
            changed = deadline.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

impl Container {
    /// Arms (or re-arms) a TTL on an existing key.
    ///
    /// See [`Container::set_expired_call`].
    pub fn set_expired(&self, key: impl Into<Key>, ttl: Duration) -> Result<()> {
        self.arm(key.into(), ttl, None)
    }

    /// Arms (or re-arms) a TTL on an existing key with an eviction callback.
    ///
    /// - Absent keys are ignored.
    /// - A zero `ttl` disarms the key's timer, keeping the key.
    /// - An armed timer has its deadline moved to `ttl` from now and its
    ///   callback replaced.
    ///
    /// When the deadline passes the key is deleted as if by [`Container::del`],
    /// and `callback` runs once, in the background, with the evicted value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if no runtime is available to run the timer.
    pub fn set_expired_call<F>(&self, key: impl Into<Key>, ttl: Duration, callback: F) -> Result<()>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.arm(key.into(), ttl, Some(Box::new(callback)))
    }

    /// Returns `true` if an expiry timer is armed for the key.
    pub fn has_expiry(&self, key: impl Into<Key>) -> bool {
        self.lock_book().timers.contains_key(&key.into())
    }

    fn arm(&self, key: Key, ttl: Duration, callback: Option<EvictionCallback>) -> Result<()> {
        let mut book = self.lock_book();

        if !self.contains(&key) {
            trace!(key = %key, "Ignoring TTL for absent key");
            return Ok(());
        }

        if ttl.is_zero() {
            if let Some(timer) = book.timers.remove(&key) {
                debug!(key = %key, timer = timer.id(), "Disarmed expiry timer");
                timer.stop();
            }
            return Ok(());
        }

        let mut callback = callback;
        if let Some(timer) = book.timers.get_mut(&key) {
            if let Some(replacement) = callback.take() {
                timer.callback = Some(replacement);
            }
            if timer.reset(ttl) {
                debug!(
                    key = %key,
                    timer = timer.id(),
                    ttl_ms = ttl.as_millis() as u64,
                    "Reset expiry timer"
                );
                return Ok(());
            }
        }
        if let Some(stale) = book.timers.remove(&key) {
            callback = stale.into_callback();
        }

        let runtime = self.config().expiry.handle()?;
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let on_fire = fire_hook(Arc::downgrade(&self.inner), key.clone(), id);
        let timer = TimerHandle::arm(id, ttl, runtime, callback, on_fire);

        debug!(
            key = %key,
            timer = id,
            ttl_ms = ttl.as_millis() as u64,
            "Armed expiry timer"
        );
        book.timers.insert(key, timer);
        Ok(())
    }

    /// Deletes `key` on behalf of timer `id`.
    ///
    /// Returns `true` when the timer is finished, `false` when its deadline was
    /// moved and it should keep waiting.
    fn expire(&self, key: &Key, id: u64) -> bool {
        let (removed, timer) = {
            let mut book = self.lock_book();
            match book.timers.get(key) {
                Some(timer) if timer.id() == id => {
                    if !timer.is_due() {
                        return false;
                    }
                }
                _ => return true,
            }
            let timer = book.timers.remove(key);
            (self.remove_locked(&mut book, key), timer)
        };

        debug!(key = %key, timer = id, "Key expired");
        if let Some(timer) = timer {
            timer.evict(removed.unwrap_or_default());
        }
        true
    }
}

fn fire_hook(container: Weak<Inner>, key: Key, id: u64) -> impl FnMut() -> bool + Send + 'static {
    move || match container.upgrade() {
        Some(inner) => Container::from_inner(inner).expire(&key, id),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(2);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_key_expires() {
        init_tracing();
        let m = Container::new();
        m.set("1", "1");
        m.set_expired("1", Duration::from_millis(50)).unwrap();
        assert!(m.has_expiry("1"));

        std::thread::sleep(Duration::from_millis(300));

        assert!(!m.has("1"));
        assert!(!m.has_expiry("1"));
        assert_eq!(m.len(), 0);
        assert!(m.keys().is_empty());
    }

    #[test]
    fn test_expiry_callback_receives_value() {
        init_tracing();
        let (tx, rx) = mpsc::channel();
        let m = Container::new();
        m.set("1", "1");
        m.set_expired_call("1", Duration::from_millis(50), move |v| {
            tx.send(v).unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Value::from("1"));
        assert!(!m.has("1"));
    }

    #[test]
    fn test_callback_sees_value_at_eviction_time() {
        let (tx, rx) = mpsc::channel();
        let m = Container::new();
        m.set("k", 1);
        m.set_expired_call("k", Duration::from_millis(50), move |v| {
            tx.send(v).unwrap();
        })
        .unwrap();
        m.set("k", 2);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_del_fires_callback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let m = Container::new();
        m.set("k", "v");

        let counter = Arc::clone(&calls);
        m.set_expired_call("k", Duration::from_millis(50), move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            tx.send(v).unwrap();
        })
        .unwrap();

        assert!(m.del("k"));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Value::from("v"));

        // The cancelled timer must not fire a second time
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!m.has_expiry("k"));
    }

    #[test]
    fn test_concurrent_arming_keeps_one_timer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let m = Container::new();
        m.set("k", "v");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let counter = Arc::clone(&calls);
                        m.set_expired_call("k", Duration::from_millis(5), move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        std::thread::sleep(Duration::from_millis(300));

        assert!(!m.has("k"));
        assert!(!m.has_expiry("k"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_absent_key_is_ignored() {
        let m = Container::new();
        m.set_expired("missing", Duration::from_millis(10)).unwrap();
        assert!(!m.has_expiry("missing"));
        assert!(!m.has("missing"));
    }

    #[test]
    fn test_zero_ttl_disarms() {
        let called = Arc::new(AtomicUsize::new(0));
        let m = Container::new();
        m.set("k", "v");

        let counter = Arc::clone(&called);
        m.set_expired_call("k", Duration::from_millis(50), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        m.set_expired("k", Duration::ZERO).unwrap();
        assert!(!m.has_expiry("k"));

        std::thread::sleep(Duration::from_millis(200));
        assert!(m.has("k"));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rearm_extends_deadline() {
        let m = Container::new();
        m.set("k", "v");
        m.set_expired("k", Duration::from_millis(100)).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        m.set_expired("k", Duration::from_millis(400)).unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert!(m.has("k"), "reset should have pushed the deadline back");

        std::thread::sleep(Duration::from_millis(500));
        assert!(!m.has("k"));
    }

    #[test]
    fn test_rearm_replaces_callback() {
        let (tx, rx) = mpsc::channel();
        let m = Container::new();
        m.set("k", "v");

        let first = tx.clone();
        m.set_expired_call("k", Duration::from_millis(50), move |_| {
            first.send("first").unwrap();
        })
        .unwrap();
        m.set_expired_call("k", Duration::from_millis(50), move |_| {
            tx.send("second").unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "second");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_rearm_without_callback_keeps_existing() {
        let (tx, rx) = mpsc::channel();
        let m = Container::new();
        m.set("k", "v");
        m.set_expired_call("k", Duration::from_millis(50), move |v| {
            tx.send(v).unwrap();
        })
        .unwrap();
        m.set_expired("k", Duration::from_millis(60)).unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Value::from("v"));
    }

    #[test]
    fn test_reset_fires_callbacks() {
        let (tx, rx) = mpsc::channel();
        let m = Container::new();
        m.set("1", "1");
        m.set("2", "2");
        m.set_expired_call("1", Duration::from_secs(60), move |v| {
            tx.send(v).unwrap();
        })
        .unwrap();

        m.reset();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Value::from("1"));
        assert_eq!(m.len(), 0);
        assert!(m.keys().is_empty());
        assert!(!m.has_expiry("1"));
    }

    #[test]
    fn test_callback_may_reenter_container() {
        let (tx, rx) = mpsc::channel();
        let m = Container::new();
        m.set("k", "v");

        let inner = m.clone();
        m.set_expired_call("k", Duration::from_millis(20), move |v| {
            inner.set("evicted", v);
            tx.send(inner.len()).unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
        assert_eq!(m.get("evicted"), Some(Value::from("v")));
    }

    #[test]
    fn test_timer_outliving_container_is_harmless() {
        let m = Container::new();
        m.set("k", "v");
        m.set_expired("k", Duration::from_millis(20)).unwrap();
        drop(m);

        std::thread::sleep(Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_timers_use_ambient_runtime() {
        let m = Container::new();
        m.set("k", "v");
        m.set_expired("k", Duration::from_millis(20)).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!m.has("k"));
    }

    #[test]
    fn test_configured_runtime() {
        let rt = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let m = Container::with_config(crate::ContainerConfig {
            expiry: ExpiryConfig::with_runtime(rt.handle().clone()),
            ..Default::default()
        });
        let child = m.new_map("child");
        child.set("k", "v");
        child.set_expired("k", Duration::from_millis(20)).unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert!(!child.has("k"));
    }
}
