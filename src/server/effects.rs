use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

pub type EffectError = Box<dyn std::error::Error + Send + Sync>;
pub type EffectFuture = BoxFuture<'static, Result<(), EffectError>>;
type EffectFn = Box<dyn FnMut() -> EffectFuture + Send>;

/// Credentialed host-platform surface. Method names are opaque strings, args
/// are opaque JSON; no return value is ever consumed.
pub trait HostApi: Send + Sync {
    fn invoke(&self, method: &str, args: Vec<serde_json::Value>) -> EffectFuture;
}

#[derive(Clone)]
pub struct EffectSettings {
    /// Additional attempts after an initial failure.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Reported to after the retry budget is exhausted; the entry is then
    /// dropped and never blocks later entries. Defaults to an error log.
    pub on_error: Option<Arc<dyn Fn(EffectError) + Send + Sync>>,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            on_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedCall {
    pub method: String,
    pub args: Vec<serde_json::Value>,
}

enum Entry {
    Effect(EffectFn),
    Fence(mpsc::Sender<()>),
}

struct Shared {
    pending: Mutex<VecDeque<Entry>>,
    tracked: Mutex<Vec<TrackedCall>>,
    closed: AtomicBool,
    wake_tx: async_channel::Sender<()>,
    settings: EffectSettings,
}

/// Decouples simulation ticks from slow or fallible host calls. Entries run
/// FIFO, one at a time, on a dedicated worker; a retrying entry holds its
/// place in line, so retries never reorder later entries.
pub struct EffectQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl EffectQueue {
    pub fn new(settings: EffectSettings) -> Self {
        let (wake_tx, wake_rx) = async_channel::bounded::<()>(1);
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::new()),
            tracked: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            wake_tx,
            settings,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("embers-effects".to_string())
            .spawn(move || run_worker(worker_shared, wake_rx))
            .expect("failed to spawn effect worker");

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Schedules an async side effect. The closure is re-invoked for each
    /// retry attempt.
    pub fn defer<F, Fut>(&self, effect: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
    {
        if self.shared.closed.load(Ordering::Relaxed) {
            log::warn!("effect queue is closed, dropping deferred effect");
            return;
        }
        let mut effect = effect;
        self.push(Entry::Effect(Box::new(move || effect().boxed())));
    }

    /// Schedules a retrying host-platform invocation.
    pub fn defer_invoke(
        &self,
        host: Arc<dyn HostApi>,
        method: impl Into<String>,
        args: Vec<serde_json::Value>,
    ) {
        let method = method.into();
        self.defer(move || host.invoke(&method, args.clone()));
    }

    /// Test affordance: records the call without executing anything.
    pub fn defer_tracked(&self, method: impl Into<String>, args: Vec<serde_json::Value>) {
        self.shared
            .tracked
            .lock()
            .expect("tracked lock poisoned")
            .push(TrackedCall {
                method: method.into(),
                args,
            });
    }

    pub fn tracked(&self) -> Vec<TrackedCall> {
        self.shared
            .tracked
            .lock()
            .expect("tracked lock poisoned")
            .clone()
    }

    /// Blocks until every entry queued before this call has finished
    /// (bounded by the retry budget). Deterministic shutdown and testing.
    pub fn flush(&self) {
        if self.shared.closed.load(Ordering::Relaxed) {
            return;
        }
        let (tx, rx) = mpsc::channel();
        self.push(Entry::Fence(tx));
        let _ = rx.recv();
    }

    /// Clears both the pending queue and the tracked list. An entry already
    /// executing finishes its attempts.
    pub fn reset(&self) {
        self.shared
            .pending
            .lock()
            .expect("pending lock poisoned")
            .clear();
        self.shared
            .tracked
            .lock()
            .expect("tracked lock poisoned")
            .clear();
    }

    pub fn close(&mut self) {
        self.shared.closed.store(true, Ordering::Relaxed);
        let _ = self.shared.wake_tx.try_send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn push(&self, entry: Entry) {
        self.shared
            .pending
            .lock()
            .expect("pending lock poisoned")
            .push_back(entry);
        let _ = self.shared.wake_tx.try_send(());
    }
}

impl Drop for EffectQueue {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(shared: Arc<Shared>, wake_rx: async_channel::Receiver<()>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build effect runtime");

    runtime.block_on(async move {
        loop {
            let entry = shared
                .pending
                .lock()
                .expect("pending lock poisoned")
                .pop_front();

            match entry {
                Some(Entry::Effect(effect)) => run_entry(&shared, effect).await,
                Some(Entry::Fence(tx)) => {
                    let _ = tx.send(());
                }
                None => {
                    if shared.closed.load(Ordering::Relaxed) {
                        break;
                    }
                    if wake_rx.recv().await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}

async fn run_entry(shared: &Shared, mut effect: EffectFn) {
    let settings = &shared.settings;
    let mut attempt = 0u32;
    loop {
        match effect().await {
            Ok(()) => return,
            Err(err) => {
                if attempt >= settings.max_retries {
                    match &settings.on_error {
                        Some(on_error) => on_error(err),
                        None => log::error!("deferred effect failed permanently: {err}"),
                    }
                    return;
                }

                let delay = settings.base_delay * (1u32 << attempt.min(16));
                log::warn!(
                    "deferred effect failed (attempt {}), retrying in {delay:?}: {err}",
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
                attempt += 1;

                // cancellation is observed between attempts, never during
                if shared.closed.load(Ordering::Relaxed) {
                    log::warn!("effect queue closing, abandoning retry");
                    return;
                }
            }
        }
    }
}
