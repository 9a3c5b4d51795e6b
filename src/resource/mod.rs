//! Lazy, retryable ownership of one heavyweight resource.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use log::{error, info};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::error::{DetectorError, Result};

pub trait ResourceLoader<R>: Send + Sync {
    fn load(&self) -> Result<R>;
}

impl<R, F> ResourceLoader<R> for F
where
    F: Fn() -> Result<R> + Send + Sync,
{
    fn load(&self) -> Result<R> {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

enum Slot<R> {
    Unloaded,
    Loading,
    Ready(Arc<R>),
    Failed(String),
}

impl<R> Slot<R> {
    fn state(&self) -> LoadState {
        match self {
            Slot::Unloaded => LoadState::Unloaded,
            Slot::Loading => LoadState::Loading,
            Slot::Ready(_) => LoadState::Ready,
            Slot::Failed(_) => LoadState::Failed,
        }
    }
}

pub struct ResourceManager<R> {
    name: String,
    loader: Box<dyn ResourceLoader<R>>,
    slot: RwLock<Slot<R>>,
    load_lock: Mutex<()>,
    attempts: AtomicUsize,
    failures: AtomicUsize,
}

impl<R: Send + Sync> ResourceManager<R> {
    pub fn new<L>(name: impl Into<String>, loader: L) -> Self
    where
        L: ResourceLoader<R> + 'static,
    {
        Self {
            name: name.into(),
            loader: Box::new(loader),
            slot: RwLock::new(Slot::Unloaded),
            load_lock: Mutex::new(()),
            attempts: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LoadState {
        self.slot.read().state()
    }

    /// Message of the most recent failed load, while the manager sits in `Failed`.
    pub fn last_error(&self) -> Option<String> {
        match &*self.slot.read() {
            Slot::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    pub fn load_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn load_failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// The resource if it is `Ready`, otherwise `ResourceUnavailable`.
    pub fn get(&self) -> Result<Arc<R>> {
        match &*self.slot.read() {
            Slot::Ready(resource) => Ok(Arc::clone(resource)),
            other => Err(DetectorError::ResourceUnavailable(format!(
                "{} is {:?}",
                self.name,
                other.state()
            ))),
        }
    }

    /// Blocks while a load runs; call from a blocking context.
    pub fn ensure_loaded(&self) -> Result<Arc<R>> {
        if let Ok(resource) = self.get() {
            return Ok(resource);
        }

        let _guard = self.load_lock.lock();

        // Another caller may have finished loading while we waited.
        if let Ok(resource) = self.get() {
            return Ok(resource);
        }

        *self.slot.write() = Slot::Loading;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        info!("Cold start: loading {}", self.name);
        let started = Instant::now();

        match self.loader.load() {
            Ok(resource) => {
                let resource = Arc::new(resource);
                *self.slot.write() = Slot::Ready(Arc::clone(&resource));
                info!(
                    "{} loaded in {:.2?}",
                    self.name,
                    started.elapsed()
                );
                Ok(resource)
            }
            Err(e) => {
                let message = e.to_string();
                self.failures.fetch_add(1, Ordering::SeqCst);
                error!("Failed to load {}: {}", self.name, message);
                *self.slot.write() = Slot::Failed(message.clone());
                Err(DetectorError::ResourceUnavailable(format!(
                    "could not load {}: {}",
                    self.name, message
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread, time::Duration};

    use super::*;

    struct Counted {
        id: usize,
    }

    fn counting_loader(counter: Arc<AtomicUsize>) -> impl Fn() -> Result<Counted> + Send + Sync {
        move || {
            thread::sleep(Duration::from_millis(30));
            let id = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Counted { id })
        }
    }

    #[test]
    fn test_lazy_until_first_use() {
        let counter = Arc::new(AtomicUsize::new(0));
        let manager = ResourceManager::new("stub", counting_loader(Arc::clone(&counter)));

        assert_eq!(manager.state(), LoadState::Unloaded);
        assert!(matches!(
            manager.get(),
            Err(DetectorError::ResourceUnavailable(_))
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let resource = manager.ensure_loaded().unwrap();
        assert_eq!(resource.id, 0);
        assert_eq!(manager.state(), LoadState::Ready);
        assert_eq!(manager.get().unwrap().id, 0);
    }

    #[test]
    fn test_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let manager = ResourceManager::new("stub", counting_loader(Arc::clone(&counter)));

        let first = manager.ensure_loaded().unwrap();
        let second = manager.ensure_loaded().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(manager.load_attempts(), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_load() {
        const CALLERS: usize = 16;

        let counter = Arc::new(AtomicUsize::new(0));
        let manager = ResourceManager::new("stub", counting_loader(Arc::clone(&counter)));
        let barrier = Barrier::new(CALLERS);

        let ids = thread::scope(|scope| {
            let handles = (0..CALLERS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        manager.ensure_loaded().unwrap().id
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|&id| id == 0));
    }

    #[test]
    fn test_failure_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader_calls = Arc::clone(&calls);
        let manager = ResourceManager::new("flaky", move || {
            let n = loader_calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(DetectorError::Io(std::io::Error::other("out of memory")))
            } else {
                Ok(n)
            }
        });

        let err = manager.ensure_loaded().unwrap_err();
        assert!(matches!(err, DetectorError::ResourceUnavailable(_)));
        assert!(err.to_string().contains("out of memory"));
        assert_eq!(manager.state(), LoadState::Failed);
        assert!(manager.last_error().unwrap().contains("out of memory"));
        assert!(manager.get().is_err());

        assert_eq!(*manager.ensure_loaded().unwrap(), 1);
        assert_eq!(manager.state(), LoadState::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.load_attempts(), 2);
        assert_eq!(manager.load_failures(), 1);
        assert!(manager.last_error().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tasks_share_one_load() {
        let counter = Arc::new(AtomicUsize::new(0));
        let manager = Arc::new(ResourceManager::new(
            "stub",
            counting_loader(Arc::clone(&counter)),
        ));

        let tasks = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::task::spawn_blocking(move || manager.ensure_loaded().map(|r| r.id))
            })
            .collect::<Vec<_>>();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 0);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
