//! Starting links on the runtime
//!
//! Links normally share the runtime's worker threads. When the priority
//! hint changes thread scheduling, every link instead gets an OS thread
//! with a single-threaded runtime, and a small task on the caller's runtime
//! stands in for it: aborting that task cancels the link.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::config::{LinkConfig, LinkPolicy};
use super::connection::{Connection, LinkExit, LinkShared};
use super::counter::ActiveLinkCounter;
use super::handler::LinkHandler;
use crate::channel::ChannelPool;
use crate::error::{Error, Result};
use crate::scheduler::PriorityHint;
use crate::transport::Endpoint;

/// Occupies a channel and spawns a [`Connection`] task for an endpoint
///
/// Cheap to clone; adapters each hold one.
pub struct LinkSpawner<H: LinkHandler> {
    shared: LinkShared<H>,
    started: Arc<AtomicU64>,
    refused: Arc<AtomicU64>,
}

impl<H: LinkHandler> Clone for LinkSpawner<H> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            started: Arc::clone(&self.started),
            refused: Arc::clone(&self.refused),
        }
    }
}

impl<H: LinkHandler> LinkSpawner<H> {
    pub fn new(
        pool: Arc<ChannelPool>,
        counter: Arc<ActiveLinkCounter>,
        handler: Arc<H>,
        priority: Arc<dyn PriorityHint>,
        config: LinkConfig,
    ) -> Self {
        Self {
            shared: LinkShared {
                pool,
                counter,
                handler,
                priority,
                config,
            },
            started: Arc::new(AtomicU64::new(0)),
            refused: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.shared.pool
    }

    pub fn counter(&self) -> &Arc<ActiveLinkCounter> {
        &self.shared.counter
    }

    /// Links started so far
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Links refused because every channel was taken
    pub fn refused(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }

    /// Build a link without starting it
    ///
    /// Fails with [`Error::PoolExhausted`] when no channel is free; the
    /// endpoint is dropped in that case.
    pub fn connect<E: Endpoint>(
        &self,
        name: impl Into<String>,
        endpoint: E,
        policy: LinkPolicy,
    ) -> Result<Connection<E, H>> {
        let name = name.into();
        let Some(claim) = self.shared.pool.claim() else {
            self.refused.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(link = %name, channels = self.shared.pool.capacity(), "No free channel, link refused");
            return Err(Error::PoolExhausted {
                capacity: self.shared.pool.capacity(),
            });
        };

        self.started.fetch_add(1, Ordering::Relaxed);
        Ok(Connection::new(name, endpoint, claim, self.shared.clone(), policy))
    }

    /// Claim a channel and run the link on its own task
    pub fn spawn<E: Endpoint>(
        &self,
        name: impl Into<String>,
        endpoint: E,
        policy: LinkPolicy,
    ) -> Result<JoinHandle<LinkExit>> {
        if !self.shared.priority.dedicated_thread() {
            let connection = self.connect(name, endpoint, policy)?;
            return Ok(tokio::spawn(connection.run()));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let connection = self.connect(name, endpoint, policy)?;
        spawn_dedicated(runtime, connection)
    }
}

fn spawn_dedicated<E: Endpoint, H: LinkHandler>(
    runtime: tokio::runtime::Runtime,
    connection: Connection<E, H>,
) -> Result<JoinHandle<LinkExit>> {
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let (exit_tx, exit_rx) = oneshot::channel();
    let thread_name = format!("link-{}", connection.context().channel);

    thread::Builder::new().name(thread_name).spawn(move || {
        let exit = runtime.block_on(async move {
            tokio::select! {
                exit = connection.run() => Some(exit),
                // Sender dropped: the supervising task was aborted
                _ = cancel_rx => None,
            }
        });
        let _ = exit_tx.send(exit);
    })?;

    Ok(tokio::spawn(async move {
        let _cancel = cancel_tx;
        exit_rx.await.ok().flatten().unwrap_or(LinkExit::Closed)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::codec::testing::heartbeat_wire;
    use crate::link::NullHandler;
    use crate::scheduler::NoPriority;
    use crate::transport::memory_pair;

    /// Records which thread every raise ran on
    #[derive(Default)]
    struct ThreadRecorder {
        raised_on: Mutex<Vec<(thread::ThreadId, Option<String>)>>,
    }

    impl PriorityHint for ThreadRecorder {
        fn raise(&self, _link: &str) {
            let current = thread::current();
            let name = current.name().map(str::to_owned);
            self.raised_on.lock().unwrap().push((current.id(), name));
        }

        fn lower(&self, _link: &str) {}

        fn dedicated_thread(&self) -> bool {
            true
        }
    }

    fn spawner(channels: usize) -> LinkSpawner<NullHandler> {
        LinkSpawner::new(
            Arc::new(ChannelPool::with_capacity(channels, 64)),
            Arc::new(ActiveLinkCounter::new()),
            Arc::new(NullHandler),
            Arc::new(NoPriority),
            LinkConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_spawn_refuses_when_full() {
        let spawner = spawner(1);

        let (first, _peer1) = memory_pair();
        let handle = spawner.spawn("first", first, LinkPolicy::tcp()).unwrap();

        let (second, _peer2) = memory_pair();
        let err = spawner.spawn("second", second, LinkPolicy::tcp()).unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { capacity: 1 }));
        assert_eq!(spawner.started(), 1);
        assert_eq!(spawner.refused(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_connect_records_owner() {
        let spawner = spawner(2);
        let (endpoint, _peer) = memory_pair();
        let conn = spawner.connect("gcs", endpoint, LinkPolicy::udp()).unwrap();

        assert_eq!(conn.context().channel, 0);
        assert!(spawner.pool().is_occupied(0));

        drop(conn);
        assert!(!spawner.pool().is_occupied(0));
    }

    #[tokio::test]
    async fn test_priority_links_run_on_their_own_threads() {
        let recorder = Arc::new(ThreadRecorder::default());
        let spawner = LinkSpawner::new(
            Arc::new(ChannelPool::with_capacity(2, 64)),
            Arc::new(ActiveLinkCounter::new()),
            Arc::new(NullHandler),
            Arc::clone(&recorder) as Arc<dyn PriorityHint>,
            LinkConfig::default(),
        );

        let (first, peer1) = memory_pair();
        let (second, peer2) = memory_pair();
        let h1 = spawner.spawn("first", first, LinkPolicy::tcp()).unwrap();
        let h2 = spawner.spawn("second", second, LinkPolicy::tcp()).unwrap();
        peer1.send(heartbeat_wire(0));
        peer2.send(heartbeat_wire(0));

        for _ in 0..200 {
            if recorder.raised_on.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(spawner.counter().get(), 2);

        let raised = recorder.raised_on.lock().unwrap().clone();
        assert_eq!(raised.len(), 2);
        let ids: HashSet<_> = raised.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&thread::current().id()));
        let mut names: Vec<_> = raised.into_iter().filter_map(|(_, name)| name).collect();
        names.sort();
        assert_eq!(names, vec!["link-0".to_string(), "link-1".to_string()]);

        // Aborting the stand-in task cancels the link on its thread
        h1.abort();
        h2.abort();
        for _ in 0..200 {
            if spawner.pool().occupied_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(spawner.pool().occupied_count(), 0);
        assert_eq!(spawner.counter().get(), 0);
    }
}
