//! Per-link poll loop
//!
//! A [`Connection`] owns one endpoint and one channel for its whole life:
//!
//! ```text
//!   Starting ──first heartbeat──► Active ◄──heartbeat──┐
//!       │                           │                  │
//!       │                       timeout                │
//!       │                           ▼                  │
//!       │                         Idle ────────────────┘
//!       │                           │
//!       └──── error / close / evicted / idle exit ────► Terminated
//! ```
//!
//! Each tick it re-checks channel ownership, drains the channel queue to the
//! endpoint, reads whatever the endpoint has, decodes and dispatches frames,
//! then checks the heartbeat deadline. Nothing in a tick waits on the
//! endpoint: bytes it cannot take stay in the link's pending buffer until a
//! later tick, and the channel queue backs up behind them.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::time::{Instant, MissedTickBehavior};

use super::config::{LinkConfig, LinkPolicy};
use super::counter::ActiveLinkCounter;
use super::handler::{LinkContext, LinkHandler};
use super::liveness::{Liveness, LivenessTracker};
use crate::channel::{ChannelClaim, ChannelPool};
use crate::codec::{Frame, MavlinkDecoder};
use crate::scheduler::PriorityHint;
use crate::stats::LinkStats;
use crate::transport::{self, Endpoint};

/// Link lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Channel held, no heartbeat yet
    Starting,
    /// Heartbeat seen within the timeout
    Active,
    /// Heartbeat timed out, still polling
    Idle,
    /// Loop has exited
    Terminated,
}

/// Why a link terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkExit {
    /// Write failed and the policy exits on error
    WriteError,
    /// Peer closed the endpoint
    Closed,
    /// Heartbeat timed out and the policy exits on idle
    Idle,
    /// Channel was released by someone else
    Evicted,
}

impl std::fmt::Display for LinkExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            LinkExit::WriteError => "write error",
            LinkExit::Closed => "closed by peer",
            LinkExit::Idle => "idle",
            LinkExit::Evicted => "evicted",
        };
        f.write_str(reason)
    }
}

/// Shared collaborators every link needs
pub(crate) struct LinkShared<H: LinkHandler> {
    pub pool: Arc<ChannelPool>,
    pub counter: Arc<ActiveLinkCounter>,
    pub handler: Arc<H>,
    pub priority: Arc<dyn PriorityHint>,
    pub config: LinkConfig,
}

impl<H: LinkHandler> Clone for LinkShared<H> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            counter: Arc::clone(&self.counter),
            handler: Arc::clone(&self.handler),
            priority: Arc::clone(&self.priority),
            config: self.config.clone(),
        }
    }
}

/// One running link
pub struct Connection<E: Endpoint, H: LinkHandler> {
    ctx: LinkContext,
    claim: ChannelClaim,
    endpoint: E,
    shared: LinkShared<H>,
    policy: LinkPolicy,
    decoder: MavlinkDecoder,
    liveness: LivenessTracker,
    stats: LinkStats,
    state: LinkState,
    write_buf: Vec<u8>,
    pending: BytesMut,
    read_buf: Vec<u8>,
    released: bool,
}

impl<E: Endpoint, H: LinkHandler> Connection<E, H> {
    /// Bind an endpoint to an already occupied channel
    pub(crate) fn new(
        name: String,
        endpoint: E,
        claim: ChannelClaim,
        shared: LinkShared<H>,
        policy: LinkPolicy,
    ) -> Self {
        let now = Instant::now();
        let ctx = LinkContext::new(name, claim.index(), endpoint.kind());
        let liveness = LivenessTracker::new(shared.config.heartbeat_timeout, now);
        let write_buf = vec![0u8; shared.config.write_chunk];
        let read_buf = vec![0u8; shared.config.read_buffer];
        let pending = BytesMut::with_capacity(write_buf.len());

        Self {
            ctx,
            claim,
            endpoint,
            shared,
            policy,
            decoder: MavlinkDecoder::new(),
            liveness,
            stats: LinkStats::new(now),
            state: LinkState::Starting,
            write_buf,
            pending,
            read_buf,
            released: false,
        }
    }

    pub fn context(&self) -> &LinkContext {
        &self.ctx
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Run until the link terminates
    pub async fn run(mut self) -> LinkExit {
        self.begin().await;

        let mut ticker = tokio::time::interval(self.shared.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            ticker.tick().await;
            if let Some(exit) = self.poll_once(Instant::now()).await {
                break exit;
            }
        };

        self.finish(exit).await;
        exit
    }

    async fn begin(&mut self) {
        let ch = self.ctx.channel;
        self.shared.pool.set_owner(ch, self.ctx.name.clone());
        if !self.policy.wait_for_heartbeat {
            self.shared.pool.set_claim_active(&self.claim, true);
        }

        tracing::info!(
            link = %self.ctx.name,
            channel = ch,
            transport = %self.ctx.transport,
            "Link started"
        );
        self.shared.handler.on_link_begin(&self.ctx).await;
    }

    /// One loop iteration at `now`
    pub(crate) async fn poll_once(&mut self, now: Instant) -> Option<LinkExit> {
        if !self.shared.pool.holds(&self.claim) {
            tracing::warn!(link = %self.ctx.name, channel = self.ctx.channel, "Channel released externally");
            return Some(LinkExit::Evicted);
        }

        if let Some(exit) = self.drain() {
            return Some(exit);
        }
        if let Some(exit) = self.ingest(now).await {
            return Some(exit);
        }
        self.check_liveness(now).await
    }

    fn drain(&mut self) -> Option<LinkExit> {
        loop {
            if self.pending.is_empty() {
                let n = self.shared.pool.drain(self.ctx.channel, &mut self.write_buf);
                if n == 0 {
                    return None;
                }
                self.pending.extend_from_slice(&self.write_buf[..n]);
            }

            match self.endpoint.try_write(&self.pending) {
                // Endpoint is full; retry on the next tick
                Ok(0) => return None,
                Ok(n) => {
                    self.pending.advance(n);
                    self.stats.bytes_out += n as u64;
                }
                Err(e) => {
                    self.stats.write_errors += 1;
                    if self.policy.exit_on_error {
                        tracing::error!(link = %self.ctx.name, error = %e, "Write failed");
                        return Some(LinkExit::WriteError);
                    }
                    // Drop the failed chunk, keep what is still queued
                    tracing::debug!(link = %self.ctx.name, error = %e, dropped = self.pending.len(), "Write failed");
                    self.pending.clear();
                    return None;
                }
            }
        }
    }

    async fn ingest(&mut self, now: Instant) -> Option<LinkExit> {
        let n = match self.endpoint.try_read(&mut self.read_buf) {
            Ok(n) => n,
            Err(e) if transport::is_closed(&e) => {
                tracing::debug!(link = %self.ctx.name, error = %e, "Endpoint closed");
                return Some(LinkExit::Closed);
            }
            Err(e) => {
                self.stats.read_errors += 1;
                tracing::debug!(link = %self.ctx.name, error = %e, "Read failed");
                return None;
            }
        };
        if n == 0 {
            return None;
        }
        self.stats.bytes_in += n as u64;

        for i in 0..n {
            let byte = self.read_buf[i];
            if let Some(frame) = self.decoder.push_byte(byte) {
                self.on_frame(frame, now).await;
            }
        }
        self.stats.parse_errors = self.decoder.stats().parse_errors;

        None
    }

    async fn on_frame(&mut self, frame: Frame, now: Instant) {
        self.stats.frames_in += 1;

        if let Err(e) = self.shared.handler.on_frame(&self.ctx, &frame).await {
            self.stats.dispatch_failures += 1;
            tracing::debug!(
                link = %self.ctx.name,
                msg_id = frame.msg_id(),
                system_id = frame.system_id(),
                error = %e,
                "Frame not handled"
            );
        }

        if frame.is_heartbeat() {
            self.stats.heartbeats += 1;
            if self.liveness.on_heartbeat(now) == Liveness::Activated {
                self.activate().await;
            }
        }
    }

    async fn check_liveness(&mut self, now: Instant) -> Option<LinkExit> {
        match self.liveness.poll(now) {
            Liveness::Deactivated => {
                self.deactivate().await;
                self.policy.exit_on_idle.then_some(LinkExit::Idle)
            }
            Liveness::Expired if self.policy.exit_on_idle => Some(LinkExit::Idle),
            _ => None,
        }
    }

    async fn activate(&mut self) {
        self.state = LinkState::Active;
        let active = self.shared.counter.increment();
        self.shared.priority.raise(&self.ctx.name);
        if self.policy.wait_for_heartbeat {
            self.shared.pool.set_claim_active(&self.claim, true);
        }

        tracing::info!(link = %self.ctx.name, channel = self.ctx.channel, active = active, "Link active");
        self.shared.handler.on_link_active(&self.ctx).await;
    }

    async fn deactivate(&mut self) {
        self.state = LinkState::Idle;
        let active = self.shared.counter.decrement();
        self.shared.priority.lower(&self.ctx.name);
        if self.policy.wait_for_heartbeat {
            self.shared.pool.set_claim_active(&self.claim, false);
        }

        tracing::info!(link = %self.ctx.name, channel = self.ctx.channel, active = active, "Link idle");
        self.shared.handler.on_link_idle(&self.ctx).await;
    }

    async fn finish(&mut self, exit: LinkExit) {
        self.release();

        let duration = self.stats.duration();
        tracing::info!(
            link = %self.ctx.name,
            reason = %exit,
            bytes_in = self.stats.bytes_in,
            bytes_out = self.stats.bytes_out,
            frames_in = self.stats.frames_in,
            dispatch_failures = self.stats.dispatch_failures,
            write_errors = self.stats.write_errors,
            parse_errors = self.stats.parse_errors,
            rx_bytes_per_sec = self.stats.rx_rate(duration),
            duration_ms = duration.as_millis() as u64,
            "Link terminated"
        );
        self.shared.handler.on_link_end(&self.ctx).await;
    }

    /// Leave the active count and give the channel back, once
    ///
    /// A channel that was released and re-occupied behind this link's back
    /// belongs to someone else and is left alone.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.state == LinkState::Active {
            self.shared.counter.decrement();
            self.shared.priority.lower(&self.ctx.name);
        }
        self.state = LinkState::Terminated;

        self.shared.pool.release_claim(&self.claim);
    }
}

impl<E: Endpoint, H: LinkHandler> Drop for Connection<E, H> {
    fn drop(&mut self) {
        // Task aborted or a hook panicked before teardown ran
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::codec::message::MSG_ID_COMMAND_LONG;
    use crate::codec::testing::{command_wire, heartbeat_wire};
    use crate::error::DispatchError;
    use crate::scheduler::NoPriority;
    use crate::transport::{memory_pair, MemoryEndpoint, MemoryPeer};

    #[derive(Default)]
    struct Recorder {
        begins: AtomicUsize,
        frames: AtomicUsize,
        actives: AtomicUsize,
        idles: AtomicUsize,
        ends: AtomicUsize,
    }

    impl LinkHandler for Recorder {
        async fn on_link_begin(&self, _ctx: &LinkContext) {
            self.begins.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_frame(&self, _ctx: &LinkContext, frame: &Frame) -> Result<(), DispatchError> {
            self.frames.fetch_add(1, Ordering::SeqCst);
            if frame.msg_id() == MSG_ID_COMMAND_LONG {
                return Err(DispatchError::Rejected("not armed".into()));
            }
            Ok(())
        }

        async fn on_link_active(&self, _ctx: &LinkContext) {
            self.actives.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_link_idle(&self, _ctx: &LinkContext) {
            self.idles.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_link_end(&self, _ctx: &LinkContext) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        pool: Arc<ChannelPool>,
        counter: Arc<ActiveLinkCounter>,
        handler: Arc<Recorder>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                pool: Arc::new(ChannelPool::with_capacity(4, 256)),
                counter: Arc::new(ActiveLinkCounter::new()),
                handler: Arc::new(Recorder::default()),
            }
        }

        fn connection(&self, policy: LinkPolicy) -> (Connection<MemoryEndpoint, Recorder>, MemoryPeer) {
            let (endpoint, peer) = memory_pair();
            let claim = self.pool.claim().unwrap();
            let shared = LinkShared {
                pool: Arc::clone(&self.pool),
                counter: Arc::clone(&self.counter),
                handler: Arc::clone(&self.handler),
                priority: Arc::new(NoPriority),
                config: LinkConfig::default(),
            };
            (Connection::new("test".into(), endpoint, claim, shared, policy), peer)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_activates_once() {
        let h = Harness::new();
        let (mut conn, peer) = h.connection(LinkPolicy::tcp());
        conn.begin().await;
        let t0 = Instant::now();

        assert!(!h.pool.is_active(0));
        peer.send(heartbeat_wire(0));
        peer.send(heartbeat_wire(1));
        assert_eq!(conn.poll_once(t0).await, None);

        assert_eq!(conn.state(), LinkState::Active);
        assert_eq!(h.counter.get(), 1);
        assert!(h.pool.is_active(0));
        assert_eq!(h.handler.actives.load(Ordering::SeqCst), 1);
        assert_eq!(conn.stats().heartbeats, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_boundary() {
        let h = Harness::new();
        let (mut conn, peer) = h.connection(LinkPolicy::tcp());
        conn.begin().await;
        let t0 = Instant::now();

        peer.send(heartbeat_wire(0));
        conn.poll_once(t0).await;
        assert_eq!(h.counter.get(), 1);

        conn.poll_once(t0 + Duration::from_secs(5)).await;
        assert_eq!(conn.state(), LinkState::Active);
        assert_eq!(h.counter.get(), 1);

        assert_eq!(conn.poll_once(t0 + Duration::from_millis(5001)).await, None);
        assert_eq!(conn.state(), LinkState::Idle);
        assert_eq!(h.counter.get(), 0);
        assert!(!h.pool.is_active(0));
        assert_eq!(h.handler.idles.load(Ordering::SeqCst), 1);

        // Still occupied: idle links keep polling
        assert!(h.pool.is_occupied(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_exit_policy() {
        let h = Harness::new();
        let (mut conn, peer) = h.connection(LinkPolicy::udp().exit_on_idle(true));
        conn.begin().await;
        let t0 = Instant::now();

        peer.send(heartbeat_wire(0));
        conn.poll_once(t0).await;
        assert_eq!(
            conn.poll_once(t0 + Duration::from_secs(6)).await,
            Some(LinkExit::Idle)
        );
        assert_eq!(h.counter.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_writes_queue() {
        let h = Harness::new();
        let (mut conn, mut peer) = h.connection(LinkPolicy::tcp());
        conn.begin().await;

        peer.send(heartbeat_wire(0));
        conn.poll_once(Instant::now()).await;

        h.pool.publish(b"downlink");
        conn.poll_once(Instant::now()).await;

        assert_eq!(peer.take_written(), b"downlink");
        assert_eq!(conn.stats().bytes_out, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_writes_keep_order() {
        let h = Harness::new();
        let (mut conn, mut peer) = h.connection(LinkPolicy::tcp());
        conn.begin().await;

        peer.send(heartbeat_wire(0));
        conn.poll_once(Instant::now()).await;

        peer.limit_writes(3);
        h.pool.publish(b"downlink");
        for _ in 0..3 {
            assert_eq!(conn.poll_once(Instant::now()).await, None);
        }

        assert_eq!(peer.take_written(), b"downlink");
        assert_eq!(conn.stats().bytes_out, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_endpoint_still_times_out() {
        let h = Harness::new();
        let (conn, mut peer) = h.connection(LinkPolicy::tcp());
        let task = tokio::spawn(conn.run());

        peer.send(heartbeat_wire(0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.counter.get(), 1);

        // Ground station stops reading, then stops sending heartbeats
        peer.limit_writes(0);
        h.pool.publish(b"telemetry");
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(h.counter.get(), 0);
        assert!(!h.pool.is_active(0));
        assert_eq!(h.handler.idles.load(Ordering::SeqCst), 1);
        assert!(!task.is_finished());

        // Once it reads again the held back bytes go out
        peer.limit_writes(usize::MAX);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(peer.take_written(), b"telemetry");

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_terminates_when_policy_says_so() {
        let h = Harness::new();
        let (conn, peer) = h.connection(LinkPolicy::tcp());
        let task = tokio::spawn(conn.run());

        peer.send(heartbeat_wire(0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.counter.get(), 1);

        peer.fail_writes(true);
        h.pool.publish(b"x");

        assert_eq!(task.await.unwrap(), LinkExit::WriteError);
        assert_eq!(h.counter.get(), 0);
        assert!(!h.pool.is_occupied(0));
        assert_eq!(h.handler.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_tolerated() {
        let h = Harness::new();
        let (mut conn, peer) = h.connection(LinkPolicy::serial());
        conn.begin().await;

        peer.send(heartbeat_wire(0));
        conn.poll_once(Instant::now()).await;

        peer.fail_writes(true);
        h.pool.publish(b"lost");
        assert_eq!(conn.poll_once(Instant::now()).await, None);
        assert_eq!(conn.stats().write_errors, 1);
        assert_eq!(conn.state(), LinkState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_close_terminates() {
        let h = Harness::new();
        let (conn, peer) = h.connection(LinkPolicy::tcp());
        let task = tokio::spawn(conn.run());

        peer.send(heartbeat_wire(0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(peer);

        assert_eq!(task.await.unwrap(), LinkExit::Closed);
        assert_eq!(h.counter.get(), 0);
        assert_eq!(h.pool.occupied_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_release_evicts() {
        let h = Harness::new();
        let (conn, peer) = h.connection(LinkPolicy::tcp());
        let task = tokio::spawn(conn.run());

        peer.send(heartbeat_wire(0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.pool.publish(b"queued");
        h.pool.release(0);

        assert_eq!(task.await.unwrap(), LinkExit::Evicted);
        assert_eq!(h.counter.get(), 0);
        assert!(!h.pool.is_occupied(0));
        assert!(!h.pool.is_active(0));
        assert!(!h.pool.has_pending(0));
        assert_eq!(h.pool.publish(b"after"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_link_leaves_next_owner_alone() {
        let h = Harness::new();
        let (conn, peer) = h.connection(LinkPolicy::tcp());
        let task = tokio::spawn(conn.run());

        peer.send(heartbeat_wire(0));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Released and taken again before the old link notices
        h.pool.release(0);
        let next = h.pool.claim().unwrap();
        assert_eq!(next.index(), 0);
        h.pool.set_claim_active(&next, true);

        assert_eq!(task.await.unwrap(), LinkExit::Evicted);
        assert!(h.pool.holds(&next));
        assert!(h.pool.is_active(0));
        assert_eq!(h.counter.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_stale_link_leaves_next_owner_alone() {
        let h = Harness::new();
        let (conn, peer) = h.connection(LinkPolicy::tcp());
        let task = tokio::spawn(conn.run());

        peer.send(heartbeat_wire(0));
        tokio::time::sleep(Duration::from_millis(50)).await;

        h.pool.release(0);
        let next = h.pool.claim().unwrap();
        task.abort();
        let _ = task.await;

        assert!(h.pool.holds(&next));
        assert_eq!(h.counter.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_for_heartbeat() {
        let h = Harness::new();
        let (mut conn, _peer) = h.connection(LinkPolicy::udp().wait_for_heartbeat(false));
        conn.begin().await;
        let t0 = Instant::now();

        assert!(h.pool.is_active(0));
        assert_eq!(h.counter.get(), 0);

        conn.poll_once(t0 + Duration::from_secs(10)).await;
        assert!(h.pool.is_active(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_is_not_fatal() {
        let h = Harness::new();
        let (mut conn, peer) = h.connection(LinkPolicy::tcp());
        conn.begin().await;

        peer.send(command_wire());
        assert_eq!(conn.poll_once(Instant::now()).await, None);

        assert_eq!(conn.stats().dispatch_failures, 1);
        assert_eq!(h.handler.frames.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_releases_channel() {
        let h = Harness::new();
        let (conn, peer) = h.connection(LinkPolicy::tcp());
        let task = tokio::spawn(conn.run());

        peer.send(heartbeat_wire(0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.counter.get(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(h.counter.get(), 0);
        assert!(!h.pool.is_occupied(0));
    }
}
