//! Actor instance loop
//!
//! TigerStyle: One task per resident instance; the loop is the sole mutator
//! of its state, so a given address never observes concurrent callbacks.

use crate::stopper::StopperHandle;
use bytes::Bytes;
use futures::FutureExt;
use selkie_core::{ActorAddr, ActorKind, Error, Message, Result, Verdict};
use selkie_storage::Persister;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// =============================================================================
// Handles
// =============================================================================

/// Signal that asks an instance to stop after its current message
///
/// Honoured ahead of queued mailbox messages; never preempts a callback
/// that is already running.
#[derive(Clone)]
pub struct StopSignal {
    tx: mpsc::UnboundedSender<()>,
}

impl StopSignal {
    /// Politely ask the instance to stop
    pub fn stop(&self) {
        let _ = self.tx.send(());
    }

    /// Build a signal around a bare channel, for stopper unit tests
    #[cfg(test)]
    pub(crate) fn for_test(tx: mpsc::UnboundedSender<()>) -> Self {
        Self { tx }
    }
}

/// Per-node record for a resident instance
///
/// Cheap to clone; the launcher's registry owns the canonical copy and the
/// fast send path reads it concurrently.
#[derive(Clone)]
pub struct InstanceHandle {
    addr: ActorAddr,
    instance_id: u64,
    mailbox_tx: mpsc::UnboundedSender<Message>,
    stop_tx: mpsc::UnboundedSender<()>,
    alive: Arc<AtomicBool>,
}

impl InstanceHandle {
    /// The instance's address
    pub fn addr(&self) -> &ActorAddr {
        &self.addr
    }

    /// Unique id of this residency (distinct across relaunches)
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Check liveness
    ///
    /// A `true` answer may be stale by the time a message is enqueued; see
    /// `deliver`.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Enqueue a message into the instance's mailbox
    ///
    /// Fails with `StaleHandle` when the loop terminated under us; the
    /// message is dropped, never relaunched from here.
    pub fn deliver(&self, message: Message) -> Result<()> {
        self.mailbox_tx
            .send(message)
            .map_err(|_| Error::stale_handle(self.addr.qualified_name()))
    }

    /// Politely ask the instance to stop
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

// =============================================================================
// Spawn
// =============================================================================

/// Everything an instance loop needs from its node
pub struct InstanceContext {
    pub addr: ActorAddr,
    pub instance_id: u64,
    pub kind: Arc<dyn ActorKind>,
    pub persister: Arc<dyn Persister>,
    pub stopper: StopperHandle,
    pub default_ttl: Duration,
}

/// Spawn an instance loop seeded with its first message
///
/// The first message is handled through the materialisation path (persisted
/// state or `init`), not the mailbox. The returned join handle completes
/// when the instance terminates for any reason; the launcher watches it to
/// reap the registry entries.
pub fn spawn(ctx: InstanceContext, first: Message) -> (InstanceHandle, JoinHandle<()>) {
    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = mpsc::unbounded_channel();
    let alive = Arc::new(AtomicBool::new(true));

    let handle = InstanceHandle {
        addr: ctx.addr.clone(),
        instance_id: ctx.instance_id,
        mailbox_tx,
        stop_tx: stop_tx.clone(),
        alive: alive.clone(),
    };

    let signal = StopSignal { tx: stop_tx };
    let task = tokio::spawn(run(ctx, first, mailbox_rx, stop_rx, signal, alive));
    (handle, task)
}

// =============================================================================
// Loop
// =============================================================================

/// What the loop does after applying a verdict
enum Flow {
    Continue(Bytes),
    Terminate,
}

async fn run(
    ctx: InstanceContext,
    first: Message,
    mut mailbox_rx: mpsc::UnboundedReceiver<Message>,
    mut stop_rx: mpsc::UnboundedReceiver<()>,
    signal: StopSignal,
    alive: Arc<AtomicBool>,
) {
    let addr = ctx.addr.clone();
    debug!(%addr, instance_id = ctx.instance_id, "instance starting");

    ctx.stopper.touch(ctx.instance_id, signal.clone());

    // Materialise: persisted state feeds process, absence feeds init.
    let flow = match ctx.persister.get(&addr).await {
        Err(e) => {
            // Startup fetch failed: drop the message, no replacement.
            warn!(%addr, error = %e, "state fetch failed, dropping first message");
            finish(&ctx, &alive);
            return;
        }
        Ok(Some(state)) => {
            let prior = state.clone();
            let verdict = invoke_process(&ctx, state, first).await;
            apply_verdict(&ctx, prior, verdict).await
        }
        Ok(None) => {
            let verdict = invoke_init(&ctx, first).await;
            // A brand-new instance that declined to produce state has
            // nothing worth keeping resident.
            let verdict = match verdict {
                Verdict::NoUpdate => Verdict::StopNoPersist,
                other => other,
            };
            apply_verdict(&ctx, Bytes::new(), verdict).await
        }
    };

    let mut state = match flow {
        Flow::Continue(state) => state,
        Flow::Terminate => {
            finish(&ctx, &alive);
            return;
        }
    };

    loop {
        let ttl = ctx
            .kind
            .time_to_live(&state, addr.id())
            .unwrap_or(ctx.default_ttl);

        tokio::select! {
            biased;

            // Stop requests outrank queued messages, and `None` (every
            // handle gone) means the instance is orphaned; either way the
            // loop ends after the message in flight, never mid-callback.
            _ = stop_rx.recv() => {
                debug!(%addr, "instance stopping on request");
                break;
            }

            received = tokio::time::timeout(ttl, mailbox_rx.recv()) => match received {
                Ok(Some(message)) => {
                    ctx.stopper.touch(ctx.instance_id, signal.clone());
                    let prior = state.clone();
                    let verdict = invoke_process(&ctx, state, message).await;
                    match apply_verdict(&ctx, prior, verdict).await {
                        Flow::Continue(next) => state = next,
                        Flow::Terminate => break,
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(%addr, ttl_ms = ttl.as_millis() as u64, "instance idle timeout");
                    break;
                }
            },
        }
    }

    finish(&ctx, &alive);
}

fn finish(ctx: &InstanceContext, alive: &AtomicBool) {
    alive.store(false, Ordering::Release);
    ctx.stopper.mark_done(ctx.instance_id);
    debug!(addr = %ctx.addr, instance_id = ctx.instance_id, "instance terminated");
}

/// Run `process`, treating a panicking callback as `StopNoPersist`
async fn invoke_process(ctx: &InstanceContext, state: Bytes, message: Message) -> Verdict {
    let fut = ctx.kind.process(state, ctx.addr.id(), message);
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(verdict) => verdict,
        Err(_) => {
            warn!(addr = %ctx.addr, "process callback panicked, stopping instance");
            Verdict::StopNoPersist
        }
    }
}

/// Run `init`, treating a panicking callback as `StopNoPersist`
async fn invoke_init(ctx: &InstanceContext, message: Message) -> Verdict {
    let fut = ctx.kind.init(ctx.addr.id(), message);
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(verdict) => verdict,
        Err(_) => {
            warn!(addr = %ctx.addr, "init callback panicked, stopping instance");
            Verdict::StopNoPersist
        }
    }
}

/// Apply the verdict table
///
/// Persister failures are logged and otherwise ignored: the update is simply
/// not durable, and the next materialisation observes the last successful
/// one.
async fn apply_verdict(ctx: &InstanceContext, current: Bytes, verdict: Verdict) -> Flow {
    match verdict {
        Verdict::Ok(state) => {
            if let Err(e) = ctx.persister.put(&ctx.addr, state.clone()).await {
                warn!(addr = %ctx.addr, error = %e, "state put failed");
            }
            Flow::Continue(state)
        }
        Verdict::OkNoPersist(state) => Flow::Continue(state),
        Verdict::NoUpdate => Flow::Continue(current),
        Verdict::Stop | Verdict::StopDelete => {
            if let Err(e) = ctx.persister.delete(&ctx.addr).await {
                warn!(addr = %ctx.addr, error = %e, "state delete failed");
            }
            Flow::Terminate
        }
        Verdict::StopPersist(state) => {
            if let Err(e) = ctx.persister.put(&ctx.addr, state).await {
                warn!(addr = %ctx.addr, error = %e, "state put failed");
            }
            Flow::Terminate
        }
        Verdict::StopNoPersist => Flow::Terminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FixedMemoryProbe;
    use crate::stopper::Stopper;
    use async_trait::async_trait;
    use selkie_storage::MemoryPersister;

    fn encode(n: i64) -> Bytes {
        Bytes::copy_from_slice(&n.to_be_bytes())
    }

    fn decode(state: &Bytes) -> i64 {
        if state.is_empty() {
            return 0;
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(state);
        i64::from_be_bytes(raw)
    }

    #[derive(Debug)]
    enum CounterMsg {
        Inc,
        IncNoPersist,
        Get(mpsc::UnboundedSender<i64>),
        Done,
        DoneKeep,
        Boom,
        Nothing,
    }

    struct CounterKind {
        ttl: Option<Duration>,
    }

    impl CounterKind {
        fn new() -> Self {
            Self { ttl: None }
        }
    }

    #[async_trait]
    impl ActorKind for CounterKind {
        fn name(&self) -> &str {
            "counter"
        }

        async fn process(&self, state: Bytes, _id: &str, message: Message) -> Verdict {
            let count = decode(&state);
            match message.downcast::<CounterMsg>().expect("counter message") {
                CounterMsg::Inc => Verdict::Ok(encode(count + 1)),
                CounterMsg::IncNoPersist => Verdict::OkNoPersist(encode(count + 1)),
                CounterMsg::Get(tx) => {
                    let _ = tx.send(count);
                    Verdict::Ok(encode(count))
                }
                CounterMsg::Done => Verdict::Stop,
                CounterMsg::DoneKeep => Verdict::StopPersist(encode(count)),
                CounterMsg::Boom => panic!("counter exploded"),
                CounterMsg::Nothing => Verdict::NoUpdate,
            }
        }

        fn time_to_live(&self, _state: &Bytes, _id: &str) -> Option<Duration> {
            self.ttl
        }
    }

    struct Fixture {
        persister: Arc<MemoryPersister>,
        stopper: StopperHandle,
        next_instance_id: std::sync::atomic::AtomicU64,
        _stopper_task: JoinHandle<()>,
    }

    impl Fixture {
        fn new() -> Self {
            let probe = Arc::new(FixedMemoryProbe::new(80, 100));
            let (stopper, task) = Stopper::spawn(probe);
            Self {
                persister: Arc::new(MemoryPersister::new()),
                stopper,
                next_instance_id: std::sync::atomic::AtomicU64::new(1),
                _stopper_task: task,
            }
        }

        fn spawn_counter(
            &self,
            id: &str,
            ttl: Option<Duration>,
            first: CounterMsg,
        ) -> (InstanceHandle, JoinHandle<()>) {
            let ctx = InstanceContext {
                addr: ActorAddr::new("counter", id).unwrap(),
                instance_id: self.next_instance_id.fetch_add(1, Ordering::SeqCst),
                kind: Arc::new(CounterKind { ttl }),
                persister: self.persister.clone(),
                stopper: self.stopper.clone(),
                default_ttl: Duration::from_secs(60),
            };
            spawn(ctx, Message::new(first))
        }
    }

    async fn get(handle: &InstanceHandle) -> i64 {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.deliver(Message::new(CounterMsg::Get(tx))).unwrap();
        rx.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_state_flows_between_invocations() {
        let fixture = Fixture::new();
        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::Inc);

        handle.deliver(Message::new(CounterMsg::Inc)).unwrap();
        handle.deliver(Message::new(CounterMsg::Inc)).unwrap();
        assert_eq!(get(&handle).await, 3);

        handle.stop();
        task.await.unwrap();
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_ok_verdict_persists() {
        let fixture = Fixture::new();
        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::Inc);
        assert_eq!(get(&handle).await, 1);

        let addr = ActorAddr::new("counter", "a").unwrap();
        assert_eq!(
            fixture.persister.get(&addr).await.unwrap(),
            Some(encode(1))
        );

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_ok_no_persist_skips_persister() {
        let fixture = Fixture::new();
        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::IncNoPersist);
        assert_eq!(get(&handle).await, 1);

        // The later Get persisted count 1; the IncNoPersist itself wrote
        // nothing, which an inspection before the Get would show. Use a
        // fresh instance to observe the pure no-persist path.
        let (handle2, task2) = fixture.spawn_counter("b", None, CounterMsg::IncNoPersist);
        let addr = ActorAddr::new("counter", "b").unwrap();
        // Wait for the first message to be fully applied.
        handle2.deliver(Message::new(CounterMsg::Nothing)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fixture.persister.get(&addr).await.unwrap(), None);

        handle.stop();
        handle2.stop();
        task.await.unwrap();
        task2.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_deletes_persisted_state() {
        let fixture = Fixture::new();
        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::Inc);
        assert_eq!(get(&handle).await, 1);

        handle.deliver(Message::new(CounterMsg::Done)).unwrap();
        task.await.unwrap();

        let addr = ActorAddr::new("counter", "a").unwrap();
        assert_eq!(fixture.persister.get(&addr).await.unwrap(), None);
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_stop_persist_keeps_final_state() {
        let fixture = Fixture::new();
        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::Inc);
        assert_eq!(get(&handle).await, 1);

        handle.deliver(Message::new(CounterMsg::DoneKeep)).unwrap();
        task.await.unwrap();

        let addr = ActorAddr::new("counter", "a").unwrap();
        assert_eq!(
            fixture.persister.get(&addr).await.unwrap(),
            Some(encode(1))
        );
    }

    #[tokio::test]
    async fn test_materialises_from_persisted_state() {
        let fixture = Fixture::new();
        let addr = ActorAddr::new("counter", "a").unwrap();
        fixture.persister.put(&addr, encode(41)).await.unwrap();

        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::Inc);
        assert_eq!(get(&handle).await, 42);

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_init_no_update_terminates_without_persisting() {
        let fixture = Fixture::new();
        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::Nothing);
        task.await.unwrap();

        assert!(!handle.is_alive());
        let addr = ActorAddr::new("counter", "a").unwrap();
        assert_eq!(fixture.persister.get(&addr).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_existing_state_no_update_continues() {
        let fixture = Fixture::new();
        let addr = ActorAddr::new("counter", "a").unwrap();
        fixture.persister.put(&addr, encode(7)).await.unwrap();

        // NoUpdate against fetched state keeps the instance resident with
        // that state.
        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::Nothing);
        assert_eq!(get(&handle).await, 7);

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_timeout_terminates() {
        let fixture = Fixture::new();
        let (handle, task) = fixture.spawn_counter(
            "a",
            Some(Duration::from_millis(50)),
            CounterMsg::Inc,
        );

        task.await.unwrap();
        assert!(!handle.is_alive());

        // Persisted state outlives the residency.
        let addr = ActorAddr::new("counter", "a").unwrap();
        assert_eq!(
            fixture.persister.get(&addr).await.unwrap(),
            Some(encode(1))
        );
    }

    #[tokio::test]
    async fn test_callback_panic_is_stop_no_persist() {
        let fixture = Fixture::new();
        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::Inc);
        assert_eq!(get(&handle).await, 1);

        handle.deliver(Message::new(CounterMsg::Boom)).unwrap();
        task.await.unwrap();
        assert!(!handle.is_alive());

        // Prior persisted state remains.
        let addr = ActorAddr::new("counter", "a").unwrap();
        assert_eq!(
            fixture.persister.get(&addr).await.unwrap(),
            Some(encode(1))
        );
    }

    #[tokio::test]
    async fn test_stale_delivery_fails_after_termination() {
        let fixture = Fixture::new();
        let (handle, task) = fixture.spawn_counter("a", None, CounterMsg::Inc);

        handle.deliver(Message::new(CounterMsg::Done)).unwrap();
        task.await.unwrap();

        let err = handle.deliver(Message::new(CounterMsg::Inc)).unwrap_err();
        assert!(matches!(err, Error::StaleHandle { .. }));
    }

    // Persister whose get always fails, for the startup-error path.
    struct BrokenPersister;

    #[async_trait]
    impl Persister for BrokenPersister {
        async fn get(&self, _addr: &ActorAddr) -> Result<Option<Bytes>> {
            Err(Error::persister("injected get failure"))
        }

        async fn put(&self, _addr: &ActorAddr, _state: Bytes) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _addr: &ActorAddr) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_get_error_aborts_materialisation() {
        let probe = Arc::new(FixedMemoryProbe::new(80, 100));
        let (stopper, _stopper_task) = Stopper::spawn(probe);

        let ctx = InstanceContext {
            addr: ActorAddr::new("counter", "a").unwrap(),
            instance_id: 1,
            kind: Arc::new(CounterKind::new()),
            persister: Arc::new(BrokenPersister),
            stopper,
            default_ttl: Duration::from_secs(60),
        };
        let (handle, task) = spawn(ctx, Message::new(CounterMsg::Inc));

        // The message is dropped and the instance never becomes resident.
        task.await.unwrap();
        assert!(!handle.is_alive());
    }
}
