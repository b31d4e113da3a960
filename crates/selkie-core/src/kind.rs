//! Actor behaviour contract
//!
//! TigerStyle: Single-threaded execution guarantee per instance, explicit
//! verdicts for every state and persistence transition.

use crate::constants::ACTOR_KIND_LENGTH_BYTES_MAX;
use async_trait::async_trait;
use bytes::Bytes;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Message
// =============================================================================

/// Opaque application payload
///
/// Messages are carried through the runtime without introspection. The
/// bundled in-process transport passes the box through untouched; a network
/// transport is expected to apply a user-chosen codec at the boundary.
pub struct Message(Box<dyn Any + Send>);

impl Message {
    /// Wrap an application value
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Recover the application value, consuming the message
    ///
    /// Returns the message unchanged on type mismatch so callers can try
    /// another type or log the drop.
    pub fn downcast<T: Any>(self) -> std::result::Result<T, Message> {
        match self.0.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(b) => Err(Message(b)),
        }
    }

    /// Borrow the application value without consuming the message
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Deref through the box: Box<dyn Any> is itself Any.
        f.debug_tuple("Message")
            .field(&(*self.0).type_id())
            .finish()
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// The value returned by an actor callback
///
/// Tells the instance loop how to update in-memory state, whether to touch
/// the persister, and whether to keep running:
///
/// | verdict           | memory     | persister | loop      |
/// |-------------------|------------|-----------|-----------|
/// | `Ok(s')`          | `s'`       | `put`     | continue  |
/// | `OkNoPersist(s')` | `s'`       | —         | continue  |
/// | `NoUpdate`        | unchanged  | —         | continue  |
/// | `Stop`            | —          | `delete`  | terminate |
/// | `StopPersist(s')` | —          | `put`     | terminate |
/// | `StopNoPersist`   | —          | —         | terminate |
/// | `StopDelete`      | —          | `delete`  | terminate |
///
/// `Stop` and `StopDelete` are equivalent; both exist so callers can state
/// their intent explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Adopt the new state and persist it
    Ok(Bytes),
    /// Adopt the new state in memory only
    OkNoPersist(Bytes),
    /// Keep the current state untouched
    NoUpdate,
    /// Terminate and delete persisted state
    Stop,
    /// Terminate after persisting the final state
    StopPersist(Bytes),
    /// Terminate leaving persisted state as-is
    StopNoPersist,
    /// Terminate and delete persisted state (explicit form of `Stop`)
    StopDelete,
}

impl Verdict {
    /// Check whether this verdict terminates the instance loop
    pub fn is_stop(&self) -> bool {
        matches!(
            self,
            Verdict::Stop | Verdict::StopPersist(_) | Verdict::StopNoPersist | Verdict::StopDelete
        )
    }
}

// =============================================================================
// ActorKind
// =============================================================================

/// Actor behaviour - implement to define an actor kind
///
/// The runtime guarantees single-threaded execution per instance: no two
/// callbacks for the same `(kind, id)` ever run concurrently anywhere in the
/// cluster (best-effort during partitions).
///
/// State is an opaque byte string; the behaviour owns its own encoding.
#[async_trait]
pub trait ActorKind: Send + Sync + 'static {
    /// Stable name of this kind, used as the wire-level type token
    fn name(&self) -> &str;

    /// Handle the first message for an instance that has no persisted state
    ///
    /// Default: process the message against an empty state.
    async fn init(&self, id: &str, message: Message) -> Verdict {
        self.process(Bytes::new(), id, message).await
    }

    /// Handle a message against the current state
    ///
    /// Default: leave the state untouched.
    async fn process(&self, _state: Bytes, _id: &str, _message: Message) -> Verdict {
        Verdict::NoUpdate
    }

    /// Idle timeout for an instance holding the given state
    ///
    /// Recomputed after every message. `None` selects the node-wide
    /// configured default.
    fn time_to_live(&self, _state: &Bytes, _id: &str) -> Option<Duration> {
        None
    }
}

// =============================================================================
// KindRegistry
// =============================================================================

/// Registry mapping kind names to behaviours
///
/// Incoming cross-node deliveries carry only the kind name; the registry
/// resolves it to the local behaviour at launch time.
#[derive(Default)]
pub struct KindRegistry {
    kinds: HashMap<String, Arc<dyn ActorKind>>,
}

impl KindRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a behaviour under its stable name
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, kind: Arc<dyn ActorKind>) {
        let name = kind.name().to_string();
        debug_assert!(!name.is_empty(), "kind name must not be empty");
        debug_assert!(name.len() <= ACTOR_KIND_LENGTH_BYTES_MAX);
        self.kinds.insert(name, kind);
    }

    /// Resolve a kind by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ActorKind>> {
        self.kinds.get(name).cloned()
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoKind;

    #[async_trait]
    impl ActorKind for EchoKind {
        fn name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_message_downcast() {
        let msg = Message::new(42u32);
        assert_eq!(msg.downcast_ref::<u32>(), Some(&42));
        assert_eq!(msg.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_message_downcast_mismatch() {
        let msg = Message::new("hello");
        let msg = msg.downcast::<u32>().unwrap_err();
        assert_eq!(msg.downcast::<&str>().unwrap(), "hello");
    }

    #[test]
    fn test_verdict_is_stop() {
        assert!(!Verdict::Ok(Bytes::new()).is_stop());
        assert!(!Verdict::OkNoPersist(Bytes::new()).is_stop());
        assert!(!Verdict::NoUpdate.is_stop());
        assert!(Verdict::Stop.is_stop());
        assert!(Verdict::StopPersist(Bytes::new()).is_stop());
        assert!(Verdict::StopNoPersist.is_stop());
        assert!(Verdict::StopDelete.is_stop());
    }

    #[tokio::test]
    async fn test_default_callbacks() {
        let kind = EchoKind;

        // Default process leaves state untouched.
        let verdict = kind
            .process(Bytes::from("state"), "a", Message::new(()))
            .await;
        assert_eq!(verdict, Verdict::NoUpdate);

        // Default init forwards to process with an empty state.
        let verdict = kind.init("a", Message::new(())).await;
        assert_eq!(verdict, Verdict::NoUpdate);

        // Default ttl defers to the node-wide configuration.
        assert!(kind.time_to_live(&Bytes::new(), "a").is_none());
    }

    #[test]
    fn test_kind_registry() {
        let mut registry = KindRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(EchoKind));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }
}
