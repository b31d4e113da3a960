//! Node assembly
//!
//! TigerStyle: Single entry point, explicit configuration, clean shutdown.
//! A server node wires persister, stopper, launcher and router together; a
//! client-only node keeps just the router.

use crate::router::Router;
use crate::transport::LocalNetwork;
use crate::view::ClusterView;
use selkie_core::{
    ActorAddr, ActorKind, KindRegistry, Message, NodeConfig, NodeId, PersistConfig, Result,
};
use selkie_runtime::{
    Launcher, LauncherHandle, MemoryProbe, Stopper, StopperHandle, SystemMemoryProbe,
};
use selkie_storage::{DiskPersister, MemoryPersister, Persister};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Builder for a Selkie node
pub struct NodeBuilder {
    network: LocalNetwork,
    config: NodeConfig,
    kinds: KindRegistry,
    persister: Option<Arc<dyn Persister>>,
    memory_probe: Option<Arc<dyn MemoryProbe>>,
}

impl NodeBuilder {
    /// Start building a node attached to a cluster fabric
    pub fn new(network: LocalNetwork) -> Self {
        Self {
            network,
            config: NodeConfig::default(),
            kinds: KindRegistry::new(),
            persister: None,
            memory_probe: None,
        }
    }

    /// Set the node configuration
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an actor kind
    pub fn with_kind(mut self, kind: Arc<dyn ActorKind>) -> Self {
        self.kinds.register(kind);
        self
    }

    /// Supply a persister, overriding the configured provider
    ///
    /// Sharing one persister between nodes is how a cluster-wide store is
    /// modelled in-process.
    pub fn with_persister(mut self, persister: Arc<dyn Persister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Supply a memory probe, overriding the host probe
    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory_probe = Some(probe);
        self
    }

    /// Validate, wire and start the node
    pub async fn start(self) -> Result<Node> {
        self.config.validate()?;

        let id = match self.config.node_id {
            Some(ref configured) => NodeId::new(configured.clone())?,
            None => NodeId::generate(),
        };

        let mut tasks = Vec::new();
        let mut launcher_handle = None;
        let mut stopper_handle = None;

        let mut launcher_task = None;
        if !self.config.client_only {
            let persister = match self.persister {
                Some(persister) => persister,
                None => build_persister(&self.config.persist).await?,
            };

            let probe = self
                .memory_probe
                .unwrap_or_else(|| Arc::new(SystemMemoryProbe::new()));
            let (stopper, stopper_task) = Stopper::spawn(probe);
            tasks.push(stopper_task);

            let launcher = Launcher::new(
                id.clone(),
                Arc::new(self.kinds),
                persister,
                stopper.clone(),
                self.config.default_time_to_live(),
            );
            let (handle, task) = launcher.spawn();
            launcher_task = Some(task);

            launcher_handle = Some(handle);
            stopper_handle = Some(stopper);
        }

        let (transport, events) = self.network.join(id.clone(), launcher_handle.clone());
        let router = Router::new(id.clone(), Arc::new(transport), launcher_handle.clone());
        router.refresh_view().await;
        tasks.push(router.clone().spawn_event_loop(events));

        info!(
            node = %id,
            client_only = self.config.client_only,
            "node started"
        );

        Ok(Node {
            id,
            router,
            launcher: launcher_handle,
            launcher_task,
            stopper: stopper_handle,
            network: self.network,
            tasks,
        })
    }
}

async fn build_persister(config: &PersistConfig) -> Result<Arc<dyn Persister>> {
    match config {
        PersistConfig::Memory { capacity } => Ok(match capacity {
            Some(capacity) => Arc::new(MemoryPersister::bounded(*capacity)),
            None => Arc::new(MemoryPersister::new()),
        }),
        PersistConfig::Disk { dir } => Ok(Arc::new(DiskPersister::open(dir.clone()).await?)),
    }
}

/// A running Selkie node
pub struct Node {
    id: NodeId,
    router: Arc<Router>,
    launcher: Option<LauncherHandle>,
    launcher_task: Option<JoinHandle<()>>,
    stopper: Option<StopperHandle>,
    network: LocalNetwork,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Start building a node
    pub fn builder(network: LocalNetwork) -> NodeBuilder {
        NodeBuilder::new(network)
    }

    /// This node's identity
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Enqueue a message to the addressed actor, wherever it lives
    pub async fn send(&self, kind: &str, id: &str, message: Message) -> Result<()> {
        self.router.send(kind, id, message).await
    }

    /// Snapshot of this node's cluster view
    pub async fn view(&self) -> ClusterView {
        self.router.view().await
    }

    /// Number of locally resident instances (0 on client-only nodes)
    pub async fn resident_count(&self) -> usize {
        match self.launcher {
            Some(ref launcher) => launcher.resident_count().await,
            None => 0,
        }
    }

    /// Addresses of locally resident instances (instrumentation)
    pub async fn resident_addrs(&self) -> Vec<ActorAddr> {
        match self.launcher {
            Some(ref launcher) => launcher.resident_addrs().await,
            None => Vec::new(),
        }
    }

    /// Stopper handle, for operators and tests that trigger pressure checks
    pub fn stopper(&self) -> Option<&StopperHandle> {
        self.stopper.as_ref()
    }

    /// Leave the cluster and stop all local instances
    pub async fn shutdown(mut self) -> Result<()> {
        info!(node = %self.id, "node shutting down");

        if let Some(ref launcher) = self.launcher {
            launcher.shutdown();
        }
        self.network.leave(&self.id);

        // Wait for the launcher to finish stopping its instances; the
        // remaining background tasks are aborted on drop.
        if let Some(task) = self.launcher_task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(ref task) = self.launcher_task {
            task.abort();
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}
