//! The per-session container instance and its lifecycle.

use std::any::Any;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use trellis_app::{
    Command, CommandQueue, ComponentId, ComponentTree, TaskQueues, TreeSnapshot,
};
use trellis_protocol::{ServerMessage, SyncError};

use crate::peer::{InputContext, RenderContext};
use crate::transfer_registry::TransferRegistry;

/// Lifecycle of a container instance.
///
/// `Created` → `Active` (init runs the application hook exactly once) →
/// (`Passivated` ⇄ `Active`) → `Disposed` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Active,
    Passivated,
    Disposed,
}

/// Everything the application may touch during its lifecycle hooks.
pub struct AppContext<'a> {
    pub tree: &'a mut ComponentTree,
    pub commands: &'a mut CommandQueue,
    pub tasks: &'a mut TaskQueues,
}

/// Application-side hooks driven by the container.
///
/// `init` builds the initial component tree; it runs exactly once per
/// instance. `activated`/`passivated` bracket passivation; listeners must be
/// reattached in `activated` since snapshots do not capture them.
pub trait ApplicationDelegate: Send {
    fn init(&mut self, ctx: &mut AppContext<'_>) -> Result<(), SyncError>;

    fn activated(&mut self, ctx: &mut AppContext<'_>) {
        let _ = ctx;
    }

    fn passivated(&mut self) {}

    fn disposed(&mut self) {}
}

/// Serializable container state produced by passivation.
#[derive(Serialize, Deserialize)]
pub struct ContainerSnapshot {
    tree: TreeSnapshot,
}

/// One application bound to one session.
pub struct ContainerInstance {
    state: LifecycleState,
    app: Box<dyn ApplicationDelegate>,
    tree: ComponentTree,
    commands: CommandQueue,
    tasks: TaskQueues,
    render_state: HashMap<ComponentId, Box<dyn Any + Send + Sync>>,
    transfers: TransferRegistry,
    /// Download transfer ids issued for this instance and not yet served;
    /// released on dispose so abandoned sessions do not leak registry
    /// entries.
    issued_downloads: Vec<String>,
}

impl ContainerInstance {
    pub fn new(app: Box<dyn ApplicationDelegate>, transfers: TransferRegistry) -> Self {
        Self {
            state: LifecycleState::Created,
            app,
            tree: ComponentTree::new(),
            commands: CommandQueue::default(),
            tasks: TaskQueues::default(),
            render_state: HashMap::new(),
            transfers,
            issued_downloads: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Runs the application's init hook. Fails with `IllegalState` on any
    /// instance that is not freshly created.
    pub fn init(&mut self) -> Result<(), SyncError> {
        if self.state != LifecycleState::Created {
            return Err(SyncError::IllegalState(format!(
                "init on a container in state {:?}",
                self.state
            )));
        }
        let mut ctx = AppContext {
            tree: &mut self.tree,
            commands: &mut self.commands,
            tasks: &mut self.tasks,
        };
        self.app.init(&mut ctx)?;
        self.state = LifecycleState::Active;
        info!("container instance initialized");
        Ok(())
    }

    /// Notifies the application and captures a serializable snapshot. Every
    /// passivation is matched by a reactivation unless disposal follows
    /// directly.
    pub fn passivate(&mut self) -> Result<ContainerSnapshot, SyncError> {
        if self.state != LifecycleState::Active {
            return Err(SyncError::IllegalState(format!(
                "passivate on a container in state {:?}",
                self.state
            )));
        }
        self.app.passivated();
        self.state = LifecycleState::Passivated;
        debug!("container instance passivated");
        Ok(ContainerSnapshot {
            tree: self.tree.snapshot(),
        })
    }

    /// Restores tree state from a snapshot and notifies the application so
    /// it can reattach listeners.
    pub fn reactivate(&mut self, snapshot: ContainerSnapshot) -> Result<(), SyncError> {
        if self.state != LifecycleState::Passivated {
            return Err(SyncError::IllegalState(format!(
                "reactivate on a container in state {:?}",
                self.state
            )));
        }
        self.tree = ComponentTree::restore(snapshot.tree);
        let mut ctx = AppContext {
            tree: &mut self.tree,
            commands: &mut self.commands,
            tasks: &mut self.tasks,
        };
        self.app.activated(&mut ctx);
        self.state = LifecycleState::Active;
        debug!("container instance reactivated");
        Ok(())
    }

    /// Tears the instance down. Idempotent; the application's dispose hook
    /// runs exactly once, and registry entries owned by this instance are
    /// released.
    pub fn dispose(&mut self) {
        if self.state == LifecycleState::Disposed {
            return;
        }
        self.app.disposed();
        self.render_state.clear();
        for id in self.issued_downloads.drain(..) {
            self.transfers.remove_download(&id);
        }
        self.state = LifecycleState::Disposed;
        info!("container instance disposed");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Owned state
    // ─────────────────────────────────────────────────────────────────────

    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ComponentTree {
        &mut self.tree
    }

    pub fn app_context(&mut self) -> AppContext<'_> {
        AppContext {
            tree: &mut self.tree,
            commands: &mut self.commands,
            tasks: &mut self.tasks,
        }
    }

    pub fn drain_commands(&mut self) -> Vec<Command> {
        self.commands.drain()
    }

    pub fn enqueue_command(&mut self, command: Command) {
        self.commands.enqueue(command);
    }

    pub fn tasks_mut(&mut self) -> &mut TaskQueues {
        &mut self.tasks
    }

    /// Polling interval advertised to the client, `None` when no task queues
    /// exist.
    pub fn callback_interval(&self) -> Option<u64> {
        self.tasks.callback_interval()
    }

    pub fn transfers(&self) -> &TransferRegistry {
        &self.transfers
    }

    pub fn note_issued_download(&mut self, transfer_id: String) {
        self.issued_downloads.push(transfer_id);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Render state
    // ─────────────────────────────────────────────────────────────────────

    /// Attaches opaque per-component scratch a peer keeps across cycles. At
    /// most one entry per component; replaced on re-render.
    pub fn set_render_state(&mut self, id: ComponentId, state: Box<dyn Any + Send + Sync>) {
        self.render_state.insert(id, state);
    }

    pub fn render_state<T: 'static>(&self, id: ComponentId) -> Option<&T> {
        self.render_state.get(&id).and_then(|s| s.downcast_ref())
    }

    pub fn remove_render_state(&mut self, id: ComponentId) {
        if self.render_state.remove(&id).is_some() {
            debug!(component = id.index(), "render state discarded");
        }
    }

    /// Borrows the disjoint parts a render cycle needs.
    pub fn render_context<'a>(
        &'a mut self,
        message: &'a mut ServerMessage,
    ) -> RenderContext<'a> {
        RenderContext {
            message,
            tree: &mut self.tree,
            render_state: &mut self.render_state,
            transfers: &self.transfers,
        }
    }

    /// Borrows what client-input processing needs.
    pub fn input_context(&mut self) -> InputContext<'_> {
        InputContext {
            tree: &mut self.tree,
            transfers: &self.transfers,
        }
    }
}

impl Drop for ContainerInstance {
    fn drop(&mut self) {
        if self.state != LifecycleState::Disposed {
            warn!("container instance dropped without dispose");
            self.dispose();
        }
    }
}
