//! The service registry, session store, and shared server context.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use trellis_container::peers;
use trellis_container::{ApplicationDelegate, ContainerInstance, PeerRegistry, TransferRegistry};
use trellis_protocol::SyncError;

use crate::connection::{Connection, ServiceResponse};
use crate::multipart::MultipartConfig;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "TRELLIS_SESSION";

/// A session's container instance behind its request-serializing lock.
pub type SessionHandle = Arc<Mutex<ContainerInstance>>;

/// Builds a fresh application for each new session.
pub type AppFactory = Arc<dyn Fn() -> Box<dyn ApplicationDelegate> + Send + Sync>;

/// An HTTP-addressable endpoint of the framework, dispatched by service id.
pub trait Service: Send + Sync + 'static {
    fn id(&self) -> &'static str;

    /// Cacheable services get long-lived caching headers; everything else is
    /// marked uncacheable.
    fn cacheable(&self) -> bool {
        false
    }

    fn handle(
        &self,
        ctx: Arc<ServerContext>,
        session: Option<SessionHandle>,
        conn: Connection,
    ) -> impl Future<Output = Result<ServiceResponse, SyncError>> + Send;
}

/// Object-safe wrapper for the Service trait.
trait ServiceDyn: Send + Sync {
    fn id_dyn(&self) -> &'static str;
    fn cacheable_dyn(&self) -> bool;
    fn handle_dyn<'a>(
        &'a self,
        ctx: Arc<ServerContext>,
        session: Option<SessionHandle>,
        conn: Connection,
    ) -> Pin<Box<dyn Future<Output = Result<ServiceResponse, SyncError>> + Send + 'a>>;
}

impl<T: Service> ServiceDyn for T {
    fn id_dyn(&self) -> &'static str {
        self.id()
    }
    fn cacheable_dyn(&self) -> bool {
        self.cacheable()
    }
    fn handle_dyn<'a>(
        &'a self,
        ctx: Arc<ServerContext>,
        session: Option<SessionHandle>,
        conn: Connection,
    ) -> Pin<Box<dyn Future<Output = Result<ServiceResponse, SyncError>> + Send + 'a>> {
        Box::pin(self.handle(ctx, session, conn))
    }
}

/// Id-keyed table of registered services.
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<&'static str, Arc<dyn ServiceDyn>>,
}

impl ServiceRegistry {
    pub fn register<S: Service>(&self, service: S) {
        info!(service_id = service.id(), "registering service");
        self.services.insert(service.id(), Arc::new(service));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.services.contains_key(id)
    }

    pub fn is_cacheable(&self, id: &str) -> Option<bool> {
        self.services.get(id).map(|s| s.cacheable_dyn())
    }

    pub async fn dispatch(
        &self,
        id: &str,
        ctx: Arc<ServerContext>,
        session: Option<SessionHandle>,
        conn: Connection,
    ) -> Option<Result<ServiceResponse, SyncError>> {
        let service = self.services.get(id).map(|s| s.clone())?;
        debug!(service_id = service.id_dyn(), "dispatching");
        Some(service.handle_dyn(ctx, session, conn).await)
    }
}

/// Session-key-keyed store of live container instances.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn create(&self, instance: ContainerInstance) -> (String, SessionHandle) {
        let key = Uuid::new_v4().to_string();
        let handle = Arc::new(Mutex::new(instance));
        self.sessions.insert(key.clone(), handle.clone());
        info!(session = %key, "session created");
        (key, handle)
    }

    pub fn get(&self, key: &str) -> Option<SessionHandle> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<SessionHandle> {
        self.sessions.remove(key).map(|(_, handle)| {
            info!(session = %key, "session removed");
            handle
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Everything the request handlers share, passed explicitly; there are no
/// process-wide statics.
pub struct ServerContext {
    pub services: ServiceRegistry,
    pub sessions: SessionStore,
    pub transfers: TransferRegistry,
    pub peers: PeerRegistry,
    pub multipart: MultipartConfig,
    pub app_factory: AppFactory,
    /// Process startup, used as `Last-Modified` for cacheable services.
    pub startup: DateTime<Utc>,
}

impl ServerContext {
    /// Builds a context with the built-in peers and services registered.
    pub fn new(app_factory: AppFactory) -> Arc<Self> {
        let ctx = Arc::new(Self {
            services: ServiceRegistry::default(),
            sessions: SessionStore::default(),
            transfers: TransferRegistry::new(),
            peers: peers::default_registry(),
            multipart: MultipartConfig::default(),
            app_factory,
            startup: Utc::now(),
        });
        crate::services::register_builtin(&ctx.services);
        ctx
    }

    /// Element ids repeat across sessions, so each instance gets a scoped
    /// transfer handle; one session's pending uploads and file panes are
    /// invisible to every other session.
    pub fn new_instance(&self) -> ContainerInstance {
        ContainerInstance::new((self.app_factory)(), self.transfers.scoped())
    }
}
