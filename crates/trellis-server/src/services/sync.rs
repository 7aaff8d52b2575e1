//! The synchronization services: new instance, default view, synchronize,
//! and session expiry.

use std::io;
use std::sync::Arc;

use tracing::{info, warn};

use trellis_app::Cookie;
use trellis_container::peers::render_commands;
use trellis_container::{ContainerInstance, CycleOutput};
use trellis_protocol::{ClientMessage, ServerMessage, Services, SyncError};

use crate::connection::{Connection, ServiceResponse};
use crate::registry::{ServerContext, Service, SessionHandle, SESSION_COOKIE};

/// Runs one render cycle against the instance and produces the JSON
/// response. A full cycle discards the pending changeset and re-renders the
/// whole tree; an incremental cycle renders the flushed changeset.
pub(crate) fn render_cycle(
    ctx: &ServerContext,
    instance: &mut ContainerInstance,
    full: bool,
) -> Result<ServiceResponse, SyncError> {
    let commands = instance.drain_commands();
    let mut message = ServerMessage::new();
    let mut out = CycleOutput::default();
    {
        let mut rc = instance.render_context(&mut message);
        if full {
            let _ = rc.tree.updates().flush();
            if let Some(root) = rc.tree.root() {
                ctx.peers.render_full_add(&mut rc, root)?;
            }
        } else {
            let changeset = rc.tree.updates().flush();
            ctx.peers.render(&mut rc, &changeset)?;
        }
        render_commands(&mut rc, commands, &mut out);
    }
    if let Some(interval) = instance.callback_interval() {
        message.set_async_interval(interval);
    }
    for transfer_id in out.issued_downloads {
        instance.note_issued_download(transfer_id);
    }

    let body = serde_json::to_vec(&message.render()).map_err(io::Error::from)?;
    let mut response = ServiceResponse::json(body);
    for cookie in out.cookies {
        response = response.with_cookie(cookie);
    }
    Ok(response)
}

/// First contact without a session: builds the application, initializes it,
/// renders the initial tree, and binds the new session cookie.
pub struct NewInstanceService;

impl Service for NewInstanceService {
    fn id(&self) -> &'static str {
        Services::NEW_INSTANCE
    }

    async fn handle(
        &self,
        ctx: Arc<ServerContext>,
        _session: Option<SessionHandle>,
        _conn: Connection,
    ) -> Result<ServiceResponse, SyncError> {
        let mut instance = ctx.new_instance();
        instance.init()?;
        let response = render_cycle(&ctx, &mut instance, true)?;
        let (key, _handle) = ctx.sessions.create(instance);
        info!(session = %key, "new application instance started");
        Ok(response.with_cookie(Cookie::new(SESSION_COOKIE, key)))
    }
}

/// A request without a service id against a live session: re-renders the
/// whole client state from the server tree.
pub struct DefaultService;

impl Service for DefaultService {
    fn id(&self) -> &'static str {
        Services::DEFAULT
    }

    async fn handle(
        &self,
        ctx: Arc<ServerContext>,
        session: Option<SessionHandle>,
        _conn: Connection,
    ) -> Result<ServiceResponse, SyncError> {
        let session = session.ok_or(SyncError::SessionMissing)?;
        let mut instance = session.lock().await;
        render_cycle(&ctx, &mut instance, true)
    }
}

/// The synchronization endpoint: applies the posted client changeset, runs
/// the server-side cycle, and responds with the rendered directives.
pub struct SynchronizeService;

impl Service for SynchronizeService {
    fn id(&self) -> &'static str {
        Services::SYNCHRONIZE
    }

    async fn handle(
        &self,
        ctx: Arc<ServerContext>,
        session: Option<SessionHandle>,
        conn: Connection,
    ) -> Result<ServiceResponse, SyncError> {
        let session = session.ok_or(SyncError::SessionMissing)?;
        let message: ClientMessage = if conn.body.is_empty() {
            ClientMessage::default()
        } else {
            serde_json::from_slice(&conn.body)
                .map_err(|e| SyncError::MalformedRequest(e.to_string()))?
        };

        let mut instance = session.lock().await;
        {
            let mut input = instance.input_context();
            for update in &message.property_updates {
                let applied = ctx.peers.process_property_update(
                    &mut input,
                    &update.component_id,
                    &update.property,
                    update.value.clone(),
                );
                match applied {
                    Ok(()) => {}
                    Err(err) if err.is_recoverable() => {
                        warn!(%err, "skipping client property update");
                    }
                    Err(err) => return Err(err),
                }
            }
            if let Some(action) = &message.action {
                match ctx.peers.process_action(&mut input, action) {
                    Ok(()) => {}
                    Err(err) if err.is_recoverable() => {
                        warn!(%err, "skipping client action");
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        render_cycle(&ctx, &mut instance, false)
    }
}

/// Fixed response for any service request arriving without a live session.
pub struct SessionExpiredService;

impl Service for SessionExpiredService {
    fn id(&self) -> &'static str {
        Services::SESSION_EXPIRED
    }

    async fn handle(
        &self,
        _ctx: Arc<ServerContext>,
        _session: Option<SessionHandle>,
        _conn: Connection,
    ) -> Result<ServiceResponse, SyncError> {
        Ok(ServiceResponse::bad_request("Session Expired"))
    }
}
