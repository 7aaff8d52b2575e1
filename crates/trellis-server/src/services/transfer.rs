//! File-transfer services: download, upload form, file pane.

use std::sync::Arc;

use tracing::{debug, warn};

use trellis_protocol::{Services, SyncError};

use crate::connection::{Connection, ServiceResponse};
use crate::multipart::FILE_FIELD;
use crate::registry::{ServerContext, Service, SessionHandle};

/// Streams a registered single-use download transfer.
pub struct DownloadService;

impl Service for DownloadService {
    fn id(&self) -> &'static str {
        Services::DOWNLOAD
    }

    async fn handle(
        &self,
        ctx: Arc<ServerContext>,
        _session: Option<SessionHandle>,
        conn: Connection,
    ) -> Result<ServiceResponse, SyncError> {
        let Some(transfer_id) = conn.param("transferId") else {
            return Ok(ServiceResponse::bad_request("Download UID not specified."));
        };
        let Some(provider) = ctx.transfers.take_download(transfer_id) else {
            warn!(transfer_id, "download request for unknown or spent transfer");
            return Ok(ServiceResponse::bad_request("Download UID is not valid."));
        };

        let mut body = Vec::with_capacity(provider.size().unwrap_or(0) as usize);
        provider.write_to(&mut body)?;
        debug!(transfer_id, bytes = body.len(), "download served");

        let disposition = match provider.file_name() {
            Some(name) => format!("attachment; filename=\"{name}\""),
            None => "attachment".to_string(),
        };
        Ok(
            ServiceResponse::ok(provider.content_type().to_string(), body)
                .with_header("content-disposition", disposition),
        )
    }
}

/// Renders the HTML upload form an upload-select component's iframe loads.
pub struct UploadFormService;

impl Service for UploadFormService {
    fn id(&self) -> &'static str {
        Services::UPLOAD_FORM
    }

    async fn handle(
        &self,
        _ctx: Arc<ServerContext>,
        session: Option<SessionHandle>,
        conn: Connection,
    ) -> Result<ServiceResponse, SyncError> {
        let Some(eid) = conn.param("eid") else {
            return Ok(ServiceResponse::bad_request("Upload target not specified."));
        };

        // Button text comes from the component when it is still reachable;
        // without it the form auto-submits on file selection.
        let mut send_button_text = None;
        if let Some(session) = session {
            let instance = session.lock().await;
            if let Some(id) = instance.tree().component_by_element_id(eid) {
                send_button_text = instance
                    .tree()
                    .property(id, "send-button-text")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }
        }

        let action = escape_attr(&format!(
            "?serviceId={}&eid={eid}",
            Services::UPLOAD_RECEIVER
        ));
        let input = match &send_button_text {
            Some(_) => format!("<input type=\"file\" name=\"{FILE_FIELD}\"/>"),
            None => format!(
                "<input type=\"file\" name=\"{FILE_FIELD}\" onchange=\"this.form.submit()\"/>"
            ),
        };
        let button = send_button_text
            .map(|text| format!("<input type=\"submit\" value=\"{}\"/>", escape_attr(&text)))
            .unwrap_or_default();
        let page = format!(
            "<!DOCTYPE html><html><body>\
             <form method=\"post\" action=\"{action}\" enctype=\"multipart/form-data\">\
             {input}{button}</form></body></html>"
        );
        Ok(ServiceResponse::html(page))
    }
}

/// Escapes a string for interpolation into an HTML attribute value.
fn escape_attr(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Streams a file-pane component's provider content into its frame. Keyed by
/// element id within the requesting session, and not consumed: the frame may
/// reload.
pub struct FilePaneService;

impl Service for FilePaneService {
    fn id(&self) -> &'static str {
        Services::FILE_PANE
    }

    async fn handle(
        &self,
        _ctx: Arc<ServerContext>,
        session: Option<SessionHandle>,
        conn: Connection,
    ) -> Result<ServiceResponse, SyncError> {
        let Some(eid) = conn.param("eid") else {
            return Ok(ServiceResponse::bad_request("File pane not specified."));
        };
        let Some(session) = session else {
            return Err(SyncError::SessionMissing);
        };
        let instance = session.lock().await;
        let Some(provider) = instance.transfers().file_pane(eid) else {
            warn!(element_id = eid, "file pane request for unknown component");
            return Ok(ServiceResponse::bad_request("File pane is not valid."));
        };
        drop(instance);
        let mut body = Vec::with_capacity(provider.size().unwrap_or(0) as usize);
        provider.write_to(&mut body)?;
        Ok(ServiceResponse::ok(provider.content_type().to_string(), body))
    }
}
