//! The file-pane peer and the command peers.

use tracing::warn;

use trellis_app::{Command, ComponentId, RemovedComponent};
use trellis_protocol::{DirectiveGroup, DirectiveItem, Processors, Services, SyncError};

use crate::peer::{CycleOutput, RenderContext, SyncPeer};
use crate::peers::basic::dom_add_item;

/// A component whose rendered frame streams provider-backed content, keyed
/// by element id rather than a transfer id: the frame may be reloaded any
/// number of times while the component lives.
pub struct FilePanePeer;

impl SyncPeer for FilePanePeer {
    fn render_add(
        &self,
        ctx: &mut RenderContext<'_>,
        id: ComponentId,
        parent_element_id: Option<&str>,
    ) -> Result<(), SyncError> {
        let eid = ctx.tree.element_id(id)?;
        match ctx.tree.download_provider(id) {
            Some(provider) => ctx.transfers.register_file_pane(&eid, provider),
            None => warn!(element_id = %eid, "file pane rendered without a content provider"),
        }
        ctx.message.add_item(
            DirectiveGroup::Update,
            Processors::DOM,
            "dom-add",
            dom_add_item(&eid, parent_element_id, "FilePane")
                .attr("src", format!("?serviceId={}&eid={eid}", Services::FILE_PANE)),
        );
        Ok(())
    }

    fn render_dispose(&self, ctx: &mut RenderContext<'_>, removed: &RemovedComponent) {
        if let Some(eid) = &removed.element_id {
            ctx.transfers.remove_file_pane(eid);
        }
    }
}

/// Renders the cycle's drained command queue. Each command renders exactly
/// once: download commands register a single-use transfer and emit the fetch
/// directive, cookie commands surface on the HTTP response.
pub fn render_commands(ctx: &mut RenderContext<'_>, commands: Vec<Command>, out: &mut CycleOutput) {
    for command in commands {
        match command {
            Command::Download { provider } => {
                let transfer_id = ctx.transfers.register_download(provider);
                ctx.message.add_library(Processors::DOWNLOAD);
                ctx.message.add_item(
                    DirectiveGroup::Update,
                    Processors::DOWNLOAD,
                    "download",
                    DirectiveItem::default().attr(
                        "uri",
                        format!(
                            "?serviceId={}&transferId={transfer_id}",
                            Services::DOWNLOAD
                        ),
                    ),
                );
                out.issued_downloads.push(transfer_id);
            }
            Command::SetCookie { cookie } => out.cookies.push(cookie),
        }
    }
}
