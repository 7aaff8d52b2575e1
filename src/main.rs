//! Trellis — server-side component synchronization framework.
//!
//! Runs a small demonstration application: a content pane holding a label, an
//! editable text field, an upload select that logs received files, and a file
//! pane serving static content.
//!
//! Usage:
//!   trellis                      # Default port 8700
//!   trellis --port 9000          # Custom port
//!   trellis --verbose            # Debug logging

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trellis_app::transfer::{BytesDownloadProvider, UploadEvent, UploadListener};
use trellis_app::{Command, ComponentKind};
use trellis_container::{AppContext, ApplicationDelegate};
use trellis_protocol::SyncError;
use trellis_server::{router, ServerContext};

#[derive(Parser, Debug)]
#[command(name = "trellis", about = "Trellis server-side component framework")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "8700")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

/// Logs received uploads.
struct LogUploads;

impl UploadListener for LogUploads {
    fn file_upload(&self, event: UploadEvent) {
        let name = event
            .file_name
            .clone()
            .unwrap_or_else(|| "upload.bin".to_string());
        match event.read_to_vec() {
            Ok(bytes) => info!(file = %name, size = bytes.len(), "upload received"),
            Err(err) => error!(%err, file = %name, "failed to read upload"),
        }
    }

    fn invalid_file_upload(&self, _event: UploadEvent) {
        info!("empty upload ignored");
    }
}

struct DemoApp;

impl ApplicationDelegate for DemoApp {
    fn init(&mut self, ctx: &mut AppContext<'_>) -> Result<(), SyncError> {
        let root = ctx.tree.init_root(ComponentKind::ContentPane)?;

        let label = ctx.tree.add_child(root, ComponentKind::Label)?;
        ctx.tree
            .set_property(label, "text", "Trellis demonstration".into())?;

        let field = ctx.tree.add_child(root, ComponentKind::TextField)?;
        ctx.tree.set_property(field, "text", "edit me".into())?;

        let select = ctx.tree.add_child(root, ComponentKind::UploadSelect)?;
        ctx.tree
            .set_property(select, "send-button-text", "Send".into())?;
        ctx.tree.set_upload_listener(select, Arc::new(LogUploads))?;

        let pane = ctx.tree.add_child(root, ComponentKind::FilePane)?;
        ctx.tree.set_download_provider(
            pane,
            Arc::new(BytesDownloadProvider::new(
                "text/plain",
                b"Served by the file pane.".to_vec(),
            )),
        )?;

        // A download handed out on first contact, so a fresh session exercises
        // the single-use transfer path immediately.
        ctx.commands.enqueue(Command::Download {
            provider: Arc::new(
                BytesDownloadProvider::new("text/plain", b"Welcome to Trellis.".to_vec())
                    .with_file_name("welcome.txt"),
            ),
        });

        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ctx = ServerContext::new(Arc::new(|| {
        Box::new(DemoApp) as Box<dyn ApplicationDelegate>
    }));
    let app = router(ctx);

    let addr = format!("{}:{}", cli.hostname, cli.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    let local: SocketAddr = match listener.local_addr() {
        Ok(local) => local,
        Err(err) => {
            error!(%err, "failed to read local address");
            std::process::exit(1);
        }
    };

    println!();
    println!("  Trellis server running!");
    println!();
    println!("  Application endpoint:");
    println!("    http://{local}/app");
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    if let Err(err) = serve.await {
        error!(%err, "server error");
        std::process::exit(1);
    }

    println!("  Server stopped.");
}
