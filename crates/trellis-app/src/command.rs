//! One-shot application commands.
//!
//! A command is enqueued by application code and rendered exactly once, in
//! the next synchronization cycle, by the matching command peer. Commands are
//! not components: they carry no identity and no persistent state.

use std::sync::Arc;

use crate::transfer::DownloadProvider;

/// An HTTP cookie to set on the client.
#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    /// Lifetime in seconds; `None` makes a session cookie.
    pub max_age: Option<i64>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
        }
    }
}

pub enum Command {
    /// Have the client fetch the provider's content as a file download.
    Download { provider: Arc<dyn DownloadProvider> },
    /// Set a cookie on the next response.
    SetCookie { cookie: Cookie },
}

/// FIFO of commands pending for the next cycle.
#[derive(Default)]
pub struct CommandQueue {
    pending: Vec<Command>,
}

impl CommandQueue {
    pub fn enqueue(&mut self, command: Command) {
        self.pending.push(command);
    }

    /// Takes all pending commands; each is rendered once and never again.
    pub fn drain(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
