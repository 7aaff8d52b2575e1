//! Trellis HTTP server: front controller, service registry, session store,
//! multipart upload handling, and the built-in framework services.

pub mod connection;
pub mod front;
pub mod multipart;
pub mod registry;
pub mod services;

pub use connection::{Connection, ServiceResponse};
pub use front::router;
pub use multipart::{DiskSpoolStrategy, MultipartConfig, MultipartStrategy};
pub use registry::{
    AppFactory, ServerContext, Service, ServiceRegistry, SessionHandle, SessionStore,
    SESSION_COOKIE,
};
