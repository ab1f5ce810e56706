//! Tool-server plumbing for toolgate.
//!
//! This crate reaches external tool servers over MCP JSON-RPC:
//!
//! - [`transport`]: local-process, streaming-HTTP and SSE transports
//! - [`registry`]: the catalog of known servers
//! - [`injector`]: per-user credential injection
//! - [`gateway`]: scoped connections that always clean up
#![deny(unused_crate_dependencies)]

// Dev-dependencies used only by the integration tests
#[cfg(test)]
use axum as _;
#[cfg(test)]
use tokio_stream as _;

pub mod gateway;
pub mod injector;
pub mod protocol;
pub mod registry;
pub mod shutdown;
pub mod transport;

pub use gateway::{Connection, Gateway, GatewayError};
pub use injector::{CredentialInjectionError, CredentialInjector, InjectionMethod, InjectionStrategy};
pub use registry::{RegistryError, ServerRegistry, default_servers};
pub use transport::{
    DefaultTransportFactory, SseTransport, StdioTransport, StreamableHttpTransport, Transport,
    TransportError, TransportErrorCategory, TransportFactory, TransportTimeouts,
};
