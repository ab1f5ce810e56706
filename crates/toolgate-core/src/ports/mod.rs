//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces the agent layer expects from the outside
//! world. They use only domain types.

pub mod credential_store;
pub mod event_sink;
pub mod model_provider;
pub mod node_catalog;

pub use credential_store::{CredentialStore, CredentialStoreError};
pub use event_sink::{ChannelEventSink, ExecutionEventSink, NoopEventSink};
pub use model_provider::{ModelError, ModelProvider, ModelTurn, ToolSpec};
pub use node_catalog::{CatalogEntry, LocalNode, NodeBinding, NodeCatalog, NodeContext};
