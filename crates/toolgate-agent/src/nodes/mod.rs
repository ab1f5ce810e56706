//! Built-in nodes.
//!
//! Local nodes run in-process, API nodes call a third-party HTTP API with
//! the user's key, and MCP nodes forward to a tool server through the
//! gateway.

pub mod calculator;
pub mod json_transformer;
pub mod mcp;
pub mod text_processor;
pub mod weather;

use std::sync::Arc;

use toolgate_core::{CatalogEntry, NodeBinding};

pub use calculator::Calculator;
pub use json_transformer::JsonTransformer;
pub use text_processor::{TextOperation, TextProcessor};
pub use weather::WeatherApi;

/// In-process nodes.
pub fn local_entries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            definition: calculator::definition(),
            binding: NodeBinding::Local(Arc::new(Calculator)),
        },
        CatalogEntry {
            definition: text_processor::definition(),
            binding: NodeBinding::Local(Arc::new(TextProcessor)),
        },
        CatalogEntry {
            definition: json_transformer::definition(),
            binding: NodeBinding::Local(Arc::new(JsonTransformer)),
        },
    ]
}

/// In-process nodes that call external HTTP APIs.
pub fn api_entries() -> Vec<CatalogEntry> {
    vec![CatalogEntry {
        definition: weather::definition(),
        binding: NodeBinding::Local(Arc::new(WeatherApi::default())),
    }]
}

/// Every node shipped with toolgate.
pub fn builtin_entries() -> Vec<CatalogEntry> {
    let mut entries = local_entries();
    entries.extend(api_entries());
    entries.extend(mcp::entries());
    entries
}
