//! Compose document loading and static port extraction.

pub mod extract;
pub mod loader;

pub use extract::{
    extract_documents, parse_port_entry, parse_short_binding, record, service_rows, PortAggregator,
    StaticExtraction, StaticOutcome,
};
pub use loader::{check_documents, load, parse_document, ComposeDocument, ComposeService, EnvEntry, PortEntry};
