//! Pluggable encode/decode capabilities for store files.
//!
//! A [`Format`] turns a whole [`Mapping`] into bytes and back. Its name is also
//! the extension of the files it writes, so `cfg` stored as JSON lives in
//! `cfg.json`.

pub mod json;
pub mod msgpack;

use crate::core::{Mapping, Result, StoreError};
use std::sync::Arc;

pub use json::JsonFormat;
pub use msgpack::MessagePackFormat;

/// Dump options understood by the built-in formats.
///
/// Formats ignore options that mean nothing to them (MessagePack has no
/// indentation).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Pretty-print with this many spaces per level. `None` writes one line.
    pub indent: Option<usize>,

    /// Emit object keys in lexicographic order instead of insertion order.
    pub sort_keys: bool,
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(mut self, width: usize) -> Self {
        self.indent = Some(width);
        self
    }

    pub fn compact(mut self) -> Self {
        self.indent = None;
        self
    }

    pub fn sort_keys(mut self, sort: bool) -> Self {
        self.sort_keys = sort;
        self
    }
}

/// Format adapter trait - allows pluggable serialization formats
pub trait Format: Send + Sync {
    /// Short name, used as the file extension
    fn name(&self) -> &str;

    /// Options used when the store is not configured with its own
    fn default_options(&self) -> FormatOptions {
        FormatOptions::default()
    }

    /// Encode the full mapping
    fn encode(&self, data: &Mapping, options: &FormatOptions) -> Result<Vec<u8>>;

    /// Decode a full file. `None` means the file holds no mapping at all
    /// (empty, or an explicit null).
    fn decode(&self, bytes: &[u8]) -> Result<Option<Mapping>>;
}

/// Looks up one of the built-in formats by name.
pub fn format_by_name(name: &str) -> Result<Arc<dyn Format>> {
    match name {
        json::NAME => Ok(Arc::new(JsonFormat)),
        msgpack::NAME => Ok(Arc::new(MessagePackFormat)),
        other => Err(StoreError::UnknownFormat(other.to_string())),
    }
}
