//! Compact binary format backed by `rmp-serde`.

use super::{Format, FormatOptions};
use crate::core::{Mapping, Result, StoreError, sorted_mapping};
use serde_json::Value;

pub const NAME: &str = "msgpack";

#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackFormat;

impl Format for MessagePackFormat {
    fn name(&self) -> &str {
        NAME
    }

    fn encode(&self, data: &Mapping, options: &FormatOptions) -> Result<Vec<u8>> {
        let encoded = if options.sort_keys {
            rmp_serde::to_vec(&sorted_mapping(data))
        } else {
            rmp_serde::to_vec(data)
        };
        encoded.map_err(|e| StoreError::encode(NAME, e))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Option<Mapping>> {
        if bytes.is_empty() {
            return Ok(None);
        }

        match rmp_serde::from_slice::<Value>(bytes).map_err(|e| StoreError::decode(NAME, e))? {
            Value::Null => Ok(None),
            Value::Object(map) => Ok(Some(map)),
            _ => Err(StoreError::decode(NAME, "expected a map at top level")),
        }
    }
}
