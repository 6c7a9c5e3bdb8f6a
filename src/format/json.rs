//! JSON format backed by `serde_json`.

use super::{Format, FormatOptions};
use crate::core::{Mapping, Result, StoreError, sorted_mapping};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{Formatter, PrettyFormatter, Serializer};
use std::borrow::Cow;
use std::io;

pub const NAME: &str = "json";

/// Default indentation for human-readable files.
pub const DEFAULT_INDENT: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

/// Single-line output with a space after `:` and `,`.
///
/// `{"a": 1, "b": {"x": 2}}` rather than serde_json's `{"a":1,"b":{"x":2}}`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn write_with<F: Formatter>(data: &Mapping, formatter: F) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    data.serialize(&mut serializer)
        .map_err(|e| StoreError::encode(NAME, e))?;
    Ok(out)
}

impl Format for JsonFormat {
    fn name(&self) -> &str {
        NAME
    }

    fn default_options(&self) -> FormatOptions {
        FormatOptions::new().indent(DEFAULT_INDENT)
    }

    fn encode(&self, data: &Mapping, options: &FormatOptions) -> Result<Vec<u8>> {
        let data = if options.sort_keys {
            Cow::Owned(sorted_mapping(data))
        } else {
            Cow::Borrowed(data)
        };

        match options.indent {
            Some(width) => {
                let indent = " ".repeat(width);
                write_with(&data, PrettyFormatter::with_indent(indent.as_bytes()))
            }
            None => write_with(&data, SpacedFormatter),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Option<Mapping>> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        match serde_json::from_slice::<Value>(bytes).map_err(|e| StoreError::decode(NAME, e))? {
            Value::Null => Ok(None),
            Value::Object(map) => Ok(Some(map)),
            other => Err(StoreError::decode(
                NAME,
                format!("expected an object at top level, found {}", kind(&other)),
            )),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
