//! Query-string encoding of record values.
//!
//! The field list comes from the value's `Serialize` impl, so declaration
//! order is the schema. Values are written with plain formatting and are
//! not percent-escaped.

use serde_json::{Map, Value};

/// Encode a record as `name=value` pairs joined by `&`.
///
/// Field names are lowercased. `None` fields render as an empty value.
pub fn encode(record: &Map<String, Value>) -> String {
    let mut out = String::new();
    for (i, (name, value)) in record.iter().enumerate() {
        if i != 0 {
            out.push('&');
        }
        out.push_str(&name.to_lowercase());
        out.push('=');
        write_plain(&mut out, value);
    }
    out
}

fn write_plain(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => out.push_str(&f.to_string()),
            _ => out.push_str(&n.to_string()),
        },
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            write_joined(out, items.iter());
            out.push(']');
        }
        Value::Object(fields) => {
            out.push('{');
            write_joined(out, fields.values());
            out.push('}');
        }
    }
}

fn write_joined<'a>(out: &mut String, items: impl Iterator<Item = &'a Value>) {
    for (i, item) in items.enumerate() {
        if i != 0 {
            out.push(' ');
        }
        write_plain(out, item);
    }
}
