//! Remote values and their canonical string form.
//!
//! Results cross the context boundary as a single string. [`canonicalize`] is total: every
//! [`RemoteValue`], including cyclic graphs, produces a string without failing.

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::{Map, Number, Value};
use std::io;

/// A value observed in the remote page's realm.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Decimal digits of a bigint
    BigInt(String),
    String(String),
    /// Symbol description
    Symbol(String),
    /// Function with its source text
    Function(String),
    Array(Vec<RemoteValue>),
    /// Own enumerable properties in insertion order
    Object(Vec<(String, RemoteValue)>),
    /// Back-reference to an enclosing object or array
    Cycle,
}

impl RemoteValue {
    pub fn string(value: impl Into<String>) -> Self {
        RemoteValue::String(value.into())
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, RemoteValue)>) -> Self {
        RemoteValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// JS truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            RemoteValue::Undefined | RemoteValue::Null => false,
            RemoteValue::Bool(b) => *b,
            RemoteValue::Number(n) => *n != 0.0 && !n.is_nan(),
            RemoteValue::BigInt(digits) => digits.trim_start_matches('-') != "0",
            RemoteValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, RemoteValue::Undefined)
    }
}

impl From<&Value> for RemoteValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => RemoteValue::Null,
            Value::Bool(b) => RemoteValue::Bool(*b),
            Value::Number(n) => RemoteValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => RemoteValue::String(s.clone()),
            Value::Array(items) => RemoteValue::Array(items.iter().map(Into::into).collect()),
            Value::Object(map) => RemoteValue::Object(
                map.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            ),
        }
    }
}

/// Convert a remote value to the string handed back across the boundary.
///
/// `undefined` → `"undefined"`, `null` → `"null"`, functions → their source, objects and
/// arrays → pretty JSON, falling back to `toString()` semantics when stringification
/// fails (cycles, bigints). Everything else is plain string coercion.
pub fn canonicalize(value: &RemoteValue) -> String {
    match value {
        RemoteValue::Undefined => "undefined".to_string(),
        RemoteValue::Null => "null".to_string(),
        RemoteValue::Function(source) => source.clone(),
        RemoteValue::Array(_) | RemoteValue::Object(_) => match to_json(value) {
            Ok(Some(json)) => to_page_json(&json).unwrap_or_else(|| to_display_string(value)),
            Ok(None) | Err(Unserializable) => to_display_string(value),
        },
        other => to_display_string(other),
    }
}

#[derive(Debug)]
struct Unserializable;

/// JSON.stringify semantics. `Ok(None)` means "omitted" (undefined, functions, symbols).
fn to_json(value: &RemoteValue) -> Result<Option<Value>, Unserializable> {
    Ok(Some(match value {
        RemoteValue::Undefined | RemoteValue::Function(_) | RemoteValue::Symbol(_) => {
            return Ok(None)
        }
        RemoteValue::Null => Value::Null,
        RemoteValue::Bool(b) => Value::Bool(*b),
        RemoteValue::Number(n) => json_number(*n),
        RemoteValue::String(s) => Value::String(s.clone()),
        RemoteValue::BigInt(_) | RemoteValue::Cycle => return Err(Unserializable),
        RemoteValue::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| to_json(item).map(|v| v.unwrap_or(Value::Null)))
                .collect::<Result<_, _>>()?,
        ),
        RemoteValue::Object(entries) => {
            let mut map = Map::new();
            for (key, item) in entries {
                if let Some(v) = to_json(item)? {
                    map.insert(key.clone(), v);
                }
            }
            Value::Object(map)
        }
    }))
}

fn json_number(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(Number::from(n as i64));
    }
    // Printed by `PageJsonFormatter::write_f64`
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// `JSON.stringify(value, null, 2)` output: two-space indent, numbers in page notation.
struct PageJsonFormatter<'a> {
    pretty: PrettyFormatter<'a>,
}

impl PageJsonFormatter<'_> {
    fn new() -> Self {
        Self {
            pretty: PrettyFormatter::with_indent(b"  "),
        }
    }
}

impl Formatter for PageJsonFormatter<'_> {
    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        writer.write_all(format_number(value).as_bytes())
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.pretty.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.pretty.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object_value(writer)
    }
}

fn to_page_json(json: &Value) -> Option<String> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PageJsonFormatter::new());
    json.serialize(&mut serializer).ok()?;
    String::from_utf8(out).ok()
}

/// `String(value)` coercion.
fn to_display_string(value: &RemoteValue) -> String {
    match value {
        RemoteValue::Undefined => "undefined".to_string(),
        RemoteValue::Null => "null".to_string(),
        RemoteValue::Bool(b) => b.to_string(),
        RemoteValue::Number(n) => format_number(*n),
        RemoteValue::BigInt(digits) => digits.clone(),
        RemoteValue::String(s) => s.clone(),
        RemoteValue::Symbol(description) => format!("Symbol({})", description),
        RemoteValue::Function(source) => source.clone(),
        RemoteValue::Object(_) => "[object Object]".to_string(),
        RemoteValue::Array(items) => items
            .iter()
            .map(|item| match item {
                // Array.prototype.join renders holes, nullish values, and cycles as empty
                RemoteValue::Undefined | RemoteValue::Null | RemoteValue::Cycle => String::new(),
                other => to_display_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        RemoteValue::Cycle => String::new(),
    }
}

/// `Number.prototype.toString()`: shortest round-trip digits, plain notation for decimal
/// exponents in `[-7, 21)`, exponent notation with an explicit sign otherwise.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let sign = if n < 0.0 { "-" } else { "" };
    let scientific = format!("{:e}", n.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    // Position of the decimal point relative to the first digit
    let point = exponent + 1;

    let body = if k <= point && point <= 21 {
        format!("{}{}", digits, "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (whole, fraction) = digits.split_at(point as usize);
        format!("{}.{}", whole, fraction)
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat(-point as usize), digits)
    } else {
        let exp_sign = if point - 1 < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{}e{}{}", first, exp_sign, (point - 1).abs())
        } else {
            format!("{}.{}e{}{}", first, rest, exp_sign, (point - 1).abs())
        }
    };
    format!("{}{}", sign, body)
}
