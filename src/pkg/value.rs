// src/pkg/value.rs
//! Agent configuration tree and its deterministic TOML emitter
//!
//! An agent's `config.toml` is embedded into the package manifest. The
//! manifest bytes are covered by the checksum ledger, so the same logical
//! configuration must always serialize to the same text. The emitter here
//! is total over [`ConfigValue`]: every shape has exactly one rendering.
//!
//! Emission rule, applied at every nesting level: the table header, then
//! every non-table key in input order, then each nested table recursively
//! under its qualified header.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// RFC 3339 / TOML datetime, kept in its source spelling
    Datetime(String),
}

/// A node of the configuration tree
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Scalar(Scalar),
    List(Vec<ConfigValue>),
    Table(ConfigTable),
}

/// Ordered key/value table; key order is the order the source declared
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTable {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a parsed TOML table, keeping its key order
    pub fn from_toml(table: toml::Table) -> Self {
        let entries = table
            .into_iter()
            .map(|(k, v)| (k, ConfigValue::from(v)))
            .collect();
        Self { entries }
    }

    /// Parse a TOML document into a table
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(text)?;
        Ok(Self::from_toml(table))
    }

    /// Insert or replace a key, keeping the original position on replace
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a dotted path such as `["agent", "description"]`
    pub fn get_path(&self, path: &[&str]) -> Option<&ConfigValue> {
        let (first, rest) = path.split_first()?;
        let value = self.get(first)?;
        if rest.is_empty() {
            return Some(value);
        }
        match value {
            ConfigValue::Table(inner) => inner.get_path(rest),
            _ => None,
        }
    }

    /// String value at a dotted path, if it is a string
    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get_path(path).and_then(ConfigValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConfigValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(value.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&ConfigTable> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<toml::Value> for ConfigValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Self::Scalar(Scalar::String(s)),
            toml::Value::Integer(i) => Self::Scalar(Scalar::Integer(i)),
            toml::Value::Float(f) => Self::Scalar(Scalar::Float(f)),
            toml::Value::Boolean(b) => Self::Scalar(Scalar::Bool(b)),
            toml::Value::Datetime(dt) => Self::Scalar(Scalar::Datetime(dt.to_string())),
            toml::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            toml::Value::Table(table) => Self::Table(ConfigTable::from_toml(table)),
        }
    }
}

// JSON view for `inspect --json`
impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            Self::Scalar(Scalar::Integer(i)) => serializer.serialize_i64(*i),
            Self::Scalar(Scalar::Float(f)) => serializer.serialize_f64(*f),
            Self::Scalar(Scalar::String(s)) | Self::Scalar(Scalar::Datetime(s)) => {
                serializer.serialize_str(s)
            }
            Self::List(items) => items.serialize(serializer),
            Self::Table(table) => table.serialize(serializer),
        }
    }
}

impl Serialize for ConfigTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Emit `table` as TOML rooted at the `[root]` header
///
/// Lines are joined with `\n` and the result ends with a newline.
pub fn emit_table(root: &str, table: &ConfigTable) -> String {
    let mut lines = Vec::new();
    emit_section(&mut lines, &mut vec![root.to_string()], table);
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn emit_section(lines: &mut Vec<String>, path: &mut Vec<String>, table: &ConfigTable) {
    let header = path.iter().map(|k| encode_key(k)).collect::<Vec<_>>().join(".");
    lines.push(format!("[{}]", header));

    let mut tables = Vec::new();
    let mut wrote_scalar = false;
    for (key, value) in table.iter() {
        match value {
            ConfigValue::Table(inner) => tables.push((key, inner)),
            other => {
                lines.push(format!("{} = {}", encode_key(key), encode_value(other)));
                wrote_scalar = true;
            }
        }
    }

    if wrote_scalar && !tables.is_empty() {
        lines.push(String::new());
    }

    for (key, inner) in tables {
        path.push(key.to_string());
        emit_section(lines, path, inner);
        path.pop();
    }
}

/// Encode a value in TOML value position
pub fn encode_value(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Scalar(scalar) => encode_scalar(scalar),
        ConfigValue::List(items) => {
            let parts: Vec<String> = items.iter().map(encode_value).collect();
            format!("[{}]", parts.join(", "))
        }
        // Only reachable inside lists
        ConfigValue::Table(table) => {
            if table.is_empty() {
                return "{}".to_string();
            }
            let parts: Vec<String> = table
                .iter()
                .map(|(k, v)| format!("{} = {}", encode_key(k), encode_value(v)))
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
    }
}

fn encode_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Bool(b) => b.to_string(),
        Scalar::Integer(i) => i.to_string(),
        Scalar::Float(f) => encode_float(*f),
        Scalar::String(s) => encode_string(s),
        Scalar::Datetime(dt) => dt.clone(),
    }
}

fn encode_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("{}inf", sign)
    } else {
        // Debug keeps a fractional part or exponent, so 1.0 stays a float
        format!("{:?}", f)
    }
}

/// Quote a string as a TOML basic string
pub fn encode_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Bare keys stay bare; anything else is quoted
pub fn encode_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        key.to_string()
    } else {
        encode_string(key)
    }
}
