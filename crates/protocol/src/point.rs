//! Line-protocol point model
//!
//! One [`Point`] is a single timestamped measurement: a measurement name,
//! a tag set, a field set and an optional integer timestamp. Points render
//! to exactly one line of line protocol and parse back from one.
//!
//! Tags and fields are kept in `BTreeMap`s so a point always renders the
//! same way; parse-render round trips are byte-stable.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProtocolError;

/// A single typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit float (the line-protocol default numeric type)
    Float(f64),
    /// 64-bit signed integer (`i` suffix on the wire)
    Integer(i64),
    /// Boolean (`t`/`f`/`true`/`false` on the wire)
    Boolean(bool),
    /// Double-quoted string
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}i"),
            FieldValue::Boolean(v) => write!(f, "{v}"),
            FieldValue::String(v) => {
                write!(f, "\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))
            }
        }
    }
}

/// One timestamped measurement
///
/// Construction is builder-style and infallible; validity (non-empty
/// measurement, at least one field) is enforced when parsing from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<i64>,
}

impl Point {
    /// Create a point with the given measurement name
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Set the timestamp
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Measurement name
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Tag set, ordered by key
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Field set, ordered by key
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Timestamp, if one was set
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Parse one line-protocol line
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on an empty measurement, a missing field
    /// set, a malformed tag or field, or an invalid timestamp.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches('\r');

        // First unescaped space ends the measurement+tags section.
        let head_end = find_unescaped(line, ' ', false)
            .ok_or_else(|| ProtocolError::MissingFields)?;
        let (head, rest) = line.split_at(head_end);
        let rest = &rest[1..];

        // Second unescaped space (outside quotes) ends the field section.
        let (field_text, timestamp_text) = match find_unescaped(rest, ' ', true) {
            Some(i) => (&rest[..i], Some(rest[i + 1..].trim())),
            None => (rest, None),
        };

        let mut head_parts = split_unescaped(head, ',', false).into_iter();
        let measurement = unescape(head_parts.next().unwrap_or(""));
        if measurement.is_empty() {
            return Err(ProtocolError::EmptyMeasurement);
        }

        let mut tags = BTreeMap::new();
        for raw in head_parts {
            let eq = find_unescaped(raw, '=', false)
                .ok_or_else(|| ProtocolError::malformed(format!("tag '{raw}' is missing '='")))?;
            let key = unescape(&raw[..eq]);
            let value = unescape(&raw[eq + 1..]);
            if key.is_empty() {
                return Err(ProtocolError::malformed("empty tag key"));
            }
            tags.insert(key, value);
        }

        if field_text.is_empty() {
            return Err(ProtocolError::MissingFields);
        }
        let mut fields = BTreeMap::new();
        for raw in split_unescaped(field_text, ',', true) {
            let eq = find_unescaped(raw, '=', true)
                .ok_or_else(|| ProtocolError::malformed(format!("field '{raw}' is missing '='")))?;
            let key = unescape(&raw[..eq]);
            if key.is_empty() {
                return Err(ProtocolError::malformed("empty field key"));
            }
            fields.insert(key, parse_field_value(&raw[eq + 1..])?);
        }
        if fields.is_empty() {
            return Err(ProtocolError::MissingFields);
        }

        let timestamp = match timestamp_text {
            Some(t) if !t.is_empty() => {
                Some(t.parse::<i64>().map_err(|_| ProtocolError::InvalidTimestamp {
                    value: t.to_string(),
                })?)
            }
            _ => None,
        };

        Ok(Self {
            measurement,
            tags,
            fields,
            timestamp,
        })
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", escape_measurement(&self.measurement))?;
        for (key, value) in &self.tags {
            write!(f, ",{}={}", escape_name(key), escape_name(value))?;
        }
        let mut sep = ' ';
        for (key, value) in &self.fields {
            write!(f, "{sep}{}={value}", escape_name(key))?;
            sep = ',';
        }
        if let Some(ts) = self.timestamp {
            write!(f, " {ts}")?;
        }
        Ok(())
    }
}

/// Escape `,` and ` ` in a measurement name
fn escape_measurement(s: &str) -> String {
    s.replace('\\', "\\\\").replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape `,`, `=` and ` ` in tag keys, tag values and field keys
fn escape_name(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Strip one level of backslash escaping
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Find the first unescaped occurrence of `delim`, optionally ignoring
/// delimiters inside double-quoted sections
fn find_unescaped(s: &str, delim: char, respect_quotes: bool) -> Option<usize> {
    let mut escaped = false;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' if respect_quotes => in_quotes = !in_quotes,
            c if c == delim && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split on unescaped occurrences of `delim`, optionally ignoring
/// delimiters inside double-quoted sections
fn split_unescaped(s: &str, delim: char, respect_quotes: bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' if respect_quotes => in_quotes = !in_quotes,
            c if c == delim && !in_quotes => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Type a raw field value per the line-protocol rules
fn parse_field_value(raw: &str) -> Result<FieldValue, ProtocolError> {
    if raw.starts_with('"') {
        return unquote(raw).map(FieldValue::String);
    }
    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Ok(FieldValue::Boolean(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Ok(FieldValue::Boolean(false)),
        _ => {}
    }
    if let Some(int_text) = raw.strip_suffix('i')
        && let Ok(v) = int_text.parse::<i64>()
    {
        return Ok(FieldValue::Integer(v));
    }
    if !raw.is_empty()
        && let Ok(v) = raw.parse::<f64>()
        && v.is_finite()
    {
        return Ok(FieldValue::Float(v));
    }
    Err(ProtocolError::InvalidFieldValue {
        value: raw.to_string(),
    })
}

/// Strip surrounding quotes from a string field value and unescape `\"`, `\\`
fn unquote(raw: &str) -> Result<String, ProtocolError> {
    let inner = raw
        .strip_prefix('"')
        .ok_or_else(|| ProtocolError::malformed("string field missing opening quote"))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(ProtocolError::malformed("unterminated string field")),
            },
            '"' => {
                if i + 1 != inner.len() {
                    return Err(ProtocolError::malformed(
                        "trailing characters after string field",
                    ));
                }
                return Ok(out);
            }
            other => out.push(other),
        }
    }
    Err(ProtocolError::malformed("unterminated string field"))
}

#[cfg(test)]
#[path = "point_test.rs"]
mod point_test;
