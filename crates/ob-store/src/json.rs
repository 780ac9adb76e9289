//! Path extraction from semi-structured (JSON text) columns.
//!
//! Legacy rows keep profile data as JSON blobs of varying shape. The SQL built
//! here yields the scalar at a path, or NULL for anything else, so it can sit
//! in a `COALESCE` fallback chain without ever raising on malformed input.

use ob_core::sql_utils::{quote_ident, quote_literal};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One step of a [`JsonPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonPathSegment {
    /// Object member
    Key(String),
    /// Array element
    Index(usize),
}

/// A parsed path such as `profile.personaname` or `$.players[0].hero_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<JsonPathSegment>,
}

impl JsonPath {
    /// Parse a dotted path, with or without a leading `$`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix('$')
            .map(|rest| rest.strip_prefix('.').unwrap_or(rest))
            .unwrap_or(trimmed);
        if body.is_empty() {
            return Err(format!("JSON path '{input}' selects nothing"));
        }

        let mut segments = Vec::new();
        for part in body.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if key.is_empty() && rest.is_empty() {
                return Err(format!("JSON path '{input}' has an empty segment"));
            }
            if !key.is_empty() {
                if key.contains(['"', ']']) {
                    return Err(format!("JSON path '{input}' has an invalid key '{key}'"));
                }
                segments.push(JsonPathSegment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| format!("JSON path '{input}' has an unclosed index"))?;
                let index = rest[1..close]
                    .parse::<usize>()
                    .map_err(|_| format!("JSON path '{input}' has a non-numeric index"))?;
                segments.push(JsonPathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(format!("JSON path '{input}' has trailing text after an index"));
                }
            }
        }
        Ok(Self { segments })
    }

    /// Path segments in order.
    pub fn segments(&self) -> &[JsonPathSegment] {
        &self.segments
    }

    /// Render in SQLite's JSON path syntax with every key quoted.
    pub fn to_sqlite(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.segments {
            match segment {
                JsonPathSegment::Key(key) => {
                    out.push_str(".\"");
                    out.push_str(key);
                    out.push('"');
                }
                JsonPathSegment::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                JsonPathSegment::Key(key) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                JsonPathSegment::Index(i) => write!(f, "[{i}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

impl FromStr for JsonPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for JsonPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JsonPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// SQL expression for the scalar at `path` inside JSON text `column`.
///
/// Evaluates to NULL when the column is NULL or not valid JSON, when the path
/// is missing, or when it holds an object, array, or JSON null.
pub fn json_scalar_sql(column: &str, path: &JsonPath) -> String {
    let col = quote_ident(column);
    let p = quote_literal(&path.to_sqlite());
    format!(
        "CASE WHEN json_valid({col}) THEN \
         CASE WHEN json_type({col}, {p}) IN ('text', 'integer', 'real', 'true', 'false') \
         THEN json_extract({col}, {p}) END END"
    )
}

#[cfg(test)]
#[path = "json_test.rs"]
mod tests;
