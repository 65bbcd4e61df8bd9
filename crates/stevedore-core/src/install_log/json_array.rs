//! JsonArray - JSON document with `/` separated path access.
//!
//! `vendor\/package` addresses a single key named `vendor/package`; an
//! unescaped `/` descends one level.

use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct JsonArray {
    data: Value,
}

impl JsonArray {
    pub fn new() -> Self {
        Self {
            data: Value::Object(Map::new()),
        }
    }

    /// Wrap an existing document. Non-object values become an empty document.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => Self { data: value },
            _ => Self::new(),
        }
    }

    /// Escape a key so it is treated as a single path segment.
    pub fn escape(segment: &str) -> String {
        segment.replace('/', "\\/")
    }

    /// Split a path at unescaped slashes and unescape the segments.
    pub fn split_path(path: &str) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = path.trim_start_matches('/').chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&'/') => {
                    current.push('/');
                    chars.next();
                }
                '/' => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        Self::split_path(path)
            .iter()
            .try_fold(&self.data, |node, segment| node.as_object()?.get(segment))
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set `value` at `path`, creating (or replacing non-object) intermediates.
    /// An empty path replaces the whole document if `value` is an object.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments = Self::split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            if value.is_object() {
                self.data = value;
            }
            return;
        };
        let mut node = &mut self.data;
        for segment in parents {
            let map = ensure_object(node);
            node = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(node).insert(last.clone(), value);
    }

    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments = Self::split_path(path);
        let (last, parents) = segments.split_last()?;
        let mut node = &mut self.data;
        for segment in parents {
            node = node.as_object_mut()?.get_mut(segment)?;
        }
        node.as_object_mut()?.remove(last)
    }

    /// Keys of the object at `path` (`""` for the root).
    pub fn keys(&self, path: &str) -> Vec<String> {
        let node = if Self::split_path(path).is_empty() {
            Some(&self.data)
        } else {
            self.get(path)
        };
        node.and_then(Value::as_object)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.data.as_object().is_none_or(Map::is_empty)
    }

    pub fn as_value(&self) -> &Value {
        &self.data
    }

    pub fn into_value(self) -> Value {
        self.data
    }
}

impl Default for JsonArray {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JsonArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string_pretty(&self.data).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}
