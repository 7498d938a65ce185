#![forbid(unsafe_code)]

use rusqlite::types::Value;

/// Ordered set of column values for one write. Putting the same column
/// twice keeps its position and takes the latest value. Columns left out of
/// a write fall back to their declared defaults when the row replaces an
/// existing one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentValues {
    entries: Vec<(&'static str, Value)>,
}

impl ContentValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_text(&mut self, column: &'static str, value: impl Into<String>) {
        self.put_value(column, Value::Text(value.into()));
    }

    pub fn put_opt_text(&mut self, column: &'static str, value: Option<impl Into<String>>) {
        match value {
            Some(value) => self.put_text(column, value),
            None => self.put_null(column),
        }
    }

    pub fn put_integer(&mut self, column: &'static str, value: i64) {
        self.put_value(column, Value::Integer(value));
    }

    /// Booleans are stored as INTEGER 0/1.
    pub fn put_flag(&mut self, column: &'static str, value: bool) {
        self.put_value(column, Value::Integer(i64::from(value)));
    }

    pub fn put_null(&mut self, column: &'static str) {
        self.put_value(column, Value::Null);
    }

    pub fn put_value(&mut self, column: &'static str, value: Value) {
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
