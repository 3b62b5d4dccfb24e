use std::cmp::Ordering;
use std::collections::HashMap;

use roaring::RoaringBitmap;
use searchdock_types::index::{DataType, Field, IndexDefinition};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A doc-value cell. Collections hold one entry per element.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Str(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    /// Unix timestamp in microseconds, UTC.
    Date(i64),
    /// (latitude, longitude)
    Geo(f64, f64),
    Many(Vec<ColumnValue>),
}

impl ColumnValue {
    /// Total order used by sorts and range facets. Values of different
    /// shapes compare by shape rank, which only matters for mixed columns.
    pub fn compare(&self, other: &ColumnValue) -> Ordering {
        use ColumnValue::*;
        match (self, other) {
            (Str(a), Str(b)) => a.cmp(b),
            (I64(a), I64(b)) => a.cmp(b),
            (F64(a), F64(b)) => a.total_cmp(b),
            (I64(a), F64(b)) => (*a as f64).total_cmp(b),
            (F64(a), I64(b)) => a.total_cmp(&(*b as f64)),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Geo(a1, a2), Geo(b1, b2)) => a1.total_cmp(b1).then(a2.total_cmp(b2)),
            (Many(a), Many(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => shape_rank(a).cmp(&shape_rank(b)),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::I64(i) => Some(*i as f64),
            ColumnValue::F64(f) => Some(*f),
            ColumnValue::Date(micros) => Some(*micros as f64),
            _ => None,
        }
    }
}

fn shape_rank(value: &ColumnValue) -> u8 {
    match value {
        ColumnValue::Bool(_) => 0,
        ColumnValue::I64(_) | ColumnValue::F64(_) => 1,
        ColumnValue::Date(_) => 2,
        ColumnValue::Str(_) => 3,
        ColumnValue::Geo(..) => 4,
        ColumnValue::Many(_) => 5,
    }
}

/// Per-index, in-memory doc-value columns plus the key ↔ sequence-id
/// mapping. Sequence ids are stable for the lifetime of a document and feed
/// the roaring sets the query engine operates on. Rebuilt from the stored
/// documents when an index is opened.
#[derive(Debug, Default)]
pub struct ColumnStore {
    keys: Vec<String>,
    key_to_seq: HashMap<String, u32>,
    live: RoaringBitmap,
    documents: Vec<Option<Map<String, Value>>>,
    columns: HashMap<String, Vec<Option<ColumnValue>>>,
}

impl ColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> &RoaringBitmap {
        &self.live
    }

    pub fn len(&self) -> u64 {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn seq_of(&self, key: &str) -> Option<u32> {
        self.key_to_seq.get(key).copied().filter(|seq| self.live.contains(*seq))
    }

    pub fn key_of(&self, seq: u32) -> Option<&str> {
        self.live.contains(seq).then(|| self.keys.get(seq as usize).map(String::as_str)).flatten()
    }

    pub fn document(&self, seq: u32) -> Option<&Map<String, Value>> {
        self.documents.get(seq as usize).and_then(|d| d.as_ref())
    }

    pub fn value(&self, field: &str, seq: u32) -> Option<&ColumnValue> {
        self.columns.get(field).and_then(|col| col.get(seq as usize)).and_then(|v| v.as_ref())
    }

    /// Insert or replace a document; the sequence id is reused on replace so
    /// insertion order stays stable under updates.
    pub fn upsert(
        &mut self,
        definition: &IndexDefinition,
        key: &str,
        document: Map<String, Value>,
    ) -> u32 {
        let seq = match self.key_to_seq.get(key) {
            Some(seq) => *seq,
            None => {
                let seq = self.keys.len() as u32;
                self.keys.push(key.to_string());
                self.documents.push(None);
                self.key_to_seq.insert(key.to_string(), seq);
                seq
            }
        };

        for field in &definition.fields {
            let cell = match document.get(&field.name) {
                Some(value) if !field.is_vector() => column_value(field, value),
                _ => None,
            };
            let column = self
                .columns
                .entry(field.name.clone())
                .or_insert_with(|| vec![None; self.keys.len()]);
            if column.len() < self.keys.len() {
                column.resize(self.keys.len(), None);
            }
            column[seq as usize] = cell;
        }
        // columns of fields absent from this document still need the slot
        for column in self.columns.values_mut() {
            if column.len() < self.keys.len() {
                column.resize(self.keys.len(), None);
            }
        }

        self.documents[seq as usize] = Some(document);
        self.live.insert(seq);
        seq
    }

    pub fn delete(&mut self, key: &str) -> Option<u32> {
        let seq = self.key_to_seq.get(key).copied()?;
        if !self.live.remove(seq) {
            return None;
        }
        self.documents[seq as usize] = None;
        for column in self.columns.values_mut() {
            if let Some(cell) = column.get_mut(seq as usize) {
                *cell = None;
            }
        }
        Some(seq)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Live sequence ids in insertion order.
    pub fn iter_live(&self) -> impl Iterator<Item = u32> + '_ {
        self.live.iter()
    }
}

/// Convert a coerced JSON value to its doc-value representation.
pub fn column_value(field: &Field, value: &Value) -> Option<ColumnValue> {
    scalar_column_value(&field.data_type, value)
}

fn scalar_column_value(data_type: &DataType, value: &Value) -> Option<ColumnValue> {
    if value.is_null() {
        return None;
    }
    match data_type {
        DataType::String => value.as_str().map(|s| ColumnValue::Str(s.to_string())),
        DataType::Int32 | DataType::Int64 => value.as_i64().map(ColumnValue::I64),
        DataType::Double | DataType::Single => value.as_f64().map(ColumnValue::F64),
        DataType::Boolean => value.as_bool().map(ColumnValue::Bool),
        DataType::DateTimeOffset => {
            let parsed = OffsetDateTime::parse(value.as_str()?, &Rfc3339).ok()?;
            Some(ColumnValue::Date(
                (parsed.unix_timestamp_nanos() / 1_000) as i64,
            ))
        }
        DataType::GeographyPoint => {
            let coordinates = value.as_object()?.get("coordinates")?.as_array()?;
            let lon = coordinates.first()?.as_f64()?;
            let lat = coordinates.get(1)?.as_f64()?;
            Some(ColumnValue::Geo(lat, lon))
        }
        DataType::Complex => None,
        DataType::Collection(inner) => {
            let items = value
                .as_array()?
                .iter()
                .filter_map(|item| scalar_column_value(inner, item))
                .collect::<Vec<_>>();
            Some(ColumnValue::Many(items))
        }
    }
}

/// Parse a datetime literal to the microsecond representation used by date
/// columns.
pub fn datetime_micros(text: &str) -> Option<i64> {
    let parsed = OffsetDateTime::parse(text, &Rfc3339).ok()?;
    Some((parsed.unix_timestamp_nanos() / 1_000) as i64)
}
