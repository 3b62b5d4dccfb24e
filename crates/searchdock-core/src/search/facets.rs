//! Facet aggregation over the matching doc-set's doc-value columns.
//!
//! Specs: `field` / `field,count:N` (value facet), `field,interval:N`
//! (numeric/date buckets at multiples of N), `field,values:a|b|c`
//! (half-open range buckets).

use std::collections::BTreeMap;

use roaring::RoaringBitmap;
use searchdock_types::index::{DataType, IndexDefinition};
use serde_json::{json, Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::columns::{datetime_micros, ColumnStore, ColumnValue};
use crate::error::{Error, Result};
use crate::search::filter::resolve_field;

const DEFAULT_VALUE_FACET_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
struct FacetSpec {
    field: String,
    count: usize,
    interval: Option<f64>,
    values: Option<Vec<String>>,
}

fn parse_spec(definition: &IndexDefinition, text: &str) -> Result<FacetSpec> {
    let mut parts = text.split(',').map(str::trim);
    let field = parts.next().unwrap_or_default().to_string();

    let schema_field = resolve_field(definition, &field)
        .ok_or_else(|| Error::UnknownField(field.clone(), definition.name.clone()))?;
    if !schema_field.facetable {
        return Err(Error::InvalidArgument(format!(
            "Field `{field}` is not facetable. Set `facetable` to true in the index definition to facet on it."
        )));
    }

    let mut spec =
        FacetSpec { field, count: DEFAULT_VALUE_FACET_COUNT, interval: None, values: None };
    for part in parts {
        let Some((name, value)) = part.split_once(':') else {
            return Err(Error::InvalidArgument(format!(
                "`{part}` is not a valid facet parameter; expected `name:value`."
            )));
        };
        match name.trim() {
            "count" => {
                spec.count = value.trim().parse().map_err(|_| {
                    Error::InvalidArgument(format!("`{value}` is not a valid facet count."))
                })?;
            }
            "interval" => {
                spec.interval = Some(value.trim().parse().map_err(|_| {
                    Error::InvalidArgument(format!("`{value}` is not a valid facet interval."))
                })?);
            }
            "values" => {
                spec.values =
                    Some(value.split('|').map(str::trim).map(str::to_string).collect());
            }
            other => {
                return Err(Error::InvalidArgument(format!(
                    "`{other}` is not a supported facet parameter."
                )));
            }
        }
    }
    Ok(spec)
}

pub fn compute_facets(
    definition: &IndexDefinition,
    columns: &ColumnStore,
    matches: &RoaringBitmap,
    specs: &[String],
) -> Result<Map<String, Value>> {
    let mut facets = Map::new();
    for text in specs {
        let spec = parse_spec(definition, text)?;
        let buckets = if let Some(boundaries) = &spec.values {
            range_facet(definition, columns, matches, &spec, boundaries)?
        } else if let Some(interval) = spec.interval {
            interval_facet(definition, columns, matches, &spec, interval)?
        } else {
            value_facet(columns, matches, &spec)
        };
        facets.insert(spec.field.clone(), Value::Array(buckets));
    }
    Ok(facets)
}

fn cells(columns: &ColumnStore, field: &str, seq: u32) -> Vec<ColumnValue> {
    match columns.value(field, seq) {
        Some(ColumnValue::Many(items)) => items.clone(),
        Some(cell) => vec![cell.clone()],
        None => Vec::new(),
    }
}

fn value_facet(columns: &ColumnStore, matches: &RoaringBitmap, spec: &FacetSpec) -> Vec<Value> {
    let mut counts: BTreeMap<String, (Value, u64)> = BTreeMap::new();
    for seq in matches {
        for cell in cells(columns, &spec.field, seq) {
            let (key, value) = match cell {
                ColumnValue::Str(s) => (s.clone(), json!(s)),
                ColumnValue::Bool(b) => (b.to_string(), json!(b)),
                ColumnValue::I64(i) => (format!("{i:020}"), json!(i)),
                ColumnValue::F64(f) => (format!("{f:024.6}"), json!(f)),
                ColumnValue::Date(micros) => {
                    let rendered = render_date(micros);
                    (rendered.clone(), json!(rendered))
                }
                ColumnValue::Geo(..) | ColumnValue::Many(_) => continue,
            };
            let entry = counts.entry(key).or_insert((value, 0));
            entry.1 += 1;
        }
    }

    let mut entries: Vec<(Value, u64)> = counts.into_values().collect();
    // most frequent first; the BTreeMap gives a stable value order for ties
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.truncate(spec.count);
    entries.into_iter().map(|(value, count)| json!({ "value": value, "count": count })).collect()
}

fn interval_facet(
    definition: &IndexDefinition,
    columns: &ColumnStore,
    matches: &RoaringBitmap,
    spec: &FacetSpec,
    interval: f64,
) -> Result<Vec<Value>> {
    if interval <= 0.0 {
        return Err(Error::InvalidArgument(
            "A facet interval must be a positive number.".to_string(),
        ));
    }
    let field = resolve_field(definition, &spec.field).expect("validated by parse_spec");
    let is_date = field.data_type.element() == &DataType::DateTimeOffset;

    let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
    for seq in matches {
        for cell in cells(columns, &spec.field, seq) {
            let Some(number) = cell.as_f64() else { continue };
            let bucket = (number / interval).floor() as i64;
            *counts.entry(bucket).or_default() += 1;
        }
    }

    Ok(counts
        .into_iter()
        .map(|(bucket, count)| {
            let start = bucket as f64 * interval;
            let value = if is_date {
                json!(render_date(start as i64))
            } else if start.fract() == 0.0 && interval.fract() == 0.0 {
                json!(start as i64)
            } else {
                json!(start)
            };
            json!({ "value": value, "count": count })
        })
        .collect())
}

fn range_facet(
    definition: &IndexDefinition,
    columns: &ColumnStore,
    matches: &RoaringBitmap,
    spec: &FacetSpec,
    boundaries: &[String],
) -> Result<Vec<Value>> {
    let field = resolve_field(definition, &spec.field).expect("validated by parse_spec");
    let is_date = field.data_type.element() == &DataType::DateTimeOffset;

    let mut bounds = Vec::with_capacity(boundaries.len());
    for boundary in boundaries {
        let value = if is_date {
            datetime_micros(boundary).map(|micros| micros as f64)
        } else {
            boundary.parse::<f64>().ok()
        };
        let value = value.ok_or_else(|| {
            Error::InvalidArgument(format!("`{boundary}` is not a valid facet range boundary."))
        })?;
        bounds.push(value);
    }
    bounds.sort_by(f64::total_cmp);

    // half-open buckets: [-inf, b0), [b0, b1), …, [bn, +inf)
    let mut counts = vec![0u64; bounds.len() + 1];
    for seq in matches {
        for cell in cells(columns, &spec.field, seq) {
            let Some(number) = cell.as_f64() else { continue };
            let bucket = bounds.iter().take_while(|bound| number >= **bound).count();
            counts[bucket] += 1;
        }
    }

    let render = |bound: f64| -> Value {
        if is_date {
            json!(render_date(bound as i64))
        } else if bound.fract() == 0.0 {
            json!(bound as i64)
        } else {
            json!(bound)
        }
    };

    let mut buckets = Vec::with_capacity(counts.len());
    for (i, count) in counts.iter().enumerate() {
        let mut bucket = Map::new();
        if i > 0 {
            bucket.insert("from".to_string(), render(bounds[i - 1]));
        }
        if i < bounds.len() {
            bucket.insert("to".to_string(), render(bounds[i]));
        }
        bucket.insert("count".to_string(), json!(count));
        buckets.push(Value::Object(bucket));
    }
    Ok(buckets)
}

fn render_date(micros: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(micros as i128 * 1_000)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn setup() -> (IndexDefinition, ColumnStore, RoaringBitmap) {
        let definition: IndexDefinition = serde_json::from_value(json!({
            "name": "hotels",
            "fields": [
                { "name": "id", "type": "Edm.String", "key": true },
                { "name": "rating", "type": "Edm.Double", "facetable": true },
                { "name": "tags", "type": "Collection(Edm.String)", "facetable": true }
            ]
        }))
        .unwrap();
        let mut columns = ColumnStore::new();
        for (id, rating, tags) in [
            ("1", 4.5, vec!["pool", "wifi"]),
            ("2", 4.8, vec!["wifi"]),
            ("3", 3.1, vec!["budget", "wifi"]),
            ("4", 2.0, vec!["budget"]),
        ] {
            columns.upsert(
                &definition,
                id,
                json!({ "id": id, "rating": rating, "tags": tags }).as_object().unwrap().clone(),
            );
        }
        let matches = columns.live().clone();
        (definition, columns, matches)
    }

    #[test]
    fn value_facet_counts_every_element() {
        let (definition, columns, matches) = setup();
        let facets =
            compute_facets(&definition, &columns, &matches, &["tags,count:2".to_string()])
                .unwrap();
        let buckets = facets["tags"].as_array().unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0], json!({ "value": "wifi", "count": 3 }));
        assert_eq!(buckets[1], json!({ "value": "budget", "count": 2 }));
    }

    #[test]
    fn interval_facet_buckets_at_multiples() {
        let (definition, columns, matches) = setup();
        let facets =
            compute_facets(&definition, &columns, &matches, &["rating,interval:1".to_string()])
                .unwrap();
        let buckets = facets["rating"].as_array().unwrap();
        assert_eq!(
            buckets,
            &vec![
                json!({ "value": 2, "count": 1 }),
                json!({ "value": 3, "count": 1 }),
                json!({ "value": 4, "count": 2 }),
            ]
        );
        // bucket counts sum to the match count when the field has no nulls
        let total: u64 = buckets.iter().map(|b| b["count"].as_u64().unwrap()).sum();
        assert_eq!(total, matches.len());
    }

    #[test]
    fn range_facet_half_open_buckets() {
        let (definition, columns, matches) = setup();
        let facets =
            compute_facets(&definition, &columns, &matches, &["rating,values:3|4.6".to_string()])
                .unwrap();
        let buckets = facets["rating"].as_array().unwrap();
        assert_eq!(
            buckets,
            &vec![
                json!({ "to": 3, "count": 1 }),
                json!({ "from": 3, "to": 4.6, "count": 2 }),
                json!({ "from": 4.6, "count": 1 }),
            ]
        );
    }

    #[test]
    fn unfacetable_field_is_rejected() {
        let (definition, columns, matches) = setup();
        assert!(matches!(
            compute_facets(&definition, &columns, &matches, &["id".to_string()]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
