//! Filter evaluation: the parsed OData AST becomes a set-valued predicate
//! over the doc-value columns, producing a roaring set of sequence ids.

use filter_parser::{Condition, FilterCondition, Literal};
use roaring::RoaringBitmap;
use searchdock_types::index::{DataType, Field, IndexDefinition};
use serde_json::Value;

use crate::analyzers;
use crate::columns::{datetime_micros, ColumnStore, ColumnValue};
use crate::error::{Error, Result};

pub fn evaluate_filter(
    definition: &IndexDefinition,
    columns: &ColumnStore,
    filter_text: &str,
) -> Result<Option<RoaringBitmap>> {
    let parsed = FilterCondition::parse(filter_text)
        .map_err(|e| Error::InvalidFilter(e.to_string()))?;
    let Some(parsed) = parsed else { return Ok(None) };
    Ok(Some(evaluate(definition, columns, &parsed)?))
}

fn evaluate(
    definition: &IndexDefinition,
    columns: &ColumnStore,
    filter: &FilterCondition,
) -> Result<RoaringBitmap> {
    match filter {
        FilterCondition::And(operands) => {
            let mut set: Option<RoaringBitmap> = None;
            for operand in operands {
                let operand = evaluate(definition, columns, operand)?;
                set = Some(match set {
                    Some(set) => set & operand,
                    None => operand,
                });
            }
            Ok(set.unwrap_or_default())
        }
        FilterCondition::Or(operands) => {
            let mut set = RoaringBitmap::new();
            for operand in operands {
                set |= evaluate(definition, columns, operand)?;
            }
            Ok(set)
        }
        FilterCondition::Not(inner) => {
            let inner = evaluate(definition, columns, inner)?;
            Ok(columns.live().clone() - inner)
        }
        FilterCondition::Comparison { field, op } => {
            let path = field.value();
            let schema_field = resolve_filterable(definition, path)?;
            let mut set = RoaringBitmap::new();
            for seq in columns.iter_live() {
                if compare(definition, schema_field, columns, seq, path, op)? {
                    set.insert(seq);
                }
            }
            Ok(set)
        }
        FilterCondition::In { field, values } => {
            let path = field.value();
            let schema_field = resolve_filterable(definition, path)?;
            let normalized: Vec<String> = values
                .iter()
                .map(|v| normalize_if_analyzed(definition, schema_field, v.value()))
                .collect();
            let mut set = RoaringBitmap::new();
            for seq in columns.iter_live() {
                let matched = field_strings(definition, schema_field, columns, seq, path)
                    .iter()
                    .any(|candidate| {
                        let candidate = normalize_if_analyzed(definition, schema_field, candidate);
                        normalized.iter().any(|v| *v == candidate)
                    });
                if matched {
                    set.insert(seq);
                }
            }
            Ok(set)
        }
    }
}

fn resolve_filterable<'a>(
    definition: &'a IndexDefinition,
    path: &str,
) -> Result<&'a Field> {
    let field = resolve_field(definition, path)
        .ok_or_else(|| Error::UnknownField(path.to_string(), definition.name.clone()))?;
    if !field.filterable {
        return Err(Error::InvalidFilter(format!(
            "Field `{path}` is not filterable. Set `filterable` to true in the index definition to filter on it."
        )));
    }
    Ok(field)
}

pub fn resolve_field<'a>(definition: &'a IndexDefinition, path: &str) -> Option<&'a Field> {
    let mut parts = path.split('/');
    let mut current = definition.field(parts.next()?)?;
    for part in parts {
        current = current.fields.iter().find(|f| f.name == part)?;
    }
    Some(current)
}

/// The cell used for comparison: top-level fields come from the columns,
/// sub-field paths are read out of the stored document.
fn cell_at(
    schema_field: &Field,
    columns: &ColumnStore,
    seq: u32,
    path: &str,
) -> Option<ColumnValue> {
    if !path.contains('/') {
        return columns.value(path, seq).cloned();
    }
    let document = columns.document(seq)?;
    let mut value: &Value = document.get(path.split('/').next()?)?;
    for part in path.split('/').skip(1) {
        value = value.as_object()?.get(part)?;
    }
    crate::columns::column_value(schema_field, value)
}

fn compare(
    definition: &IndexDefinition,
    schema_field: &Field,
    columns: &ColumnStore,
    seq: u32,
    path: &str,
    op: &Condition,
) -> Result<bool> {
    let literal = op.literal();

    // null comparisons test presence
    if matches!(literal, Literal::Null(_)) {
        let present = cell_at(schema_field, columns, seq, path).is_some();
        return Ok(match op {
            Condition::Equal(_) => !present,
            Condition::NotEqual(_) => present,
            _ => {
                return Err(Error::InvalidFilter(
                    "`null` can only be compared with `eq` or `ne`.".to_string(),
                ))
            }
        });
    }

    let Some(cell) = cell_at(schema_field, columns, seq, path) else {
        // a missing value matches nothing but `ne`
        return Ok(matches!(op, Condition::NotEqual(_)));
    };

    let ordering = match &cell {
        ColumnValue::Many(items) => {
            // a collection satisfies a comparison when any element does
            let mut orderings = Vec::with_capacity(items.len());
            for item in items {
                orderings.push(compare_cell(definition, schema_field, item, literal)?);
            }
            return Ok(orderings.into_iter().any(|ordering| matches_op(op, ordering)));
        }
        cell => compare_cell(definition, schema_field, cell, literal)?,
    };
    Ok(matches_op(op, ordering))
}

fn matches_op(op: &Condition, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    match (op, ordering) {
        (Condition::Equal(_), Some(Equal)) => true,
        (Condition::NotEqual(_), ordering) => ordering != Some(Equal),
        (Condition::GreaterThan(_), Some(Greater)) => true,
        (Condition::GreaterThanOrEqual(_), Some(Greater | Equal)) => true,
        (Condition::LowerThan(_), Some(Less)) => true,
        (Condition::LowerThanOrEqual(_), Some(Less | Equal)) => true,
        _ => false,
    }
}

/// Compare one cell against the literal; `None` means the shapes are not
/// comparable (which never matches except under `ne`).
fn compare_cell(
    definition: &IndexDefinition,
    schema_field: &Field,
    cell: &ColumnValue,
    literal: &Literal,
) -> Result<Option<std::cmp::Ordering>> {
    let ordering = match (cell, literal) {
        (ColumnValue::Str(value), Literal::String(token)) => {
            let left = normalize_if_analyzed(definition, schema_field, value);
            let right = normalize_if_analyzed(definition, schema_field, token.value());
            Some(left.cmp(&right))
        }
        (ColumnValue::Bool(value), Literal::Boolean(literal, _)) => Some(value.cmp(literal)),
        (ColumnValue::Date(micros), Literal::DateTime(token) | Literal::String(token)) => {
            match datetime_micros(token.value()) {
                Some(literal_micros) => Some(micros.cmp(&literal_micros)),
                None => {
                    return Err(Error::InvalidFilter(format!(
                        "`{}` is not a valid RFC 3339 datetime literal.",
                        token.value()
                    )))
                }
            }
        }
        (cell, Literal::Number(token)) => {
            let number =
                token.parse_finite_float().map_err(|e| Error::InvalidFilter(e.to_string()))?;
            cell.as_f64().map(|value| value.total_cmp(&number))
        }
        _ => None,
    };
    Ok(ordering)
}

/// For filter/facet equality on analyzed fields, the configured normalizer
/// applies to both sides.
fn normalize_if_analyzed(definition: &IndexDefinition, field: &Field, value: &str) -> String {
    if field.searchable && field.normalizer.is_some() {
        analyzers::normalize(definition, field.normalizer.as_deref(), value)
    } else {
        value.to_string()
    }
}

/// All string values of a field for one document; collections contribute
/// every element.
fn field_strings(
    _definition: &IndexDefinition,
    schema_field: &Field,
    columns: &ColumnStore,
    seq: u32,
    path: &str,
) -> Vec<String> {
    match cell_at(schema_field, columns, seq, path) {
        Some(ColumnValue::Str(s)) => vec![s],
        Some(ColumnValue::Many(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                ColumnValue::Str(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
