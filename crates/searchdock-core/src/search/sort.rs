use std::cmp::Ordering;

use searchdock_types::index::IndexDefinition;

use crate::columns::ColumnStore;
use crate::error::{Error, Result};
use crate::search::filter::resolve_field;

#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Field { path: String, descending: bool },
    Score { descending: bool },
}

/// Parse `orderBy`: a comma-separated list of `field (asc|desc)`;
/// `search.score()` is a valid sort key.
pub fn parse_order_by(definition: &IndexDefinition, text: &str) -> Result<Vec<SortKey>> {
    let mut keys = Vec::new();
    for clause in text.split(',') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let (name, direction) = match clause.rsplit_once(char::is_whitespace) {
            Some((name, "asc")) => (name.trim(), false),
            Some((name, "desc")) => (name.trim(), true),
            _ => (clause, false),
        };

        if name == "search.score()" {
            keys.push(SortKey::Score { descending: direction });
            continue;
        }

        let field = resolve_field(definition, name)
            .ok_or_else(|| Error::UnknownField(name.to_string(), definition.name.clone()))?;
        if !field.sortable {
            return Err(Error::InvalidArgument(format!(
                "Field `{name}` is not sortable. Set `sortable` to true in the index definition to order by it."
            )));
        }
        keys.push(SortKey::Field { path: name.to_string(), descending: direction });
    }
    Ok(keys)
}

/// Order results by the sort keys; ties break by stable insertion order
/// (ascending sequence id). Documents missing a sort value go last.
pub fn sort_results(keys: &[SortKey], columns: &ColumnStore, results: &mut [(u32, f64)]) {
    results.sort_by(|&(a_seq, a_score), &(b_seq, b_score)| {
        for key in keys {
            let ordering = match key {
                SortKey::Score { descending } => {
                    let ordering = a_score.total_cmp(&b_score);
                    if *descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                }
                SortKey::Field { path, descending } => {
                    let a = columns.value(path, a_seq);
                    let b = columns.value(path, b_seq);
                    match (a, b) {
                        (Some(a), Some(b)) => {
                            let ordering = a.compare(b);
                            if *descending {
                                ordering.reverse()
                            } else {
                                ordering
                            }
                        }
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a_seq.cmp(&b_seq)
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn definition() -> IndexDefinition {
        serde_json::from_value(json!({
            "name": "hotels",
            "fields": [
                { "name": "id", "type": "Edm.String", "key": true },
                { "name": "rating", "type": "Edm.Double", "sortable": true },
                { "name": "name", "type": "Edm.String", "searchable": true }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn parses_directions() {
        let definition = definition();
        let keys = parse_order_by(&definition, "rating desc, search.score()").unwrap();
        assert_eq!(
            keys,
            vec![
                SortKey::Field { path: "rating".into(), descending: true },
                SortKey::Score { descending: false }
            ]
        );
    }

    #[test]
    fn rejects_unsortable_and_unknown_fields() {
        let definition = definition();
        assert!(matches!(
            parse_order_by(&definition, "name asc"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_order_by(&definition, "bogus desc"),
            Err(Error::UnknownField(..))
        ));
    }

    #[test]
    fn sorts_with_missing_values_last() {
        let definition = definition();
        let mut columns = ColumnStore::new();
        for (id, rating) in [("a", Some(3.0)), ("b", None), ("c", Some(5.0))] {
            let mut doc = json!({ "id": id }).as_object().unwrap().clone();
            if let Some(rating) = rating {
                doc.insert("rating".into(), json!(rating));
            }
            columns.upsert(&definition, id, doc);
        }
        let keys = parse_order_by(&definition, "rating desc").unwrap();
        let mut results = vec![(0u32, 1.0), (1u32, 1.0), (2u32, 1.0)];
        sort_results(&keys, &columns, &mut results);
        let order: Vec<u32> = results.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }
}
