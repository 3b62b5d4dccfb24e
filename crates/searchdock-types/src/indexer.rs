use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Code, ErrorCode};

/// Ties a data source to a target index, optionally through a skillset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexerDefinition {
    pub name: String,
    pub data_source_name: String,
    pub target_index_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skillset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<IndexerSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<IndexerParameters>,
    /// source field → target field, applied to the cracked document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_mappings: Vec<FieldMapping>,
    /// enriched path → target field, applied after the skillset ran.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_field_mappings: Vec<FieldMapping>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexerSchedule {
    /// ISO-8601 duration, e.g. `PT5M`. Minimum enforced at validation.
    pub interval: String,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexerParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failed_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub source_field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_function: Option<MappingFunction>,
}

impl FieldMapping {
    pub fn target(&self) -> &str {
        self.target_field_name.as_deref().unwrap_or(&self.source_field_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MappingFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

/// The indexer run state machine:
/// `idle → inProgress → {success, transientFailure, reset} → idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexerStatus {
    #[default]
    Idle,
    InProgress,
    Success,
    TransientFailure,
    Reset,
}

/// One recorded run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexerExecutionResult {
    pub status: IndexerStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<OffsetDateTime>,
    pub items_processed: u64,
    pub items_failed: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<IndexerExecutionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexerExecutionError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub error_message: String,
}

/// Persisted next to the definition: run history plus the connector's opaque
/// tracking state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerState {
    pub status: IndexerStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_history: Vec<IndexerExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_state: Option<String>,
}

impl IndexerState {
    pub const MAX_HISTORY: usize = 50;

    pub fn last_result(&self) -> Option<&IndexerExecutionResult> {
        self.execution_history.first()
    }

    /// Newest first; the history is capped.
    pub fn push_result(&mut self, result: IndexerExecutionResult) {
        self.execution_history.insert(0, result);
        self.execution_history.truncate(Self::MAX_HISTORY);
    }
}

/// Wire shape of `GET /indexers/{name}/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerStatusView {
    pub status: IndexerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<IndexerExecutionResult>,
    pub execution_history: Vec<IndexerExecutionResult>,
}

#[derive(Debug, thiserror::Error)]
#[error("`{0}` is not a valid ISO-8601 duration. Expected a shape like `PT5M` or `P1DT2H`.")]
pub struct ParseDurationError(pub String);

impl ErrorCode for ParseDurationError {
    fn error_code(&self) -> Code {
        Code::InvalidArgument
    }
}

/// Parse the ISO-8601 duration subset used by indexer schedules and skill
/// timeouts: `P[nD][T[nH][nM][nS]]`.
pub fn parse_iso8601_duration(input: &str) -> Result<Duration, ParseDurationError> {
    let err = || ParseDurationError(input.to_string());
    let rest = input.strip_prefix('P').ok_or_else(err)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    let mut seconds = 0u64;
    let mut parse_units = |part: &str, units: &[(char, u64)]| -> Result<(), ParseDurationError> {
        let mut digits = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else {
                let factor =
                    units.iter().find(|(unit, _)| *unit == c).map(|(_, f)| *f).ok_or_else(err)?;
                let n: u64 = digits.parse().map_err(|_| err())?;
                seconds += n * factor;
                digits.clear();
            }
        }
        if digits.is_empty() {
            Ok(())
        } else {
            Err(err())
        }
    };

    parse_units(date_part, &[('D', 86_400)])?;
    parse_units(time_part, &[('H', 3_600), ('M', 60), ('S', 1)])?;

    if seconds == 0 {
        return Err(err());
    }
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_iso8601_duration("PT5M").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_iso8601_duration("PT1H30M").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_iso8601_duration("P1DT2H").unwrap(), Duration::from_secs(93_600));
        assert_eq!(parse_iso8601_duration("PT45S").unwrap(), Duration::from_secs(45));
        assert!(parse_iso8601_duration("5m").is_err());
        assert!(parse_iso8601_duration("PT").is_err());
        assert!(parse_iso8601_duration("P").is_err());
    }

    #[test]
    fn definition_round_trips() {
        let body = json!({
            "name": "hotels-indexer",
            "dataSourceName": "hotels-files",
            "targetIndexName": "hotels",
            "schedule": { "interval": "PT10M" },
            "fieldMappings": [
                { "sourceFieldName": "metadata_storage_path", "targetFieldName": "id",
                  "mappingFunction": { "name": "base64Encode" } }
            ],
            "outputFieldMappings": [
                { "sourceFieldName": "/document/chunks", "targetFieldName": "chunks" }
            ]
        });
        let indexer: IndexerDefinition = serde_json::from_value(body).unwrap();
        assert!(!indexer.disabled);
        assert_eq!(indexer.field_mappings[0].target(), "id");
        assert_eq!(
            indexer.field_mappings[0].mapping_function.as_ref().unwrap().name,
            "base64Encode"
        );
    }

    #[test]
    fn history_is_capped_newest_first() {
        let mut state = IndexerState::default();
        for i in 0..60 {
            state.push_result(IndexerExecutionResult {
                status: IndexerStatus::Success,
                start_time: OffsetDateTime::from_unix_timestamp(i).unwrap(),
                end_time: None,
                items_processed: i as u64,
                items_failed: 0,
                errors: vec![],
                error_message: None,
            });
        }
        assert_eq!(state.execution_history.len(), IndexerState::MAX_HISTORY);
        assert_eq!(state.last_result().unwrap().items_processed, 59);
    }
}
