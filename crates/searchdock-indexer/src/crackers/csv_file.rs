use serde_json::json;

use super::{CrackedDocument, DocumentCracker};

/// CSV rows become newline-separated text; the header and row count land in
/// the metadata.
pub struct CsvCracker;

impl DocumentCracker for CsvCracker {
    fn can_handle(&self, content_type: &str, extension: &str) -> bool {
        content_type.starts_with("text/csv") || extension == "csv"
    }

    fn crack(&self, bytes: &[u8], file_name: &str, _content_type: &str) -> CrackedDocument {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

        let headers = match reader.headers() {
            Ok(headers) => headers.iter().map(str::to_string).collect::<Vec<_>>(),
            Err(e) => {
                return CrackedDocument {
                    warnings: vec![format!("`{file_name}` is not valid CSV: {e}.")],
                    failed: true,
                    ..Default::default()
                }
            }
        };

        let mut lines = vec![headers.join(" ")];
        let mut row_count = 0u64;
        let mut warnings = Vec::new();
        for record in reader.records() {
            match record {
                Ok(record) => {
                    lines.push(record.iter().collect::<Vec<_>>().join(" "));
                    row_count += 1;
                }
                Err(e) => warnings.push(format!("skipped malformed CSV record: {e}")),
            }
        }

        let mut cracked = CrackedDocument {
            content: lines.join("\n"),
            warnings,
            ..Default::default()
        };
        cracked.metadata.insert("csv_headers".into(), json!(headers));
        cracked.metadata.insert("csv_row_count".into(), json!(row_count));
        cracked.with_counts()
    }
}
