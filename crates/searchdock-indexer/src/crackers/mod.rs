//! Document crackers: pure functions from bytes to text + metadata,
//! dispatched by (content-type, extension). An unmatched payload yields an
//! empty document with an error flag rather than aborting the run.

mod csv_file;
mod json_file;
mod markdown;
mod text;

pub use csv_file::CsvCracker;
pub use json_file::JsonCracker;
pub use markdown::MarkdownCracker;
use serde_json::Map;
pub use text::PlainTextCracker;

#[derive(Debug, Clone, Default)]
pub struct CrackedDocument {
    pub content: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub created_date: Option<String>,
    pub modified_date: Option<String>,
    pub page_count: Option<u64>,
    pub word_count: Option<u64>,
    pub character_count: Option<u64>,
    pub language: Option<String>,
    pub metadata: Map<String, serde_json::Value>,
    pub warnings: Vec<String>,
    pub images: Vec<CrackedImage>,
    /// Set when no cracker matched the payload.
    pub failed: bool,
}

#[derive(Debug, Clone)]
pub struct CrackedImage {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl CrackedDocument {
    pub fn with_counts(mut self) -> Self {
        self.character_count = Some(self.content.chars().count() as u64);
        self.word_count = Some(self.content.split_whitespace().count() as u64);
        self
    }
}

pub trait DocumentCracker: Send + Sync {
    fn can_handle(&self, content_type: &str, extension: &str) -> bool;
    fn crack(&self, bytes: &[u8], file_name: &str, content_type: &str) -> CrackedDocument;
}

pub struct CrackerFactory {
    crackers: Vec<Box<dyn DocumentCracker>>,
}

impl Default for CrackerFactory {
    fn default() -> Self {
        Self {
            crackers: vec![
                Box::new(JsonCracker),
                Box::new(CsvCracker),
                Box::new(MarkdownCracker),
                Box::new(PlainTextCracker),
            ],
        }
    }
}

impl CrackerFactory {
    /// Pick the first handler that matches; on miss, return an empty
    /// document flagged with a warning.
    pub fn crack(&self, bytes: &[u8], file_name: &str, content_type: &str) -> CrackedDocument {
        let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
        for cracker in &self.crackers {
            if cracker.can_handle(content_type, extension) {
                return cracker.crack(bytes, file_name, content_type);
            }
        }
        CrackedDocument {
            warnings: vec![format!(
                "No document cracker handles content type `{content_type}` (file `{file_name}`)."
            )],
            failed: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_dispatches_by_content_type_and_extension() {
        let factory = CrackerFactory::default();

        let cracked = factory.crack(b"hello world", "note.txt", "text/plain");
        assert_eq!(cracked.content, "hello world");
        assert!(!cracked.failed);

        let cracked = factory.crack(b"{\"a\": 1}", "data.bin", "application/json");
        assert!(cracked.content.contains('1'));

        let cracked = factory.crack(b"\x00\x01", "blob.pdf", "application/pdf");
        assert!(cracked.failed);
        assert!(cracked.content.is_empty());
        assert_eq!(cracked.warnings.len(), 1);
    }
}
