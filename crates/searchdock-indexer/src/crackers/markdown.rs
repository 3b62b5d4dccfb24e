use super::{CrackedDocument, DocumentCracker};

pub struct MarkdownCracker;

impl DocumentCracker for MarkdownCracker {
    fn can_handle(&self, content_type: &str, extension: &str) -> bool {
        content_type.starts_with("text/markdown") || matches!(extension, "md" | "markdown")
    }

    fn crack(&self, bytes: &[u8], _file_name: &str, _content_type: &str) -> CrackedDocument {
        let raw = String::from_utf8_lossy(bytes);
        let title = raw
            .lines()
            .find_map(|line| line.strip_prefix('#'))
            .map(|line| line.trim_start_matches('#').trim().to_string());

        // strip the heading markers and emphasis so the content reads plain
        let content = raw
            .lines()
            .map(|line| line.trim_start_matches('#').trim_start())
            .collect::<Vec<_>>()
            .join("\n")
            .replace("**", "")
            .replace('`', "");

        CrackedDocument { content, title, ..Default::default() }.with_counts()
    }
}
