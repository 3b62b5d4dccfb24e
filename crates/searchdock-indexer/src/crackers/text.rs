use super::{CrackedDocument, DocumentCracker};

pub struct PlainTextCracker;

impl DocumentCracker for PlainTextCracker {
    fn can_handle(&self, content_type: &str, extension: &str) -> bool {
        content_type.starts_with("text/plain")
            || matches!(extension, "txt" | "text" | "log")
    }

    fn crack(&self, bytes: &[u8], _file_name: &str, _content_type: &str) -> CrackedDocument {
        let content = String::from_utf8_lossy(bytes).into_owned();
        let title = content.lines().find(|line| !line.trim().is_empty()).map(str::to_string);
        CrackedDocument { content, title, ..Default::default() }.with_counts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_title() {
        let cracked = PlainTextCracker.crack(b"First line\nsecond line", "a.txt", "text/plain");
        assert_eq!(cracked.title.as_deref(), Some("First line"));
        assert_eq!(cracked.word_count, Some(4));
        assert_eq!(cracked.character_count, Some(22));
    }
}
