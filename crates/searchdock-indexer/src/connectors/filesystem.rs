//! The filesystem connector: the connection string is a base directory, the
//! container name a subdirectory, and the container query a glob pattern
//! over relative paths.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use searchdock_types::data_source::{DataSourceDefinition, DataSourceDocument};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::DataSourceConnector;
use crate::error::{Error, Result};

pub struct FilesystemConnector;

impl FilesystemConnector {
    fn container_dir(&self, source: &DataSourceDefinition) -> Result<PathBuf> {
        let base = source.credentials.connection_string.as_deref().ok_or_else(|| {
            Error::InvalidDefinition(format!(
                "Data source `{}` has no connection string; the filesystem connector treats it as the base directory.",
                source.name
            ))
        })?;
        Ok(Path::new(base).join(&source.container.name))
    }

    fn walk(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir).map_err(|e| Error::Connector(e.to_string()))? {
            let entry = entry.map_err(|e| Error::Connector(e.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path, files)?;
            } else {
                files.push(path);
            }
        }
        Ok(())
    }

    fn describe(&self, root: &Path, path: &Path) -> Result<DataSourceDocument> {
        let metadata = fs::metadata(path).map_err(|e| Error::Connector(e.to_string()))?;
        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative_str.clone());
        let extension =
            path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();
        let last_modified = metadata
            .modified()
            .ok()
            .map(OffsetDateTime::from)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let content_type = content_type_for(&extension);

        let mut doc = DataSourceDocument {
            key: URL_SAFE_NO_PAD.encode(relative_str.as_bytes()),
            name,
            content_type: Some(content_type.to_string()),
            size: metadata.len(),
            last_modified,
            metadata: serde_json::Map::new(),
        };
        doc.metadata.insert("metadata_storage_path".into(), json!(relative_str));
        doc.metadata.insert("metadata_storage_name".into(), json!(doc.name.clone()));
        doc.metadata.insert("metadata_storage_size".into(), json!(doc.size));
        doc.metadata.insert(
            "metadata_storage_last_modified".into(),
            json!(last_modified.format(&Rfc3339).unwrap_or_default()),
        );
        doc.metadata.insert("metadata_storage_content_type".into(), json!(content_type));
        doc.metadata.insert("metadata_storage_file_extension".into(), json!(extension));
        Ok(doc)
    }
}

impl DataSourceConnector for FilesystemConnector {
    fn connector_type(&self) -> &'static str {
        "filesystem"
    }

    fn list_documents(
        &self,
        source: &DataSourceDefinition,
        tracking_state: Option<&str>,
    ) -> Result<Vec<DataSourceDocument>> {
        let root = self.container_dir(source)?;
        if !root.is_dir() {
            return Err(Error::Connector(format!(
                "container directory `{}` does not exist",
                root.display()
            )));
        }

        let pattern = source
            .container
            .query
            .as_deref()
            .map(|query| {
                glob::Pattern::new(query).map_err(|e| {
                    Error::InvalidDefinition(format!("`{query}` is not a valid glob pattern: {e}"))
                })
            })
            .transpose()?;
        let high_water = tracking_state.and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok());

        let mut files = Vec::new();
        self.walk(&root, &mut files)?;
        files.sort();

        let mut documents = Vec::new();
        for path in files {
            let relative = path.strip_prefix(&root).unwrap_or(&path);
            if let Some(pattern) = &pattern {
                if !pattern.matches(&relative.to_string_lossy().replace('\\', "/")) {
                    continue;
                }
            }
            let document = self.describe(&root, &path)?;
            if let Some(high_water) = high_water {
                if document.last_modified <= high_water {
                    continue;
                }
            }
            documents.push(document);
        }
        Ok(documents)
    }

    fn read_content(
        &self,
        source: &DataSourceDefinition,
        document: &DataSourceDocument,
    ) -> Result<Vec<u8>> {
        let root = self.container_dir(source)?;
        let relative = decode_key(&document.key)?;
        fs::read(root.join(relative)).map_err(|e| Error::Connector(e.to_string()))
    }

    fn get_document(
        &self,
        source: &DataSourceDefinition,
        key: &str,
    ) -> Result<Option<DataSourceDocument>> {
        let root = self.container_dir(source)?;
        let relative = decode_key(key)?;
        let path = root.join(relative);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(self.describe(&root, &path)?))
    }
}

fn decode_key(key: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(key)
        .map_err(|_| Error::Connector(format!("`{key}` is not a valid document key")))?;
    String::from_utf8(bytes)
        .map_err(|_| Error::Connector(format!("`{key}` is not a valid document key")))
}

fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "json" => "application/json",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
