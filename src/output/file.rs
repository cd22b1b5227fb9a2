use crate::item::Artifact;
use crate::output::traits::{Sink, SinkError, SinkResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Default tag naming the output path
pub const DEFAULT_PATH_TAG: &str = "file";

/// Appends artifact payloads to the file named by one of their tags
///
/// Only artifacts carrying the tag are accepted. Parent directories are
/// created on demand.
#[derive(Debug, Clone)]
pub struct FileSink {
    path_tag: String,
}

impl FileSink {
    pub fn new() -> Self {
        Self::with_path_tag(DEFAULT_PATH_TAG)
    }

    pub fn with_path_tag(tag: impl Into<String>) -> Self {
        Self {
            path_tag: tag.into(),
        }
    }
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for FileSink {
    fn identity(&self) -> String {
        format!("file:{}", self.path_tag)
    }

    fn acceptable(&self, artifact: &Artifact) -> bool {
        artifact.tag_str(&self.path_tag).is_some()
    }

    fn save(&self, artifact: &Artifact) -> SinkResult<()> {
        let path = artifact
            .tag_str(&self.path_tag)
            .map(Path::new)
            .ok_or_else(|| SinkError::MissingTag(self.path_tag.clone()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = match &artifact.payload {
            serde_json::Value::String(text) => text.clone(),
            other => serde_json::to_string(other)?,
        };
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
