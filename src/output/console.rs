use crate::item::Artifact;
use crate::output::traits::{Sink, SinkResult};
use std::io::Write;

/// Prints every artifact to stdout, one JSON document per line
#[derive(Debug, Default, Clone)]
pub struct ConsoleSink {
    pretty: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretty-prints payloads instead of one line per artifact
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render(&self, artifact: &Artifact) -> SinkResult<String> {
        let body = if self.pretty {
            serde_json::to_string_pretty(&artifact.payload)?
        } else {
            serde_json::to_string(&artifact.payload)?
        };
        Ok(match artifact.name.as_str() {
            "" => body,
            name => format!("{}: {}", name, body),
        })
    }
}

impl Sink for ConsoleSink {
    fn identity(&self) -> String {
        "console".to_string()
    }

    fn save(&self, artifact: &Artifact) -> SinkResult<()> {
        let line = self.render(artifact)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)?;
        Ok(())
    }
}
