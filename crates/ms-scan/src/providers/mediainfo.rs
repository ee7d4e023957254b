//! mediainfo provider.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ms_core::Result;

use super::{parse_json_output, resolve_tool};
use crate::command::ToolCommand;
use crate::provider::MetadataProvider;

pub struct MediainfoProvider {
    program: PathBuf,
    timeout: Duration,
}

impl MediainfoProvider {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    /// Locate mediainfo from the configured path or `PATH`.
    pub fn discover(configured: Option<&Path>, timeout: Duration) -> Option<Self> {
        resolve_tool("mediainfo", configured).map(|p| Self::new(p, timeout))
    }
}

impl MetadataProvider for MediainfoProvider {
    fn name(&self) -> &str {
        "mediainfo"
    }

    fn run(&self, path: &Path) -> Result<Option<serde_json::Value>> {
        let output = ToolCommand::new(self.program.clone())
            .arg("--Output=JSON")
            .arg(path.to_string_lossy())
            .timeout(self.timeout)
            .execute_blocking()?;
        parse_json_output(self.name(), &output.stdout)
    }
}
