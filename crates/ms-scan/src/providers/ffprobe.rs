//! ffprobe provider: container and stream information.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ms_core::Result;

use super::{parse_json_output, resolve_tool};
use crate::command::ToolCommand;
use crate::provider::MetadataProvider;

pub struct FfprobeProvider {
    program: PathBuf,
    timeout: Duration,
}

impl FfprobeProvider {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    /// Locate ffprobe from the configured path or `PATH`.
    pub fn discover(configured: Option<&Path>, timeout: Duration) -> Option<Self> {
        resolve_tool("ffprobe", configured).map(|p| Self::new(p, timeout))
    }

    fn command(&self, path: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.program.clone());
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path.to_string_lossy())
            .timeout(self.timeout);
        cmd
    }
}

impl MetadataProvider for FfprobeProvider {
    fn name(&self) -> &str {
        "ffprobe"
    }

    fn run(&self, path: &Path) -> Result<Option<serde_json::Value>> {
        let output = self.command(path).execute_blocking()?;
        parse_json_output(self.name(), &output.stdout)
    }
}
