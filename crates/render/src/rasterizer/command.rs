use super::{Rasterizer, RenderedImage};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tome_storage::{FileRef, StoreHandle};
use tracing::instrument;

/// First page only, scaled so the longest side is `{size}` pixels.
const PDFTOPPM: &[&str] =
    &["pdftoppm", "-png", "-singlefile", "-f", "1", "-l", "1", "-scale-to", "{size}", "{input}", "{output_stem}"];
const OUTPUT_STEM: &str = "render";

/// Rasterizes by running an external program on a temporary copy of the
/// attachment.
///
/// The program is located on `PATH` when the rasterizer is built, so a
/// missing tool is reported once at startup instead of on every render.
pub struct CommandRasterizer {
    store: StoreHandle,
    name: String,
    program: PathBuf,
    args: Vec<String>,
    size: u32,
    timeout: Duration,
}
impl CommandRasterizer {
    /// `argv` is the program followed by its arguments; see
    /// [`RasterizerSettings`](tome_config::RasterizerSettings) for the
    /// placeholders it may use.
    pub fn new(store: StoreHandle, argv: &[String], size: u32, timeout: Duration) -> Result<Self> {
        let (name, args) = argv.split_first().ok_or_raise(|| ErrorKind::RasterizerNotFound(String::new()))?;
        let program = which::which(name).or_raise(|| ErrorKind::RasterizerNotFound(name.clone()))?;
        tracing::debug!(program = %program.display(), "rasterizer discovered");
        Ok(Self { store, name: name.clone(), program, args: args.to_vec(), size, timeout })
    }

    /// Poppler's `pdftoppm`.
    pub fn pdftoppm(store: StoreHandle, size: u32, timeout: Duration) -> Result<Self> {
        let argv: Vec<String> = PDFTOPPM.iter().map(|arg| arg.to_string()).collect();
        Self::new(store, &argv, size, timeout)
    }

    fn expand(&self, arg: &str, input: &Path, workdir: &Path) -> String {
        let stem = workdir.join(OUTPUT_STEM);
        arg.replace("{input}", &input.to_string_lossy())
            .replace("{output_stem}", &stem.to_string_lossy())
            .replace("{output}", &stem.with_extension("png").to_string_lossy())
            .replace("{size}", &self.size.to_string())
    }
}

#[async_trait]
impl Rasterizer for CommandRasterizer {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(rasterizer = %self.name, path = %attachment.path.display()))]
    async fn render(&self, attachment: &FileRef, _requesting: &Path) -> Result<RenderedImage> {
        let bytes = self.store.read(&attachment.path).await.or_raise(|| ErrorKind::Source)?;
        let workdir = tempfile::tempdir().or_raise(|| ErrorKind::Io)?;
        // Keep the original file name; some tools sniff the format from it.
        let file_name = attachment.path.file_name().ok_or_raise(|| ErrorKind::Unsupported(attachment.path.clone()))?;
        let input = workdir.path().join(file_name);
        tokio::fs::write(&input, bytes).await.or_raise(|| ErrorKind::Io)?;

        let mut command = Command::new(&self.program);
        command
            .args(self.args.iter().map(|arg| self.expand(arg, &input, workdir.path())))
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .or_raise(|| ErrorKind::RasterizerTimeout(self.timeout.as_secs()))?
            .or_raise(|| ErrorKind::Io)?;
        if !output.status.success() {
            tracing::warn!(stderr = %String::from_utf8_lossy(&output.stderr).trim(), "rasterizer failed");
            exn::bail!(ErrorKind::RasterizerFailed { program: self.name.clone(), code: output.status.code() });
        }
        let png = workdir.path().join(OUTPUT_STEM).with_extension("png");
        let bytes = tokio::fs::read(&png).await.or_raise(|| ErrorKind::Io)?;
        Ok(RenderedImage { bytes })
    }
}
