use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use super::{ArchiveSource, Archiver};
use crate::error::ArchiveError;

/// Exit codes zip uses for a usable archive. 12 is "nothing to do", which is
/// what an empty directory produces.
const ZIP_OK_CODES: &[i32] = &[0, 12];

/// A child process whose stdout is read incrementally
pub struct ProcessSource {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    pid: Option<u32>,
    buf: Vec<u8>,
    ok_codes: &'static [i32],
}

impl ProcessSource {
    /// Spawn `command` with stdout piped, reading at most `chunk_size` bytes per chunk
    pub fn spawn(command: Command, chunk_size: usize) -> std::io::Result<Self> {
        Self::spawn_with_ok_codes(command, chunk_size, &[0])
    }

    fn spawn_with_ok_codes(
        mut command: Command,
        chunk_size: usize,
        ok_codes: &'static [i32],
    ) -> std::io::Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
        let pid = child.id();

        Ok(Self {
            child: Some(child),
            stdout: Some(stdout),
            pid,
            buf: vec![0u8; chunk_size.max(1)],
            ok_codes,
        })
    }

    /// OS process id, as observed at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn check_status(&self, status: ExitStatus) -> Result<(), ArchiveError> {
        match status.code() {
            Some(code) if self.ok_codes.contains(&code) => Ok(()),
            _ => Err(ArchiveError::ProcessFailed(status)),
        }
    }
}

#[async_trait]
impl ArchiveSource for ProcessSource {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, ArchiveError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let n = stdout.read(&mut self.buf).await?;
        if n > 0 {
            return Ok(Some(Bytes::copy_from_slice(&self.buf[..n])));
        }

        // EOF on stdout: reap the child and judge its exit status
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let status = child.wait().await?;
            debug!(pid = ?self.pid, %status, "archiver exited");
            self.check_status(status)?;
        }

        Ok(None)
    }

    async fn terminate(&mut self) -> Result<(), ArchiveError> {
        self.stdout = None;

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if child.try_wait()?.is_none() {
            child.start_kill()?;
        }
        let status = child.wait().await?;
        debug!(pid = ?self.pid, %status, "archiver terminated");

        Ok(())
    }
}

/// Launches `zip -r -j -q - <dir>`: recursive, flattened, archive on stdout
#[derive(Debug, Clone)]
pub struct ZipCommand {
    program: PathBuf,
    chunk_size: usize,
}

impl ZipCommand {
    pub fn new(program: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            program: program.into(),
            chunk_size,
        }
    }

    /// Start the archiver and return the concrete process handle
    pub fn spawn(&self, dir: &Path) -> Result<ProcessSource, ArchiveError> {
        let mut command = Command::new(&self.program);
        command.args(["-r", "-j", "-q", "-"]).arg(dir);

        let source = ProcessSource::spawn_with_ok_codes(command, self.chunk_size, ZIP_OK_CODES)
            .map_err(|source| ArchiveError::ProcessLaunch {
                program: self.program.display().to_string(),
                source,
            })?;
        debug!(pid = ?source.pid(), dir = %dir.display(), "archiver started");

        Ok(source)
    }
}

impl Archiver for ZipCommand {
    fn start(&self, dir: &Path) -> Result<Box<dyn ArchiveSource>, ArchiveError> {
        Ok(Box::new(self.spawn(dir)?))
    }
}
