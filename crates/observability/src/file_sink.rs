//! JSONL file sink.
//!
//! Each event is collected in a [`PendingLine`] and written to the file with
//! a single `write_all` when the line is dropped, so lines from concurrent
//! threads never interleave.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// `~/.feedkit/logs/client.jsonl`, or `None` without a home directory.
pub fn default_log_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".feedkit/logs/client.jsonl"))
}

#[derive(Clone)]
pub struct JsonlFile {
    path: Arc<PathBuf>,
    file: Arc<Mutex<File>>,
}

impl JsonlFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(Self {
            path: Arc::new(path.to_path_buf()),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One event's bytes, flushed on drop.
pub struct PendingLine {
    buf: Vec<u8>,
    file: Arc<Mutex<File>>,
}

impl Write for PendingLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PendingLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        // Nowhere to report a failed log write.
        let _ = self.file.lock().write_all(&self.buf);
    }
}

impl<'a> MakeWriter<'a> for JsonlFile {
    type Writer = PendingLine;

    fn make_writer(&'a self) -> Self::Writer {
        PendingLine {
            buf: Vec::with_capacity(256),
            file: self.file.clone(),
        }
    }
}
