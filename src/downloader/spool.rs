// Temporary store for providers that can only "save to a location"
//
// A `SpoolFile` owns a private temp directory. The directory is removed
// exactly once: when the last owner (the spool itself, or the byte stream
// it was turned into) is dropped.

use std::io;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tempfile::TempDir;
use tokio_util::io::ReaderStream;

use super::models::ByteStream;

const SPOOL_PREFIX: &str = "mp3rapide-";
const READ_CHUNK: usize = 16 * 1024;

pub struct SpoolFile {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl SpoolFile {
    /// Create an empty spool under the system temp dir
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(SPOOL_PREFIX).tempdir()?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> Self {
        let path = dir.path().join("audio");
        Self {
            dir: Some(dir),
            path,
        }
    }

    /// Directory a tool may write into
    pub fn dir(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => self.path.parent().unwrap_or(&self.path),
        }
    }

    /// File the bytes are read back from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point the spool at the file a tool actually produced
    ///
    /// Tools like yt-dlp pick the extension themselves, so the first regular
    /// file in the directory is taken.
    pub fn locate_output(&mut self) -> io::Result<&Path> {
        let found = std::fs::read_dir(self.dir())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && !is_partial(p))
            .min();

        match found {
            Some(path) => {
                self.path = path;
                Ok(&self.path)
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no output file in {}", self.dir().display()),
            )),
        }
    }

    /// Stream the spooled bytes; the spool is removed when the stream drops
    pub async fn into_stream(self) -> io::Result<ByteStream> {
        let file = tokio::fs::File::open(&self.path).await?;
        let reader = ReaderStream::with_capacity(file, READ_CHUNK);

        Ok(stream::unfold((reader, self), |(mut reader, spool)| async move {
            reader.next().await.map(|item| (item, (reader, spool)))
        })
        .boxed())
    }
}

fn is_partial(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("part" | "ytdl" | "tmp")
    )
}

impl Drop for SpoolFile {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let shown = dir.path().display().to_string();
            match dir.close() {
                Ok(()) => tracing::debug!(spool = %shown, "removed spooled audio"),
                Err(e) => tracing::warn!(spool = %shown, error = %e, "failed to remove spooled audio"),
            }
        }
    }
}
