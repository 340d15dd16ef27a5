// Staging area for atomic writes.
//
// Content is written and synced to a temp file inside the staging directory,
// then moved over the destination with a single rename. The staging directory
// must live on the same filesystem as the documents.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// The directory must already exist (see `security::ensure_private_dir`).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Atomically replace `target` with `contents`.
    pub fn replace(&self, target: &Path, contents: &[u8]) -> io::Result<()> {
        let staged = self.stage(contents)?;
        staged.persist(target).map_err(|e| e.error)?;
        Ok(())
    }

    /// Move `contents` to the first free candidate name. Never overwrites.
    ///
    /// Returns the path that was written, or `None` if every candidate already
    /// existed.
    pub fn create_first_free<I>(
        &self,
        candidates: I,
        contents: &[u8],
    ) -> io::Result<Option<PathBuf>>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut staged = self.stage(contents)?;
        for candidate in candidates {
            match staged.persist_noclobber(&candidate) {
                Ok(_) => return Ok(Some(candidate)),
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => staged = e.file,
                Err(e) => return Err(e.error),
            }
        }
        Ok(None)
    }

    fn stage(&self, contents: &[u8]) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        Ok(file)
    }
}
