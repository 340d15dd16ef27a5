// Read, create, save and delete documents on disk.
//
// The store trusts its caller: every path handed in has already been resolved
// by the sandbox.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fuzzy_common::document::{derive_name, disambiguate, is_variant_of, Document, DocumentFormat};
use tracing::{debug, warn};

use super::{StagingArea, StoreError, MAX_NAME_ATTEMPTS};

/// A decoded document together with the text it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded {
    pub document: Document,
    pub raw: String,
}

/// How a save may pick its destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveMode {
    /// Move the file when the title no longer matches its name.
    pub allow_rename: bool,
    /// Never overwrite: disambiguate the requested name instead.
    pub create: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub path: PathBuf,
    /// Set when the document ended up somewhere other than the requested path.
    pub renamed_from: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    format: DocumentFormat,
    staging: StagingArea,
}

impl DocumentStore {
    pub fn new(format: DocumentFormat, staging: StagingArea) -> Self {
        Self { format, staging }
    }

    pub fn read(&self, path: &Path) -> Result<Loaded, StoreError> {
        let metadata = fs::metadata(path).map_err(|e| StoreError::from_io(path, e))?;
        if metadata.is_dir() {
            return Err(StoreError::IsDirectory { path: path.into() });
        }

        let bytes = fs::read(path).map_err(|e| StoreError::from_io(path, e))?;
        let raw = decode_text(bytes);
        let document = self
            .format
            .decode(&raw)
            .map_err(|source| StoreError::Malformed { path: path.into(), source })?;
        Ok(Loaded { document, raw })
    }

    /// Create a new document in `dir`, named after its title.
    pub fn create(&self, dir: &Path, doc: &Document) -> Result<PathBuf, StoreError> {
        self.create_named(dir, &derive_name(&doc.title), doc)
    }

    /// Create a new document at `dir/base`, or `dir/base_N` for the first free
    /// `N`. Existing files are never touched.
    pub fn create_named(
        &self,
        dir: &Path,
        base: &str,
        doc: &Document,
    ) -> Result<PathBuf, StoreError> {
        self.format.validate(doc)?;
        let contents = self.format.encode(doc);
        let candidates =
            (0..MAX_NAME_ATTEMPTS).map(|attempt| dir.join(disambiguate(base, attempt)));

        let created = self
            .staging
            .create_first_free(candidates, contents.as_bytes())
            .map_err(|e| StoreError::from_io(dir, e))?
            .ok_or_else(|| StoreError::NameExhausted { dir: dir.into(), base: base.into() })?;
        debug!(path = %created.display(), "document created");
        Ok(created)
    }

    /// Write `doc` to `path`, possibly under a different name.
    ///
    /// A rename writes the new file first and removes the old one afterwards.
    /// The pair is not atomic: a crash in between leaves both files.
    pub fn save(
        &self,
        path: &Path,
        doc: &Document,
        mode: SaveMode,
    ) -> Result<SaveOutcome, StoreError> {
        self.format.validate(doc)?;

        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => {
                return Err(StoreError::IsDirectory { path: path.into() })
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::from_io(path, e)),
        }

        let (dir, current) = split_path(path)?;

        if mode.create {
            let created = self.create_named(dir, current, doc)?;
            let renamed_from = (created != path).then(|| path.to_path_buf());
            return Ok(SaveOutcome { path: created, renamed_from });
        }

        if mode.allow_rename {
            let canonical = derive_name(&doc.title);
            if !is_variant_of(current, &canonical) {
                let created = self.create_named(dir, &canonical, doc)?;
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(error) => {
                        warn!(
                            path = %path.display(),
                            %error,
                            "renamed document but failed to remove old file"
                        );
                    }
                }
                return Ok(SaveOutcome { path: created, renamed_from: Some(path.into()) });
            }
        }

        let contents = self.format.encode(doc);
        self.staging.replace(path, contents.as_bytes()).map_err(|e| StoreError::from_io(path, e))?;
        Ok(SaveOutcome { path: path.into(), renamed_from: None })
    }

    /// Remove a document. Directories are refused and left untouched.
    pub fn delete(&self, path: &Path) -> Result<(), StoreError> {
        let metadata = fs::metadata(path).map_err(|e| StoreError::from_io(path, e))?;
        if metadata.is_dir() {
            return Err(StoreError::IsDirectory { path: path.into() });
        }
        fs::remove_file(path).map_err(|e| StoreError::from_io(path, e))
    }
}

/// UTF-8 (BOM stripped), falling back to Latin-1 for legacy files.
fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => match text.strip_prefix('\u{FEFF}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        },
        Err(error) => error.into_bytes().into_iter().map(char::from).collect(),
    }
}

fn split_path(path: &Path) -> Result<(&Path, &str), StoreError> {
    let invalid = || StoreError::Io {
        path: path.into(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path has no usable file name"),
    };
    let dir = path.parent().ok_or_else(invalid)?;
    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    Ok((dir, name))
}
