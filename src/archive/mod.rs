//! Read-only access to distribution archives.
//!
//! `Archive` is the single entry point; it picks a format-specific backend
//! from the file extension (tarballs for source distributions, zip for
//! wheels and zipped sdists) and exposes listing, pattern search, member
//! reads and extraction. A closed archive refuses every further read.

mod tar_gz;
mod zip;

use anyhow::Result as AnyResult;
use log::debug;
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{ExtractError, Result};

pub use tar_gz::TarGzBackend;
pub use zip::ZipBackend;

/// A single entry of an archive, with `/`-separated path and no trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub path: String,
    pub is_dir: bool,
}

/// Format-specific archive reader.
pub trait ArchiveBackend: Send {
    /// All entries, in archive order.
    fn members(&self) -> &[Member];

    /// Read one member. `Ok(None)` when there is no such file.
    fn read_member(&mut self, path: &str) -> AnyResult<Option<Vec<u8>>>;

    /// Unpack every entry below `dest`, skipping entries that would escape it.
    fn extract_all(&mut self, dest: &Path) -> AnyResult<()>;
}

/// What the archive carries, which decides the extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// Source tree driven by an embedded `setup.py`.
    SourceTree,
    /// Prebuilt wheel with a static metadata manifest.
    Wheel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    TarGz,
    Zip,
}

impl Format {
    fn detect(path: &Path) -> Option<(Format, ArchiveKind)> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some((Format::TarGz, ArchiveKind::SourceTree))
        } else if name.ends_with(".whl") {
            Some((Format::Zip, ArchiveKind::Wheel))
        } else if name.ends_with(".zip") {
            Some((Format::Zip, ArchiveKind::SourceTree))
        } else {
            None
        }
    }
}

impl ArchiveKind {
    /// Archive kind implied by the file name, if the format is supported.
    pub fn detect(path: &Path) -> Option<Self> {
        Format::detect(path).map(|(_, kind)| kind)
    }
}

pub struct Archive {
    path: PathBuf,
    kind: ArchiveKind,
    backend: Option<Box<dyn ArchiveBackend>>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Archive {
    #[tracing::instrument]
    pub fn open(path: &Path) -> Result<Self> {
        let (format, kind) = Format::detect(path).ok_or_else(|| ExtractError::ArchiveFormat {
            path: path.to_path_buf(),
            reason: "unrecognized file extension".to_string(),
        })?;

        let backend: AnyResult<Box<dyn ArchiveBackend>> = match format {
            Format::TarGz => TarGzBackend::open(path).map(|b| Box::new(b) as _),
            Format::Zip => ZipBackend::open(path).map(|b| Box::new(b) as _),
        };
        let backend = backend.map_err(|e| ExtractError::ArchiveFormat {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })?;

        debug!(
            "Opened {:?} as {:?} with {} members",
            path,
            kind,
            backend.members().len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            kind,
            backend: Some(backend),
        })
    }

    /// Release the underlying handle. Idempotent.
    pub fn close(&mut self) {
        if self.backend.take().is_some() {
            debug!("Closed {:?}", self.path);
        }
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    fn backend(&self) -> Result<&dyn ArchiveBackend> {
        self.backend
            .as_deref()
            .ok_or_else(|| ExtractError::ArchiveClosed(self.path.clone()))
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn ArchiveBackend>> {
        let path = self.path.clone();
        self.backend
            .as_mut()
            .ok_or(ExtractError::ArchiveClosed(path))
    }

    /// Paths of every entry, directories included.
    pub fn list_members(&self) -> Result<Vec<String>> {
        Ok(self
            .backend()?
            .members()
            .iter()
            .map(|m| m.path.clone())
            .collect())
    }

    /// First path component shared by every member, e.g. `spam-1.0` for a
    /// conventional sdist. Wheels usually have none.
    pub fn root_name(&self) -> Result<Option<String>> {
        Ok(common_root(self.backend()?.members()))
    }

    /// Files whose path matches `pattern`.
    ///
    /// With `restrict_to_subdir` the pattern sees the path below the root
    /// entry (`README.rst` rather than `spam-1.0/README.rst`) and members
    /// outside the root are ignored. Returned paths are always full paths.
    pub fn find(
        &self,
        pattern: &str,
        case_insensitive: bool,
        restrict_to_subdir: bool,
    ) -> Result<Vec<String>> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()?;
        let members = self.backend()?.members();
        let root = if restrict_to_subdir {
            common_root(members)
        } else {
            None
        };

        let found = members
            .iter()
            .filter(|m| !m.is_dir)
            .filter(|m| {
                let candidate = match &root {
                    Some(root) => match strip_root(&m.path, root) {
                        Some(rel) => rel,
                        None => return false,
                    },
                    None => m.path.as_str(),
                };
                re.is_match(candidate)
            })
            .map(|m| m.path.clone())
            .collect();
        Ok(found)
    }

    /// Directories (explicit or implied by member paths) whose full path
    /// matches `pattern`, sorted.
    pub fn find_directories(&self, pattern: &str) -> Result<Vec<String>> {
        let re = RegexBuilder::new(pattern).build()?;
        let mut dirs = BTreeSet::new();
        for member in self.backend()?.members() {
            if member.is_dir {
                dirs.insert(member.path.clone());
            }
            let mut parent = member.path.as_str();
            while let Some((head, _)) = parent.rsplit_once('/') {
                dirs.insert(head.to_string());
                parent = head;
            }
        }
        Ok(dirs.into_iter().filter(|d| re.is_match(d)).collect())
    }

    pub fn has_member_with_suffix<S: AsRef<str>>(&self, suffixes: &[S]) -> Result<bool> {
        Ok(self.backend()?.members().iter().any(|m| {
            suffixes
                .iter()
                .any(|suffix| m.path.ends_with(suffix.as_ref()))
        }))
    }

    /// First file whose path ends with `suffix`.
    pub fn find_member_with_suffix(&self, suffix: &str) -> Result<Option<String>> {
        Ok(self
            .backend()?
            .members()
            .iter()
            .find(|m| !m.is_dir && m.path.ends_with(suffix))
            .map(|m| m.path.clone()))
    }

    /// Read a member as UTF-8 text (lossy).
    pub fn read_member(&mut self, path: &str) -> Result<String> {
        let archive_path = self.path.clone();
        let bytes = self
            .backend_mut()?
            .read_member(path)
            .map_err(|e| ExtractError::ArchiveFormat {
                path: archive_path,
                reason: format!("{:#}", e),
            })?
            .ok_or_else(|| ExtractError::MemberNotFound(path.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Unpack everything into the caller-owned `dest`.
    #[tracing::instrument(skip(self))]
    pub fn extract_all(&mut self, dest: &Path) -> Result<()> {
        let archive_path = self.path.clone();
        self.backend_mut()?
            .extract_all(dest)
            .map_err(|e| ExtractError::ArchiveFormat {
                path: archive_path,
                reason: format!("{:#}", e),
            })
    }
}

fn common_root(members: &[Member]) -> Option<String> {
    let mut root: Option<&str> = None;
    let mut nested = false;
    for member in members {
        let (head, rest) = match member.path.split_once('/') {
            Some((head, rest)) => (head, Some(rest)),
            None => (member.path.as_str(), None),
        };
        if rest.is_some_and(|r| !r.is_empty()) {
            nested = true;
        } else if !member.is_dir {
            // a plain file at top level means there is no single root dir
            return None;
        }
        match root {
            Some(r) if r != head => return None,
            Some(_) => {}
            None => root = Some(head),
        }
    }
    if nested { root.map(String::from) } else { None }
}

fn strip_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    path.strip_prefix(root)?.strip_prefix('/')
}

/// Normalise an entry name: forward slashes, no leading `./`, no trailing `/`.
pub(crate) fn normalize_member_path(raw: &str) -> String {
    let path = raw.replace('\\', "/");
    let path = path.trim_start_matches("./");
    path.trim_end_matches('/').to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use tar::Builder;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    pub fn create_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let enc = GzEncoder::new(file, Compression::default());
        let mut tar = Builder::new(enc);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append(&header, content.as_bytes()).unwrap();
        }
        tar.into_inner().unwrap().finish().unwrap();
    }

    pub fn create_zip(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> = FileOptions::default();
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
}
