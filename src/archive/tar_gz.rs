use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, warn};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive as TarArchive;

use super::{ArchiveBackend, Member, normalize_member_path};

/// Backend for `.tar.gz` / `.tgz` source distributions.
///
/// Tar has no index, so the member list is collected once on open and the
/// file is re-streamed for reads and extraction.
pub struct TarGzBackend {
    path: PathBuf,
    members: Vec<Member>,
}

impl TarGzBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let mut members = Vec::new();
        let mut archive = Self::stream(path)?;
        for entry in archive.entries().context("Failed to read tar entries")? {
            let entry = entry.context("Failed to read tar entry")?;
            let raw = entry.path().context("Invalid path in tar entry")?;
            let path = normalize_member_path(&raw.to_string_lossy());
            if path.is_empty() {
                continue;
            }
            members.push(Member {
                path,
                is_dir: entry.header().entry_type().is_dir(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            members,
        })
    }

    fn stream(path: &Path) -> Result<TarArchive<GzDecoder<File>>> {
        let file =
            File::open(path).with_context(|| format!("Failed to open archive at {:?}", path))?;
        Ok(TarArchive::new(GzDecoder::new(file)))
    }
}

impl ArchiveBackend for TarGzBackend {
    fn members(&self) -> &[Member] {
        &self.members
    }

    fn read_member(&mut self, wanted: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = Self::stream(&self.path)?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = normalize_member_path(&entry.path()?.to_string_lossy());
            if path == wanted && !entry.header().entry_type().is_dir() {
                let mut buffer = Vec::new();
                entry
                    .read_to_end(&mut buffer)
                    .with_context(|| format!("Failed to read member {}", wanted))?;
                return Ok(Some(buffer));
            }
        }
        Ok(None)
    }

    fn extract_all(&mut self, dest: &Path) -> Result<()> {
        debug!("Extracting tar archive {:?} to {:?}...", self.path, dest);
        let mut archive = Self::stream(&self.path)?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_path_buf();
            // unpack_in refuses entries that would land outside dest
            if !entry
                .unpack_in(dest)
                .with_context(|| format!("Failed to extract {:?}", path))?
            {
                warn!("Skipping entry outside extraction dir: {:?}", path);
            }
        }
        Ok(())
    }
}
