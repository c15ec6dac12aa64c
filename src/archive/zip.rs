use anyhow::{Context, Result};
use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;
use zip::result::ZipError;

use super::{ArchiveBackend, Member, normalize_member_path};

/// Backend for wheels and zipped source distributions.
pub struct ZipBackend {
    archive: ZipArchive<File>,
    members: Vec<Member>,
}

impl ZipBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open archive at {:?}", path))?;
        let mut archive = ZipArchive::new(file).context("Failed to parse ZIP archive")?;

        let mut members = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;
            let path = normalize_member_path(entry.name());
            if path.is_empty() {
                continue;
            }
            members.push(Member {
                path,
                is_dir: entry.is_dir(),
            });
        }

        Ok(Self { archive, members })
    }
}

impl ArchiveBackend for ZipBackend {
    fn members(&self) -> &[Member] {
        &self.members
    }

    fn read_member(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut entry = match self.archive.by_name(path) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read member {}", path)),
        };
        let mut buffer = Vec::new();
        entry
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read member {}", path))?;
        Ok(Some(buffer))
    }

    fn extract_all(&mut self, dest: &Path) -> Result<()> {
        debug!("Extracting zip archive to {:?}...", dest);
        for i in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let entry_path = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    debug!("Skipping entry with invalid path: {}", entry.name());
                    continue;
                }
            };
            let full_path = dest.join(&entry_path);

            if entry.is_dir() {
                std::fs::create_dir_all(&full_path)?;
                continue;
            }
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut dest_file = File::create(&full_path)
                .with_context(|| format!("Failed to create {:?}", full_path))?;
            std::io::copy(&mut entry, &mut dest_file)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(&full_path, std::fs::Permissions::from_mode(mode))
                {
                    debug!("Failed to set permissions on {:?}: {}", full_path, e);
                }
            }
        }
        Ok(())
    }
}
