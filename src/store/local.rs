//! Directory-backed artifact store.
//!
//! Layout: `<root>/<name>/<tag>/` holds the packaged files plus a
//! `manifest.yaml` table of contents with per-file sha256 digests and the
//! push annotations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{ArtifactStore, MAX_FILE_SIZE, StoreError, check_entry_path, split_reference};

const MANIFEST_FILE: &str = "manifest.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    path: String,
    size: u64,
    digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    created_at: DateTime<Utc>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    files: Vec<ManifestEntry>,
}

pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn package_dir(&self, reference: &str) -> Result<PathBuf, StoreError> {
        let (name, tag) = split_reference(reference)?;
        Ok(self.root.join(name).join(tag))
    }

    fn read_manifest(&self, reference: &str) -> Result<Manifest, StoreError> {
        let path = self.package_dir(reference)?.join(MANIFEST_FILE);
        let contents = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::Remote(format!("reference {reference:?} not found"))
            } else {
                StoreError::Io(e)
            }
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| StoreError::Remote(format!("malformed manifest for {reference:?}: {e}")))
    }

    fn extract(
        &self,
        reference: &str,
        dst: &Path,
        mut want: impl FnMut(&str) -> bool,
    ) -> Result<Vec<String>, StoreError> {
        let manifest = self.read_manifest(reference)?;
        let package = self.package_dir(reference)?;

        let mut extracted = Vec::new();
        for entry in &manifest.files {
            if !want(&entry.path) {
                continue;
            }
            let rel = Path::new(&entry.path);
            check_entry_path(rel)?;
            if entry.size > MAX_FILE_SIZE {
                return Err(StoreError::TooLarge(format!(
                    "{} is {} bytes (cap {})",
                    entry.path, entry.size, MAX_FILE_SIZE
                )));
            }

            let target = dst.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
                sanitize_dir_permissions(parent)?;
            }
            fs::copy(package.join(rel), &target)?;
            sanitize_file_permissions(&target)?;
            extracted.push(entry.path.clone());
        }
        Ok(extracted)
    }
}

impl ArtifactStore for DirStore {
    fn push(
        &self,
        dir: &Path,
        reference: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let package = self.package_dir(reference)?;
        fs::create_dir_all(&package)?;

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
            check_entry_path(rel)?;

            let data = fs::read(entry.path())?;
            if data.len() as u64 > MAX_FILE_SIZE {
                return Err(StoreError::TooLarge(format!(
                    "{} is {} bytes (cap {})",
                    rel.display(),
                    data.len(),
                    MAX_FILE_SIZE
                )));
            }

            let target = package.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &data)?;

            files.push(ManifestEntry {
                path: rel.to_string_lossy().replace('\\', "/"),
                size: data.len() as u64,
                digest: format!("sha256:{:x}", Sha256::digest(&data)),
            });
        }

        let manifest = Manifest {
            created_at: Utc::now(),
            annotations: annotations.clone(),
            files,
        };
        let body = serde_yaml::to_string(&manifest)
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        fs::write(package.join(MANIFEST_FILE), body)?;
        tracing::debug!(reference, dir = %dir.display(), "pushed package");
        Ok(())
    }

    fn pull(&self, reference: &str, dst: &Path) -> Result<Vec<String>, StoreError> {
        self.extract(reference, dst, |_| true)
    }

    fn list_files(&self, reference: &str) -> Result<Vec<String>, StoreError> {
        let manifest = self.read_manifest(reference)?;
        let mut paths: Vec<String> = manifest.files.into_iter().map(|f| f.path).collect();
        paths.sort();
        Ok(paths)
    }

    fn pull_selective(
        &self,
        reference: &str,
        patterns: &[String],
        dst: &Path,
    ) -> Result<Vec<String>, StoreError> {
        let compiled: Vec<glob::Pattern> = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| StoreError::Remote(format!("bad glob pattern {p:?}: {e}")))
            })
            .collect::<Result<_, _>>()?;

        self.extract(reference, dst, |path| {
            compiled.iter().any(|pattern| pattern.matches(path))
        })
    }

    fn resolve_tags(&self) -> Result<Vec<String>, StoreError> {
        let mut refs = Vec::new();
        if !self.root.is_dir() {
            return Ok(refs);
        }
        for name_entry in fs::read_dir(&self.root)? {
            let name_entry = name_entry?;
            if !name_entry.path().is_dir() {
                continue;
            }
            let name = name_entry.file_name().to_string_lossy().into_owned();
            for tag_entry in fs::read_dir(name_entry.path())? {
                let tag_entry = tag_entry?;
                if tag_entry.path().join(MANIFEST_FILE).exists() {
                    refs.push(format!("{name}:{}", tag_entry.file_name().to_string_lossy()));
                }
            }
        }
        refs.sort();
        Ok(refs)
    }
}

#[cfg(unix)]
fn sanitize_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    Ok(())
}

#[cfg(unix)]
fn sanitize_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn sanitize_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(not(unix))]
fn sanitize_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}
