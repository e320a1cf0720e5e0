//! Local scratch space for rasters between generation and upload
//!
//! Every request gets its own file names derived from its [`ArtifactId`], so
//! concurrent requests never touch the same path. Files are removed when the
//! [`StagedArtifact`] guard is dropped, whatever the outcome of the request.

use crate::artifact::ArtifactId;
use crate::error::Result;
use std::io;
use std::path::{Path, PathBuf};

/// Directory holding in-flight rasters
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Open (creating if needed) the staging directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve the staging paths of one artifact.
    pub fn lease(&self, id: &ArtifactId) -> StagedArtifact {
        StagedArtifact {
            real: self.dir.join(format!("{id}_real.png")),
            preview: self.dir.join(format!("{id}_preview.png")),
        }
    }
}

/// Staging paths of one artifact, purged on drop
#[derive(Debug)]
pub struct StagedArtifact {
    real: PathBuf,
    preview: PathBuf,
}

impl StagedArtifact {
    /// Path of the real raster
    pub fn real_path(&self) -> &Path {
        &self.real
    }

    /// Path of the preview raster
    pub fn preview_path(&self) -> &Path {
        &self.preview
    }

    /// Remove both files. Files that were never written are skipped.
    pub fn purge(&self) -> io::Result<()> {
        let mut first_error = None;
        for path in [&self.real, &self.preview] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for StagedArtifact {
    fn drop(&mut self) {
        if let Err(err) = self.purge() {
            tracing::debug!(path = %self.real.display(), error = %err, "Staging cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn lease_paths_are_scoped_to_the_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::open(tmp.path().join("temp")).unwrap();
        let id = ArtifactId::allocate();
        let staged = area.lease(&id);

        assert!(staged.real_path().ends_with(format!("{id}_real.png")));
        assert!(staged.preview_path().ends_with(format!("{id}_preview.png")));
        assert_ne!(
            area.lease(&ArtifactId::allocate()).real_path(),
            staged.real_path()
        );
    }

    #[test]
    fn drop_removes_written_files() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::open(tmp.path()).unwrap();
        {
            let staged = area.lease(&ArtifactId::allocate());
            std::fs::write(staged.real_path(), b"real").unwrap();
            std::fs::write(staged.preview_path(), b"preview").unwrap();
            assert_eq!(entries(area.dir()), 2);
        }
        assert_eq!(entries(area.dir()), 0);
    }

    #[test]
    fn shared_lease_is_purged_by_the_last_holder() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::open(tmp.path()).unwrap();
        let staged = std::sync::Arc::new(area.lease(&ArtifactId::allocate()));
        let writer = std::sync::Arc::clone(&staged);
        drop(staged);

        std::thread::spawn(move || {
            std::fs::write(writer.real_path(), b"real").unwrap();
            std::fs::write(writer.preview_path(), b"preview").unwrap();
            assert_eq!(entries(writer.real_path().parent().unwrap()), 2);
        })
        .join()
        .unwrap();

        assert_eq!(entries(area.dir()), 0);
    }

    #[test]
    fn purge_tolerates_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::open(tmp.path()).unwrap();
        let staged = area.lease(&ArtifactId::allocate());
        std::fs::write(staged.real_path(), b"real").unwrap();

        assert!(staged.purge().is_ok());
        assert!(staged.purge().is_ok());
        assert_eq!(entries(area.dir()), 0);
    }
}
