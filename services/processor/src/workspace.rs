use crate::key_parser::JobKey;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Local artifacts of one job, removed when the guard is dropped
///
/// Covers the downloaded video, the frames directory and the archive, so every
/// exit path (success, early return, error) releases scratch space.
#[derive(Debug)]
pub struct JobWorkspace {
    video_path: PathBuf,
    frames_dir: PathBuf,
    archive_path: PathBuf,
}

impl JobWorkspace {
    pub fn new(scratch_dir: &Path, job_key: &JobKey) -> Self {
        Self {
            video_path: scratch_dir.join(job_key.local_video_name()),
            frames_dir: scratch_dir.join(job_key.frames_dir_name()),
            archive_path: scratch_dir.join(job_key.archive_name()),
        }
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Remove every artifact that exists
    pub fn cleanup(&self) {
        remove(&self.video_path, |p| std::fs::remove_file(p));
        remove(&self.frames_dir, |p| std::fs::remove_dir_all(p));
        remove(&self.archive_path, |p| std::fs::remove_file(p));
    }
}

fn remove(path: &Path, op: fn(&Path) -> std::io::Result<()>) {
    match op(path) {
        Ok(()) => debug!(path = %path.display(), "Removed scratch artifact"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch artifact"),
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_all_artifacts() {
        let scratch = tempfile::tempdir().unwrap();
        let job_key = JobKey::parse("video1.1700000000000.mp4").unwrap();

        let (video, frames, archive) = {
            let workspace = JobWorkspace::new(scratch.path(), &job_key);
            std::fs::write(workspace.video_path(), b"video").unwrap();
            std::fs::create_dir_all(workspace.frames_dir()).unwrap();
            std::fs::write(workspace.frames_dir().join("frame_0001.jpg"), b"jpg").unwrap();
            std::fs::write(workspace.archive_path(), b"zip").unwrap();
            (
                workspace.video_path().to_path_buf(),
                workspace.frames_dir().to_path_buf(),
                workspace.archive_path().to_path_buf(),
            )
        };

        assert!(!video.exists());
        assert!(!frames.exists());
        assert!(!archive.exists());
    }

    #[test]
    fn test_cleanup_tolerates_missing_artifacts() {
        let scratch = tempfile::tempdir().unwrap();
        let job_key = JobKey::parse("a.b.c").unwrap();
        let workspace = JobWorkspace::new(scratch.path(), &job_key);
        workspace.cleanup();
        assert_eq!(workspace.video_path(), scratch.path().join("a_b.c"));
    }
}
