use crate::config::TranscoderConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

/// Number of stderr bytes kept when the transcoder fails
const STDERR_TAIL_BYTES: usize = 2048;

/// Samples frames from a local video into an output directory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Write sampled frames into `output_dir` and return how many were produced
    async fn extract_frames(&self, input: &Path, output_dir: &Path) -> Result<usize, PipelineError>;
}

/// Frame sampler backed by an ffmpeg executable
///
/// Invocation shape: `<binary> -i <input> -vf fps=<n> <output_dir>/<pattern>`
pub struct FfmpegSampler {
    binary: PathBuf,
    fps: u32,
    frame_pattern: String,
}

impl FfmpegSampler {
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            fps: config.fps,
            frame_pattern: config.frame_pattern.clone(),
        }
    }

    /// Arguments passed to the transcoder
    pub fn args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.display().to_string(),
            "-vf".to_string(),
            format!("fps={}", self.fps),
            output_dir.join(&self.frame_pattern).display().to_string(),
        ]
    }
}

#[async_trait]
impl FrameSampler for FfmpegSampler {
    #[instrument(skip(self), fields(binary = %self.binary.display()))]
    async fn extract_frames(&self, input: &Path, output_dir: &Path) -> Result<usize, PipelineError> {
        let args = self.args(input, output_dir);
        debug!(args = ?args, "Running transcoder");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PipelineError::ExtractionFailed {
                input: input.to_path_buf(),
                message: format!("failed to spawn {}: {}", self.binary.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let tail = stderr
                .get(tail_start..)
                .unwrap_or_default()
                .trim()
                .to_string();

            error!(status = %output.status, stderr = %tail, "Transcoder exited with failure");

            return Err(PipelineError::ExtractionFailed {
                input: input.to_path_buf(),
                message: format!("transcoder exited with {}: {}", output.status, tail),
            });
        }

        count_frames(output_dir).await
    }
}

/// Count the files in `dir`; a missing directory counts as zero
pub async fn count_frames(dir: &Path) -> Result<usize, PipelineError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "Frames directory missing after extraction");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            count += 1;
        }
    }

    Ok(count)
}

/// Frames produced for one job
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrames {
    pub frames_dir: PathBuf,
    pub frame_count: usize,
}

/// Prepares a fresh frames directory and drives the sampler
pub struct FrameExtractor {
    sampler: Arc<dyn FrameSampler>,
}

impl FrameExtractor {
    pub fn new(sampler: Arc<dyn FrameSampler>) -> Self {
        Self { sampler }
    }

    /// Extract frames from `local_video` into an emptied `frames_dir`
    #[instrument(skip(self), fields(local_video = %local_video.display(), frames_dir = %frames_dir.display()))]
    pub async fn extract(
        &self,
        local_video: &Path,
        frames_dir: &Path,
    ) -> Result<ExtractedFrames, PipelineError> {
        let frames_dir = frames_dir.to_path_buf();

        // Leftovers from an earlier delivery of the same key would inflate the count
        match tokio::fs::remove_dir_all(&frames_dir).await {
            Ok(()) => debug!(dir = %frames_dir.display(), "Removed stale frames directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&frames_dir).await?;

        let frame_count = self.sampler.extract_frames(local_video, &frames_dir).await?;

        metrics::counter!("processor.frames.extracted").increment(frame_count as u64);
        info!(frame_count = frame_count, "Frames extracted");

        Ok(ExtractedFrames {
            frames_dir,
            frame_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_parser::JobKey;
    use crate::workspace::JobWorkspace;

    fn sampler_config(binary: &str) -> TranscoderConfig {
        TranscoderConfig {
            binary: PathBuf::from(binary),
            ..Default::default()
        }
    }

    #[test]
    fn test_ffmpeg_args_shape() {
        let sampler = FfmpegSampler::new(&sampler_config("/opt/bin/ffmpeg"));
        let args = sampler.args(Path::new("/tmp/v_1.mp4"), Path::new("/tmp/frames_v_1"));

        assert_eq!(
            args,
            vec![
                "-i",
                "/tmp/v_1.mp4",
                "-vf",
                "fps=1",
                "/tmp/frames_v_1/frame_%04d.jpg"
            ]
        );
    }

    #[tokio::test]
    async fn test_count_frames_missing_dir_is_zero() {
        let scratch = tempfile::tempdir().unwrap();
        let count = count_frames(&scratch.path().join("absent")).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_extract_recreates_directory_and_reports_count() {
        let scratch = tempfile::tempdir().unwrap();
        let job_key = JobKey::parse("video1.1700000000000.mp4").unwrap();
        let workspace = JobWorkspace::new(scratch.path(), &job_key);

        // Stale frame from an earlier run
        let stale_dir = workspace.frames_dir().to_path_buf();
        std::fs::create_dir_all(&stale_dir).unwrap();
        std::fs::write(stale_dir.join("frame_9999.jpg"), b"old").unwrap();

        let mut sampler = MockFrameSampler::new();
        sampler.expect_extract_frames().returning(|_, output_dir| {
            assert_eq!(std::fs::read_dir(output_dir).unwrap().count(), 0);
            for i in 1..=4 {
                std::fs::write(output_dir.join(format!("frame_{:04}.jpg", i)), b"jpg").unwrap();
            }
            Ok(4)
        });

        let extractor = FrameExtractor::new(Arc::new(sampler));
        let extracted = extractor
            .extract(workspace.video_path(), workspace.frames_dir())
            .await
            .unwrap();

        assert_eq!(extracted.frames_dir, stale_dir);
        assert_eq!(extracted.frame_count, 4);
        assert!(!stale_dir.join("frame_9999.jpg").exists());
    }

    #[tokio::test]
    async fn test_extract_propagates_sampler_failure() {
        let scratch = tempfile::tempdir().unwrap();

        let mut sampler = MockFrameSampler::new();
        sampler.expect_extract_frames().returning(|input, _| {
            Err(PipelineError::ExtractionFailed {
                input: input.to_path_buf(),
                message: "exit status: 1".to_string(),
            })
        });

        let extractor = FrameExtractor::new(Arc::new(sampler));
        let result = extractor
            .extract(Path::new("/missing.mp4"), &scratch.path().join("frames_video1_1"))
            .await;
        assert!(matches!(result, Err(PipelineError::ExtractionFailed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ffmpeg_sampler_runs_binary_and_counts_output() {
        use std::os::unix::fs::PermissionsExt;

        let scratch = tempfile::tempdir().unwrap();
        let script = scratch.path().join("fake-ffmpeg");
        // Writes three frames next to the output pattern (last argument)
        std::fs::write(
            &script,
            "#!/bin/sh\nfor last; do :; done\ndir=$(dirname \"$last\")\nfor i in 1 2 3; do echo x > \"$dir/frame_000$i.jpg\"; done\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let frames_dir = scratch.path().join("frames");
        std::fs::create_dir_all(&frames_dir).unwrap();

        let sampler = FfmpegSampler::new(&sampler_config(script.to_str().unwrap()));
        let count = sampler
            .extract_frames(Path::new("input.mp4"), &frames_dir)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ffmpeg_sampler_non_zero_exit_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let scratch = tempfile::tempdir().unwrap();
        let script = scratch.path().join("failing-ffmpeg");
        std::fs::write(&script, "#!/bin/sh\necho 'Invalid data found' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let sampler = FfmpegSampler::new(&sampler_config(script.to_str().unwrap()));
        match sampler
            .extract_frames(Path::new("input.mp4"), scratch.path())
            .await
        {
            Err(PipelineError::ExtractionFailed { message, .. }) => {
                assert!(message.contains("Invalid data found"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
