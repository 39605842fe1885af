use crate::error::PipelineError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Packaged frames ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveOutput {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Packs a frames directory into a flat, deflate-compressed zip
#[derive(Debug, Default, Clone, Copy)]
pub struct Archiver;

impl Archiver {
    /// Archive every file in `frames_dir` into `archive_path`
    #[instrument(skip(self), fields(frames_dir = %frames_dir.display(), archive = %archive_path.display()))]
    pub async fn archive(
        &self,
        frames_dir: &Path,
        archive_path: &Path,
    ) -> Result<ArchiveOutput, PipelineError> {
        let archive_path = archive_path.to_path_buf();
        info!("Creating frame archive");

        let source = frames_dir.to_path_buf();
        let target = archive_path.clone();
        let result = tokio::task::spawn_blocking(move || write_archive(&source, &target))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            .and_then(|inner| inner);

        match result {
            Ok(size_bytes) => {
                metrics::counter!("processor.archive.bytes").increment(size_bytes);
                info!(size_bytes = size_bytes, "Frame archive created");
                Ok(ArchiveOutput {
                    path: archive_path,
                    size_bytes,
                })
            }
            Err(e) => {
                error!(error = %e, "Failed to create frame archive");
                Err(PipelineError::ArchiveFailed {
                    frames_dir: frames_dir.to_path_buf(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Write the archive and return its size on disk
fn write_archive(frames_dir: &Path, archive_path: &Path) -> std::io::Result<u64> {
    let mut entries: Vec<(String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(frames_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, path) in &entries {
        zip.start_file(name.as_str(), options)?;
        let mut source = File::open(path)?;
        std::io::copy(&mut source, &mut zip)?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    drop(writer);

    Ok(std::fs::metadata(archive_path)?.len())
}
