//! On-disk layout of one job.

use std::path::{Path, PathBuf};

use crate::error::ReelResult;

/// Everything a job reads or writes lives under `<jobs_root>/<job_id>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub job_dir: PathBuf,
    pub input_dir: PathBuf,
    pub proxy_dir: PathBuf,
    pub frames_dir: PathBuf,
    pub output_dir: PathBuf,
    pub edl_path: PathBuf,
    pub status_path: PathBuf,
    pub job_path: PathBuf,
    pub tags_path: PathBuf,
    pub beats_path: PathBuf,
    pub song_segment_path: PathBuf,
}

impl JobPaths {
    pub fn new(jobs_root: &Path, job_id: &str) -> Self {
        let job_dir = jobs_root.join(job_id);
        Self {
            input_dir: job_dir.join("input"),
            proxy_dir: job_dir.join("proxy"),
            frames_dir: job_dir.join("frames"),
            output_dir: job_dir.join("output"),
            edl_path: job_dir.join("edl.json"),
            status_path: job_dir.join("status.json"),
            job_path: job_dir.join("job.json"),
            tags_path: job_dir.join("tags.json"),
            beats_path: job_dir.join("beats.json"),
            song_segment_path: job_dir.join("song_segment.json"),
            job_dir,
        }
    }

    pub fn proxy_path(&self, clip_id: &str) -> PathBuf {
        self.proxy_dir.join(format!("{clip_id}.mp4"))
    }

    /// Per-clip directory for sampled frames.
    pub fn clip_frames_dir(&self, clip_id: &str) -> PathBuf {
        self.frames_dir.join(clip_id)
    }
}

/// Create the job directory tree and return its paths.
pub async fn ensure_job_dirs(jobs_root: &Path, job_id: &str) -> ReelResult<JobPaths> {
    let paths = JobPaths::new(jobs_root, job_id);
    for dir in [
        &paths.job_dir,
        &paths.input_dir,
        &paths.proxy_dir,
        &paths.frames_dir,
        &paths.output_dir,
    ] {
        tokio::fs::create_dir_all(dir).await?;
    }
    Ok(paths)
}
