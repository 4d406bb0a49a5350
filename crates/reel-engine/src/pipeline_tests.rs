//! Tests for the job state machine, driven through in-memory collaborators

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::audio::{BeatDetector, BeatGrid, BeatSlice, SongSegment};
    use crate::edl::{total_duration, Edl};
    use crate::error::{ReelError, ReelResult};
    use crate::fallback;
    use crate::media::{ClipInput, MediaTools, MonoAudio, ProxyClip, RenderArtifacts, RenderRequest, Renderer};
    use crate::pipeline::{plan_timeline, AnalyzeOutcome, JobRequest, JobRunner, TimelineSource};
    use crate::settings::JobSettings;
    use crate::status::{JobState, JobStep};
    use crate::tagging::FrameTagger;
    use crate::tags::{FrameTagStore, ShotType, TagRecord};

    const FAKE_SAMPLE_RATE: u32 = 1_000;

    #[derive(Debug, Clone, Copy, Default)]
    struct Faults {
        tagging: bool,
        beats: bool,
        decode: bool,
        render: bool,
    }

    struct FakeMedia {
        durations: HashMap<String, f64>,
        song_duration: f64,
        fail_decode: bool,
    }

    #[async_trait]
    impl MediaTools for FakeMedia {
        async fn make_proxy(&self, _clip: &ClipInput, output: &Path, _include_audio: bool) -> ReelResult<()> {
            tokio::fs::write(output, b"proxy").await?;
            Ok(())
        }

        async fn probe_duration(&self, path: &Path) -> ReelResult<f64> {
            let clip_id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            self.durations
                .get(&clip_id)
                .copied()
                .ok_or_else(|| ReelError::tool("ffprobe", format!("unknown proxy {clip_id}")))
        }

        async fn extract_frames(&self, proxy: &Path, out_dir: &Path) -> ReelResult<Vec<PathBuf>> {
            let duration = self.probe_duration(proxy).await?;
            tokio::fs::create_dir_all(out_dir).await?;
            let mut frames = Vec::new();
            for i in 0..duration.floor() as usize {
                let frame = out_dir.join(format!("frame_{:05}.jpg", i + 1));
                tokio::fs::write(&frame, b"jpg").await?;
                frames.push(frame);
            }
            Ok(frames)
        }

        async fn decode_mono(&self, _song: &Path, _sample_rate: u32) -> ReelResult<MonoAudio> {
            if self.fail_decode {
                return Err(ReelError::tool("ffmpeg", "Invalid data found when processing input"));
            }
            let len = (self.song_duration * FAKE_SAMPLE_RATE as f64) as usize;
            Ok(MonoAudio {
                samples: vec![0.0; len],
                sample_rate: FAKE_SAMPLE_RATE,
            })
        }
    }

    struct FakeTagger {
        fail: bool,
    }

    #[async_trait]
    impl FrameTagger for FakeTagger {
        async fn tag_frame(&self, _frame: &Path) -> ReelResult<TagRecord> {
            if self.fail {
                return Err(ReelError::tool("captioner", "model unavailable"));
            }
            Ok(TagRecord {
                scene: "friends dancing".to_string(),
                tags: vec!["dancing".to_string(), "friends".to_string()],
                shot_type: ShotType::Other,
                energy: 7,
                highlight: 9,
                people: 3,
                brightness: 0.5,
                ai_used: true,
            })
        }
    }

    struct FakeBeats {
        fail: bool,
    }

    #[async_trait]
    impl BeatDetector for FakeBeats {
        async fn detect(&self, _song: &Path, _audio: &MonoAudio) -> ReelResult<BeatGrid> {
            if self.fail {
                return Err(ReelError::tool("beat-track", "exit status 2"));
            }
            Ok(BeatGrid {
                tempo: 120.0,
                beats: (0..60).map(|i| i as f64 * 0.5).collect(),
                downbeats: (0..15).map(|i| i as f64 * 2.0).collect(),
            })
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, request: &RenderRequest<'_>) -> ReelResult<RenderArtifacts> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ReelError::tool("ffmpeg", "boom"));
            }
            let final_path = request.output_dir.join("final.mp4");
            let preview_path = request.output_dir.join("preview.mp4");
            tokio::fs::write(&final_path, b"final").await?;
            tokio::fs::write(&preview_path, b"preview").await?;
            Ok(RenderArtifacts {
                final_path,
                preview_path,
            })
        }
    }

    struct Harness {
        dir: TempDir,
        runner: JobRunner,
        renderer: Arc<FakeRenderer>,
        request: JobRequest,
    }

    impl Harness {
        fn jobs_root(&self) -> PathBuf {
            self.dir.path().join("jobs")
        }
    }

    fn harness(durations: &[f64], settings: JobSettings, faults: Faults) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();

        let mut clips = Vec::new();
        let mut by_id = HashMap::new();
        for (i, duration) in durations.iter().enumerate() {
            let path = uploads.join(format!("IMG_{:04}.MOV", i + 1));
            std::fs::write(&path, b"clip").unwrap();
            clips.push(path);
            by_id.insert(format!("c{}", i + 1), *duration);
        }
        let song = uploads.join("track.mp3");
        std::fs::write(&song, b"song").unwrap();

        let renderer = Arc::new(FakeRenderer {
            fail: faults.render,
            ..Default::default()
        });
        let runner = JobRunner::new(
            dir.path().join("jobs"),
            Arc::new(FakeMedia {
                durations: by_id,
                song_duration: 30.0,
                fail_decode: faults.decode,
            }),
            renderer.clone(),
            Arc::new(FakeTagger { fail: faults.tagging }),
            Arc::new(FakeBeats { fail: faults.beats }),
        );

        Harness {
            dir,
            runner,
            renderer,
            request: JobRequest {
                clips,
                song,
                settings,
            },
        }
    }

    fn seeded(target: f64) -> JobSettings {
        JobSettings {
            target_length_s: target,
            seed: Some(42),
            ..Default::default()
        }
    }

    fn proxies(h: &Harness, job_id: &str, durations: &[f64]) -> Vec<ProxyClip> {
        let paths = h.runner.paths(job_id);
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let id = format!("c{}", i + 1);
                ProxyClip::new(&id, paths.proxy_path(&id), *d)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let h = harness(&[8.0; 5], seeded(9.0), Faults::default());
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        assert_eq!(
            manifest.clips.iter().map(|c| c.clip_id.as_str()).collect::<Vec<_>>(),
            vec!["c1", "c2", "c3", "c4", "c5"]
        );
        assert_eq!(manifest.clips[0].original_name, "IMG_0001.MOV");

        let queued = h.runner.status(&manifest.job_id).await.unwrap().unwrap();
        assert_eq!(queued.status, JobState::Queued);

        let artifacts = h.runner.run(&manifest).await.unwrap();
        let paths = h.runner.paths(&manifest.job_id);
        assert!(artifacts.final_path.exists());
        assert!(artifacts.preview.exists());
        assert_eq!(artifacts.edl, paths.edl_path);

        let status = h.runner.status(&manifest.job_id).await.unwrap().unwrap();
        assert_eq!(status.status, JobState::Complete);
        assert_eq!(status.step, JobStep::Done);
        assert_eq!(status.progress, 1.0);
        assert_eq!(status.artifacts, Some(artifacts));

        let edl = Edl::read(&paths.edl_path).await.unwrap();
        assert_eq!(edl.settings.seed, 42);
        assert!((edl.total_duration() - 9.0).abs() <= 0.05);
        assert!(paths.tags_path.exists());

        let song: SongSegment =
            serde_json::from_str(&std::fs::read_to_string(&paths.song_segment_path).unwrap()).unwrap();
        assert_eq!((song.start_s, song.end_s, song.loop_audio), (0.0, 9.0, false));

        let beats: BeatSlice =
            serde_json::from_str(&std::fs::read_to_string(&paths.beats_path).unwrap()).unwrap();
        assert_eq!(beats.beats.len(), 19);
        assert_eq!(beats.downbeats, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tagging_failure_degrades_to_fallback() {
        let durations = [5.0, 5.0, 5.0];
        let h = harness(
            &durations,
            seeded(15.0),
            Faults {
                tagging: true,
                ..Default::default()
            },
        );
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        h.runner.run(&manifest).await.unwrap();

        let paths = h.runner.paths(&manifest.job_id);
        let status = h.runner.status(&manifest.job_id).await.unwrap().unwrap();
        assert_eq!(status.status, JobState::Complete);
        assert!(!paths.tags_path.exists());

        let settings = seeded(15.0);
        let expected = fallback::generate(&proxies(&h, &manifest.job_id, &durations), &settings, 42).unwrap();
        let edl = Edl::read(&paths.edl_path).await.unwrap();
        assert_eq!(edl.timeline, Edl::new(&settings, 42, expected).timeline);
        assert!((edl.total_duration() - 15.0).abs() <= 0.05);
    }

    #[tokio::test]
    async fn test_degraded_analyze_is_reported_in_status() {
        let durations = [3.0, 3.0];
        let h = harness(
            &durations,
            seeded(5.0),
            Faults {
                tagging: true,
                ..Default::default()
            },
        );
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        let paths = h.runner.paths(&manifest.job_id);
        let proxies = h.runner.preprocess(&manifest, &paths).await.unwrap();

        let outcome = h.runner.analyze_step(&manifest.job_id, &proxies, &paths).await.unwrap();
        assert!(matches!(outcome, AnalyzeOutcome::Degraded { .. }));

        let status = h.runner.status(&manifest.job_id).await.unwrap().unwrap();
        assert_eq!(status.status, JobState::Running);
        assert_eq!(status.step, JobStep::Analyze);
        assert!(status.message.contains("fallback timeline"), "{}", status.message);
        assert!(status.message.contains("model unavailable"), "{}", status.message);
    }

    #[tokio::test]
    async fn test_healthy_analyze_keeps_plain_status() {
        let h = harness(&[3.0, 3.0], seeded(5.0), Faults::default());
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        let paths = h.runner.paths(&manifest.job_id);
        let proxies = h.runner.preprocess(&manifest, &paths).await.unwrap();

        let outcome = h.runner.analyze_step(&manifest.job_id, &proxies, &paths).await.unwrap();
        assert!(matches!(outcome, AnalyzeOutcome::Tagged(_)));

        let status = h.runner.status(&manifest.job_id).await.unwrap().unwrap();
        assert_eq!(status.step, JobStep::Analyze);
        assert_eq!(status.message, "Tagging frames");
    }

    #[tokio::test]
    async fn test_render_failure_is_terminal() {
        let h = harness(
            &[6.0, 6.0],
            seeded(5.0),
            Faults {
                render: true,
                ..Default::default()
            },
        );
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        let err = h.runner.run(&manifest).await.unwrap_err();
        assert!(matches!(err, ReelError::ExternalTool { .. }));

        let status = h.runner.status(&manifest.job_id).await.unwrap().unwrap();
        assert_eq!(status.status, JobState::Error);
        assert_eq!(status.step, JobStep::Failed);
        assert_eq!(status.progress, 1.0);
        assert!(status.message.contains("boom"));
        assert!(status.artifacts.is_none());
    }

    #[tokio::test]
    async fn test_song_decode_failure_is_terminal() {
        let h = harness(
            &[6.0, 6.0],
            seeded(5.0),
            Faults {
                decode: true,
                ..Default::default()
            },
        );
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        assert!(h.runner.run(&manifest).await.is_err());

        let status = h.runner.status(&manifest.job_id).await.unwrap().unwrap();
        assert_eq!(status.status, JobState::Error);
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_beat_failure_only_disables_snapping() {
        let h = harness(
            &[6.0, 6.0],
            seeded(5.0),
            Faults {
                beats: true,
                ..Default::default()
            },
        );
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        h.runner.run(&manifest).await.unwrap();

        let paths = h.runner.paths(&manifest.job_id);
        assert!(paths.song_segment_path.exists());
        assert!(!paths.beats_path.exists());
    }

    #[tokio::test]
    async fn test_zero_duration_clips_fail_at_edl() {
        let h = harness(&[0.0, 0.0], seeded(5.0), Faults::default());
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        let err = h.runner.run(&manifest).await.unwrap_err();
        assert!(matches!(err, ReelError::NoCandidates(_)));

        let status = h.runner.status(&manifest.job_id).await.unwrap().unwrap();
        assert_eq!(status.status, JobState::Error);
        assert!(status.message.contains("No candidate windows"));
        assert!(!h.runner.paths(&manifest.job_id).edl_path.exists());
    }

    #[tokio::test]
    async fn test_spawned_job_completes() {
        let h = harness(&[4.0, 4.0, 4.0, 4.0], seeded(6.0), Faults::default());
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        let job_id = manifest.job_id.clone();

        let artifacts = h.runner.spawn(manifest).await.unwrap().unwrap();
        assert!(artifacts.final_path.exists());
        let status = h.runner.status(&job_id).await.unwrap().unwrap();
        assert!(status.is_terminal());
    }

    #[tokio::test]
    async fn test_replan_reproduces_recorded_edl() {
        let mut settings = seeded(10.0);
        settings.seed = None;
        let h = harness(&[8.0; 5], settings, Faults::default());
        let manifest = h.runner.create_job(h.request.clone()).await.unwrap();
        h.runner.run(&manifest).await.unwrap();

        let recorded = Edl::read(&h.runner.paths(&manifest.job_id).edl_path).await.unwrap();
        let replanned = h.runner.replan(&manifest.job_id, None).await.unwrap();
        assert_eq!(replanned, recorded);

        let reseeded = h.runner.replan(&manifest.job_id, Some(7)).await.unwrap();
        assert_eq!(reseeded.settings.seed, 7);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_create_jobs() {
        let h = harness(&[4.0, 4.0], seeded(5.0), Faults::default());

        let mut empty = h.request.clone();
        empty.clips.clear();
        assert!(matches!(h.runner.create_job(empty).await, Err(ReelError::Validation(_))));

        let mut wrong_type = h.request.clone();
        let text = h.dir.path().join("notes.txt");
        std::fs::write(&text, b"x").unwrap();
        wrong_type.clips.push(text);
        assert!(matches!(h.runner.create_job(wrong_type).await, Err(ReelError::Validation(_))));

        let mut missing = h.request.clone();
        missing.clips.push(h.dir.path().join("gone.mp4"));
        assert!(matches!(h.runner.create_job(missing).await, Err(ReelError::Validation(_))));

        let mut too_many = h.request.clone();
        too_many.clips = vec![h.request.clips[0].clone(); 21];
        assert!(matches!(h.runner.create_job(too_many).await, Err(ReelError::Validation(_))));

        let mut bad_song = h.request.clone();
        bad_song.song = h.request.clips[0].clone();
        assert!(matches!(h.runner.create_job(bad_song).await, Err(ReelError::Validation(_))));

        let mut locked = h.request.clone();
        locked.settings.locked_clips = vec!["c9".to_string()];
        assert!(matches!(h.runner.create_job(locked).await, Err(ReelError::Validation(_))));

        assert!(!h.jobs_root().exists());
    }

    #[test]
    fn test_empty_tag_store_uses_fallback() {
        let clips = vec![ProxyClip::new("c1", "/p/c1.mp4", 4.0), ProxyClip::new("c2", "/p/c2.mp4", 4.0)];
        let settings = seeded(5.0);

        let (timeline, source) =
            plan_timeline(&clips, &AnalyzeOutcome::Tagged(FrameTagStore::new()), &settings, 42).unwrap();
        assert_eq!(source, TimelineSource::Fallback);
        assert_eq!(timeline, fallback::generate(&clips, &settings, 42).unwrap());

        let (_, source) = plan_timeline(
            &clips,
            &AnalyzeOutcome::Degraded {
                reason: "offline".to_string(),
            },
            &settings,
            42,
        )
        .unwrap();
        assert_eq!(source, TimelineSource::Fallback);
        assert!(total_duration(&timeline) > 4.9);
    }
}
