use async_trait::async_trait;
use clip_relay_core::error::JobPhase;
use clip_relay_core::job::MediaFile;
use clip_relay_core::media::{FetchRequest, MediaBackend, MediaInfo};
use clip_relay_core::progress::ProgressRuntimeConfig;
use clip_relay_core::{
    JobError, JobRequest, JobRunner, JobStatus, MediaKind, MediaUploader, ProgressReporter,
    Selector, SourceUrl, StatusSink,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Backend that writes a small file for heights it "has"
struct FakeBackend {
    available_heights: Vec<u32>,
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeBackend {
    fn new(available_heights: Vec<u32>) -> Self {
        Self {
            available_heights,
            delay: Duration::ZERO,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, _source: &SourceUrl) -> Result<MediaInfo, JobError> {
        Ok(MediaInfo {
            title: Some("Fake".to_string()),
            heights: self.available_heights.clone(),
        })
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &ProgressReporter,
    ) -> Result<(), JobError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = async {
            if let Selector::Video { height } = request.selector {
                if !self.available_heights.contains(&height) {
                    return Err(JobError::QualityUnavailable {
                        label: request.selector.label(),
                    });
                }
            }
            // Partial file left behind by an interrupted download
            tokio::fs::write(request.output_dir().join("media.part"), b"partial").await?;
            for done in [0u64, 250, 500, 750, 1000] {
                progress.on_download_progress(done, 1000);
            }
            tokio::time::sleep(self.delay).await;
            progress.on_postprocessing();
            tokio::fs::write(request.output_path(), b"fake media payload").await?;
            Ok(())
        }
        .await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
struct FakeUploader {
    uploads: Mutex<Vec<MediaFile>>,
    fail: bool,
}

#[async_trait]
impl MediaUploader for FakeUploader {
    async fn upload(&self, media: &MediaFile, progress: &ProgressReporter) -> Result<(), JobError> {
        assert!(media.path.exists(), "upload target must exist during upload");
        progress.on_upload_progress(media.size / 2, media.size);
        if self.fail {
            return Err(JobError::TransportFailure("Request Entity Too Large".to_string()));
        }
        progress.on_upload_progress(media.size, media.size);
        self.uploads.lock().await.push(media.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<JobStatus>>,
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn update_status(&self, status: &JobStatus) -> anyhow::Result<()> {
        self.seen.lock().await.push(status.clone());
        Ok(())
    }
}

fn runner(backend: Arc<dyn MediaBackend>, root: &Path, workers: usize) -> JobRunner {
    JobRunner::new(
        backend,
        root,
        workers,
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .with_progress_config(ProgressRuntimeConfig::default().with_throttle(Duration::ZERO))
}

fn request(selector: Selector, title: Option<&str>) -> Result<JobRequest, JobError> {
    Ok(JobRequest {
        source: SourceUrl::parse("https://video.example.com/watch?v=abc123")?,
        selector,
        title: title.map(ToString::to_string),
    })
}

fn entries(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    std::fs::read_dir(root)?
        .map(|entry| entry.map(|e| e.path()))
        .collect()
}

#[tokio::test]
async fn video_720p_success() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("downloads");
    let backend = Arc::new(FakeBackend::new(vec![1080, 720, 360]));
    let uploader = FakeUploader::default();
    let sink = Arc::new(RecordingSink::default());

    let outcome = runner(backend, &root, 2)
        .run(
            request(Selector::Video { height: 720 }, Some("Cats"))?,
            &uploader,
            sink.clone(),
        )
        .await?;

    assert_eq!(outcome.kind, MediaKind::Video);
    assert_eq!(outcome.bytes, b"fake media payload".len() as u64);

    let uploads = uploader.uploads.lock().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].kind, MediaKind::Video);
    assert_eq!(uploads[0].caption, "✅ Cats (720p)");
    assert!(uploads[0].path.ends_with("media.mp4"));
    assert_eq!(
        uploads[0].path.parent().and_then(Path::file_name),
        Some(std::ffi::OsStr::new(&outcome.job_id.to_string()))
    );

    let seen = sink.seen.lock().await;
    assert_eq!(
        seen.last(),
        Some(&JobStatus::Completed {
            kind: MediaKind::Video
        })
    );
    assert!(seen.contains(&JobStatus::Downloading { percent: 100 }));
    assert_eq!(seen.iter().filter(|s| s.is_terminal()).count(), 1);

    assert!(entries(&root)?.is_empty(), "scratch root must be empty");
    Ok(())
}

#[tokio::test]
async fn audio_upload_uses_generic_caption_without_title() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let uploader = FakeUploader::default();
    let sink = Arc::new(RecordingSink::default());

    runner(Arc::new(FakeBackend::new(vec![])), tmp.path(), 1)
        .run(request(Selector::AudioOnly, None)?, &uploader, sink)
        .await?;

    let uploads = uploader.uploads.lock().await;
    assert_eq!(uploads[0].kind, MediaKind::Audio);
    assert_eq!(uploads[0].caption, "✅ Your file (MP3)");
    assert!(uploads[0].path.ends_with("media.mp3"));
    assert!(entries(tmp.path())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unavailable_height_fails_without_upload() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let uploader = FakeUploader::default();
    let sink = Arc::new(RecordingSink::default());

    let result = runner(Arc::new(FakeBackend::new(vec![360])), tmp.path(), 1)
        .run(
            request(Selector::Video { height: 1080 }, Some("Cats"))?,
            &uploader,
            sink.clone(),
        )
        .await;

    let expected = JobError::QualityUnavailable {
        label: "1080p".to_string(),
    };
    assert_eq!(result.err(), Some(expected.clone()));
    assert!(uploader.uploads.lock().await.is_empty());
    assert_eq!(sink.seen.lock().await.last(), Some(&JobStatus::Failed(expected)));
    assert!(entries(tmp.path())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn upload_failure_still_cleans_up() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let uploader = FakeUploader {
        fail: true,
        ..FakeUploader::default()
    };
    let sink = Arc::new(RecordingSink::default());

    let result = runner(Arc::new(FakeBackend::new(vec![720])), tmp.path(), 1)
        .run(request(Selector::Video { height: 720 }, None)?, &uploader, sink)
        .await;

    assert!(matches!(result, Err(JobError::TransportFailure(_))));
    assert!(entries(tmp.path())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn download_timeout_is_reported_and_cleaned() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let backend = Arc::new(FakeBackend::new(vec![720]).with_delay(Duration::from_secs(30)));
    let uploader = FakeUploader::default();
    let sink = Arc::new(RecordingSink::default());

    let runner = JobRunner::new(
        backend,
        tmp.path(),
        1,
        Duration::from_millis(100),
        Duration::from_secs(5),
    );
    let result = runner
        .run(request(Selector::Video { height: 720 }, None)?, &uploader, sink)
        .await;

    assert_eq!(
        result.err(),
        Some(JobError::BackendTimeout {
            phase: JobPhase::Download
        })
    );
    assert!(entries(tmp.path())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn parallel_jobs_never_collide() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let backend = Arc::new(FakeBackend::new(vec![720, 480]).with_delay(Duration::from_millis(20)));
    let runner = Arc::new(runner(backend.clone(), tmp.path(), 3));
    let uploader = Arc::new(FakeUploader::default());

    let mut handles = Vec::new();
    for i in 0..12 {
        let runner = runner.clone();
        let uploader = uploader.clone();
        let selector = if i % 2 == 0 {
            Selector::Video { height: 480 }
        } else {
            Selector::AudioOnly
        };
        let req = request(selector, Some("Clip"))?;
        handles.push(tokio::spawn(async move {
            let sink = Arc::new(RecordingSink::default());
            runner.run(req, uploader.as_ref(), sink).await
        }));
    }

    let mut job_ids = Vec::new();
    for handle in handles {
        job_ids.push(handle.await??.job_id);
    }
    job_ids.sort();
    job_ids.dedup();
    assert_eq!(job_ids.len(), 12);

    let uploads = uploader.uploads.lock().await;
    let mut paths: Vec<_> = uploads.iter().map(|m| m.path.clone()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 12);

    assert!(backend.peak.load(Ordering::SeqCst) <= 3);
    assert!(entries(tmp.path())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn saturated_pool_reports_queued() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let backend = Arc::new(FakeBackend::new(vec![720]).with_delay(Duration::from_millis(200)));
    let runner = Arc::new(runner(backend, tmp.path(), 1));
    let uploader = Arc::new(FakeUploader::default());

    let first = {
        let runner = runner.clone();
        let uploader = uploader.clone();
        let req = request(Selector::AudioOnly, None)?;
        tokio::spawn(async move {
            let sink = Arc::new(RecordingSink::default());
            runner.run(req, uploader.as_ref(), sink).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sink = Arc::new(RecordingSink::default());
    runner
        .run(request(Selector::AudioOnly, None)?, uploader.as_ref(), sink.clone())
        .await?;
    first.await??;

    let seen = sink.seen.lock().await;
    assert_eq!(seen.first(), Some(&JobStatus::Queued));
    Ok(())
}
