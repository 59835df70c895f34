// src/face.rs
use crate::{
    error::{processing, ApiError},
    types::Envelope,
    verifier::FaceVerifier,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("image payload has no data-URL separator")]
    MissingSeparator,
    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image payload is empty")]
    Empty,
}

/// Decode `data:<mime>;base64,<payload>`. Everything up to the first comma is ignored.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, DecodeError> {
    let (_header, encoded) = data_url.split_once(',').ok_or(DecodeError::MissingSeparator)?;
    let bytes = B64.decode(encoded.trim())?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(bytes)
}

/// A decoded submission on disk. Owned by one request; removed by `remove` or on drop.
#[derive(Debug)]
pub struct ScratchImage {
    path: PathBuf,
    armed: bool,
}

impl ScratchImage {
    pub async fn write(dir: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        // guard exists before the write so a partial file is still removed
        let img = Self {
            path: dir.join(format!("{}.jpg", Uuid::new_v4())),
            armed: true,
        };
        tokio::fs::write(&img.path, bytes).await?;
        Ok(img)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(mut self) {
        self.armed = false;
        log_removal(&self.path, tokio::fs::remove_file(&self.path).await);
    }
}

// Fallback for early returns and futures dropped mid-flight (timeouts).
// A single unlink, so the blocking call is tolerable here.
impl Drop for ScratchImage {
    fn drop(&mut self) {
        if self.armed {
            log_removal(&self.path, std::fs::remove_file(&self.path));
        }
    }
}

fn log_removal(path: &Path, res: std::io::Result<()>) {
    match res {
        Ok(()) => debug!("removed scratch image {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove scratch image {}: {e}", path.display()),
    }
}

/// Face path of the attendance check: decode, hand to the verifier, clean up.
pub struct FaceService<V> {
    verifier: V,
    reference: PathBuf,
    scratch_dir: PathBuf,
    permits: Semaphore,
}

impl<V: FaceVerifier> FaceService<V> {
    pub fn new(verifier: V, reference: PathBuf, scratch_dir: PathBuf, max_concurrent: usize) -> Self {
        Self {
            verifier,
            reference,
            scratch_dir,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    pub async fn verify(&self, image: Option<&str>) -> Result<Envelope, ApiError> {
        let data_url = image
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::Validation("No image data received.".into()))?;

        if !tokio::fs::try_exists(&self.reference).await.unwrap_or(false) {
            return Err(ApiError::Configuration);
        }

        // held across decode and write too, so queued requests keep nothing in memory or on disk
        let _permit = self.permits.acquire().await.map_err(processing)?;

        let bytes = decode_data_url(data_url).map_err(processing)?;
        let scratch = ScratchImage::write(&self.scratch_dir, &bytes)
            .await
            .map_err(processing)?;
        drop(bytes);

        let result = self.verifier.verify(&self.reference, scratch.path()).await;
        scratch.remove().await;

        let matched = result.map_err(processing)?.matched;
        if matched {
            info!("SUCCESS: face verification successful");
            Ok(Envelope::success("Face verified successfully."))
        } else {
            info!("FAILURE: face verification failed");
            Ok(Envelope::failure("Face does not match. Attendance denied."))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::Status;
    use crate::verifier::{FaceMatch, VerifierError};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use std::time::Duration;

    pub(crate) const JPEG_URL: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRg==";

    #[derive(Clone, Copy)]
    pub(crate) enum Outcome {
        Match,
        NoMatch,
        Fail,
    }

    /// Records the candidate path it was shown and whether it existed at the time.
    #[derive(Clone)]
    pub(crate) struct StubVerifier {
        pub outcome: Outcome,
        pub seen: Arc<Mutex<Vec<(PathBuf, bool)>>>,
        pub in_flight: Arc<AtomicUsize>,
        pub peak: Arc<AtomicUsize>,
        pub delay: Duration,
    }

    impl StubVerifier {
        pub(crate) fn new(outcome: Outcome) -> Self {
            Self {
                outcome,
                seen: Arc::default(),
                in_flight: Arc::default(),
                peak: Arc::default(),
                delay: Duration::ZERO,
            }
        }
    }

    impl FaceVerifier for StubVerifier {
        async fn verify(&self, _reference: &Path, candidate: &Path) -> Result<FaceMatch, VerifierError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((candidate.to_path_buf(), candidate.exists()));
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Match => Ok(FaceMatch { matched: true }),
                Outcome::NoMatch => Ok(FaceMatch { matched: false }),
                Outcome::Fail => Err(VerifierError::Rejected {
                    status: 500,
                    body: "model exploded".into(),
                }),
            }
        }

        async fn warm_up(&self, _reference: &Path) -> Result<(), VerifierError> {
            Ok(())
        }
    }

    pub(crate) struct Fixture {
        pub dir: tempfile::TempDir,
        pub reference: PathBuf,
        pub scratch: PathBuf,
    }

    pub(crate) fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("reference.jpg");
        std::fs::write(&reference, b"ref").unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        Fixture { dir, reference, scratch }
    }

    fn scratch_is_empty(fx: &Fixture) -> bool {
        std::fs::read_dir(&fx.scratch).unwrap().next().is_none()
    }

    #[test]
    fn decodes_data_url() {
        assert_eq!(decode_data_url("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
        // only the first comma splits
        assert!(matches!(decode_data_url("data:x,aGk=,aGk="), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn decode_failures() {
        assert_eq!(decode_data_url("aGVsbG8="), Err(DecodeError::MissingSeparator));
        assert!(matches!(decode_data_url("data:image/png;base64,***"), Err(DecodeError::Base64(_))));
        assert_eq!(decode_data_url("data:image/png;base64,"), Err(DecodeError::Empty));
    }

    #[tokio::test]
    async fn scratch_image_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let img = ScratchImage::write(dir.path(), b"bytes").await.unwrap();
        let path = img.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "jpg");
        drop(img);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn explicit_remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let img = ScratchImage::write(dir.path(), b"bytes").await.unwrap();
        let path = img.path().to_path_buf();
        img.remove().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn queued_requests_write_nothing_until_admitted() {
        let fx = fixture();
        let mut stub = StubVerifier::new(Outcome::Match);
        stub.delay = Duration::from_millis(200);
        let svc = Arc::new(FaceService::new(stub.clone(), fx.reference.clone(), fx.scratch.clone(), 1));

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.verify(Some(JPEG_URL)).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(std::fs::read_dir(&fx.scratch).unwrap().count(), 1);

        for t in tasks {
            assert_eq!(t.await.unwrap().unwrap().status, Status::Success);
        }
        assert!(scratch_is_empty(&fx));
    }

    #[tokio::test]
    async fn scratch_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = ScratchImage::write(dir.path(), b"a").await.unwrap();
        let b = ScratchImage::write(dir.path(), b"b").await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir");
        assert!(ScratchImage::write(&missing, b"x").await.is_err());
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn match_and_no_match() {
        let fx = fixture();
        let stub = StubVerifier::new(Outcome::Match);
        let svc = FaceService::new(stub.clone(), fx.reference.clone(), fx.scratch.clone(), 1);
        let env = svc.verify(Some(JPEG_URL)).await.unwrap();
        assert_eq!(env, Envelope::success("Face verified successfully."));

        let (path, existed) = stub.seen.lock().unwrap()[0].clone();
        assert!(existed);
        assert!(!path.exists());
        assert!(scratch_is_empty(&fx));

        let svc = FaceService::new(StubVerifier::new(Outcome::NoMatch), fx.reference.clone(), fx.scratch.clone(), 1);
        let env = svc.verify(Some(JPEG_URL)).await.unwrap();
        assert_eq!(env.status, Status::Failure);
        assert_eq!(env.message, "Face does not match. Attendance denied.");
        assert!(scratch_is_empty(&fx));
    }

    #[tokio::test]
    async fn verifier_failure_is_processing_error_and_cleans_up() {
        let fx = fixture();
        let stub = StubVerifier::new(Outcome::Fail);
        let svc = FaceService::new(stub.clone(), fx.reference.clone(), fx.scratch.clone(), 1);
        let err = svc.verify(Some(JPEG_URL)).await.unwrap_err();
        assert!(matches!(err, ApiError::Processing(_)));
        assert_eq!(stub.seen.lock().unwrap().len(), 1);
        assert!(scratch_is_empty(&fx));
    }

    #[tokio::test]
    async fn payload_without_comma_is_processing_error() {
        let fx = fixture();
        let stub = StubVerifier::new(Outcome::Match);
        let svc = FaceService::new(stub.clone(), fx.reference.clone(), fx.scratch.clone(), 1);
        let err = svc.verify(Some("/9j/4AAQSkZJRg==")).await.unwrap_err();
        assert!(matches!(err, ApiError::Processing(_)));
        assert!(stub.seen.lock().unwrap().is_empty());
        assert!(scratch_is_empty(&fx));
    }

    #[tokio::test]
    async fn missing_image_and_missing_reference() {
        let fx = fixture();
        let svc = FaceService::new(StubVerifier::new(Outcome::Match), fx.reference.clone(), fx.scratch.clone(), 1);
        assert!(matches!(svc.verify(None).await, Err(ApiError::Validation(_))));
        assert!(matches!(svc.verify(Some("")).await, Err(ApiError::Validation(_))));

        let gone = fx.dir.path().join("nobody.jpg");
        let svc = FaceService::new(StubVerifier::new(Outcome::Match), gone, fx.scratch.clone(), 1);
        assert!(matches!(svc.verify(Some(JPEG_URL)).await, Err(ApiError::Configuration)));
    }

    #[tokio::test]
    async fn concurrent_calls_respect_limit() {
        let fx = fixture();
        let mut stub = StubVerifier::new(Outcome::Match);
        stub.delay = Duration::from_millis(30);
        let svc = Arc::new(FaceService::new(stub.clone(), fx.reference.clone(), fx.scratch.clone(), 2));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.verify(Some(JPEG_URL)).await })
            })
            .collect();
        for t in tasks {
            assert_eq!(t.await.unwrap().unwrap().status, Status::Success);
        }

        assert!(stub.peak.load(Ordering::SeqCst) <= 2);
        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen.len(), 6);
        let mut paths: Vec<_> = seen.iter().map(|(p, _)| p.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 6);
        assert!(scratch_is_empty(&fx));
    }
}
