use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use autodamage_core::VehicleClass;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::DetectError;

/// Square letterbox size YOLO-family detectors run at.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// One object as reported by the detector, in pixel coordinates of the frame
/// it was given.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    #[serde(default)]
    pub label: Option<String>,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectRequest {
    /// COCO class ids the detector should restrict itself to.
    pub classes: Vec<u32>,
    pub confidence: f32,
    pub input_size: u32,
}

impl DetectRequest {
    pub fn vehicles(confidence: f32, input_size: u32) -> Self {
        Self {
            classes: VehicleClass::ALL.iter().map(|c| c.coco_id()).collect(),
            confidence,
            input_size,
        }
    }
}

/// A loaded detection model. Frames are 8-bit RGB.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage, request: &DetectRequest) -> anyhow::Result<Vec<RawDetection>>;

    /// Whether `detect` may run on several threads at once. When false, calls
    /// on one instance are serialized.
    fn concurrent_inference(&self) -> bool {
        false
    }
}

/// Produces a detector. Called at most once per successful load.
pub trait DetectorLoader: Send + Sync {
    fn name(&self) -> &str;
    fn load(&self) -> anyhow::Result<Box<dyn Detector>>;
}

/// A loaded detector plus the gate that serializes non-reentrant models.
pub struct DetectorHandle {
    detector: Arc<dyn Detector>,
    gate: Option<Mutex<()>>,
}

impl DetectorHandle {
    pub fn new(detector: Box<dyn Detector>) -> Self {
        let gate = if detector.concurrent_inference() { None } else { Some(Mutex::new(())) };
        Self { detector: Arc::from(detector), gate }
    }

    pub fn infer(&self, image: &RgbImage, request: &DetectRequest) -> anyhow::Result<Vec<RawDetection>> {
        // a panic inside a previous inference leaves nothing to protect in `()`
        let _guard = self
            .gate
            .as_ref()
            .map(|g| g.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
        self.detector.detect(image, request)
    }
}

/// Process-wide, lazily loaded detector.
///
/// Loading (and the optional warm-up) runs on a worker thread. The first
/// caller starts it; callers wait on it while holding the slot lock, so
/// concurrent first callers never load twice. A caller whose deadline passes
/// gets `Timeout` and the load keeps going for the next caller. A failed load
/// leaves the slot empty and the next call tries again.
pub struct SharedDetector {
    loader: Arc<dyn DetectorLoader>,
    warm_up: Option<DetectRequest>,
    slot: Mutex<Slot>,
    loads: AtomicUsize,
}

type LoadResult = Result<Arc<DetectorHandle>, DetectError>;

/// One background load, shared by every caller waiting on it.
struct PendingLoad {
    started: Instant,
    result: Mutex<Option<LoadResult>>,
    done: Condvar,
}

enum Slot {
    Empty,
    Loading(Arc<PendingLoad>),
    Ready(Arc<DetectorHandle>),
}

impl SharedDetector {
    pub fn new(loader: Box<dyn DetectorLoader>) -> Self {
        Self {
            loader: Arc::from(loader),
            warm_up: None,
            slot: Mutex::new(Slot::Empty),
            loads: AtomicUsize::new(0),
        }
    }

    /// Run one dummy inference on a blank `input_size` square right after loading.
    pub fn with_warm_up(mut self, input_size: u32) -> Self {
        self.warm_up = Some(DetectRequest::vehicles(0.5, input_size));
        self
    }

    /// Wait as long as loading takes.
    pub fn get(&self) -> Result<Arc<DetectorHandle>, DetectError> {
        self.acquire(None)
    }

    /// Give up with `Timeout` once `deadline` passes. The load keeps running
    /// and later callers pick it up.
    pub fn get_until(&self, deadline: Instant) -> Result<Arc<DetectorHandle>, DetectError> {
        self.acquire(Some(deadline))
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().expect("detector slot lock poisoned")
    }

    fn acquire(&self, deadline: Option<Instant>) -> Result<Arc<DetectorHandle>, DetectError> {
        // the slot lock is never held while waiting on a load
        let pending = {
            let mut slot = self.lock_slot();
            let running = match &*slot {
                Slot::Ready(handle) => return Ok(Arc::clone(handle)),
                Slot::Loading(pending) => Some(Arc::clone(pending)),
                Slot::Empty => None,
            };
            match running {
                Some(pending) => pending,
                None => {
                    let pending = self.spawn_load()?;
                    *slot = Slot::Loading(Arc::clone(&pending));
                    pending
                }
            }
        };

        let outcome = {
            let result = pending.result.lock().expect("detector load lock poisoned");
            let result = match deadline {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    pending.done.wait_timeout_while(result, wait, |r| r.is_none()).expect("detector load lock poisoned").0
                }
                None => pending.done.wait_while(result, |r| r.is_none()).expect("detector load lock poisoned"),
            };
            result.clone()
        };

        let Some(outcome) = outcome else {
            let waited = pending.started.elapsed();
            warn!(loader = self.loader.name(), waited_ms = waited.as_millis() as u64, "detector still loading");
            return Err(DetectError::Timeout(waited));
        };

        let mut slot = self.lock_slot();
        // only the first caller to see this load finish moves the slot on
        if matches!(&*slot, Slot::Loading(current) if Arc::ptr_eq(current, &pending)) {
            *slot = match &outcome {
                Ok(handle) => {
                    self.loads.fetch_add(1, Ordering::SeqCst);
                    Slot::Ready(Arc::clone(handle))
                }
                Err(_) => Slot::Empty,
            };
        }
        outcome
    }

    fn spawn_load(&self) -> Result<Arc<PendingLoad>, DetectError> {
        let pending = Arc::new(PendingLoad { started: Instant::now(), result: Mutex::new(None), done: Condvar::new() });
        let shared = Arc::clone(&pending);
        let loader = Arc::clone(&self.loader);
        let warm_up = self.warm_up.clone();
        thread::Builder::new()
            .name("autodamage-detector-load".into())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| load_and_warm_up(loader.as_ref(), warm_up.as_ref())))
                    .unwrap_or_else(|_| {
                        warn!(loader = loader.name(), "detector load panicked");
                        Err(DetectError::ModelUnavailable(format!("load {}: loader crashed", loader.name())))
                    });
                *shared.result.lock().expect("detector load lock poisoned") = Some(outcome);
                shared.done.notify_all();
            })
            .map_err(|err| DetectError::ModelUnavailable(format!("spawn detector load thread: {}", err)))?;
        Ok(pending)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.lock_slot(), Slot::Ready(_))
    }

    /// Number of successful loads over the lifetime of this instance.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

fn load_and_warm_up(loader: &dyn DetectorLoader, warm_up: Option<&DetectRequest>) -> LoadResult {
    info!(loader = loader.name(), "loading detector");
    let detector = loader.load().map_err(|err| {
        warn!(loader = loader.name(), "detector load failed: {:#}", err);
        DetectError::ModelUnavailable(format!("load {}: {:#}", loader.name(), err))
    })?;
    let handle = Arc::new(DetectorHandle::new(detector));

    if let Some(request) = warm_up {
        let blank = RgbImage::new(request.input_size, request.input_size);
        handle.infer(&blank, request).map_err(|err| {
            warn!(loader = loader.name(), "detector warm-up failed: {:#}", err);
            DetectError::ModelUnavailable(format!("warm up {}: {:#}", loader.name(), err))
        })?;
        info!(loader = loader.name(), size = request.input_size, "detector warmed up");
    }
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct Nothing;

    impl Detector for Nothing {
        fn detect(&self, _image: &RgbImage, _request: &DetectRequest) -> anyhow::Result<Vec<RawDetection>> {
            Ok(vec![])
        }
    }

    /// Slow loader that counts how often `load` ran.
    struct CountingLoader {
        calls: Arc<AtomicUsize>,
        fail_first: AtomicBool,
    }

    impl DetectorLoader for CountingLoader {
        fn name(&self) -> &str {
            "counting"
        }

        fn load(&self) -> anyhow::Result<Box<dyn Detector>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            if self.fail_first.swap(false, Ordering::SeqCst) {
                anyhow::bail!("weights missing");
            }
            Ok(Box::new(Nothing))
        }
    }

    fn loader(fail_first: bool) -> (CountingLoader, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let l = CountingLoader { calls: Arc::clone(&calls), fail_first: AtomicBool::new(fail_first) };
        (l, calls)
    }

    #[test]
    fn concurrent_first_callers_load_once() {
        let (l, calls) = loader(false);
        let shared = Arc::new(SharedDetector::new(Box::new(l)));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || shared.get().map(|_| ()))
            })
            .collect();
        for t in threads {
            t.join().unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared.load_count(), 1);
    }

    #[test]
    fn failed_load_is_retried_on_next_call() {
        let (l, calls) = loader(true);
        let shared = SharedDetector::new(Box::new(l));
        let err = shared.get().err().unwrap();
        assert!(matches!(err, DetectError::ModelUnavailable(ref m) if m.contains("weights missing")));
        assert!(!shared.is_loaded());

        assert!(shared.get().is_ok());
        assert!(shared.get().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(shared.load_count(), 1);
    }

    struct SizeRecorder(Arc<Mutex<Vec<(u32, u32)>>>);

    impl Detector for SizeRecorder {
        fn detect(&self, image: &RgbImage, _request: &DetectRequest) -> anyhow::Result<Vec<RawDetection>> {
            self.0.lock().unwrap().push(image.dimensions());
            Ok(vec![])
        }
    }

    struct RecorderLoader(Arc<Mutex<Vec<(u32, u32)>>>);

    impl DetectorLoader for RecorderLoader {
        fn name(&self) -> &str {
            "recorder"
        }

        fn load(&self) -> anyhow::Result<Box<dyn Detector>> {
            Ok(Box::new(SizeRecorder(Arc::clone(&self.0))))
        }
    }

    #[test]
    fn warm_up_runs_once_at_input_size() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let shared = SharedDetector::new(Box::new(RecorderLoader(Arc::clone(&seen)))).with_warm_up(DEFAULT_INPUT_SIZE);
        shared.get().unwrap();
        shared.get().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(640, 640)]);
    }

    struct SlowLoader {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl DetectorLoader for SlowLoader {
        fn name(&self) -> &str {
            "slow"
        }

        fn load(&self) -> anyhow::Result<Box<dyn Detector>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(Box::new(Nothing))
        }
    }

    #[test]
    fn slow_load_times_out_without_restarting() {
        let calls = Arc::new(AtomicUsize::new(0));
        let shared = SharedDetector::new(Box::new(SlowLoader { calls: Arc::clone(&calls), delay: Duration::from_millis(300) }));

        let started = Instant::now();
        let err = shared.get_until(Instant::now() + Duration::from_millis(20)).err().unwrap();
        assert!(matches!(err, DetectError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(matches!(shared.get_until(Instant::now() + Duration::from_millis(20)), Err(DetectError::Timeout(_))));
        assert!(!shared.is_loaded());

        // the same load finishes in the background
        assert!(shared.get().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared.load_count(), 1);
    }

    #[test]
    fn waiting_caller_does_not_block_a_bounded_one() {
        let calls = Arc::new(AtomicUsize::new(0));
        let shared = Arc::new(SharedDetector::new(Box::new(SlowLoader {
            calls: Arc::clone(&calls),
            delay: Duration::from_millis(400),
        })));

        let patient = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.get().map(|_| ()))
        };
        thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        assert!(matches!(shared.get_until(Instant::now() + Duration::from_millis(20)), Err(DetectError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_millis(250));

        assert!(patient.join().unwrap().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared.load_count(), 1);
    }

    struct PanickingLoader;

    impl DetectorLoader for PanickingLoader {
        fn name(&self) -> &str {
            "panicking"
        }

        fn load(&self) -> anyhow::Result<Box<dyn Detector>> {
            panic!("loader crashed");
        }
    }

    #[test]
    fn loader_panic_is_model_unavailable() {
        let shared = SharedDetector::new(Box::new(PanickingLoader));
        assert!(matches!(shared.get(), Err(DetectError::ModelUnavailable(_))));
        assert!(matches!(shared.get(), Err(DetectError::ModelUnavailable(_))));
    }

    #[test]
    fn vehicle_request_uses_coco_ids() {
        let r = DetectRequest::vehicles(0.4, 640);
        assert_eq!(r.classes, vec![2, 3, 5, 7]);
    }
}
