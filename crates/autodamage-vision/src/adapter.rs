use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use autodamage_core::{BoundingBox, Detection, DetectionSet, VehicleClass};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{DetectError, DetectRequest, DetectorHandle, NormalizedImage, RawDetection, SharedDetector, DEFAULT_INPUT_SIZE};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct AdapterSettings {
    pub input_size: u32,
    pub timeout: Duration,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self { input_size: DEFAULT_INPUT_SIZE, timeout: DEFAULT_TIMEOUT }
    }
}

/// Runs the shared detector on a normalized image and keeps only vehicle
/// detections at or above the requested confidence.
#[derive(Clone)]
pub struct DetectionAdapter {
    detector: Arc<SharedDetector>,
    settings: AdapterSettings,
}

impl DetectionAdapter {
    pub fn new(detector: Arc<SharedDetector>, settings: AdapterSettings) -> Self {
        Self { detector, settings }
    }

    pub fn shared(&self) -> &Arc<SharedDetector> {
        &self.detector
    }

    /// Load, warm-up and inference share one deadline of `settings.timeout`
    /// measured from the start of the call.
    pub fn detect(&self, image: &NormalizedImage, confidence: f32) -> Result<DetectionSet, DetectError> {
        let timeout = self.settings.timeout;
        let started = Instant::now();
        let deadline = started + timeout;
        let handle = self.detector.get_until(deadline).map_err(|err| match err {
            DetectError::Timeout(_) => DetectError::Timeout(timeout),
            other => other,
        })?;

        let frame = image.to_rgb8();
        let (width, height) = frame.dimensions();
        let request = DetectRequest::vehicles(confidence, self.settings.input_size);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let raw = infer_with_timeout(handle, frame, request, remaining).map_err(|err| match err {
            DetectError::Timeout(_) => DetectError::Timeout(timeout),
            other => other,
        })?;
        let detections = to_detection_set(&raw, confidence, width, height)?;
        info!(
            raw = raw.len(),
            kept = detections.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inference complete"
        );
        Ok(detections)
    }
}

/// Inference runs on its own thread so a hung detector costs the caller at
/// most `timeout`. The thread is not cancelled and finishes in the background.
fn infer_with_timeout(
    handle: Arc<DetectorHandle>,
    frame: RgbImage,
    request: DetectRequest,
    timeout: Duration,
) -> Result<Vec<RawDetection>, DetectError> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("autodamage-inference".into())
        .spawn(move || {
            let _ = tx.send(handle.infer(&frame, &request));
        })
        .map_err(|err| DetectError::ModelUnavailable(format!("spawn inference thread: {}", err)))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(raw)) => Ok(raw),
        Ok(Err(err)) => {
            warn!("inference failed: {:#}", err);
            Err(DetectError::ModelUnavailable(format!("{:#}", err)))
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "inference timed out");
            Err(DetectError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(DetectError::ModelUnavailable(
            "inference thread exited without a result".to_string(),
        )),
    }
}

/// Apply the allow-list and threshold to raw output and normalize boxes.
/// Detector order is preserved. A vehicle detection with a confidence outside
/// [0, 1] or a non-finite box means the detector is misbehaving and fails the
/// whole request.
pub fn to_detection_set(
    raw: &[RawDetection],
    confidence: f32,
    width: u32,
    height: u32,
) -> Result<DetectionSet, DetectError> {
    let mut set = DetectionSet::new();
    for r in raw {
        let Some(class) = VehicleClass::from_coco_id(r.class_id) else {
            debug!(class_id = r.class_id, label = ?r.label, "dropping non-vehicle detection");
            continue;
        };
        let detection = BoundingBox::from_pixels(r.x1, r.y1, r.x2, r.y2, width, height)
            .and_then(|bbox| Detection::new(class, r.confidence, bbox))
            .map_err(|err| {
                warn!(class_id = r.class_id, "malformed detector output: {}", err);
                DetectError::ModelUnavailable(format!("detector returned malformed detection: {}", err))
            })?;
        if detection.confidence < confidence {
            continue;
        }
        set.push(detection);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{normalize, Detector, DetectorLoader};
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn raw(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection { class_id, label: None, confidence, x1: 10.0, y1: 20.0, x2: 110.0, y2: 220.0 }
    }

    #[test]
    fn filters_classes_and_threshold_in_order() {
        let out = to_detection_set(&[raw(7, 0.9), raw(0, 0.99), raw(2, 0.3), raw(2, 0.4)], 0.4, 400, 400).unwrap();
        let kept: Vec<_> = out.iter().map(|d| (d.class, d.confidence)).collect();
        assert_eq!(kept, vec![(VehicleClass::Truck, 0.9), (VehicleClass::Car, 0.4)]);
        let b = out.first().unwrap().bounding_box;
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (0.025, 0.05, 0.275, 0.55));
    }

    #[test]
    fn malformed_vehicle_detection_fails_the_request() {
        for bad in [raw(2, 1.2), raw(2, f32::NAN), raw(2, -0.1)] {
            let err = to_detection_set(&[raw(7, 0.9), bad], 0.4, 400, 400).unwrap_err();
            assert!(matches!(err, DetectError::ModelUnavailable(ref m) if m.contains("malformed")));
        }
        let nan_box = RawDetection { x2: f32::NAN, ..raw(3, 0.8) };
        assert!(to_detection_set(&[nan_box], 0.4, 400, 400).is_err());
        // non-vehicle output is not validated
        assert!(to_detection_set(&[raw(0, f32::NAN)], 0.4, 400, 400).unwrap().is_empty());
    }

    struct Scripted {
        output: Vec<RawDetection>,
        delay: Duration,
        fail: bool,
    }

    impl Detector for Scripted {
        fn detect(&self, _image: &RgbImage, _request: &DetectRequest) -> anyhow::Result<Vec<RawDetection>> {
            thread::sleep(self.delay);
            if self.fail {
                anyhow::bail!("cuda out of memory");
            }
            Ok(self.output.clone())
        }
    }

    struct ScriptedLoader(Mutex<Option<Scripted>>);

    impl DetectorLoader for ScriptedLoader {
        fn name(&self) -> &str {
            "scripted"
        }

        fn load(&self) -> anyhow::Result<Box<dyn Detector>> {
            let d = self.0.lock().unwrap().take().ok_or_else(|| anyhow::anyhow!("already loaded"))?;
            Ok(Box::new(d))
        }
    }

    fn adapter(d: Scripted, timeout: Duration) -> DetectionAdapter {
        let shared = Arc::new(SharedDetector::new(Box::new(ScriptedLoader(Mutex::new(Some(d))))));
        DetectionAdapter::new(shared, AdapterSettings { input_size: 640, timeout })
    }

    fn frame() -> NormalizedImage {
        normalize(DynamicImage::ImageRgb8(RgbImage::new(200, 100)))
    }

    #[test]
    fn returns_vehicle_set() {
        let a = adapter(
            Scripted { output: vec![raw(2, 0.8), raw(5, 0.6)], delay: Duration::ZERO, fail: false },
            Duration::from_secs(5),
        );
        let set = a.detect(&frame(), 0.5).unwrap();
        assert_eq!(set.len(), 2);
        // second call reuses the loaded model; a second load would fail
        assert_eq!(a.detect(&frame(), 0.7).unwrap().len(), 1);
    }

    #[test]
    fn inference_error_is_model_unavailable() {
        let a = adapter(Scripted { output: vec![], delay: Duration::ZERO, fail: true }, Duration::from_secs(5));
        let err = a.detect(&frame(), 0.5).unwrap_err();
        assert!(matches!(err, DetectError::ModelUnavailable(ref m) if m.contains("cuda")));
    }

    #[test]
    fn hung_detector_times_out() {
        let a = adapter(
            Scripted { output: vec![], delay: Duration::from_millis(500), fail: false },
            Duration::from_millis(20),
        );
        assert_eq!(a.detect(&frame(), 0.5).unwrap_err(), DetectError::Timeout(Duration::from_millis(20)));
    }

    /// Stalls only on the square warm-up frame.
    struct StallsOnWarmUp(Duration);

    impl Detector for StallsOnWarmUp {
        fn detect(&self, image: &RgbImage, request: &DetectRequest) -> anyhow::Result<Vec<RawDetection>> {
            if image.dimensions() == (request.input_size, request.input_size) {
                thread::sleep(self.0);
            }
            Ok(vec![raw(2, 0.9)])
        }
    }

    struct StallsOnWarmUpLoader;

    impl DetectorLoader for StallsOnWarmUpLoader {
        fn name(&self) -> &str {
            "stalls-on-warm-up"
        }

        fn load(&self) -> anyhow::Result<Box<dyn Detector>> {
            Ok(Box::new(StallsOnWarmUp(Duration::from_millis(400))))
        }
    }

    #[test]
    fn hung_warm_up_is_bounded_by_timeout() {
        let shared = Arc::new(SharedDetector::new(Box::new(StallsOnWarmUpLoader)).with_warm_up(640));
        let a = DetectionAdapter::new(
            Arc::clone(&shared),
            AdapterSettings { input_size: 640, timeout: Duration::from_millis(50) },
        );

        let started = Instant::now();
        assert_eq!(a.detect(&frame(), 0.5).unwrap_err(), DetectError::Timeout(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(!shared.is_loaded());

        // the background load finishes and later requests reuse it
        thread::sleep(Duration::from_millis(500));
        let slow = DetectionAdapter::new(Arc::clone(&shared), AdapterSettings { input_size: 640, timeout: Duration::from_secs(5) });
        assert_eq!(slow.detect(&frame(), 0.5).unwrap().len(), 1);
        assert_eq!(shared.load_count(), 1);
    }

    struct Panicky;

    impl Detector for Panicky {
        fn detect(&self, _image: &RgbImage, _request: &DetectRequest) -> anyhow::Result<Vec<RawDetection>> {
            panic!("native crash");
        }
    }

    struct PanickyLoader;

    impl DetectorLoader for PanickyLoader {
        fn name(&self) -> &str {
            "panicky"
        }

        fn load(&self) -> anyhow::Result<Box<dyn Detector>> {
            Ok(Box::new(Panicky))
        }
    }

    #[test]
    fn detector_panic_does_not_reach_caller() {
        let a = DetectionAdapter::new(Arc::new(SharedDetector::new(Box::new(PanickyLoader))), AdapterSettings::default());
        assert!(matches!(a.detect(&frame(), 0.5), Err(DetectError::ModelUnavailable(_))));
        // serialized detectors stay usable after a poisoned gate
        assert!(matches!(a.detect(&frame(), 0.5), Err(DetectError::ModelUnavailable(_))));
    }

    struct Overlap {
        active: AtomicUsize,
        max_seen: AtomicUsize,
    }

    impl Detector for Arc<Overlap> {
        fn detect(&self, _image: &RgbImage, _request: &DetectRequest) -> anyhow::Result<Vec<RawDetection>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(15));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    struct OverlapLoader(Arc<Overlap>);

    impl DetectorLoader for OverlapLoader {
        fn name(&self) -> &str {
            "overlap"
        }

        fn load(&self) -> anyhow::Result<Box<dyn Detector>> {
            Ok(Box::new(Arc::clone(&self.0)))
        }
    }

    #[test]
    fn non_reentrant_detector_is_serialized() {
        let overlap = Arc::new(Overlap { active: AtomicUsize::new(0), max_seen: AtomicUsize::new(0) });
        let a = DetectionAdapter::new(
            Arc::new(SharedDetector::new(Box::new(OverlapLoader(Arc::clone(&overlap))))),
            AdapterSettings::default(),
        );
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let a = a.clone();
                thread::spawn(move || a.detect(&frame(), 0.5).map(|s| s.len()))
            })
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap().unwrap(), 0);
        }
        assert_eq!(overlap.max_seen.load(Ordering::SeqCst), 1);
    }
}
