//! SessionController - owner of all mutable session state
//!
//! One `parking_lot::Mutex` guards the scan state and the camera lifecycle
//! together. The capture loop takes it once per detection, and
//! `start`/`stop`/`reset`/`status`/`submit` take it for their whole duration,
//! so a reset can never land in the middle of a decision and a status snapshot
//! never mixes fields from before and after a reset.
//!
//! The queue and frame cache are synchronized internally; pollers read them
//! without touching the session lock.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::frame::{EncodedFrame, FrameCache};
use super::queue::AttendanceQueue;
use super::state::{SessionState, DEFAULT_COOLDOWN};
use super::types::{AttendanceRecord, CameraLifecycle, DetectionEvent, ScanOutcome, SessionStatus};
use super::unknown::DEFAULT_UNKNOWN_THRESHOLD;
use crate::capture::overlay::Hud;
use crate::capture::{runner, Collaborators, PhotoSink};
use crate::error::SessionError;
use crate::roster::Roster;

/// Default pause between capture iterations (~30 fps)
pub const DEFAULT_LOOP_INTERVAL: Duration = Duration::from_millis(33);

/// Tunables for one session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cooldown: Duration,
    pub unknown_threshold: u32,
    pub loop_interval: Duration,
    /// Draw detection boxes on published frames
    pub annotate: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            unknown_threshold: DEFAULT_UNKNOWN_THRESHOLD,
            loop_interval: DEFAULT_LOOP_INTERVAL,
            annotate: true,
        }
    }
}

/// Lifecycle of the capture loop
///
/// Every `start` opens a new run with a fresh generation number. A run only
/// keeps going while it is still the current generation and the lifecycle is
/// `Running`, so a run that exits late can never stop a newer one.
#[derive(Debug)]
pub struct CameraSession {
    lifecycle: CameraLifecycle,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl CameraSession {
    fn new() -> Self {
        Self {
            lifecycle: CameraLifecycle::Stopped,
            generation: 0,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == CameraLifecycle::Running
    }

    fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.lifecycle = CameraLifecycle::Running;
        self.generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation == generation
    }

    /// Mark a run as finished; ignored if a newer run already took over
    fn finish(&mut self, generation: u64) -> bool {
        if self.is_current(generation) {
            self.lifecycle = CameraLifecycle::Stopped;
            true
        } else {
            false
        }
    }
}

struct SessionCore {
    state: SessionState,
    camera: CameraSession,
}

/// State shared between the controller handles and the capture thread
pub(crate) struct SessionShared {
    core: Mutex<SessionCore>,
    pub(crate) queue: AttendanceQueue,
    pub(crate) frames: FrameCache,
    pub(crate) roster: Roster,
    pub(crate) settings: SessionSettings,
    pub(crate) collaborators: Collaborators,
    pub(crate) photos: Option<PhotoSink>,
}

impl SessionShared {
    /// Decision algorithm as one critical section
    pub(crate) fn process(&self, event: &DetectionEvent) -> ScanOutcome {
        let mut core = self.core.lock();
        core.state.apply(event, &self.queue)
    }

    /// Whether the run `generation` should start another iteration
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.core.lock().camera.is_current(generation)
    }

    /// Last scan and unique count for the frame header, read together
    pub(crate) fn hud(&self) -> Hud {
        let core = self.core.lock();
        Hud {
            last_scan: core.state.last_scan_view(),
            unique_students: core.state.total_scanned(),
        }
    }

    pub(crate) fn finish_run(&self, generation: u64) {
        if self.core.lock().camera.finish(generation) {
            info!("Capture run #{} ended, camera stopped", generation);
        }
    }
}

/// Cheap-to-clone handle to the scan session
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<SessionShared>,
}

impl SessionController {
    pub fn new(
        roster: Roster,
        settings: SessionSettings,
        collaborators: Collaborators,
        photos: Option<PhotoSink>,
    ) -> Self {
        let state = SessionState::new(settings.cooldown, settings.unknown_threshold);
        Self {
            shared: Arc::new(SessionShared {
                core: Mutex::new(SessionCore {
                    state,
                    camera: CameraSession::new(),
                }),
                queue: AttendanceQueue::new(),
                frames: FrameCache::new(),
                roster,
                settings,
                collaborators,
                photos,
            }),
        }
    }

    /// Spawn the capture loop; rejected if it is already running
    pub fn start(&self) -> Result<(), SessionError> {
        let mut core = self.shared.core.lock();
        if core.camera.is_running() {
            return Err(SessionError::AlreadyRunning);
        }

        let generation = core.camera.begin();
        let previous = core.camera.task.take();
        let shared = Arc::clone(&self.shared);

        let spawned = thread::Builder::new()
            .name(format!("capture-{}", generation))
            .spawn(move || {
                // The previous run may still hold the camera
                if let Some(previous) = previous {
                    if previous.join().is_err() {
                        warn!("Previous capture run panicked");
                    }
                }
                runner::run(shared, generation);
            });

        match spawned {
            Ok(handle) => {
                core.camera.task = Some(handle);
                info!("📷 Camera start requested (run #{})", generation);
                Ok(())
            }
            Err(e) => {
                core.camera.finish(generation);
                Err(SessionError::Spawn(e.to_string()))
            }
        }
    }

    /// Ask the capture loop to stop at its next iteration boundary
    pub fn stop(&self) -> Result<(), SessionError> {
        let mut core = self.shared.core.lock();
        let generation = core.camera.generation;
        if !core.camera.finish(generation) {
            return Err(SessionError::NotRunning);
        }
        info!("📷 Camera stop requested (run #{})", generation);
        Ok(())
    }

    /// Clear scanned names, unknown counters, last scan and pending records
    pub fn reset(&self) -> usize {
        let mut core = self.shared.core.lock();
        let drained = core.state.reset(&self.shared.queue);
        info!("🔄 Reset all scanned students ({} pending record(s) dropped)", drained);
        drained
    }

    pub fn status(&self) -> SessionStatus {
        let core = self.shared.core.lock();
        SessionStatus {
            running: core.camera.is_running(),
            last_scan: core.state.last_scan_view(),
            total_scanned: core.state.total_scanned(),
            scanned_students: core.state.scanned_names().to_vec(),
            pending_unknown: core.state.unknown().len(),
        }
    }

    /// Accept an attendance record that did not come from the camera
    pub fn submit(&self, student_name: &str, student_id: &str) -> Result<AttendanceRecord, SessionError> {
        let student_name = student_name.trim();
        let student_id = student_id.trim();
        if student_name.is_empty() {
            return Err(SessionError::MissingField("studentName"));
        }
        if student_id.is_empty() {
            return Err(SessionError::MissingField("studentId"));
        }

        let record = AttendanceRecord {
            student_name: student_name.to_string(),
            student_id: student_id.to_string(),
        };

        let mut core = self.shared.core.lock();
        match core.state.submit(record.clone(), &self.shared.queue) {
            Ok(()) => Ok(record),
            Err(e) => {
                warn!("⚠️ {}", e);
                Err(e)
            }
        }
    }

    /// Run one detection through the decision algorithm
    pub fn process_detection(&self, event: &DetectionEvent) -> ScanOutcome {
        self.shared.process(event)
    }

    /// Pop the oldest pending attendance record; never blocks
    pub fn next_record(&self) -> Option<AttendanceRecord> {
        self.shared.queue.try_dequeue()
    }

    pub fn latest_frame(&self) -> Option<EncodedFrame> {
        self.shared.frames.read()
    }

    pub fn is_running(&self) -> bool {
        self.shared.core.lock().camera.is_running()
    }

    pub fn roster(&self) -> &Roster {
        &self.shared.roster
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    /// Stop the loop if needed and wait for the capture thread to exit
    pub fn shutdown(&self) {
        let task = {
            let mut core = self.shared.core.lock();
            let generation = core.camera.generation;
            core.camera.finish(generation);
            core.camera.task.take()
        };

        if let Some(task) = task {
            debug!("Waiting for capture thread to exit");
            if task.join().is_err() {
                warn!("Capture thread panicked");
            }
        }

        if let Some(photos) = &self.shared.photos {
            let stats = photos.stats();
            info!(
                "Photos: {} saved, {} dropped, {} failed",
                stats.saved, stats.dropped, stats.failed
            );
        }

        let total = self.shared.core.lock().state.total_scanned();
        info!("📊 Session complete. Total unique students scanned: {}", total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::fakes::{FakeCameraProvider, FakeVision};
    use crate::session::types::{Candidate, UNKNOWN_STUDENT};
    use std::time::Instant;

    fn idle_controller() -> SessionController {
        let (collaborators, _, _) = fake_collaborators(None);
        SessionController::new(
            Roster::new(["Ryan Fu", "Alice Su"]),
            SessionSettings::default(),
            collaborators,
            None,
        )
    }

    fn fake_collaborators(
        frames: Option<usize>,
    ) -> (Collaborators, Arc<FakeCameraProvider>, Arc<FakeVision>) {
        let camera = Arc::new(FakeCameraProvider::new(frames));
        let vision = Arc::new(FakeVision::default());
        (
            Collaborators {
                camera: camera.clone(),
                decoder: vision.clone(),
                recognizer: vision.clone(),
                photo_locator: vision.clone(),
                encoder: vision.clone(),
            },
            camera,
            vision,
        )
    }

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn detect(controller: &SessionController, id: &str, candidate: Candidate) -> ScanOutcome {
        controller.process_detection(&DetectionEvent::new(id, candidate, Instant::now()))
    }

    #[test]
    fn test_scenario_single_read_then_repeat() {
        let controller = idle_controller();

        detect(&controller, "B1", Candidate::Roster("Ryan Fu".into()));
        let repeat = detect(&controller, "B1", Candidate::Roster("Ryan Fu".into()));

        assert_eq!(repeat, ScanOutcome::Duplicate { name: "Ryan Fu".into() });
        assert_eq!(
            controller.next_record(),
            Some(AttendanceRecord {
                student_name: "Ryan Fu".into(),
                student_id: "B1".into()
            })
        );
        assert_eq!(controller.next_record(), None);
    }

    #[test]
    fn test_scenario_unknown_badges() {
        let controller = idle_controller();

        for _ in 0..14 {
            detect(&controller, "B2", Candidate::Unknown);
        }
        assert_eq!(controller.next_record(), None);

        detect(&controller, "B2", Candidate::Unknown);
        assert_eq!(
            controller.next_record(),
            Some(AttendanceRecord {
                student_name: UNKNOWN_STUDENT.into(),
                student_id: "B2".into()
            })
        );

        // A different unknown badge collides with the first one
        let outcomes: Vec<_> = (0..15)
            .map(|_| detect(&controller, "B3", Candidate::Unknown))
            .collect();
        assert!(matches!(
            outcomes.last(),
            Some(ScanOutcome::ProvisionalCollision { .. })
        ));
        assert_eq!(controller.next_record(), None);
    }

    #[test]
    fn test_scenario_direct_submission_duplicate() {
        let controller = idle_controller();
        detect(&controller, "B1", Candidate::Roster("Ryan Fu".into()));

        let result = controller.submit("Ryan Fu", "X");
        assert_eq!(result, Err(SessionError::Duplicate { name: "Ryan Fu".into() }));
    }

    #[test]
    fn test_submit_validates_fields() {
        let controller = idle_controller();

        assert_eq!(
            controller.submit("  ", "X"),
            Err(SessionError::MissingField("studentName"))
        );
        assert_eq!(
            controller.submit("Alice Su", ""),
            Err(SessionError::MissingField("studentId"))
        );
        assert_eq!(controller.status().total_scanned, 0);

        let record = controller.submit(" Alice Su ", "S1").unwrap();
        assert_eq!(record.student_name, "Alice Su");
        assert_eq!(controller.next_record(), Some(record));
    }

    #[test]
    fn test_reset_and_status() {
        let controller = idle_controller();
        detect(&controller, "B1", Candidate::Roster("Ryan Fu".into()));
        detect(&controller, "B4", Candidate::Roster("Alice Su".into()));
        detect(&controller, "B9", Candidate::Unknown);

        let status = controller.status();
        assert!(!status.running);
        assert_eq!(status.total_scanned, 2);
        assert_eq!(status.scanned_students, vec!["Ryan Fu", "Alice Su"]);
        assert_eq!(status.pending_unknown, 1);
        assert_eq!(status.last_scan.as_ref().map(|l| l.id.as_str()), Some("B4"));

        assert_eq!(controller.reset(), 2);

        let status = controller.status();
        assert_eq!(status.total_scanned, 0);
        assert!(status.scanned_students.is_empty());
        assert!(status.last_scan.is_none());
        assert_eq!(status.pending_unknown, 0);
        assert_eq!(controller.next_record(), None);
    }

    #[test]
    fn test_stop_when_stopped_is_rejected() {
        let controller = idle_controller();
        assert_eq!(controller.stop(), Err(SessionError::NotRunning));
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let (collaborators, camera, _) = fake_collaborators(None);
        let controller = SessionController::new(
            Roster::new(["Ryan Fu"]),
            SessionSettings {
                loop_interval: Duration::from_millis(1),
                ..SessionSettings::default()
            },
            collaborators,
            None,
        );

        controller.start().unwrap();
        assert_eq!(controller.start(), Err(SessionError::AlreadyRunning));
        assert!(controller.status().running);

        wait_until("first frame", || controller.latest_frame().is_some());

        controller.stop().unwrap();
        assert!(!controller.is_running());
        assert_eq!(controller.stop(), Err(SessionError::NotRunning));

        // Restart reuses the camera only after the previous run released it
        controller.start().unwrap();
        wait_until("second open", || camera.opened() == 2);
        assert_eq!(camera.max_open(), 1);

        controller.shutdown();
        assert!(!controller.is_running());
        assert_eq!(camera.open_now(), 0);
    }

    #[test]
    fn test_frame_failure_stops_the_run() {
        let (collaborators, camera, _) = fake_collaborators(Some(3));
        let controller = SessionController::new(
            Roster::new(["Ryan Fu"]),
            SessionSettings {
                loop_interval: Duration::ZERO,
                ..SessionSettings::default()
            },
            collaborators,
            None,
        );

        controller.start().unwrap();
        wait_until("run to end", || !controller.is_running());
        assert_eq!(camera.open_now(), 0);

        // Recoverable by starting again
        controller.start().unwrap();
        wait_until("second run to end", || camera.opened() == 2 && !controller.is_running());
        controller.shutdown();
    }

    #[test]
    fn test_open_failure_stops_the_run() {
        let (collaborators, camera, _) = fake_collaborators(None);
        camera.fail_open(true);
        let controller =
            SessionController::new(Roster::new(["Ryan Fu"]), SessionSettings::default(), collaborators, None);

        controller.start().unwrap();
        wait_until("failed open", || !controller.is_running());
        assert!(controller.latest_frame().is_none());
        controller.shutdown();
    }

    #[test]
    fn test_accepted_scan_saves_badge_photo() {
        let temp = tempfile::tempdir().unwrap();
        let photos = PhotoSink::spawn(temp.path(), 4).unwrap();
        let (collaborators, _, vision) = fake_collaborators(None);
        vision.show("B7", "alice su");
        vision.show_photo(Some(crate::capture::Rect::new(10, 10, 16, 16)));

        let controller = SessionController::new(
            Roster::new(["Alice Su"]),
            SessionSettings {
                loop_interval: Duration::from_millis(1),
                ..SessionSettings::default()
            },
            collaborators,
            Some(photos.clone()),
        );

        controller.start().unwrap();
        wait_until("photo written", || photos.stats().saved == 1);
        controller.shutdown();

        // Only the accepted read produced a photo, later duplicates did not
        assert_eq!(photos.stats().saved, 1);
        let written: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(written.len(), 1);
    }

    fn has_pixel(frame: &EncodedFrame, rgb: [u8; 3]) -> bool {
        frame.jpeg.chunks_exact(3).any(|px| px == rgb)
    }

    #[test]
    fn test_annotated_frame_labels_pending_read() {
        let run = |annotate: bool| {
            let (collaborators, _, vision) = fake_collaborators(None);
            vision.show("B2", "library card");
            let controller = SessionController::new(
                Roster::new(["Ryan Fu"]),
                SessionSettings {
                    loop_interval: Duration::from_millis(1),
                    annotate,
                    ..SessionSettings::default()
                },
                collaborators,
                None,
            );
            controller.start().unwrap();
            wait_until("a frame", || controller.latest_frame().is_some());
            controller.shutdown();
            controller.latest_frame().unwrap()
        };

        let annotated = run(true);
        // Orange box and label for the unknown badge, cyan header
        assert!(has_pixel(&annotated, [255, 165, 0]));
        assert!(has_pixel(&annotated, [0, 255, 255]));

        let plain = run(false);
        assert!(!has_pixel(&plain, [255, 165, 0]));
        assert!(!has_pixel(&plain, [0, 255, 255]));
    }

    #[test]
    fn test_reset_and_status_stay_consistent_under_load() {
        let controller = SessionController::new(
            Roster::new(["Ryan Fu", "Alice Su", "Kevin Tam", "Maria Lopez"]),
            SessionSettings {
                unknown_threshold: 3,
                ..SessionSettings::default()
            },
            fake_collaborators(None).0,
            None,
        );
        let names = ["Ryan Fu", "Alice Su", "Kevin Tam", "Maria Lopez"];

        thread::scope(|scope| {
            let detector = controller.clone();
            scope.spawn(move || {
                for i in 0..20_000usize {
                    let candidate = if i % 5 == 0 {
                        Candidate::Unknown
                    } else {
                        Candidate::Roster(names[i % names.len()].to_string())
                    };
                    detector.process_detection(&DetectionEvent::new(
                        format!("B{}", i % 7),
                        candidate,
                        Instant::now(),
                    ));
                }
            });

            let observer = controller.clone();
            scope.spawn(move || {
                for i in 0..2_000usize {
                    if i % 10 == 0 {
                        observer.reset();
                    }
                    let status = observer.status();
                    assert_eq!(status.total_scanned, status.scanned_students.len());
                    if status.total_scanned == 0 {
                        assert!(status.last_scan.is_none(), "last scan survived a reset");
                    } else {
                        let last = status.last_scan.as_ref().expect("scan without last scan");
                        assert!(status.scanned_students.contains(&last.name));
                    }
                }
            });
        });

        controller.reset();
        assert_eq!(controller.next_record(), None);
        let status = controller.status();
        assert_eq!(status.total_scanned, 0);
        assert!(status.last_scan.is_none());
        assert_eq!(status.pending_unknown, 0);
    }

    #[test]
    fn test_capture_loop_feeds_queue() {
        let (collaborators, _, vision) = fake_collaborators(None);
        vision.show("B1", "ID CARD\nryan fu");
        let controller = SessionController::new(
            Roster::new(["Alice Su", "Ryan Fu"]),
            SessionSettings {
                loop_interval: Duration::from_millis(1),
                ..SessionSettings::default()
            },
            collaborators,
            None,
        );

        controller.start().unwrap();
        wait_until("first record", || controller.status().total_scanned == 1);
        wait_until("a few more frames", || {
            controller.latest_frame().map(|f| f.sequence).unwrap_or(0) > 5
        });
        controller.stop().unwrap();
        controller.shutdown();

        assert_eq!(
            controller.next_record(),
            Some(AttendanceRecord {
                student_name: "Ryan Fu".into(),
                student_id: "B1".into()
            })
        );
        // Later frames of the same badge were duplicates
        assert_eq!(controller.next_record(), None);
    }
}
