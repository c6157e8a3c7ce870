//! The capture loop: grab, decode, decide, publish, pace
//!
//! Runs on its own thread for the lifetime of one capture run. The stop
//! request is only checked between iterations, so a frame that has started
//! processing always finishes its full decision pass.

use chrono::Local;
use image::imageops;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::overlay::{self, Hud, Mark};
use super::photos::PhotoJob;
use super::{Frame, Rect};
use crate::session::controller::SessionShared;
use crate::session::{AttendanceRecord, Candidate, DetectionEvent, ScanOutcome};

pub(crate) fn run(shared: Arc<SessionShared>, generation: u64) {
    let mut camera = match shared.collaborators.camera.open() {
        Ok(camera) => camera,
        Err(e) => {
            error!("❌ Cannot open camera: {}", e);
            shared.finish_run(generation);
            return;
        }
    };
    info!("📷 Camera started successfully (run #{})", generation);

    let mut frames = 0u64;
    while shared.is_current(generation) {
        let mut frame = match camera.grab() {
            Ok(frame) => frame,
            Err(e) => {
                error!("❌ Failed to read frame: {}", e);
                break;
            }
        };

        process_frame(&shared, &mut frame);
        frames += 1;

        if !shared.settings.loop_interval.is_zero() {
            thread::sleep(shared.settings.loop_interval);
        }
    }

    // Release the device before reporting the run as stopped
    drop(camera);
    shared.finish_run(generation);
    info!("📷 Camera released after {} frame(s) (run #{})", frames, generation);
}

fn process_frame(shared: &SessionShared, frame: &mut Frame) {
    let collaborators = &shared.collaborators;

    let barcodes = collaborators.decoder.decode(frame).unwrap_or_else(|e| {
        warn!("Barcode decoding failed: {:#}", e);
        Vec::new()
    });
    let photo = collaborators.photo_locator.locate(frame);
    let mut marks = Vec::with_capacity(barcodes.len() + 1);

    if !barcodes.is_empty() {
        match collaborators.recognizer.recognize(frame) {
            Ok(text) => {
                debug!("Raw OCR text: {:?}", text);
                let candidate = Candidate::from_match(shared.roster.match_text(&text));
                let now = Instant::now();

                for barcode in &barcodes {
                    let event = DetectionEvent::new(barcode.id.clone(), candidate.clone(), now);
                    let outcome = shared.process(&event);

                    if let (ScanOutcome::Accepted(record), Some(rect)) = (&outcome, photo) {
                        save_photo(shared, frame, rect, record);
                    }
                    marks.push(Mark::for_outcome(barcode.rect, &barcode.id, &outcome));
                }
            }
            Err(e) => warn!("OCR failed, skipping {} barcode(s): {:#}", barcodes.len(), e),
        }
    }

    if shared.settings.annotate {
        if let Some(rect) = photo {
            marks.push(Mark::photo(rect));
        }
        overlay::draw(&mut frame.image, &marks, Some(&shared.hud()));
    }

    match collaborators.encoder.encode(frame) {
        Ok(jpeg) => {
            shared.frames.swap(jpeg, frame.captured_at);
        }
        Err(e) => warn!("Frame not published: {:#}", e),
    }
}

/// Hand the badge photo to the writer thread; never fails the decision
fn save_photo(shared: &SessionShared, frame: &Frame, rect: Rect, record: &AttendanceRecord) {
    let Some(sink) = &shared.photos else {
        return;
    };
    let Some(rect) = rect.clamp_to(frame.image.width(), frame.image.height()) else {
        debug!("Photo region outside the frame, not saved");
        return;
    };

    let crop = imageops::crop_imm(&frame.image, rect.x, rect.y, rect.width, rect.height).to_image();
    sink.submit(PhotoJob {
        image: crop,
        barcode_id: record.student_id.clone(),
        student_name: record.student_name.clone(),
        taken_at: Local::now(),
    });
}
