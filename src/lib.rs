//! Attendance GW - barcode + OCR attendance session coordinator
//!
//! Turns raw camera detections into a deduplicated, rate-limited attendance
//! feed that an HTTP front-end polls one record at a time.

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod roster;
pub mod session;
