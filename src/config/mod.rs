//! Configuration management for Attendance GW
//!
//! Handles loading, parsing and validation of the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

use crate::capture::encoder::DEFAULT_JPEG_QUALITY;
use crate::capture::photos::DEFAULT_QUEUE_CAPACITY;
use crate::roster::Roster;
use crate::session::{SessionSettings, DEFAULT_COOLDOWN, UNKNOWN_STUDENT};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub roster: RosterConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub photos: PhotoConfig,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Scan session rules
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
    #[serde(default = "default_unknown_threshold")]
    pub unknown_threshold: u32,
    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

/// Class roster: inline names, optionally extended from a CSV file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RosterConfig {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv: Option<PathBuf>,
}

/// Frame source and published feed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default = "default_replay_dir")]
    pub replay_dir: PathBuf,
    #[serde(default = "default_true")]
    pub loop_replay: bool,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_true")]
    pub annotate: bool,
}

/// Badge photo side-channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhotoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_photo_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl AppConfig {
    /// Load configuration from file with validation
    ///
    /// Only the inline roster is validated here; CSV names are checked by
    /// [`AppConfig::load_roster`].
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        Ok(config)
    }

    /// Parse and validate YAML content
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port cannot be 0");
        }

        if self.session.unknown_threshold == 0 {
            anyhow::bail!("session.unknown_threshold must be at least 1");
        }
        if Duration::try_from_secs_f64(self.session.cooldown_secs).is_err() {
            anyhow::bail!(
                "session.cooldown_secs {} is invalid (must be a non-negative number of seconds)",
                self.session.cooldown_secs
            );
        }

        if !(1..=100).contains(&self.camera.jpeg_quality) {
            anyhow::bail!(
                "camera.jpeg_quality {} is invalid (must be 1-100)",
                self.camera.jpeg_quality
            );
        }

        if self.photos.queue_capacity == 0 {
            anyhow::bail!("photos.queue_capacity must be at least 1");
        }

        if self.roster.names.is_empty() && self.roster.csv.is_none() {
            anyhow::bail!("roster must define names or a csv file");
        }
        validate_names(&self.roster.names)?;

        Ok(())
    }

    /// Build the roster from inline names followed by the CSV file, if any
    pub async fn load_roster(&self) -> Result<Roster> {
        let mut names = self.roster.names.clone();
        if let Some(csv) = &self.roster.csv {
            names.extend(Roster::load_csv(csv).await?);
        }
        validate_names(&names)?;

        let roster = Roster::new(names);
        if roster.is_empty() {
            anyhow::bail!("roster is empty");
        }
        Ok(roster)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            cooldown: Duration::try_from_secs_f64(self.session.cooldown_secs)
                .unwrap_or(DEFAULT_COOLDOWN),
            unknown_threshold: self.session.unknown_threshold,
            loop_interval: Duration::from_millis(self.session.loop_interval_ms),
            annotate: self.camera.annotate,
        }
    }
}

fn validate_names(names: &[String]) -> Result<()> {
    for (idx, name) in names.iter().enumerate() {
        if name.trim().is_empty() {
            anyhow::bail!("roster name {} cannot be empty", idx);
        }
        if name.trim().eq_ignore_ascii_case(UNKNOWN_STUDENT) {
            anyhow::bail!("'{}' is reserved and cannot be a roster name", UNKNOWN_STUDENT);
        }
    }
    Ok(())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            unknown_threshold: default_unknown_threshold(),
            loop_interval_ms: default_loop_interval_ms(),
            auto_start: true,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            replay_dir: default_replay_dir(),
            loop_replay: true,
            jpeg_quality: default_jpeg_quality(),
            annotate: true,
        }
    }
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_photo_dir(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5000 }
fn default_cooldown_secs() -> f64 { 3.0 }
fn default_unknown_threshold() -> u32 { crate::session::DEFAULT_UNKNOWN_THRESHOLD }
fn default_loop_interval_ms() -> u64 { 33 }
fn default_true() -> bool { true }
fn default_replay_dir() -> PathBuf { PathBuf::from("frames") }
fn default_jpeg_quality() -> u8 { DEFAULT_JPEG_QUALITY }
fn default_photo_dir() -> PathBuf { PathBuf::from("student_photos") }
fn default_queue_capacity() -> usize { DEFAULT_QUEUE_CAPACITY }
