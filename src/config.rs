//! Configuration management for Hark
//!
//! Provides persistent settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.hark/config.json`. Missing fields fall back
//! to defaults so a hand-edited or partial file never prevents startup.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Current config schema version
const CURRENT_VERSION: u32 = 1;

/// Global config instance for caching
static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Audio input settings
    pub audio: AudioConfig,
    /// Wake word detection settings
    pub wake: WakeConfig,
    /// Utterance capture settings
    pub capture: CaptureConfig,
    /// Speech recognition settings
    pub transcription: TranscriptionConfig,
    /// Command resolution settings
    pub resolver: ResolverConfig,
    /// Action dispatch settings
    pub dispatch: DispatchConfig,
    /// Desktop notification settings
    pub notifications: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            audio: AudioConfig::default(),
            wake: WakeConfig::default(),
            capture: CaptureConfig::default(),
            transcription: TranscriptionConfig::default(),
            resolver: ResolverConfig::default(),
            dispatch: DispatchConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Audio input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name (None for system default)
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { device: None }
    }
}

/// Wake word detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Path to the wake word model file (.rpw). None means
    /// `~/.hark/models/hark.rpw`.
    pub model_path: Option<String>,
    /// Detection score threshold in [0, 1]. Higher is stricter.
    pub threshold: f32,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            threshold: 0.5,
        }
    }
}

/// Utterance capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Hard cap on a single utterance in milliseconds. Capture always ends
    /// by this point even if the speaker has not paused.
    pub max_utterance_ms: u32,
    /// Trailing silence that ends capture early, in milliseconds
    pub trailing_silence_ms: u32,
    /// VAD aggressiveness (0-3, higher filters more non-speech)
    pub vad_aggressiveness: u8,
    /// Pause after a completed command before re-arming wake detection,
    /// in milliseconds
    pub rearm_cooldown_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_utterance_ms: 4000,
            trailing_silence_ms: 800,
            vad_aggressiveness: 2,
            rearm_cooldown_ms: 400,
        }
    }
}

/// Speech recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Directory containing the acoustic model. None means
    /// `~/.hark/models/vosk-model-small-en-us`.
    pub model_dir: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self { model_dir: None }
    }
}

/// Command resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum similarity score for a fuzzy match in [0, 1]
    pub fuzzy_threshold: f64,
    /// Name the assistant answers to; stripped from transcripts
    pub assistant_name: String,
    /// Verbs that request launching a target
    pub open_verbs: Vec<String>,
    /// Verbs that request closing a target
    pub close_verbs: Vec<String>,
    /// Phrases that shut the assistant down, matched exactly
    pub stop_phrases: Vec<String>,
    /// Filler phrases removed from transcripts before matching
    pub filler_phrases: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.75,
            assistant_name: "hark".to_string(),
            open_verbs: strings(&["open", "launch", "start", "run"]),
            close_verbs: strings(&["close", "quit", "exit", "terminate", "end", "kill"]),
            stop_phrases: strings(&["stop listening", "die"]),
            filler_phrases: strings(&[
                "please",
                "can you",
                "could you",
                "will you",
                "would you",
                "for me",
                "percent",
                "uh",
                "um",
            ]),
        }
    }
}

/// Action dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Default volume step in percent when no amount is spoken
    pub volume_step: u8,
    /// Default brightness step in percent when no amount is spoken
    pub brightness_step: u8,
    /// Session logout command. None means detect from the desktop
    /// environment at dispatch time.
    pub logout_command: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            volume_step: 5,
            brightness_step: 10,
            logout_command: None,
        }
    }
}

/// Desktop notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Whether to emit desktop notifications at all
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Get the path to the config file (~/.hark/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the path to the user app overrides file (~/.hark/apps.user.json)
pub fn get_overrides_path() -> PathBuf {
    get_config_dir().join("apps.user.json")
}

/// Get the path to the config directory (~/.hark)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".hark")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

impl WakeConfig {
    /// Resolve the wake model path, applying the default location
    pub fn resolved_model_path(&self) -> PathBuf {
        match &self.model_path {
            Some(p) => PathBuf::from(p),
            None => get_config_dir().join("models").join("hark.rpw"),
        }
    }
}

impl TranscriptionConfig {
    /// Resolve the acoustic model directory, applying the default location
    pub fn resolved_model_dir(&self) -> PathBuf {
        match &self.model_dir {
            Some(p) => PathBuf::from(p),
            None => get_config_dir().join("models").join("vosk-model-small-en-us"),
        }
    }
}

/// Ensure the config directory exists
fn ensure_config_dir() -> Result<()> {
    let dir = get_config_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
    }
    Ok(())
}

/// Load configuration from disk
fn load_from_disk() -> Result<Config> {
    let path = get_config_path();

    if !path.exists() {
        tracing::info!("Config file not found, using defaults");
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(&path).context("Failed to read config file")?;
    let config: Config = serde_json::from_str(&contents).context("Failed to parse config")?;

    // Run migrations if needed
    migrate_config(config)
}

/// Save configuration to disk
fn save_to_disk(config: &Config) -> Result<()> {
    ensure_config_dir()?;

    let path = get_config_path();
    let contents =
        serde_json::to_string_pretty(config).context("Failed to serialise config")?;
    fs::write(&path, contents).context("Failed to write config file")?;

    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config> {
    let original_version = config.version;

    // Apply migrations sequentially
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
        save_to_disk(&config)?;
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config> {
    match config.version {
        // Version 0 -> 1: initial migration
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => anyhow::bail!("Unknown config version: {}", v),
    }
}

/// Get the global config instance
fn get_config_instance() -> &'static RwLock<Config> {
    CONFIG.get_or_init(|| {
        let config = load_from_disk().unwrap_or_else(|e| {
            tracing::error!("Failed to load config, using defaults: {:#}", e);
            Config::default()
        });
        RwLock::new(config)
    })
}

/// Get a snapshot of the current configuration
///
/// The config is cached in memory and loaded from disk on first access.
/// A malformed config file logs an error and yields defaults, it never
/// prevents startup.
pub fn get_config() -> Config {
    get_config_instance().read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_current_version() {
        let config = Config::default();
        assert_eq!(config.version, CURRENT_VERSION);
    }

    #[test]
    fn test_config_serialisation_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialised: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialised.version, config.version);
        assert_eq!(deserialised.wake.threshold, config.wake.threshold);
        assert_eq!(
            deserialised.capture.max_utterance_ms,
            config.capture.max_utterance_ms
        );
        assert_eq!(
            deserialised.resolver.fuzzy_threshold,
            config.resolver.fuzzy_threshold
        );
    }

    #[test]
    fn test_capture_config_defaults() {
        let capture = CaptureConfig::default();
        assert_eq!(capture.max_utterance_ms, 4000);
        assert_eq!(capture.trailing_silence_ms, 800);
        assert_eq!(capture.vad_aggressiveness, 2);
        assert_eq!(capture.rearm_cooldown_ms, 400);
    }

    #[test]
    fn test_resolver_config_defaults() {
        let resolver = ResolverConfig::default();
        assert_eq!(resolver.fuzzy_threshold, 0.75);
        assert_eq!(resolver.assistant_name, "hark");
        assert!(resolver.open_verbs.contains(&"launch".to_string()));
        assert!(resolver.close_verbs.contains(&"quit".to_string()));
        assert!(resolver.stop_phrases.contains(&"stop listening".to_string()));
    }

    #[test]
    fn test_partial_config_deserialisation() {
        // Config should use defaults for missing fields
        let json = r#"{"version": 1, "capture": {"max_utterance_ms": 3000}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.version, 1);
        assert_eq!(config.capture.max_utterance_ms, 3000);
        assert_eq!(config.capture.trailing_silence_ms, 800); // Default
        assert_eq!(config.wake.threshold, 0.5); // Default
    }

    #[test]
    fn test_config_unknown_fields_ignored() {
        let json = r#"{
            "version": 1,
            "unknown_field": "should be ignored",
            "wake": {"threshold": 0.7, "extra": true}
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.wake.threshold, 0.7);
    }

    #[test]
    fn test_migration_from_version_0() {
        let old_config = Config {
            version: 0,
            ..Default::default()
        };

        // migrate_config persists on version change, so test the step directly
        let migrated = apply_migration(old_config).unwrap();
        assert_eq!(migrated.version, CURRENT_VERSION);
    }

    #[test]
    fn test_apply_migration_unknown_version() {
        let future_config = Config {
            version: 999,
            ..Default::default()
        };

        let result = apply_migration(future_config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Unknown config version"));
    }

    #[test]
    fn test_config_paths() {
        let path = get_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains(".hark"));
        assert!(path_str.ends_with("config.json"));

        let overrides = get_overrides_path();
        assert!(overrides.to_string_lossy().ends_with("apps.user.json"));
    }

    #[test]
    fn test_resolved_model_paths_apply_defaults() {
        let wake = WakeConfig::default();
        assert!(wake.resolved_model_path().to_string_lossy().ends_with("hark.rpw"));

        let wake = WakeConfig {
            model_path: Some("/opt/models/custom.rpw".to_string()),
            ..Default::default()
        };
        assert_eq!(
            wake.resolved_model_path(),
            PathBuf::from("/opt/models/custom.rpw")
        );

        let transcription = TranscriptionConfig::default();
        assert!(transcription
            .resolved_model_dir()
            .to_string_lossy()
            .contains("vosk-model-small-en-us"));
    }
}
