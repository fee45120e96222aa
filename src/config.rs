use anyhow::{bail, Result};
use entsync_net::SyncConfig;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/entsync.toml";

/// Everything a headless run needs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimConfig {
    pub sync: SyncConfig,
    pub scene: SceneConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Entities in the scene, numbered from 1.
    pub entities: u16,
    /// Frames simulated under loss.
    pub frames: u64,
    /// Lossless frames run afterwards to let the client catch up.
    pub settle_frames: u64,
    pub seed: u64,
    /// Chance (percent) that an entity frame or an ack is dropped.
    pub loss_percent: u8,
    pub ack_delay_frames: u64,
    /// Entity the viewer sits on.
    pub view_entity: u16,
    /// Radius entities wander in.
    pub spread: f32,
    /// Chance per frame, in thousandths, that an entity vanishes or returns.
    pub churn_per_mille: u16,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            entities: 64,
            frames: 600,
            settle_frames: 40,
            seed: 1337,
            loss_percent: 10,
            ack_delay_frames: 2,
            view_entity: 1,
            spread: 2048.0,
            churn_per_mille: 5,
        }
    }
}

impl SimConfig {
    /// Load configuration from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<SimConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    SimConfig::default()
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                } else {
                    warn!(
                        "Sim config not found at {}. Using defaults",
                        path.display()
                    );
                }
                SimConfig::default()
            }
        }
    }

    /// Save configuration to an explicit path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        Ok(())
    }

    /// Reject combinations the session cannot run.
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        let scene = &self.scene;
        if scene.entities == 0 || scene.entities as usize >= self.sync.max_entities {
            bail!(
                "scene.entities must be in 1..{}, got {}",
                self.sync.max_entities,
                scene.entities
            );
        }
        if scene.view_entity == 0 || scene.view_entity > scene.entities {
            bail!(
                "scene.view_entity must be in 1..={}, got {}",
                scene.entities,
                scene.view_entity
            );
        }
        if scene.loss_percent > 100 {
            bail!("scene.loss_percent must be at most 100, got {}", scene.loss_percent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entsync_net::Precision;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "{name}-{}.toml",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn defaults_validate() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: SimConfig = toml::from_str(
            r#"
            [sync]
            precision = "low"

            [scene]
            loss_percent = 40
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sync.precision, Precision::Low);
        assert_eq!(cfg.sync.max_entities, SyncConfig::default().max_entities);
        assert_eq!(cfg.scene.loss_percent, 40);
        assert_eq!(cfg.scene.entities, SceneConfig::default().entities);
    }

    #[test]
    fn unreadable_or_invalid_files_fall_back_to_defaults() {
        let missing = temp_path("entsync-missing");
        assert_eq!(SimConfig::load_from_path(&missing), SimConfig::default());

        let broken = temp_path("entsync-broken");
        fs::write(&broken, "[scene\nentities = ").unwrap();
        assert_eq!(SimConfig::load_from_path(&broken), SimConfig::default());
        fs::remove_file(&broken).ok();
    }

    #[test]
    fn save_then_load_preserves_values() {
        let path = temp_path("entsync-saved");
        let mut cfg = SimConfig::default();
        cfg.scene.frames = 42;
        cfg.sync.max_packet_size = 512;
        cfg.save_to_path(&path).unwrap();
        assert_eq!(SimConfig::load_from_path(&path), cfg);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn scene_must_fit_the_database() {
        let mut cfg = SimConfig::default();
        cfg.sync.max_entities = 16;
        cfg.scene.entities = 16;
        assert!(cfg.validate().is_err());
        cfg.scene.entities = 15;
        cfg.scene.view_entity = 20;
        assert!(cfg.validate().is_err());
    }
}
