//! User-editable engine settings, stored as TOML in the preferences directory.

const DOCUMENTATION: &str = r"# Paint engine settings. You may edit this file, but formatting and comments will not be preserved.
# Missing keys take their default values.

# tick_rate_hz: how often queued messages are applied and observers notified.
# local_user: context id of the local user, whose messages are shown ahead of the server.
# snapshot_max_states / snapshot_max_messages: how far back undo can reach.
# render_threads: size of the compositing pool, 0 to pick automatically.

";

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no preferences directory found")]
    NoPreferencesDir,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid setting `{0}`")]
    Invalid(&'static str),
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_rate_hz: u32,
    pub local_user: paintengine_core::UserId,
    pub snapshot_max_states: usize,
    pub snapshot_max_messages: u64,
    pub render_threads: usize,
}
impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            local_user: 0,
            snapshot_max_states: 16,
            snapshot_max_messages: 50_000,
            render_threads: 0,
        }
    }
}
impl EngineConfig {
    pub const FILENAME: &'static str = "engine.toml";
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let string = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&string)?;
        config.validate()?;
        Ok(config)
    }
    /// Load from `path`, or fall back on defaults if it is missing or broken.
    #[must_use]
    pub fn load_or_default(path: &std::path::Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!(
                    "engine settings at {} unavailable, defaulting: {e}",
                    path.display()
                );
                Self::default()
            }
        }
    }
    /// Settings from the user's preferences directory, or defaults.
    #[must_use]
    pub fn from_preferences() -> Self {
        let config: Result<Self, ConfigError> = try_block::try_block! {
            let mut path = preferences_dir().ok_or(ConfigError::NoPreferencesDir)?;
            path.push(Self::FILENAME);
            Self::load(&path)
        };
        config.unwrap_or_else(|e| {
            log::warn!("engine settings weren't available, defaulting: {e}");
            Self::default()
        })
    }
    /// Write to the preferences directory, returning the path written.
    pub fn save(&self) -> Result<std::path::PathBuf, ConfigError> {
        let mut preferences = preferences_dir().ok_or(ConfigError::NoPreferencesDir)?;
        // Not recursive. Real errors surface from the write below.
        let _ = std::fs::DirBuilder::new().create(&preferences);
        preferences.push(Self::FILENAME);
        self.save_to(&preferences)?;
        Ok(preferences)
    }
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        self.validate()?;
        let string = DOCUMENTATION.to_owned() + &toml::ser::to_string_pretty(self)?;
        std::fs::write(path, string)?;
        Ok(())
    }
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 1000 {
            return Err(ConfigError::Invalid("tick_rate_hz"));
        }
        if self.snapshot_max_states == 0 {
            return Err(ConfigError::Invalid("snapshot_max_states"));
        }
        Ok(())
    }
    #[must_use]
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }
}

#[cfg(test)]
mod test {
    use super::{ConfigError, EngineConfig};

    #[test]
    fn partial_file() {
        let config: EngineConfig = toml::from_str("tick_rate_hz = 30\nlocal_user = 4").unwrap();
        assert_eq!(config.tick_rate_hz, 30);
        assert_eq!(config.local_user, 4);
        assert_eq!(config.snapshot_max_states, 16);
        assert_eq!(config.tick_interval(), std::time::Duration::from_millis(1000) / 30);
    }
    #[test]
    fn save_and_load() {
        let path = std::env::temp_dir().join(format!("paintengine-config-{}.toml", std::process::id()));
        let config = EngineConfig {
            render_threads: 2,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);

        std::fs::write(&path, "tick_rate_hz = 0").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Invalid("tick_rate_hz"))
        ));
        assert_eq!(EngineConfig::load_or_default(&path), EngineConfig::default());
        let _ = std::fs::remove_file(&path);
    }
}
