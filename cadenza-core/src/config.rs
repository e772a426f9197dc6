use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "CADENZA_CONFIG";
/// Environment variable overriding [`Config::sound_root`].
pub const SOUND_ROOT_ENV: &str = "CADENZA_SOUND_ROOT";

/// Settings shared by the controller and the engines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the on-disk library: `<sound_root>/<uuid>/<disc>/<track>.<ext>`
    pub sound_root: PathBuf,
    /// Played in place of a track whose file is missing
    pub alert_sound: PathBuf,
    /// File extensions in order of preference, lossless first
    pub codecs: Vec<String>,
    /// CD drive handed to the ripping tools
    pub cd_device: String,
    pub cdparanoia: PathBuf,
    pub flac: PathBuf,
    /// Engine binary spawned by the controller; defaults to the one next to
    /// the running executable
    pub engine_program: Option<PathBuf>,
    pub tick_interval_ms: u64,
    /// How long before the natural end of a track the next one is pre-bound
    pub about_to_finish_ms: u64,
    /// How long an engine may take to exit after SIGINT before it is killed
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            sound_root: data.join("cadenza").join("sound"),
            alert_sound: data.join("cadenza").join("alert.ogg"),
            codecs: ["flac", "wav", "ogg", "mp3"].map(String::from).to_vec(),
            cd_device: "/dev/cdrom".to_string(),
            cdparanoia: PathBuf::from("cdparanoia"),
            flac: PathBuf::from("flac"),
            engine_program: None,
            tick_interval_ms: 500,
            about_to_finish_ms: 1300,
            shutdown_grace_ms: 2000,
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// Lookup order: `path`, then `$CADENZA_CONFIG`, then
    /// `<config dir>/cadenza/config.toml` when it exists, then defaults.
    /// `$CADENZA_SOUND_ROOT` always wins over the file.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match dirs::config_dir().map(|d| d.join("cadenza").join("config.toml")) {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        if let Some(root) = std::env::var_os(SOUND_ROOT_ENV) {
            config.sound_root = PathBuf::from(root);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// The engine binary to spawn.
    pub fn engine_program(&self) -> PathBuf {
        if let Some(program) = &self.engine_program {
            return program.clone();
        }
        let name = format!("cadenza-engine{}", std::env::consts::EXE_SUFFIX);
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
