//! On-disk layout of ripped and imported recordings.
//!
//! `<sound_root>/<uuid>/<disc_num>/<track_num:02>.<ext>`, with a `.part`
//! suffix while a rip of that track is still in progress.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::protocol::TrackId;

/// Suffix of a track that is still being written.
pub const STAGING_SUFFIX: &str = "part";
/// Extension written by the ripping engine.
pub const RIP_EXTENSION: &str = "flac";

/// A playable file for a track, or the alert sound standing in for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    /// `false` when the alert sound replaced a missing file
    pub valid: bool,
}

#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
    codecs: Vec<String>,
    alert_sound: PathBuf,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>, codecs: Vec<String>, alert_sound: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            codecs,
            alert_sound: alert_sound.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.sound_root, config.codecs.clone(), &config.alert_sound)
    }

    pub fn disc_dir(&self, uuid: &str, disc_num: u32) -> PathBuf {
        self.root.join(uuid).join(disc_num.to_string())
    }

    pub fn track_path(&self, uuid: &str, track_id: TrackId, extension: &str) -> PathBuf {
        self.disc_dir(uuid, track_id.disc_num)
            .join(format!("{:02}.{}", track_id.track_num, extension))
    }

    /// Where a finished rip of the track lives.
    pub fn rip_path(&self, uuid: &str, track_id: TrackId) -> PathBuf {
        self.track_path(uuid, track_id, RIP_EXTENSION)
    }

    /// Where a rip of the track is written until it completes.
    pub fn staging_path(&self, uuid: &str, track_id: TrackId) -> PathBuf {
        staging_path_for(&self.rip_path(uuid, track_id))
    }

    /// The best existing file for a track, searching codecs in preference
    /// order.
    pub fn best_version(&self, uuid: &str, track_id: TrackId) -> Option<PathBuf> {
        self.codecs
            .iter()
            .map(|ext| self.track_path(uuid, track_id, ext))
            .find(|path| path.is_file())
    }

    /// Like [`Library::best_version`], but falls back to the alert sound.
    pub fn resolve(&self, uuid: &str, track_id: TrackId) -> Resolved {
        match self.best_version(uuid, track_id) {
            Some(path) => Resolved { path, valid: true },
            None => {
                log::warn!(
                    "No audio file for {} disc {} track {}, using alert sound",
                    uuid,
                    track_id.disc_num,
                    track_id.track_num
                );
                Resolved {
                    path: self.alert_sound.clone(),
                    valid: false,
                }
            }
        }
    }

    /// Track numbers that have at least one playable file on a disc, sorted.
    pub fn disc_tracks(&self, uuid: &str, disc_num: u32) -> std::io::Result<Vec<u32>> {
        let mut tracks = Vec::new();
        for entry in std::fs::read_dir(self.disc_dir(uuid, disc_num))? {
            let path = entry?.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !self.codecs.iter().any(|c| c.eq_ignore_ascii_case(ext)) {
                continue;
            }
            if let Some(num) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            {
                tracks.push(num);
            }
        }
        tracks.sort_unstable();
        tracks.dedup();
        Ok(tracks)
    }
}

pub fn staging_path_for(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".");
    staged.push(STAGING_SUFFIX);
    PathBuf::from(staged)
}
