use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use lofty::{
    file::{AudioFile, TaggedFileExt},
    probe::Probe,
    tag::Accessor,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    Unsupported,
}

impl Display for ChannelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChannelLayout::Mono => "Mono",
            ChannelLayout::Stereo => "Stereo",
            ChannelLayout::Unsupported => "Unsupported",
        };
        write!(f, "{}", label)
    }
}

impl ChannelLayout {
    pub fn from_channels(num_channels: u16) -> ChannelLayout {
        match num_channels {
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::Stereo,
            _ => ChannelLayout::Unsupported,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Audio format (mp3, flac, wav, ogg, etc)
    pub format: String,
    /// sample rate / sampling frequency (f_s)
    pub sample_rate: u32,
    pub num_channels: u16,
    pub channel_layout: ChannelLayout,
    /// Length in nanoseconds, the unit `append-queue` takes
    pub duration_ns: u64,
    pub title: Option<String>,
    /// Artist (if many then separated by semicolon)
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
}

impl Default for TrackMetadata {
    fn default() -> Self {
        Self {
            format: String::new(),
            sample_rate: 0,
            num_channels: 0,
            channel_layout: ChannelLayout::Unsupported,
            duration_ns: 0,
            title: None,
            artist: None,
            album: None,
            genre: None,
        }
    }
}

impl TrackMetadata {
    /// Read stream properties and the primary tag of an audio file.
    ///
    /// A file without tags is not an error; its title falls back to the file
    /// stem.
    pub fn probe(path: &Path) -> anyhow::Result<Self> {
        let tagged_file = Probe::open(path)
            .and_then(|p| p.read())
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let properties = tagged_file.properties();
        let num_channels = properties.channels().map(u16::from).unwrap_or(0);

        let mut metadata = TrackMetadata {
            format: path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_lowercase(),
            sample_rate: properties.sample_rate().unwrap_or(0),
            num_channels,
            channel_layout: ChannelLayout::from_channels(num_channels),
            duration_ns: properties.duration().as_nanos() as u64,
            ..Default::default()
        };

        if let Some(tag) = tagged_file.primary_tag() {
            metadata.title = tag.title().map(|s| s.to_string());
            metadata.artist = tag.artist().map(|s| s.to_string());
            metadata.album = tag.album().map(|s| s.to_string());
            metadata.genre = tag.genre().map(|s| s.to_string());
        } else {
            log::debug!("{} has no tags", path.display());
        }

        if metadata.title.is_none() {
            metadata.title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string());
        }
        Ok(metadata)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_ns)
    }
}

impl Display for TrackMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.duration().as_secs();
        let title = self.title.as_deref().unwrap_or("Unknown Title");
        let artist = self.artist.as_deref().unwrap_or("Unknown Artist");
        let album = self.album.as_deref().unwrap_or("Unknown Album");

        writeln!(f, "Track:  {} - {}", title, artist)?;
        writeln!(f, "Album:  {}", album)?;
        writeln!(f, "Length: {:02}:{:02}", secs / 60, secs % 60)?;
        write!(
            f,
            "Format: {} ({:.1} kHz, {})",
            self.format.to_uppercase(),
            self.sample_rate as f32 / 1000.0,
            self.channel_layout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_maps_to_layout() {
        assert_eq!(ChannelLayout::from_channels(1), ChannelLayout::Mono);
        assert_eq!(ChannelLayout::from_channels(2), ChannelLayout::Stereo);
        assert_eq!(ChannelLayout::from_channels(6), ChannelLayout::Unsupported);
    }

    #[test]
    fn display_fills_in_unknown_tags() {
        let metadata = TrackMetadata {
            format: "flac".into(),
            sample_rate: 44_100,
            num_channels: 2,
            channel_layout: ChannelLayout::Stereo,
            duration_ns: 200 * 1_000_000_000,
            ..Default::default()
        };
        let text = metadata.to_string();
        assert!(text.contains("Unknown Title - Unknown Artist"));
        assert!(text.contains("Length: 03:20"));
        assert!(text.contains("FLAC (44.1 kHz, Stereo)"));
    }

    #[test]
    fn probing_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.flac");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(TrackMetadata::probe(&path).is_err());
    }
}
