use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Get the directories and files with one of `extensions` in a directory,
/// sorted by type (dir first) then case-insensitive name, behind a `..`
/// entry unless `path` is a root.
pub fn get_directory_content(path: &Path, extensions: &[String]) -> io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(path)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(err) => {
                log::debug!("Skipping unreadable entry: {}", err);
                continue;
            }
        };
        let is_dir = path.is_dir();

        let should_include = is_dir
            || path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
        if !should_include {
            continue;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "???".to_string());
        entries.push(FileEntry { name, path, is_dir });
    }

    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    if let Some(parent) = path.parent() {
        entries.insert(
            0,
            FileEntry {
                name: "..".to_string(),
                path: parent.to_path_buf(),
                is_dir: true,
            },
        );
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_first_then_audio_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::create_dir(dir.path().join("Alpha")).unwrap();
        for name in ["b.FLAC", "a.mp3", "notes.txt", "C.ogg"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let codecs = ["flac", "ogg", "mp3"].map(String::from).to_vec();
        let names: Vec<String> = get_directory_content(dir.path(), &codecs)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["..", "Alpha", "zeta", "a.mp3", "b.FLAC", "C.ogg"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(get_directory_content(&dir.path().join("gone"), &[]).is_err());
    }
}
