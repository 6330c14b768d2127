//! Workspace Layout
//!
//! Output directories are derived from the document's path alone; setup and
//! cleanup are idempotent.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::naming::Platform;

const UNTITLED: &str = "Untitled";

/// Host facts used to pick output locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub home_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl PlatformInfo {
    pub fn detect() -> Self {
        Self::detect_for(Platform::current())
    }

    pub fn detect_for(platform: Platform) -> Self {
        let home_dir = std::env::var_os(platform.home_var())
            .map(PathBuf::from)
            .unwrap_or_default();
        Self {
            platform,
            home_dir,
            temp_dir: std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Preview,
    Final,
}

impl OutputMode {
    pub fn root_in<'a>(&self, workspace: &'a Workspace) -> &'a Path {
        match self {
            Self::Preview => &workspace.preview_dir,
            Self::Final => &workspace.uncompressed_dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    pub document_name: String,
    pub document_dir: PathBuf,
    pub using_temp_dir: bool,
    /// Where the packaged `.lsr` file belongs.
    pub lsr_path: PathBuf,
    pub save_dir: PathBuf,
    pub preview_dir: PathBuf,
    pub uncompressed_dir: PathBuf,
}

impl Workspace {
    pub fn derive(document_file: Option<&Path>, info: &PlatformInfo) -> Self {
        let document_name = document_file
            .and_then(Path::file_name)
            .map(|n| {
                let n = n.to_string_lossy();
                n.strip_suffix(".psd").unwrap_or(&n).to_string()
            })
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let parent = document_file
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty() && *p != Path::new("."));

        let lsr_name = format!("{}.lsr", document_name);
        let (document_dir, using_temp_dir, lsr_path) = match parent {
            Some(dir) => (dir.to_path_buf(), false, dir.join(&lsr_name)),
            None => (
                info.temp_dir.clone(),
                true,
                info.home_dir.join("Desktop").join(&lsr_name),
            ),
        };

        let save_dir = document_dir.join(format!("{}-assets-files", document_name));
        Self {
            preview_dir: save_dir.join("preview"),
            uncompressed_dir: save_dir.join("uncompressed"),
            document_name,
            document_dir,
            using_temp_dir,
            lsr_path,
            save_dir,
        }
    }

    /// Remove every previous output. A missing directory is not an error.
    pub fn cleanup(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.save_dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    pub fn setup(&self, include_preview: bool) -> io::Result<()> {
        fs::create_dir_all(&self.uncompressed_dir)?;
        if include_preview {
            fs::create_dir_all(&self.preview_dir)?;
        }
        Ok(())
    }

    pub fn reset(&self, include_preview: bool) -> io::Result<()> {
        self.cleanup()?;
        self.setup(include_preview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> PlatformInfo {
        PlatformInfo {
            platform: Platform::Unix,
            home_dir: PathBuf::from("/home/me"),
            temp_dir: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn test_layout_next_to_document() {
        let ws = Workspace::derive(Some(Path::new("/work/poster.psd")), &info());
        assert_eq!(ws.document_name, "poster");
        assert!(!ws.using_temp_dir);
        assert_eq!(ws.save_dir, PathBuf::from("/work/poster-assets-files"));
        assert_eq!(ws.preview_dir, PathBuf::from("/work/poster-assets-files/preview"));
        assert_eq!(ws.uncompressed_dir, PathBuf::from("/work/poster-assets-files/uncompressed"));
        assert_eq!(ws.lsr_path, PathBuf::from("/work/poster.lsr"));
    }

    #[test]
    fn test_unsaved_document_uses_temp_and_desktop() {
        let ws = Workspace::derive(Some(Path::new("Untitled-1")), &info());
        assert!(ws.using_temp_dir);
        assert_eq!(ws.document_name, "Untitled-1");
        assert_eq!(ws.save_dir, PathBuf::from("/tmp/Untitled-1-assets-files"));
        assert_eq!(ws.lsr_path, PathBuf::from("/home/me/Desktop/Untitled-1.lsr"));

        let ws = Workspace::derive(None, &info());
        assert_eq!(ws.document_name, "Untitled");
    }

    #[test]
    fn test_only_psd_extension_is_stripped() {
        let ws = Workspace::derive(Some(Path::new("/work/cover.psb")), &info());
        assert_eq!(ws.document_name, "cover.psb");
    }

    #[test]
    fn test_reset_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("scene.psd");
        let ws = Workspace::derive(Some(&doc), &info());

        ws.reset(true).unwrap();
        fs::write(ws.uncompressed_dir.join("stale.txt"), b"x").unwrap();
        ws.reset(false).unwrap();

        assert!(ws.uncompressed_dir.is_dir());
        assert!(!ws.preview_dir.exists());
        assert!(!ws.uncompressed_dir.join("stale.txt").exists());
        ws.cleanup().unwrap();
        ws.cleanup().unwrap();
    }
}
