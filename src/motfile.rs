//! Motion file relabelling
//!
//! Scale and IK write a generic first line (`Coordinates`) into their
//! `.mot` outputs. Replacing it with the file stem keeps the files apart
//! when several are loaded into the OpenSim GUI.

use crate::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffixes of the motion files that get relabelled.
pub const RELABELLED_SUFFIXES: [&str; 2] = ["_Scale.mot", "_IK.mot"];

/// Replace the first line of `path` with its file stem.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read or written
pub fn relabel(path: &Path) -> Result<()> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text = std::fs::read_to_string(path)?;
    let relabelled = match text.find('\n') {
        Some(end) => {
            let crlf = text[..end].ends_with('\r');
            format!("{stem}{}{}", if crlf { "\r" } else { "" }, &text[end..])
        }
        None => stem,
    };
    std::fs::write(path, relabelled)?;
    Ok(())
}

/// Relabel every Scale and IK motion file in `subject_dir`.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be listed or a file rewritten
pub fn relabel_subject(subject_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(subject_dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| RELABELLED_SUFFIXES.iter().any(|s| n.ends_with(s)))
        })
        .collect();
    files.sort();
    for file in &files {
        relabel(file)?;
        debug!(file = %file.display(), "relabelled");
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relabel_keeps_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S1_A_Walk_IK.mot");
        std::fs::write(&path, "Coordinates\r\nversion=1\r\nnRows=2\r\n").unwrap();
        relabel(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "S1_A_Walk_IK\r\nversion=1\r\nnRows=2\r\n");
    }

    #[test]
    fn test_relabel_subject_selects_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["S1_0_StaticPose_Scale.mot", "S1_A_Walk_IK.mot", "S1_A_Walk_GRF.mot"] {
            std::fs::write(dir.path().join(name), "Coordinates\nx\n").unwrap();
        }
        let files = relabel_subject(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let grf = std::fs::read_to_string(dir.path().join("S1_A_Walk_GRF.mot")).unwrap();
        assert!(grf.starts_with("Coordinates"));
        let scale = std::fs::read_to_string(dir.path().join("S1_0_StaticPose_Scale.mot")).unwrap();
        assert_eq!(scale, "S1_0_StaticPose_Scale\nx\n");
    }
}
