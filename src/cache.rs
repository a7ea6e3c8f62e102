//! Engine cache directory maintenance.

use std::fs;
use std::io;
use std::path::Path;

/// Total size in bytes of the regular files under `dir`. Missing dir is 0.
pub fn dir_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Remove everything inside `dir`, keeping the directory itself.
///
/// Returns the number of bytes freed.
pub fn clear_dir(dir: &Path) -> io::Result<u64> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let freed = dir_size(dir);
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let removed = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = removed {
            log::warn!("Failed to remove {}: {e}", path.display());
            return Err(e);
        }
    }
    Ok(freed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(dir_size(&missing), 0);
        assert_eq!(clear_dir(&missing).unwrap(), 0);
    }

    #[test]
    fn clear_keeps_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a").join("b")).unwrap();
        fs::write(dir.path().join("a").join("b").join("chunk"), [1u8; 300]).unwrap();
        fs::write(dir.path().join("top"), [1u8; 12]).unwrap();

        assert_eq!(dir_size(dir.path()), 312);
        assert_eq!(clear_dir(dir.path()).unwrap(), 312);
        assert!(dir.path().is_dir());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
