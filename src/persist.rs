//! Atomic file persistence.
//!
//! Both durable files (the machine context and the ledger) are written with a
//! write-temp-then-rename discipline, so a reader never observes a partially
//! written file and a failed write leaves the previous contents intact.

use std::fs;
use std::io;
use std::path::Path;

/// Write `contents` to `path` atomically: write to a temp sibling, then
/// rename over the destination. Parent directories are created as needed.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_new_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.json");

        write_atomic(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn overwrites_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.json");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/out.json");

        write_atomic(&path, "data").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "data");
    }

    #[test]
    fn leaves_no_temp_file_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.json");

        write_atomic(&path, "data").unwrap();
        assert!(!tmp.path().join("out.tmp").exists());
    }
}
