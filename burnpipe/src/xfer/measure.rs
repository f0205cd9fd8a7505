//! Size of a source tree.

use std::fs;
use std::path::Path;

use crate::error::{BurnError, EngineResult};

/// Sum the sizes of every regular file and symlink under `src`.
///
/// Symlinks are not followed and count as the size of the link itself.
/// Directories contribute nothing of their own.
pub fn measure(src: &Path) -> EngineResult<u64> {
    let metadata = fs::symlink_metadata(src).map_err(|e| BurnError::transfer(src, e))?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0u64;
    for entry in fs::read_dir(src).map_err(|e| BurnError::transfer(src, e))? {
        let entry = entry.map_err(|e| BurnError::transfer(src, e))?;
        total = total.saturating_add(measure(&entry.path())?);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.bin");
        fs::write(&file, vec![0u8; 1234]).unwrap();

        assert_eq!(measure(&file).unwrap(), 1234);
    }

    #[test]
    fn test_nested_tree() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("x/y");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp.path().join("a"), b"12345").unwrap();
        fs::write(temp.path().join("x/b"), b"123").unwrap();
        fs::write(nested.join("c"), b"1").unwrap();

        assert_eq!(measure(temp.path()).unwrap(), 9);
    }

    #[test]
    fn test_symlink_not_followed() {
        let temp = TempDir::new().unwrap();
        let big = temp.path().join("big");
        fs::write(&big, vec![0u8; 10_000]).unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&big, &link).unwrap();

        let link_size = fs::symlink_metadata(&link).unwrap().len();
        assert_eq!(measure(&link).unwrap(), link_size);
        assert!(link_size < 10_000);
    }

    #[test]
    fn test_missing_source_carries_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");

        match measure(&missing) {
            Err(BurnError::Transfer { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
