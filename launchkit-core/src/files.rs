//! Small filesystem primitives shared by install and uninstall.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Removes a file or directory tree. A missing path is not an error.
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to stat {}", path.display()));
        }
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Moves a file or directory, copying when a rename crosses filesystems.
pub fn move_path(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    debug!(
        "Rename {} -> {} failed, falling back to copy",
        from.display(),
        to.display()
    );

    if from.is_dir() {
        copy_dir(from, to)?;
    } else {
        fs::copy(from, to).with_context(|| {
            format!("Failed to copy {} to {}", from.display(), to.display())
        })?;
    }
    remove_path(from)
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)
        .with_context(|| format!("Failed to create directory: {}", to.display()))?;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        let dest = to.join(entry.file_name());
        if source.is_dir() {
            copy_dir(&source, &dest)?;
        } else {
            fs::copy(&source, &dest).with_context(|| {
                format!("Failed to copy {} to {}", source.display(), dest.display())
            })?;
        }
    }
    Ok(())
}

/// Removes empty directories from `start` upwards, never touching `root` or
/// anything outside it.
///
/// The walk stops at the first directory that can't be removed (usually
/// because it still has entries). Returns how many directories were removed.
pub fn prune_empty_dirs(start: &Path, root: &Path) -> usize {
    let mut removed = 0;
    let mut current = Some(start);

    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if fs::remove_dir(dir).is_err() {
            break;
        }
        debug!("Removed empty directory {}", dir.display());
        removed += 1;
        current = dir.parent();
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_path_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        remove_path(&temp_dir.path().join("nothing")).unwrap();
    }

    #[test]
    fn test_remove_path_file_and_tree() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("f.txt");
        let tree = temp_dir.path().join("a/b/c");
        fs::write(&file, "x").unwrap();
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("g.txt"), "y").unwrap();

        remove_path(&file).unwrap();
        remove_path(&temp_dir.path().join("a")).unwrap();

        assert!(!file.exists());
        assert!(!temp_dir.path().join("a").exists());
    }

    #[test]
    fn test_move_path_file() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("from.bin");
        let to = temp_dir.path().join("to.bin");
        fs::write(&from, "payload").unwrap();

        move_path(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "payload");
    }

    #[test]
    fn test_prune_stops_at_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("libraries");
        let leaf = root.join("org/lwjgl/2.9.0");
        fs::create_dir_all(&leaf).unwrap();

        let removed = prune_empty_dirs(&leaf, &root);

        assert_eq!(removed, 3);
        assert!(root.is_dir());
        assert!(!root.join("org").exists());
    }

    #[test]
    fn test_prune_stops_at_non_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("libraries");
        let leaf = root.join("org/lwjgl/2.9.0");
        fs::create_dir_all(&leaf).unwrap();
        fs::write(root.join("org/keep.jar"), "x").unwrap();

        let removed = prune_empty_dirs(&leaf, &root);

        assert_eq!(removed, 2);
        assert!(root.join("org").is_dir());
        assert!(!root.join("org/lwjgl").exists());
    }

    #[test]
    fn test_prune_ignores_paths_outside_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("libraries");
        let outside = temp_dir.path().join("elsewhere/empty");
        fs::create_dir_all(&outside).unwrap();
        fs::create_dir_all(&root).unwrap();

        assert_eq!(prune_empty_dirs(&outside, &root), 0);
        assert!(outside.is_dir());
    }
}
