//! Source tree traversal.
//!
//! [`DirectoryWalker`] yields every non-directory entry below a root path as
//! a [`WalkedFile`], named relative to the root's basename. Traversal is
//! depth-first in whatever order the filesystem lists entries; it is not
//! sorted. Symbolic links are not descended into; a link to a file is
//! archived as that file's contents.

use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// A file discovered during traversal.
#[derive(Debug)]
pub struct WalkedFile {
    /// Archive-internal, `/`-separated name.
    pub archive_path: String,
    /// Location on disk.
    pub source_path: PathBuf,
    /// Metadata of the file, resolved through a symlink if the entry is one.
    pub metadata: fs::Metadata,
}

impl WalkedFile {
    /// Reads the whole file.
    ///
    /// The handle is opened and closed within this call.
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut file = File::open(&self.source_path).map_err(Error::io_at(&self.source_path))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(Error::io_at(&self.source_path))?;
        Ok(contents)
    }
}

/// Iterator over the files below a root path.
pub struct DirectoryWalker {
    root: PathBuf,
    prefix: Option<String>,
    inner: walkdir::IntoIter,
}

impl DirectoryWalker {
    /// Starts a walk at `root`.
    ///
    /// Archive paths begin with the basename of `root`. Roots without a
    /// basename, such as `.` or `/`, give paths relative to the root itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoAt`] if `root` does not exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();

        fs::symlink_metadata(root).map_err(Error::io_at(root))?;

        let prefix = match root.file_name() {
            Some(name) => Some(
                name.to_str()
                    .ok_or_else(|| non_utf8(root))?
                    .to_string(),
            ),
            None => None,
        };

        Ok(Self {
            root: root.to_path_buf(),
            prefix,
            inner: WalkDir::new(root).follow_links(false).into_iter(),
        })
    }

    /// Returns the walk root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn archive_path(&self, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| Error::Format(format!("{} is outside the walk root", path.display())))?;

        let mut parts: Vec<&str> = Vec::new();
        if let Some(prefix) = &self.prefix {
            parts.push(prefix);
        }
        for component in relative.components() {
            match component {
                Component::Normal(name) => parts.push(name.to_str().ok_or_else(|| non_utf8(path))?),
                Component::CurDir => {}
                _ => {
                    return Err(Error::Format(format!(
                        "Unexpected path component in {}",
                        path.display()
                    )))
                }
            }
        }

        if parts.is_empty() {
            return Err(Error::Format(format!(
                "Cannot name {} inside the archive",
                path.display()
            )));
        }
        Ok(parts.join("/"))
    }
}

impl Iterator for DirectoryWalker {
    type Item = Result<WalkedFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    return Some(Err(Error::IoAt {
                        path,
                        source: io::Error::from(e),
                    }));
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            // Symlinks are archived as the file they point to.
            let metadata = if entry.path_is_symlink() {
                fs::metadata(entry.path())
            } else {
                entry.metadata().map_err(io::Error::from)
            };
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(source) => {
                    return Some(Err(Error::IoAt {
                        path: entry.path().to_path_buf(),
                        source,
                    }))
                }
            };

            if metadata.is_dir() {
                warn!(path = %entry.path().display(), "skipping symlink to directory");
                continue;
            }

            let item = self.archive_path(entry.path()).map(|archive_path| WalkedFile {
                archive_path,
                source_path: entry.into_path(),
                metadata,
            });
            return Some(item);
        }
    }
}

fn non_utf8(path: &Path) -> Error {
    Error::IoAt {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn create_tree(dir: &Path) -> PathBuf {
        let root = dir.join("tree");
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("a.txt"), b"hi").unwrap();
        fs::write(root.join("sub/b.txt"), b"bye").unwrap();
        fs::write(root.join("sub/deeper/c.bin"), [0u8, 1, 2]).unwrap();
        root
    }

    fn walk_names(root: &Path) -> Vec<String> {
        DirectoryWalker::new(root)
            .unwrap()
            .map(|f| f.unwrap().archive_path)
            .collect()
    }

    #[test]
    fn test_walk_names_rooted_at_basename() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_tree(temp_dir.path());

        let names: BTreeSet<_> = walk_names(&root).into_iter().collect();
        let expected: BTreeSet<_> = ["tree/a.txt", "tree/sub/b.txt", "tree/sub/deeper/c.bin"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_walk_skips_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_tree(temp_dir.path());

        for file in DirectoryWalker::new(&root).unwrap() {
            let file = file.unwrap();
            assert!(!file.metadata.is_dir(), "{} is a directory", file.archive_path);
            assert!(!file.archive_path.contains("empty"));
        }
    }

    #[test]
    fn test_walk_is_depth_first() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_tree(temp_dir.path());

        // Files of one directory are never interleaved with another
        // directory's files once that directory has been left.
        let names = walk_names(&root);
        let dirs: Vec<_> = names
            .iter()
            .map(|n| n.rsplit_once('/').unwrap().0.to_string())
            .collect();
        let mut seen_and_left = BTreeSet::new();
        for window in dirs.windows(2) {
            if window[0] != window[1] && !window[1].starts_with(&window[0]) {
                seen_and_left.insert(window[0].clone());
            }
            assert!(!seen_and_left.contains(&window[1]), "revisited {}", window[1]);
        }
    }

    #[test]
    fn test_walk_order_is_stable_within_a_run() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_tree(temp_dir.path());
        assert_eq!(walk_names(&root), walk_names(&root));
    }

    #[test]
    fn test_walk_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nothing");
        fs::create_dir(&root).unwrap();
        assert!(walk_names(&root).is_empty());
    }

    #[test]
    fn test_walk_single_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("lonely.txt");
        fs::write(&file, b"1").unwrap();
        assert_eq!(walk_names(&file), ["lonely.txt"]);
    }

    #[test]
    fn test_walk_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = DirectoryWalker::new(temp_dir.path().join("missing"));
        assert!(matches!(result, Err(Error::IoAt { .. })));
    }

    #[test]
    fn test_read_returns_contents() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_tree(temp_dir.path());
        let file = DirectoryWalker::new(&root)
            .unwrap()
            .map(Result::unwrap)
            .find(|f| f.archive_path == "tree/sub/b.txt")
            .unwrap();
        assert_eq!(file.read().unwrap(), b"bye");
    }

    #[test]
    fn test_archive_path_without_basename() {
        let walker = DirectoryWalker {
            root: PathBuf::from("/"),
            prefix: None,
            inner: WalkDir::new("/").max_depth(0).into_iter(),
        };
        assert_eq!(walker.archive_path(Path::new("/a.txt")).unwrap(), "a.txt");
        assert_eq!(
            walker.archive_path(Path::new("/sub/b.txt")).unwrap(),
            "sub/b.txt"
        );
    }
}
