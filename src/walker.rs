use std::path::{Path, PathBuf};

use crate::error::Result;

/// A discovered document file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the walk root.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
}

impl DiscoveredFile {
    /// Directory containing the file, relative to the walk root.
    pub fn relative_dir(&self) -> &Path {
        self.relative_path.parent().unwrap_or(Path::new(""))
    }
}

/// One step of a document walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    File(DiscoveredFile),
    /// All files directly inside `directory` have been yielded.
    DirectoryBoundary { directory: PathBuf },
}

/// Recursively walk a directory and discover regular files.
///
/// Skips hidden files/directories (names starting with `.`). Files are
/// grouped by parent directory, directories in path order and files by
/// name within each directory.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    results.sort_by(|a, b| {
        a.relative_dir()
            .cmp(b.relative_dir())
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });
    Ok(results)
}

/// Walk `root` and return the event stream for it.
pub fn walk(root: &Path) -> Result<WalkEvents> {
    Ok(WalkEvents::new(discover_files(root)?))
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk_dir(root, &entry.path(), results)?;
        } else if file_type.is_symlink() {
            let resolved = match entry.path().canonicalize() {
                Ok(p) => p,
                Err(_) => continue, // broken link
            };
            // Directory links are never followed (cycle prevention).
            if resolved.is_file() {
                results.push(make_discovered(root, &entry.path(), &resolved));
            }
        } else if file_type.is_file() {
            let abs = entry.path().canonicalize()?;
            results.push(make_discovered(root, &entry.path(), &abs));
        }
    }

    Ok(())
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: &Path,
) -> DiscoveredFile {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    DiscoveredFile {
        relative_path,
        absolute_path: absolute_path.to_path_buf(),
    }
}

/// Iterator over a sorted file list that emits a
/// [`WalkEvent::DirectoryBoundary`] after the last file of each directory.
#[derive(Debug)]
pub struct WalkEvents {
    files: std::vec::IntoIter<DiscoveredFile>,
    pending: Option<DiscoveredFile>,
    current_dir: Option<PathBuf>,
}

impl WalkEvents {
    pub fn new(files: Vec<DiscoveredFile>) -> Self {
        Self {
            files: files.into_iter(),
            pending: None,
            current_dir: None,
        }
    }
}

impl Iterator for WalkEvents {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        let next = self.pending.take().or_else(|| self.files.next());

        match next {
            Some(file) => {
                let dir = file.relative_dir().to_path_buf();
                match self.current_dir.take() {
                    Some(current) if current != dir => {
                        self.pending = Some(file);
                        self.current_dir = Some(dir);
                        Some(WalkEvent::DirectoryBoundary { directory: current })
                    }
                    _ => {
                        self.current_dir = Some(dir);
                        Some(WalkEvent::File(file))
                    }
                }
            }
            None => self
                .current_dir
                .take()
                .map(|directory| WalkEvent::DirectoryBoundary { directory }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(files: &[DiscoveredFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn discovers_all_regular_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("note.md"), "# Hello").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "Hello").unwrap();
        std::fs::write(tmp.path().join("data.xml"), "<a/>").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["data.xml", "note.md", "readme.txt"]);
        assert!(files[0].absolute_path.is_absolute());
    }

    #[test]
    fn skips_hidden_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let hidden = tmp.path().join(".git");
        std::fs::create_dir(&hidden).unwrap();
        std::fs::write(hidden.join("config"), "git config").unwrap();
        std::fs::write(tmp.path().join(".hidden.md"), "secret").unwrap();
        std::fs::write(tmp.path().join("visible.md"), "hello").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["visible.md"]);
    }

    #[test]
    fn files_are_grouped_by_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        std::fs::create_dir_all(a.join("b")).unwrap();
        std::fs::write(a.join("z.txt"), "z").unwrap();
        std::fs::write(a.join("c.txt"), "c").unwrap();
        std::fs::write(a.join("b").join("y.txt"), "y").unwrap();
        std::fs::write(tmp.path().join("top.txt"), "top").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert_eq!(
            names(&files),
            vec!["top.txt", "a/c.txt", "a/z.txt", "a/b/y.txt"]
        );
    }

    #[test]
    fn events_mark_directory_boundaries() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(tmp.path().join("one.txt"), "1").unwrap();
        std::fs::write(tmp.path().join("two.txt"), "2").unwrap();
        std::fs::write(sub.join("three.txt"), "3").unwrap();

        let events: Vec<String> = walk(tmp.path())
            .unwrap()
            .map(|e| match e {
                WalkEvent::File(f) => {
                    f.relative_path.to_string_lossy().to_string()
                }
                WalkEvent::DirectoryBoundary { directory } => {
                    format!("<{}>", directory.display())
                }
            })
            .collect();

        assert_eq!(
            events,
            vec!["one.txt", "two.txt", "<>", "sub/three.txt", "<sub>"]
        );
    }

    #[test]
    fn empty_directory_has_no_events() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_files(tmp.path()).unwrap().is_empty());
        assert_eq!(walk(tmp.path()).unwrap().count(), 0);
    }
}
