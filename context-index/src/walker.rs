//! Directory walk over an indexing root (§4.6 step 1): `.gitignore`-aware,
//! filtered to the languages in [`crate::languages`].

use std::path::{Path, PathBuf};

/// Walks `root`, honoring `.gitignore`/`.ignore` and skipping hidden
/// directories, yielding only files whose extension is indexable.
pub struct FileWalker {
    root: PathBuf,
    max_depth: Option<usize>,
}

impl FileWalker {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), max_depth: None }
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Collect every indexable file under the root, in `.gitignore`-aware
    /// order. Symlinks are not followed (a project symlinked into itself
    /// would otherwise loop the walk).
    #[must_use]
    pub fn walk(&self) -> Vec<PathBuf> {
        let mut builder = ignore::WalkBuilder::new(&self.root);
        builder.hidden(true).follow_links(false).git_ignore(true).git_global(true);
        if let Some(depth) = self.max_depth {
            builder.max_depth(Some(depth));
        }
        builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .map(ignore::DirEntry::into_path)
            .filter(|path| is_indexable(path))
            .collect()
    }
}

/// Whether `path`'s extension is one [`crate::languages`] recognizes.
#[must_use]
pub fn is_indexable(path: &Path) -> bool {
    crate::languages::language_for_path(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walks_only_indexable_files_and_skips_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("b.md"), "# notes\n").unwrap();
        fs::write(dir.path().join(".gitignore"), "ignored.py\n").unwrap();
        fs::write(dir.path().join("ignored.py"), "y = 2\n").unwrap();

        let found = FileWalker::new(dir.path()).walk();
        let names: Vec<String> =
            found.iter().filter_map(|p| p.file_name()?.to_str().map(str::to_string)).collect();
        assert!(names.contains(&"a.py".to_string()));
        assert!(!names.contains(&"b.md".to_string()));
        assert!(!names.contains(&"ignored.py".to_string()));
    }

    #[test]
    fn is_indexable_checks_extension() {
        assert!(is_indexable(Path::new("src/main.rs")));
        assert!(!is_indexable(Path::new("README.md")));
    }
}
