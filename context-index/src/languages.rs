//! File-extension to language table the directory walk filters by (§4.6
//! step 1: Python, JS/TS, Java, Go, Rust, Ruby, C/C++/C#, PHP, SQL).

/// `(extension, language name)`. Extensions are matched without the dot,
/// case-sensitively — the walker lowercases before lookup.
const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("py", "python"),
    ("pyi", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("java", "java"),
    ("go", "go"),
    ("rs", "rust"),
    ("rb", "ruby"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("hh", "cpp"),
    ("cs", "csharp"),
    ("php", "php"),
    ("sql", "sql"),
];

/// The language for a file extension (without leading dot), if indexable.
#[must_use]
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lower = ext.to_lowercase();
    LANGUAGE_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == lower)
        .map(|(_, lang)| *lang)
}

/// The language for a file path, derived from its extension.
#[must_use]
pub fn language_for_path(path: &std::path::Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(language_for_extension)
}

/// Every extension this indexer will walk into, for building a glob/filter.
#[must_use]
pub fn indexable_extensions() -> Vec<&'static str> {
    LANGUAGE_EXTENSIONS.iter().map(|(e, _)| *e).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn recognizes_known_extensions() {
        assert_eq!(language_for_extension("rs"), Some("rust"));
        assert_eq!(language_for_extension("PY"), Some("python"));
        assert_eq!(language_for_extension("tsx"), Some("typescript"));
    }

    #[test]
    fn unknown_extension_is_none() {
        assert_eq!(language_for_extension("bin"), None);
    }

    #[test]
    fn language_for_path_reads_extension() {
        assert_eq!(language_for_path(Path::new("src/lib.rs")), Some("rust"));
        assert_eq!(language_for_path(Path::new("README.md")), None);
    }
}
