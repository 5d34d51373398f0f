//! `SourceParser`: the "external AST parser" collaborator contract (§4.6
//! step 3, §1 out-of-scope collaborators). `context-core` never depends on
//! this crate, so the trait — and the regex-based default implementation
//! used when no richer parser is wired in — live here instead.

use context_core::types::CodeImport;
use std::path::Path;

/// One extracted unit from a source file, mirroring `parse_source_file`'s
/// per-unit shape (§4.6).
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    pub unit_type: String,
    pub name: String,
    pub signature: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub has_documentation: bool,
}

/// `parse_source_file(path, source) -> {language, units, imports_per_unit}`
/// (§4.6). Imports are attached to the synthetic whole-file `"module"` unit
/// rather than duplicated onto every unit, so the dependency graph (§4.7),
/// which aggregates a file's imports across its units, doesn't double-count
/// the same edge once per function in the file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub language: String,
    pub units: Vec<ParsedUnit>,
}

/// The external AST parser contract. A production deployment wires in a
/// real parser (tree-sitter, a language server, …); [`RegexSourceParser`]
/// is the dependency-free default so the indexer is independently testable.
pub trait SourceParser: Send + Sync {
    /// Parse one file's `source` into its constituent units.
    ///
    /// Returns `None` if `path`'s extension isn't recognized — the caller
    /// skips the file rather than treating this as an error (§4.6 failure
    /// semantics: a parse failure is logged and the file is skipped).
    fn parse_source_file(&self, path: &Path, source: &str) -> Option<ParsedFile>;
}

/// Regex-based unit extractor covering the language table in
/// [`crate::languages`]. Accurate enough to find top-level
/// functions/classes/methods by signature; does not attempt full-fidelity
/// AST parsing (nested scopes, macros, string/comment-aware boundaries).
#[derive(Debug, Default, Clone)]
pub struct RegexSourceParser;

impl RegexSourceParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

struct UnitPattern {
    unit_type: &'static str,
    regex: regex::Regex,
}

fn patterns_for(language: &str) -> Vec<UnitPattern> {
    let defs: &[(&str, &str)] = match language {
        "python" => &[
            (r"(?m)^(\s*)def\s+(\w+)\s*\(", "function"),
            (r"(?m)^(\s*)class\s+(\w+)", "class"),
        ],
        "javascript" | "typescript" => &[
            (r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s*\*?\s*(\w+)\s*\(", "function"),
            (r"(?m)^\s*(?:export\s+)?class\s+(\w+)", "class"),
            (r"(?m)^\s*(?:export\s+)?const\s+(\w+)\s*=\s*(?:async\s*)?\(.*?\)\s*=>", "function"),
        ],
        "rust" => &[
            (r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(\w+)", "function"),
            (r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?struct\s+(\w+)", "struct"),
            (r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?enum\s+(\w+)", "enum"),
            (r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?trait\s+(\w+)", "trait"),
            (r"(?m)^\s*impl(?:<[^>]*>)?\s+(?:\w+\s+for\s+)?(\w+)", "impl"),
        ],
        "go" => &[
            (r"(?m)^func\s+(?:\([^)]*\)\s*)?(\w+)\s*\(", "function"),
            (r"(?m)^type\s+(\w+)\s+struct", "struct"),
        ],
        "java" | "csharp" => &[
            (r"(?m)^\s*(?:public|private|protected)?\s*(?:static\s+)?class\s+(\w+)", "class"),
            (
                r"(?m)^\s*(?:public|private|protected)\s+(?:static\s+)?[\w<>\[\]]+\s+(\w+)\s*\(",
                "method",
            ),
        ],
        "ruby" => &[
            (r"(?m)^\s*def\s+(\w+[!?=]?)", "function"),
            (r"(?m)^\s*class\s+(\w+)", "class"),
            (r"(?m)^\s*module\s+(\w+)", "module"),
        ],
        "c" | "cpp" => &[(
            r"(?m)^[\w:<>,\*&\s]+\s+(\w+)\s*\([^;{]*\)\s*\{",
            "function",
        )],
        "php" => &[
            (r"(?m)^\s*(?:public|private|protected)?\s*function\s+(\w+)\s*\(", "function"),
            (r"(?m)^\s*class\s+(\w+)", "class"),
        ],
        "sql" => &[
            (r"(?mi)^\s*create\s+(?:or\s+replace\s+)?table\s+(\w+)", "table"),
            (r"(?mi)^\s*create\s+(?:or\s+replace\s+)?(?:function|procedure)\s+(\w+)", "function"),
        ],
        _ => &[],
    };
    defs.iter()
        .filter_map(|(pattern, unit_type)| {
            regex::Regex::new(pattern).ok().map(|regex| UnitPattern { unit_type, regex })
        })
        .collect()
}

fn line_of(source: &str, byte_offset: usize) -> u32 {
    source[..byte_offset.min(source.len())].matches('\n').count() as u32 + 1
}

impl SourceParser for RegexSourceParser {
    fn parse_source_file(&self, path: &Path, source: &str) -> Option<ParsedFile> {
        let language = crate::languages::language_for_path(path)?.to_string();
        let patterns = patterns_for(&language);
        let total_lines = source.lines().count().max(1) as u32;

        let mut matches: Vec<(u32, &'static str, String, String)> = Vec::new();
        for pattern in &patterns {
            for capture in pattern.regex.captures_iter(source) {
                let whole = capture.get(0).unwrap();
                let name = capture
                    .iter()
                    .skip(1)
                    .rev()
                    .find_map(|m| m.map(|m| m.as_str().to_string()))
                    .unwrap_or_else(|| "anonymous".to_string());
                let start_line = line_of(source, whole.start());
                let signature = whole.as_str().trim().to_string();
                matches.push((start_line, pattern.unit_type, name, signature));
            }
        }
        matches.sort_by_key(|(line, ..)| *line);

        let mut units = Vec::new();
        for (idx, (start_line, unit_type, name, signature)) in matches.iter().enumerate() {
            let end_line = matches
                .get(idx + 1)
                .map(|(next_line, ..)| next_line.saturating_sub(1).max(*start_line))
                .unwrap_or(total_lines);
            let content = extract_lines(source, *start_line, end_line);
            let has_documentation = preceding_lines_have_doc_comment(source, *start_line);
            units.push(ParsedUnit {
                unit_type: (*unit_type).to_string(),
                name: name.clone(),
                signature: signature.clone(),
                start_line: *start_line,
                end_line,
                content,
                has_documentation,
            });
        }

        // The whole-file "module" unit always exists, even for files with
        // no recognized sub-units (a config/constants-only file is still
        // worth indexing as one searchable chunk), and is the sole carrier
        // of this file's imports once the caller attaches them.
        units.insert(
            0,
            ParsedUnit {
                unit_type: "module".to_string(),
                name: module_name(path),
                signature: path.to_string_lossy().to_string(),
                start_line: 1,
                end_line: total_lines,
                content: source.to_string(),
                has_documentation: false,
            },
        );

        Some(ParsedFile { language, units })
    }
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string()
}

fn extract_lines(source: &str, start_line: u32, end_line: u32) -> String {
    source
        .lines()
        .skip((start_line.saturating_sub(1)) as usize)
        .take((end_line.saturating_sub(start_line) as usize) + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

fn preceding_lines_have_doc_comment(source: &str, start_line: u32) -> bool {
    let lines: Vec<&str> = source.lines().collect();
    let idx = start_line.saturating_sub(2) as usize;
    (0..3).any(|back| {
        idx.checked_sub(back)
            .and_then(|i| lines.get(i))
            .map(|l| {
                let t = l.trim_start();
                t.starts_with("///") || t.starts_with("\"\"\"") || t.starts_with("/**") || t.starts_with('#')
            })
            .unwrap_or(false)
    })
}

/// Extract `CodeImport`s from source text for languages the parser knows
/// about. Kept separate from unit extraction since imports are file-scoped.
#[must_use]
pub fn extract_imports(language: &str, source: &str) -> Vec<CodeImport> {
    match language {
        "python" => extract_python_imports(source),
        "javascript" | "typescript" => extract_es_imports(source),
        "rust" => extract_rust_imports(source),
        "go" => extract_go_imports(source),
        _ => Vec::new(),
    }
}

fn extract_python_imports(source: &str) -> Vec<CodeImport> {
    let import_re = regex::Regex::new(r"(?m)^\s*import\s+([\w\.]+)").unwrap();
    let from_re = regex::Regex::new(r"(?m)^\s*from\s+([\.\w]+)\s+import\s+(.+)$").unwrap();
    let mut imports = Vec::new();
    for cap in import_re.captures_iter(source) {
        let module = cap[1].to_string();
        let line = line_of(source, cap.get(0).unwrap().start());
        imports.push(CodeImport { module, items: Vec::new(), import_type: "import".to_string(), line, relative: false });
    }
    for cap in from_re.captures_iter(source) {
        let module = cap[1].to_string();
        let relative = module.starts_with('.');
        let items = cap[2].split(',').map(|s| s.trim().to_string()).collect();
        let line = line_of(source, cap.get(0).unwrap().start());
        imports.push(CodeImport { module, items, import_type: "from_import".to_string(), line, relative });
    }
    imports
}

fn extract_es_imports(source: &str) -> Vec<CodeImport> {
    let re = regex::Regex::new(r#"(?m)^\s*import\s+(?:\{([^}]*)\}|(\w+))?\s*(?:from\s+)?['"]([^'"]+)['"]"#).unwrap();
    let mut imports = Vec::new();
    for cap in re.captures_iter(source) {
        let module = cap[3].to_string();
        let relative = module.starts_with('.');
        let items: Vec<String> = cap
            .get(1)
            .map(|m| m.as_str().split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .or_else(|| cap.get(2).map(|m| vec![m.as_str().to_string()]))
            .unwrap_or_default();
        let line = line_of(source, cap.get(0).unwrap().start());
        imports.push(CodeImport { module, items, import_type: "from_import".to_string(), line, relative });
    }
    imports
}

fn extract_rust_imports(source: &str) -> Vec<CodeImport> {
    let re = regex::Regex::new(r"(?m)^\s*use\s+((?:crate|self|super)(?:::\w+)*|[\w:]+)").unwrap();
    let mut imports = Vec::new();
    for cap in re.captures_iter(source) {
        let module = cap[1].to_string();
        let relative = module.starts_with("crate") || module.starts_with("self") || module.starts_with("super");
        let line = line_of(source, cap.get(0).unwrap().start());
        imports.push(CodeImport { module, items: Vec::new(), import_type: "import".to_string(), line, relative });
    }
    imports
}

fn extract_go_imports(source: &str) -> Vec<CodeImport> {
    let re = regex::Regex::new(r#"(?m)^\s*"([^"]+)""#).unwrap();
    let import_block = regex::Regex::new(r"(?s)import\s*\((.*?)\)").unwrap();
    let mut imports = Vec::new();
    if let Some(block) = import_block.captures(source) {
        for cap in re.captures_iter(&block[1]) {
            let module = cap[1].to_string();
            let line = line_of(source, cap.get(0).unwrap().start());
            imports.push(CodeImport { module, items: Vec::new(), import_type: "import".to_string(), line, relative: false });
        }
    }
    imports
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_python_functions_and_classes() {
        let source = "def foo():\n    pass\n\nclass Bar:\n    def method(self):\n        pass\n";
        let parsed = RegexSourceParser::new().parse_source_file(&PathBuf::from("a.py"), source).unwrap();
        assert_eq!(parsed.language, "python");
        let names: Vec<&str> = parsed.units.iter().map(|u| u.name.as_str()).collect();
        assert!(names.contains(&"foo"));
        assert!(names.contains(&"Bar"));
        assert!(names.contains(&"method"));
    }

    #[test]
    fn always_includes_module_unit() {
        let parsed = RegexSourceParser::new().parse_source_file(&PathBuf::from("config.py"), "X = 1\n").unwrap();
        assert_eq!(parsed.units[0].unit_type, "module");
    }

    #[test]
    fn unknown_extension_returns_none() {
        assert!(RegexSourceParser::new().parse_source_file(&PathBuf::from("a.bin"), "").is_none());
    }

    #[test]
    fn parses_rust_functions_and_structs() {
        let source = "pub struct Foo;\n\npub fn bar() -> i32 {\n    1\n}\n";
        let parsed = RegexSourceParser::new().parse_source_file(&PathBuf::from("a.rs"), source).unwrap();
        let names: Vec<&str> = parsed.units.iter().map(|u| u.name.as_str()).collect();
        assert!(names.contains(&"Foo"));
        assert!(names.contains(&"bar"));
    }

    #[test]
    fn extracts_python_from_import() {
        let imports = extract_imports("python", "from .models import User, Post\n");
        assert_eq!(imports.len(), 1);
        assert!(imports[0].relative);
        assert_eq!(imports[0].items, vec!["User", "Post"]);
    }

    #[test]
    fn extracts_es_relative_import() {
        let imports = extract_imports("typescript", "import { Foo } from './foo';\n");
        assert_eq!(imports.len(), 1);
        assert!(imports[0].relative);
        assert_eq!(imports[0].module, "./foo");
    }

    #[test]
    fn extracts_go_imports_from_block() {
        let imports = extract_imports(
            "go",
            "package main\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n",
        );
        assert_eq!(imports.len(), 2);
    }
}
