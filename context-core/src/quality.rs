//! Static code-quality metrics attached to indexed code units (spec §4.10).

use crate::constants::{DUPLICATION_FLAG_THRESHOLD, SIMILAR_CODE_THRESHOLD};
use crate::store::cosine_similarity;
use serde::{Deserialize, Serialize};

/// Per-unit metrics computed at index time and re-derivable on demand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct QualityMetrics {
    pub cyclomatic_complexity: u32,
    pub line_count: u32,
    pub max_nesting_depth: u32,
    pub parameter_count: u32,
    pub has_documentation: bool,
    pub duplication_score: f32,
    pub maintainability_index: f32,
}

/// Flags a unit may be tagged with once its metrics are known (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityFlag {
    HighComplexity,
    DeepNesting,
    Undocumented,
    PossibleDuplicate,
    LowMaintainability,
}

/// Count decision points in `source` as a proxy for cyclomatic complexity:
/// one baseline path plus one per branching keyword or boolean operator.
/// Keyword matching is word-boundary-ish (surrounded by non-identifier
/// characters) so it doesn't fire inside identifiers like `fortune`.
#[must_use]
pub fn cyclomatic_complexity(source: &str) -> u32 {
    const BRANCH_KEYWORDS: &[&str] = &[
        "if", "else if", "elif", "for", "while", "case", "catch", "except", "&&", "||", "?",
    ];
    let mut complexity = 1u32;
    for keyword in BRANCH_KEYWORDS {
        complexity += count_word_occurrences(source, keyword);
    }
    complexity
}

fn count_word_occurrences(source: &str, keyword: &str) -> u32 {
    if keyword.chars().all(|c| !c.is_alphanumeric()) {
        return source.matches(keyword).count() as u32;
    }
    source
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|tok| *tok == keyword)
        .count() as u32
}

/// Deepest brace/indent nesting level reached in `source`.
#[must_use]
pub fn max_nesting_depth(source: &str) -> u32 {
    let mut depth: i32 = 0;
    let mut max_depth: i32 = 0;
    for c in source.chars() {
        match c {
            '{' | '(' | '[' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '}' | ')' | ']' => depth = (depth - 1).max(0),
            _ => {}
        }
    }
    max_depth.max(0) as u32
}

/// Maintainability index on the classic 0-100 scale (Halstead-free
/// approximation using complexity and line count only, since a full
/// Halstead volume needs a real AST the indexer does not build here).
#[must_use]
pub fn maintainability_index(complexity: u32, line_count: u32) -> f32 {
    let loc = (line_count as f32).max(1.0);
    let raw = 171.0 - 0.23 * (complexity as f32) - 16.2 * loc.ln();
    (raw * 100.0 / 171.0).clamp(0.0, 100.0)
}

/// Nearest-neighbor duplication score: the highest cosine similarity
/// between `embedding` and any vector in `others` (§4.10). Empty `others`
/// yields `0.0` — a unit cannot duplicate nothing.
#[must_use]
pub fn duplication_score(embedding: &[f32], others: &[Vec<f32>]) -> f32 {
    others
        .iter()
        .map(|other| cosine_similarity(embedding, other))
        .fold(0.0f32, f32::max)
}

/// Derive the full metric set for one unit's source text and embedding
/// neighborhood.
#[must_use]
pub fn analyze(
    source: &str,
    parameter_count: u32,
    has_documentation: bool,
    embedding: &[f32],
    neighbor_embeddings: &[Vec<f32>],
) -> QualityMetrics {
    let complexity = cyclomatic_complexity(source);
    let line_count = source.lines().count() as u32;
    let nesting = max_nesting_depth(source);
    let duplication = duplication_score(embedding, neighbor_embeddings);
    QualityMetrics {
        cyclomatic_complexity: complexity,
        line_count,
        max_nesting_depth: nesting,
        parameter_count,
        has_documentation,
        duplication_score: duplication,
        maintainability_index: maintainability_index(complexity, line_count),
    }
}

/// Derive the flags implied by a metric set (§4.10 thresholds).
#[must_use]
pub fn quality_flags(metrics: &QualityMetrics) -> Vec<QualityFlag> {
    let mut flags = Vec::new();
    if metrics.cyclomatic_complexity > 10 {
        flags.push(QualityFlag::HighComplexity);
    }
    if metrics.max_nesting_depth > 4 {
        flags.push(QualityFlag::DeepNesting);
    }
    if !metrics.has_documentation {
        flags.push(QualityFlag::Undocumented);
    }
    if metrics.duplication_score >= DUPLICATION_FLAG_THRESHOLD {
        flags.push(QualityFlag::PossibleDuplicate);
    } else if metrics.duplication_score >= SIMILAR_CODE_THRESHOLD {
        flags.push(QualityFlag::PossibleDuplicate);
    }
    if metrics.maintainability_index < 20.0 {
        flags.push(QualityFlag::LowMaintainability);
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branching_keywords_raise_complexity_above_baseline() {
        let source = "fn f(x: i32) -> i32 { if x > 0 { x } else { -x } }";
        assert!(cyclomatic_complexity(source) > 1);
    }

    #[test]
    fn identifier_substring_does_not_inflate_complexity() {
        let source = "fn forecast() -> i32 { 42 }";
        assert_eq!(cyclomatic_complexity(source), 1);
    }

    #[test]
    fn nesting_depth_tracks_deepest_braces() {
        let source = "fn f() { if a { if b { if c { 1 } } } }";
        assert_eq!(max_nesting_depth(source), 4);
    }

    #[test]
    fn duplication_score_is_zero_with_no_neighbors() {
        assert_eq!(duplication_score(&[1.0, 0.0], &[]), 0.0);
    }

    #[test]
    fn duplication_score_is_the_max_neighbor_similarity() {
        let embedding = vec![1.0, 0.0];
        let others = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        assert!((duplication_score(&embedding, &others) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn high_complexity_and_undocumented_are_flagged_together() {
        let metrics = QualityMetrics {
            cyclomatic_complexity: 15,
            line_count: 50,
            max_nesting_depth: 1,
            parameter_count: 2,
            has_documentation: false,
            duplication_score: 0.1,
            maintainability_index: 80.0,
        };
        let flags = quality_flags(&metrics);
        assert!(flags.contains(&QualityFlag::HighComplexity));
        assert!(flags.contains(&QualityFlag::Undocumented));
        assert!(!flags.contains(&QualityFlag::PossibleDuplicate));
    }
}
