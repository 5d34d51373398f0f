//! BM25 built per-query over the dense-retrieval candidate pool (§4.3).

use std::collections::HashMap;
use uuid::Uuid;

/// `k1`/`b` parameters, sourced from `EngineConfig` (§6.5).
#[derive(Debug, Clone, Copy)]
pub struct Bm25Config {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Language-agnostic whitespace + simple punctuation tokenizer, lowercased.
/// Stopwords are intentionally not removed — code tokens look like
/// stopwords (`if`, `for`, `in`) and would be lost otherwise (§4.3).
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || ",.;:!?()[]{}\"'`".contains(c))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// A BM25 index built fresh for a single query over a candidate pool.
pub struct Bm25Index {
    config: Bm25Config,
    docs: Vec<(Uuid, Vec<String>)>,
    avg_len: f32,
    df: HashMap<String, usize>,
}

impl Bm25Index {
    /// Build an index over `(id, content)` pairs — the candidate pool
    /// retrieved by the dense search, sized per §4.3 (≈3x requested limit,
    /// minimum 50).
    #[must_use]
    pub fn build(documents: &[(Uuid, String)], config: Bm25Config) -> Self {
        let docs: Vec<(Uuid, Vec<String>)> = documents
            .iter()
            .map(|(id, content)| (*id, tokenize(content)))
            .collect();
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            docs.iter().map(|(_, t)| t.len()).sum::<usize>() as f32 / docs.len() as f32
        };
        let mut df: HashMap<String, usize> = HashMap::new();
        for (_, tokens) in &docs {
            let unique: std::collections::HashSet<&String> = tokens.iter().collect();
            for term in unique {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
        }
        Self {
            config,
            docs,
            avg_len,
            df,
        }
    }

    /// True if the pool this index was built over was empty (§8 item 12:
    /// must degrade to pure semantic without error).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.docs.len() as f32;
        let df = *self.df.get(term).unwrap_or(&0) as f32;
        // +1 smoothing keeps scores finite and non-negative for df == n.
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_doc(&self, query_terms: &[String], tokens: &[String]) -> f32 {
        if tokens.is_empty() {
            return 0.0;
        }
        let len = tokens.len() as f32;
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for t in tokens {
            *term_freq.entry(t.as_str()).or_insert(0) += 1;
        }
        let mut score = 0.0f32;
        for q in query_terms {
            let Some(&tf) = term_freq.get(q.as_str()) else {
                continue;
            };
            let tf = tf as f32;
            let idf = self.idf(q);
            let numerator = tf * (self.config.k1 + 1.0);
            let denominator =
                tf + self.config.k1 * (1.0 - self.config.b + self.config.b * len / self.avg_len.max(1.0));
            score += idf * numerator / denominator;
        }
        score.max(0.0)
    }

    /// Raw BM25 scores for `query`, one per document in the pool, in pool
    /// order. Callers needing a normalized `[0, 1]` score should divide by
    /// [`Bm25Index::max_score`].
    #[must_use]
    pub fn scores(&self, query: &str) -> Vec<(Uuid, f32)> {
        let query_terms = tokenize(query);
        self.docs
            .iter()
            .map(|(id, tokens)| (*id, self.score_doc(&query_terms, tokens)))
            .collect()
    }

    /// Scores rescaled to `[0, 1]` over the candidate pool (§4.3 weighted
    /// fusion's `bm25_norm`).
    #[must_use]
    pub fn normalized_scores(&self, query: &str) -> HashMap<Uuid, f32> {
        let raw = self.scores(query);
        let max = raw
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0f32, f32::max);
        raw.into_iter()
            .map(|(id, s)| (id, if max > 0.0 { s / max } else { 0.0 }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_token_match_outranks_unrelated_document() {
        let docs = vec![
            (
                Uuid::new_v4(),
                "struct DatabasePool { connections: Vec<Connection> }".to_string(),
            ),
            (Uuid::new_v4(), "fn render_ui_widget() {}".to_string()),
        ];
        let index = Bm25Index::build(&docs, Bm25Config::default());
        let scores = index.scores("DatabasePool connection");
        assert!(scores[0].1 > scores[1].1);
    }

    #[test]
    fn empty_pool_is_empty_and_scores_nothing() {
        let index = Bm25Index::build(&[], Bm25Config::default());
        assert!(index.is_empty());
        assert!(index.scores("anything").is_empty());
    }

    #[test]
    fn normalized_scores_are_within_unit_interval() {
        let docs = vec![
            (Uuid::new_v4(), "alpha beta gamma".to_string()),
            (Uuid::new_v4(), "alpha alpha alpha".to_string()),
        ];
        let index = Bm25Index::build(&docs, Bm25Config::default());
        for (_, s) in index.normalized_scores("alpha") {
            assert!((0.0..=1.0).contains(&s));
        }
    }
}
