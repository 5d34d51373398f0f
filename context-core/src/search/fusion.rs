//! Dense + lexical fusion strategies (§4.3/§4.4).

use super::bm25::Bm25Index;
use crate::constants::RRF_K;
use std::collections::HashMap;
use uuid::Uuid;

/// Client-selectable fusion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// `score = alpha * dense + (1 - alpha) * bm25_norm`.
    Weighted,
    /// Reciprocal rank fusion with fixed constant `k`.
    Rrf,
    /// Top-N by dense, re-ranked within that set by BM25 only.
    Cascade,
}

/// Fuse dense scores (already `[0, 1]`, ordered by descending similarity)
/// with a BM25 index built over the same candidate pool, per the selected
/// `method`. `alpha` is only used by `Weighted`; `cascade_n` only by
/// `Cascade`.
///
/// If `bm25.is_empty()` (§8 item 12), this degrades to returning `dense`
/// unchanged — hybrid fusion over zero lexical documents never errors.
#[must_use]
pub fn fuse(
    dense: &[(Uuid, f32)],
    bm25: &Bm25Index,
    query: &str,
    method: FusionMethod,
    alpha: f32,
    cascade_n: usize,
) -> Vec<(Uuid, f32)> {
    if bm25.is_empty() || dense.is_empty() {
        return dense.to_vec();
    }
    match method {
        FusionMethod::Weighted => fuse_weighted(dense, bm25, query, alpha),
        FusionMethod::Rrf => fuse_rrf(dense, bm25, query),
        FusionMethod::Cascade => fuse_cascade(dense, bm25, query, cascade_n),
    }
}

fn fuse_weighted(dense: &[(Uuid, f32)], bm25: &Bm25Index, query: &str, alpha: f32) -> Vec<(Uuid, f32)> {
    let bm25_norm = bm25.normalized_scores(query);
    let mut out: Vec<(Uuid, f32)> = dense
        .iter()
        .map(|(id, dense_score)| {
            let lexical = bm25_norm.get(id).copied().unwrap_or(0.0);
            (*id, alpha * dense_score + (1.0 - alpha) * lexical)
        })
        .collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1));
    out
}

fn fuse_rrf(dense: &[(Uuid, f32)], bm25: &Bm25Index, query: &str) -> Vec<(Uuid, f32)> {
    let dense_rank: HashMap<Uuid, usize> = dense
        .iter()
        .enumerate()
        .map(|(rank, (id, _))| (*id, rank + 1))
        .collect();
    let mut bm25_scores = bm25.scores(query);
    bm25_scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    let bm25_rank: HashMap<Uuid, usize> = bm25_scores
        .iter()
        .enumerate()
        .map(|(rank, (id, _))| (*id, rank + 1))
        .collect();

    let mut out: Vec<(Uuid, f32)> = dense_rank
        .keys()
        .map(|id| {
            let dr = *dense_rank.get(id).unwrap_or(&(dense.len() + 1)) as f64;
            let br = *bm25_rank.get(id).unwrap_or(&(dense.len() + 1)) as f64;
            let score = 1.0 / (RRF_K + dr) + 1.0 / (RRF_K + br);
            (*id, score as f32)
        })
        .collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1));
    out
}

fn fuse_cascade(dense: &[(Uuid, f32)], bm25: &Bm25Index, query: &str, cascade_n: usize) -> Vec<(Uuid, f32)> {
    let top_n: Vec<Uuid> = dense.iter().take(cascade_n.max(1)).map(|(id, _)| *id).collect();
    let bm25_scores: HashMap<Uuid, f32> = bm25.scores(query).into_iter().collect();
    let mut out: Vec<(Uuid, f32)> = top_n
        .into_iter()
        .map(|id| {
            let s = bm25_scores.get(&id).copied().unwrap_or(0.0);
            (id, s)
        })
        .collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> (Vec<(Uuid, f32)>, Bm25Index, Uuid, Uuid) {
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        let dense = vec![(id_b, 0.9), (id_a, 0.5)];
        let docs = vec![
            (id_a, "DatabasePool connection manager".to_string()),
            (id_b, "unrelated rendering widget".to_string()),
        ];
        let bm25 = Bm25Index::build(&docs, super::super::Bm25Config::default());
        (dense, bm25, id_a, id_b)
    }

    #[test]
    fn weighted_fusion_can_flip_dense_only_order() {
        let (dense, bm25, id_a, _id_b) = pool();
        let fused = fuse(&dense, &bm25, "DatabasePool connection", FusionMethod::Weighted, 0.3, 10);
        assert_eq!(fused[0].0, id_a);
    }

    #[test]
    fn rrf_degrades_gracefully_on_empty_pool() {
        let dense = vec![(Uuid::new_v4(), 0.9)];
        let empty = Bm25Index::build(&[], super::super::Bm25Config::default());
        let fused = fuse(&dense, &empty, "query", FusionMethod::Rrf, 0.5, 10);
        assert_eq!(fused, dense);
    }

    #[test]
    fn cascade_reranks_within_top_n_by_bm25_only() {
        let (dense, bm25, id_a, _id_b) = pool();
        let fused = fuse(&dense, &bm25, "DatabasePool connection", FusionMethod::Cascade, 0.5, 2);
        assert_eq!(fused[0].0, id_a);
    }
}
