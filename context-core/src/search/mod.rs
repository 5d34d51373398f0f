//! Query-local BM25 index and hybrid fusion (spec §4.3, §4.4).

mod bm25;
mod fusion;

pub use bm25::{Bm25Config, Bm25Index};
pub use fusion::{fuse, FusionMethod};
