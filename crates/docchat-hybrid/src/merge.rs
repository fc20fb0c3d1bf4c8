use std::collections::HashMap;

use docchat_core::types::{RetrievalCandidate, SourceTag};

/// One source's raw candidates and the weight applied to them.
#[derive(Debug, Clone)]
pub struct WeightedSource {
    pub tag: SourceTag,
    pub weight: f32,
    pub candidates: Vec<RetrievalCandidate>,
}

struct Entry {
    candidate: RetrievalCandidate,
    scores: Vec<(SourceTag, f32)>,
}

/// Merge sources on `(chunk_index, page_number)`. A chunk seen by several
/// sources gets the mean of their weighted scores and the `Hybrid` tag;
/// otherwise its single weighted score is kept. Output is sorted best first.
pub fn merge_sources(sources: Vec<WeightedSource>) -> Vec<RetrievalCandidate> {
    let mut entries: Vec<Entry> = Vec::new();
    let mut index: HashMap<(usize, u32), usize> = HashMap::new();
    for source in sources {
        for candidate in source.candidates {
            let weighted = candidate.raw_score * source.weight;
            match index.get(&candidate.chunk.merge_key()) {
                Some(&i) => {
                    let scores = &mut entries[i].scores;
                    match scores.iter_mut().find(|(tag, _)| *tag == source.tag) {
                        Some((_, s)) => *s = s.max(weighted),
                        None => scores.push((source.tag, weighted)),
                    }
                }
                None => {
                    index.insert(candidate.chunk.merge_key(), entries.len());
                    entries.push(Entry { candidate, scores: vec![(source.tag, weighted)] });
                }
            }
        }
    }
    let mut merged: Vec<RetrievalCandidate> = entries
        .into_iter()
        .map(|e| {
            let mut c = e.candidate;
            c.final_score = e.scores.iter().map(|(_, s)| s).sum::<f32>() / e.scores.len() as f32;
            c.source = if e.scores.len() > 1 { SourceTag::Hybrid } else { e.scores[0].0 };
            c
        })
        .collect();
    sort_by_score(&mut merged);
    merged
}

/// Stable sort, best `final_score` first.
pub fn sort_by_score(candidates: &mut [RetrievalCandidate]) {
    candidates.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
}
