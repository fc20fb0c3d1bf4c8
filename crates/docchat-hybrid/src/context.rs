//! Context assembly: ranked candidates to a token-budgeted text block.
//!
//! Candidates are taken whole, in rank order, until the next one would push
//! the estimate over budget. Nothing is ever cut mid-candidate.

use serde::{Deserialize, Serialize};

use docchat_core::types::{estimate_tokens, Citation, Modality, RetrievalCandidate};

const SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub included: Vec<Citation>,
    pub estimated_tokens: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool { self.text.is_empty() }
}

fn citation(c: &RetrievalCandidate) -> Citation {
    Citation { chunk_index: c.chunk.chunk_index, page_number: c.chunk.page_number }
}

pub fn render_line(c: &RetrievalCandidate) -> String {
    format!("[Page {}] {}", c.chunk.page_number, c.chunk.text.trim())
}

pub fn assemble(candidates: &[RetrievalCandidate], token_budget: usize) -> AssembledContext {
    let mut text = String::new();
    let mut included = Vec::new();
    for c in candidates {
        let line = render_line(c);
        let next = if text.is_empty() { line } else { format!("{}{}{}", text, SEPARATOR, line) };
        if estimate_tokens(&next) > token_budget { break; }
        text = next;
        included.push(citation(c));
    }
    let estimated_tokens = estimate_tokens(&text);
    AssembledContext { text, included, estimated_tokens }
}

fn mmss(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Annotated line for a candidate of any modality: images carry pixel
/// dimensions, audio carries its `mm:ss–mm:ss` range.
pub fn render_modal_line(c: &RetrievalCandidate) -> String {
    let chunk = &c.chunk;
    let marker = match (chunk.modality, chunk.dimensions, chunk.time_range) {
        (Modality::Image, Some(d), _) => format!("[Page {}, {}x{}]", chunk.page_number, d.width, d.height),
        (Modality::Audio, _, Some(t)) => format!("[{}–{}]", mmss(t.start_secs), mmss(t.end_secs)),
        _ => format!("[Page {}]", chunk.page_number),
    };
    format!("{} {}", marker, chunk.text.trim())
}

fn section_title(m: Modality) -> &'static str {
    match m {
        Modality::Text => "Text excerpts:",
        Modality::Image => "Image descriptions:",
        Modality::Audio => "Audio transcripts:",
    }
}

fn render_grouped(selected: &[&RetrievalCandidate]) -> String {
    let mut sections = Vec::new();
    for m in Modality::ALL {
        let lines: Vec<String> = selected.iter().filter(|c| c.chunk.modality == m).map(|c| render_modal_line(c)).collect();
        if !lines.is_empty() { sections.push(format!("{}\n{}", section_title(m), lines.join("\n"))); }
    }
    sections.join(SEPARATOR)
}

/// Multimodal variant: selection is greedy in rank order against the budget
/// of the full grouped rendering; output is grouped into modality sections.
pub fn assemble_multimodal(candidates: &[RetrievalCandidate], token_budget: usize) -> AssembledContext {
    let mut selected: Vec<&RetrievalCandidate> = Vec::new();
    let mut text = String::new();
    for c in candidates {
        selected.push(c);
        let next = render_grouped(&selected);
        if estimate_tokens(&next) > token_budget {
            selected.pop();
            break;
        }
        text = next;
    }
    let included = selected.iter().map(|c| citation(c)).collect();
    let estimated_tokens = estimate_tokens(&text);
    AssembledContext { text, included, estimated_tokens }
}
