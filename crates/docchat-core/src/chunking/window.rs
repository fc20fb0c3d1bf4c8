//! Running-buffer accumulation shared by the sentence and paragraph strategies.

use crate::config::WindowConfig;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Window {
    pub text: String,
    pub page: u32,
    pub topic: Option<String>,
}

/// Spreads units evenly across the known page count: the page counter
/// advances every `ceil(total_units / page_count)` units.
pub(crate) struct PageEstimator {
    per_page: usize,
    page_count: u32,
    seen: usize,
}

impl PageEstimator {
    pub fn new(total_units: usize, page_count: u32) -> Self {
        let page_count = page_count.max(1);
        let per_page = total_units.div_ceil(page_count as usize).max(1);
        Self { per_page, page_count, seen: 0 }
    }

    /// Page of the next unit; advances the counter.
    pub fn next_page(&mut self) -> u32 {
        let page = u32::try_from(self.seen / self.per_page).unwrap_or(u32::MAX).saturating_add(1);
        self.seen += 1;
        page.min(self.page_count)
    }
}

/// Last `overlap` words of `text`, clamped to the words available.
pub(crate) fn trailing_words(text: &str, overlap: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let take = overlap.min(words.len());
    words[words.len() - take..].join(" ")
}

/// Accumulate units into a buffer until adding the next one would exceed
/// `max_size` characters, then flush and seed the next buffer with the
/// trailing overlap window of the flushed one. A buffer holding only the
/// overlap seed is never flushed.
pub(crate) fn accumulate(units: &[String], config: WindowConfig, page_count: u32, separator: &str) -> Vec<Window> {
    let sep_chars = separator.chars().count();
    let mut pages = PageEstimator::new(units.len(), page_count);
    let mut windows = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0usize;
    let mut fresh = false;
    let mut page = 1u32;

    for unit in units {
        let unit_page = pages.next_page();
        let unit_chars = unit.chars().count();
        if fresh && buffer_chars + sep_chars + unit_chars > config.max_size {
            let seed = trailing_words(&buffer, config.overlap);
            windows.push(Window { text: std::mem::take(&mut buffer), page, topic: None });
            buffer_chars = seed.chars().count();
            buffer = seed;
            fresh = false;
        }
        if !fresh { page = unit_page; }
        if !buffer.is_empty() {
            buffer.push_str(separator);
            buffer_chars += sep_chars;
        }
        buffer.push_str(unit);
        buffer_chars += unit_chars;
        fresh = true;
    }
    if fresh { windows.push(Window { text: buffer, page, topic: None }); }
    windows
}
