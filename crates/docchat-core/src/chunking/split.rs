//! Unit splitters feeding the window accumulator.

/// Split on terminal punctuation (`.`, `!`, `?`) followed by whitespace or end
/// of input. Trailing quotes/brackets stay with their sentence; whitespace
/// inside a sentence is collapsed.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            while let Some(&n) = chars.peek() {
                if matches!(n, '.' | '!' | '?' | '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}') {
                    current.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek().map_or(true, |n| n.is_whitespace()) { flush(&mut out, &mut current); }
        }
    }
    flush(&mut out, &mut current);
    out
}

/// Split on blank lines. Lines inside a paragraph are joined with a space.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut out, &mut current);
        } else {
            current.push(' ');
            current.push_str(line);
        }
    }
    flush(&mut out, &mut current);
    out
}

/// Re-split any unit longer than `max_size` characters into word-aligned
/// pieces that fit. A single word longer than `max_size` is kept whole.
pub(crate) fn bound_units(units: Vec<String>, max_size: usize) -> Vec<String> {
    let max_size = max_size.max(1);
    let mut out = Vec::with_capacity(units.len());
    for unit in units {
        if unit.chars().count() <= max_size { out.push(unit); continue; }
        let mut piece = String::new();
        let mut piece_chars = 0usize;
        for word in unit.split_whitespace() {
            let word_chars = word.chars().count();
            if piece_chars > 0 && piece_chars + 1 + word_chars > max_size {
                out.push(std::mem::take(&mut piece));
                piece_chars = 0;
            }
            if piece_chars > 0 { piece.push(' '); piece_chars += 1; }
            piece.push_str(word);
            piece_chars += word_chars;
        }
        if !piece.is_empty() { out.push(piece); }
    }
    out
}

fn flush(out: &mut Vec<String>, current: &mut String) {
    let normalized = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !normalized.is_empty() { out.push(normalized); }
    current.clear();
}
