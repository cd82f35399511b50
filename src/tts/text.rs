use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Clause boundaries: ASCII punctuation followed by whitespace, or
    // full-width punctuation on its own.
    static ref BOUNDARY_REGEX: Regex = Regex::new(
        r"(?x)
        [;:,.!?]\s+ |
        [；：，。！？]
        "
    )
    .unwrap();
}

/// Make the reference transcript end on a sentence break so the model
/// does not run it into the generated text.
pub fn prepare_ref_text(ref_text: &str) -> String {
    if ref_text.ends_with(". ") || ref_text.ends_with('。') {
        ref_text.to_string()
    } else if ref_text.ends_with('.') {
        format!("{} ", ref_text)
    } else {
        format!("{}. ", ref_text)
    }
}

/// Split text into clauses, keeping each clause's punctuation.
fn split_clauses(text: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut last_end = 0;

    for m in BOUNDARY_REGEX.find_iter(text) {
        let clause = text[last_end..m.end()].trim_end();
        clauses.push(clause);
        last_end = m.end();
    }

    if last_end < text.len() {
        clauses.push(&text[last_end..]);
    }

    clauses
}

/// Group clauses into chunks of at most `max_bytes` UTF-8 bytes.
///
/// A single clause longer than the limit becomes its own chunk.
pub fn chunk_text(text: &str, max_bytes: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for clause in split_clauses(text) {
        if clause.is_empty() {
            continue;
        }

        if !current.is_empty() && current.len() + clause.len() > max_bytes {
            chunks.push(current.trim().to_string());
            current.clear();
        }

        current.push_str(clause);
        if clause.chars().last().map(|c| c.is_ascii()).unwrap_or(false) {
            current.push(' ');
        }
    }

    let last = current.trim();
    if !last.is_empty() {
        chunks.push(last.to_string());
    }

    chunks
}
