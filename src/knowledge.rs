//! Source text for the knowledge base, compiled into the binary.

use crate::indexer::chunker::{split_sections, TextChunk};

/// History of the Democratic Republic of Georgia (1918-1921).
pub const GEORGIAN_HISTORY: &str = include_str!("../data/georgian_history.txt");

pub fn georgian_history_chunks(max_chars: usize, overlap: usize) -> Vec<TextChunk> {
    split_sections(GEORGIAN_HISTORY, max_chars, overlap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_is_paragraph_chunked() {
        let chunks = georgian_history_chunks(1000, 200);
        assert!(chunks.len() >= 5);
        assert!(chunks[0].text.contains("26 May 1918"));
        assert!(chunks.iter().all(|c| !c.text.contains("\n\n")));
    }
}
