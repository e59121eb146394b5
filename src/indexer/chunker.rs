use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

static TOKENIZER: Lazy<Option<CoreBPE>> = Lazy::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        tracing::warn!("cl100k_base tokenizer unavailable, token counts disabled: {}", e);
        None
    }
});

#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub id: u64,
    pub text: String,
    pub char_len: usize,
    pub token_count: Option<usize>,
}

impl TextChunk {
    fn new(id: u64, text: String) -> Self {
        Self {
            id,
            char_len: text.chars().count(),
            token_count: count_tokens(&text),
            text,
        }
    }
}

pub fn count_tokens(text: &str) -> Option<usize> {
    TOKENIZER
        .as_ref()
        .map(|bpe| bpe.encode_with_special_tokens(text).len())
}

/// Splits a document on blank lines, then windows any section longer than
/// `max_chars` characters. Ids are assigned sequentially in document order.
pub fn split_sections(text: &str, max_chars: usize, overlap: usize) -> Vec<TextChunk> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .flat_map(|section| chunk_text(section, max_chars, overlap))
        .enumerate()
        .map(|(i, piece)| TextChunk::new(i as u64, piece))
        .collect()
}

const BREAKS: [&str; 7] = ["\n\n", "\n", ". ", "? ", "! ", "; ", " "];

/// Windows `text` into pieces of at most `max_chars` characters, cutting after
/// the strongest break in each window. Neighbouring windows share up to
/// `overlap` characters.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    // offsets[i] is the byte position of char i; the last entry is text.len().
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = offsets.len() - 1;

    if max_chars == 0 || total <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    loop {
        let limit = (start + max_chars).min(total);
        let end = if limit == total {
            total
        } else {
            break_before(text, &offsets, start, limit)
        };

        let piece = text[offsets[start]..offsets[end]].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        if end == total {
            break;
        }

        let rewound = end.saturating_sub(overlap);
        start = if rewound > start { rewound } else { end };
    }

    pieces
}

/// Char index just past the last break in `start..limit`, or `limit` if the
/// window has none.
fn break_before(text: &str, offsets: &[usize], start: usize, limit: usize) -> usize {
    let window = &text[offsets[start]..offsets[limit]];
    BREAKS
        .iter()
        .find_map(|sep| window.rfind(sep).map(|pos| offsets[start] + pos + sep.len()))
        .map(|byte| offsets.partition_point(|&o| o < byte))
        .unwrap_or(limit)
}
