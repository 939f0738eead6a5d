//! Text chunking for TTS processing.

use super::TextChunk;
use super::cleaner::clean_text;
use super::sentences::split_into_sentences;

/// Default maximum chunk size in characters.
pub const DEFAULT_MAX_CHARS: usize = 1000;

/// Group sentences into chunks of at most `max_chars` characters.
///
/// Sentences are appended greedily, joined by a single space. When the next
/// sentence would push the chunk past the budget, the chunk is closed and the
/// sentence starts a new one. A sentence that is longer than the budget on its
/// own becomes a single oversized chunk; sentences are never cut.
pub fn chunk_sentences<S: AsRef<str>>(sentences: &[S], max_chars: usize) -> Vec<TextChunk> {
    let mut texts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences {
        let sentence = sentence.as_ref().trim();
        if sentence.is_empty() {
            continue;
        }
        let sentence_len = sentence.chars().count();

        if current.is_empty() {
            current.push_str(sentence);
            current_len = sentence_len;
        } else if current_len + 1 + sentence_len <= max_chars {
            current.push(' ');
            current.push_str(sentence);
            current_len += 1 + sentence_len;
        } else {
            texts.push(std::mem::take(&mut current));
            current.push_str(sentence);
            current_len = sentence_len;
        }
    }

    if !current.is_empty() {
        texts.push(current);
    }

    texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk::new(index, text))
        .collect()
}

/// Clean raw extracted text and split it into TTS-ready chunks.
pub fn prepare_chunks(raw: &str, max_chars: usize) -> Vec<TextChunk> {
    let text = clean_text(raw);
    if text.is_empty() {
        return Vec::new();
    }
    chunk_sentences(&split_into_sentences(&text), max_chars)
}
