//! Text processing for TTS: cleaning, sentence splitting and chunking.

pub mod chunker;
pub mod cleaner;
mod sentences;

pub use chunker::{DEFAULT_MAX_CHARS, chunk_sentences, prepare_chunks};
pub use cleaner::clean_text;
pub use sentences::split_into_sentences;

/// A chunk of text ready for TTS processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of this chunk within its document
    pub index: usize,
    /// The text content
    pub text: String,
}

impl TextChunk {
    /// Create a new text chunk.
    pub fn new(index: usize, text: String) -> Self {
        Self { index, text }
    }

    /// Length in characters, the unit of the chunk budget.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
