//! Punctuation-based sentence splitting.
//!
//! A boundary is terminal punctuation (`.`, `!`, `?`), optionally followed by
//! closing quotes or brackets, then whitespace, then something that can open a
//! sentence: an uppercase letter, a digit, or an opening quote/bracket.
//! Abbreviations such as "Dr. Smith" or "Fig. 3" split anyway.

const TERMINALS: &[char] = &['.', '!', '?'];
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}'];
const OPENERS: &[char] = &['"', '\'', '(', '['];

/// Split normalized text into sentences.
///
/// Sentences are trimmed slices of the input, so joining them with a single
/// space reproduces text whose whitespace has already been collapsed.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (_, c) = chars[i];
        if !TERMINALS.contains(&c) {
            i += 1;
            continue;
        }

        // Swallow repeated terminals ("?!") and closing quotes/brackets.
        let mut end = i + 1;
        while end < chars.len() && (TERMINALS.contains(&chars[end].1) || CLOSERS.contains(&chars[end].1)) {
            end += 1;
        }

        let mut next = end;
        while next < chars.len() && chars[next].1.is_whitespace() {
            next += 1;
        }

        if next > end && next < chars.len() && opens_sentence(chars[next].1) {
            let byte_end = chars[end].0;
            push_trimmed(&mut sentences, &text[start..byte_end]);
            start = chars[next].0;
            i = next;
        } else {
            i = end;
        }
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn opens_sentence(c: char) -> bool {
    c.is_uppercase() || c.is_ascii_digit() || OPENERS.contains(&c)
}

fn push_trimmed(sentences: &mut Vec<String>, sentence: &str) {
    let sentence = sentence.trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }
}
