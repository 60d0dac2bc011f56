//! Greedy sentence chunking.
//!
//! Sentences are packed into chunks joined by single spaces, and a chunk
//! never exceeds `max_len` characters unless it holds one sentence that is
//! longer than the limit on its own.

use super::{Chunk, ChunkIndex, Sentence};
use crate::config::OversizePolicy;

/// Default chunk budget in characters (the speech service's input limit).
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 4096;

/// Maximum recursion depth for splitting long sentences.
const MAX_SPLIT_DEPTH: usize = 10;

/// Group sentences into ordered chunks of at most `max_len` characters.
///
/// With [`OversizePolicy::Isolate`] the chunks partition the sentence
/// sequence exactly. With [`OversizePolicy::Split`] an oversized sentence is
/// broken into several chunks that all cover that one sentence.
pub fn chunk_sentences(
    sentences: &[Sentence],
    max_len: usize,
    policy: OversizePolicy,
) -> Vec<Chunk> {
    let mut builder = ChunkBuilder::default();

    for (i, sentence) in sentences.iter().enumerate() {
        let len = sentence.char_len();

        if len > max_len && policy == OversizePolicy::Split {
            builder.flush();
            for part in split_long_sentence(&sentence.text, max_len, 0) {
                builder.push_whole(i, part);
            }
            continue;
        }

        if builder.fits(len, max_len) {
            builder.append(i, sentence);
        } else {
            builder.flush();
            builder.append(i, sentence);
        }
    }

    builder.finish()
}

#[derive(Default)]
struct ChunkBuilder {
    chunks: Vec<Chunk>,
    text: String,
    text_len: usize,
    first: usize,
    end: usize,
}

impl ChunkBuilder {
    fn fits(&self, len: usize, max_len: usize) -> bool {
        self.text.is_empty() || self.text_len + 1 + len <= max_len
    }

    fn append(&mut self, index: usize, sentence: &Sentence) {
        if self.text.is_empty() {
            self.first = index;
        } else {
            self.text.push(' ');
            self.text_len += 1;
        }
        self.text.push_str(&sentence.text);
        self.text_len += sentence.char_len();
        self.end = index + 1;
    }

    fn push_whole(&mut self, index: usize, text: String) {
        self.chunks.push(Chunk {
            index: ChunkIndex(self.chunks.len()),
            sentences: index..index + 1,
            text,
        });
    }

    fn flush(&mut self) {
        if self.text.is_empty() {
            return;
        }
        self.chunks.push(Chunk {
            index: ChunkIndex(self.chunks.len()),
            sentences: self.first..self.end,
            text: std::mem::take(&mut self.text),
        });
        self.text_len = 0;
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split a long sentence at clause, then word, then character boundaries.
fn split_long_sentence(sentence: &str, max_len: usize, depth: usize) -> Vec<String> {
    if char_len(sentence) <= max_len {
        return vec![sentence.to_string()];
    }

    if depth > MAX_SPLIT_DEPTH {
        return hard_split(sentence, max_len);
    }

    const DELIMITERS: &[&str] = &[";", ":", ",", " - "];

    for delimiter in DELIMITERS {
        let parts: Vec<&str> = sentence.split(delimiter).collect();
        if parts.len() < 2 {
            continue;
        }

        let pieces = reassemble_parts(&parts, delimiter, max_len);
        if pieces.len() > 1 {
            return pieces
                .into_iter()
                .flat_map(|piece| {
                    if char_len(&piece) > max_len {
                        split_long_sentence(&piece, max_len, depth + 1)
                    } else {
                        vec![piece]
                    }
                })
                .collect();
        }
    }

    let words = split_on_words(sentence, max_len);
    if words.len() > 1 {
        return words
            .into_iter()
            .flat_map(|piece| {
                if char_len(&piece) > max_len {
                    hard_split(&piece, max_len)
                } else {
                    vec![piece]
                }
            })
            .collect();
    }

    hard_split(sentence, max_len)
}

/// Rejoin delimiter-split parts greedily, keeping the delimiter on the left part.
fn reassemble_parts(parts: &[&str], delimiter: &str, max_len: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let last = parts.len() - 1;

    for (i, part) in parts.iter().enumerate() {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let piece = if i < last {
            format!("{}{}", part, delimiter.trim_end())
        } else {
            part.to_string()
        };

        if current.is_empty() {
            current = piece;
        } else if char_len(&current) + 1 + char_len(&piece) <= max_len {
            current.push(' ');
            current.push_str(&piece);
        } else {
            pieces.push(std::mem::replace(&mut current, piece));
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

fn split_on_words(text: &str, max_len: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if char_len(&current) + 1 + char_len(word) <= max_len {
            current.push(' ');
            current.push_str(word);
        } else {
            pieces.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

fn hard_split(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_len.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
