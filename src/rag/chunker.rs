use anyhow::bail;
use serde::{Deserialize, Serialize};

/// One indexed chunk of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
}

/// Two-stage splitter: greedy paragraph accumulation, then sentence re-split
/// for anything still over budget. Sizes are byte lengths; all cuts land on
/// char boundaries.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> anyhow::Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Chunker {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Splits a document into passages with deterministic ids. Stage-1 chunks
    /// are `{source}_chunk_{n}`; sentence sub-chunks append `_s{m}`.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Passage> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut stage1: Vec<String> = Vec::new();
        let mut current = String::new();
        for para in normalized.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }
            if !current.is_empty() && current.len() + para.len() + 2 > self.chunk_size {
                let closed = std::mem::take(&mut current);
                current = self.seed_next(&closed, para);
                stage1.push(closed);
            } else if current.is_empty() {
                current.push_str(para);
            } else {
                current.push_str("\n\n");
                current.push_str(para);
            }
        }
        if !current.is_empty() {
            stage1.push(current);
        }

        let mut passages = Vec::new();
        for (n, chunk) in stage1.into_iter().enumerate() {
            let parent_id = format!("{}_chunk_{}", source, n);
            let chunk = chunk.trim();
            if chunk.len() <= self.chunk_size {
                passages.push(Passage {
                    id: parent_id,
                    text: chunk.to_string(),
                    source: source.to_string(),
                    chunk_index: passages.len(),
                });
            } else {
                for (m, sub) in self.resplit_sentences(chunk).into_iter().enumerate() {
                    passages.push(Passage {
                        id: format!("{}_s{}", parent_id, m),
                        text: sub,
                        source: source.to_string(),
                        chunk_index: passages.len(),
                    });
                }
            }
        }
        passages
    }

    /// Seeds the next buffer with the closed chunk's tail so adjacent chunks
    /// overlap. The tail never bisects a word.
    fn seed_next(&self, closed: &str, para: &str) -> String {
        if self.chunk_overlap == 0 {
            return para.to_string();
        }
        let tail = overlap_tail(closed, self.chunk_overlap);
        if tail.is_empty() {
            para.to_string()
        } else {
            format!("{} {}", tail, para)
        }
    }

    fn resplit_sentences(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();
        for sentence in split_sentences(text) {
            if !current.is_empty() && current.len() + sentence.len() + 1 > self.chunk_size {
                out.push(std::mem::take(&mut current));
                current.push_str(sentence);
            } else if current.is_empty() {
                current.push_str(sentence);
            } else {
                current.push(' ');
                current.push_str(sentence);
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
        out
    }
}

/// Collapses horizontal whitespace runs to one space, strips control
/// characters, and bounds blank-line runs to a single blank line. Paragraph
/// breaks (`\n\n`) survive so stage-1 splitting still sees them.
pub fn normalize(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                cleaned.push('\n');
            }
            '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' => {}
            _ => cleaned.push(c),
        }
    }

    let mut out = String::with_capacity(cleaned.len());
    let mut newlines = 0usize;
    let mut pending_space = false;
    for c in cleaned.chars() {
        if c == '\n' {
            newlines += 1;
            pending_space = false;
        } else if c.is_whitespace() {
            pending_space = true;
        } else {
            if newlines > 0 {
                if !out.is_empty() {
                    out.push_str(if newlines == 1 { "\n" } else { "\n\n" });
                }
            } else if pending_space && !out.is_empty() {
                out.push(' ');
            }
            newlines = 0;
            pending_space = false;
            out.push(c);
        }
    }
    out
}

/// Last `overlap` bytes of `text`, snapped forward to the next word boundary
/// when the cut lands inside a word. The result only ever shrinks, so the
/// overlap bound holds.
fn overlap_tail(text: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }
    if text.len() <= overlap {
        return text;
    }
    let mut start = text.len() - overlap;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let prev_is_ws = text[..start]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace);
    let tail = &text[start..];
    if prev_is_ws || tail.starts_with(char::is_whitespace) {
        return tail.trim_start();
    }
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start(),
        None => tail,
    }
}

/// Splits after `.`, `!` or `?` followed by whitespace. Abbreviations are not
/// special-cased.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(end, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = end;
        while let Some(&(i, w)) = chars.peek() {
            if !w.is_whitespace() {
                start = i;
                break;
            }
            chars.next();
        }
    }
    if start < text.len() {
        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
    }
    sentences
}
