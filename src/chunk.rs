//! Text chunking strategies.
//!
//! Splits extracted text into the ordered segments that become embedding
//! units. Chunk order is significant: the position of a chunk in the returned
//! sequence becomes its `chunk_index` everywhere downstream.
//!
//! Two strategies are available, selected by `[chunking].strategy`:
//! - [`FixedSizeChunker`]: character windows of `chunk_size` with `overlap`
//!   characters shared between consecutive windows.
//! - [`SentenceAwareChunker`]: greedy sentence accumulation up to a target
//!   size, hard-splitting only sentences that exceed the maximum.
//!
//! All sizes are measured in characters, not bytes, so multi-byte UTF-8
//! input never splits inside a code point.

use anyhow::Result;

use crate::config::ChunkingConfig;

/// A chunking strategy. Must be deterministic for identical input.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered chunks. Empty input yields an empty vec.
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Builds the chunker selected by the configuration.
pub fn chunker_from_config(config: &ChunkingConfig) -> Result<Box<dyn Chunker>> {
    match config.strategy.as_str() {
        "fixed" => Ok(Box::new(FixedSizeChunker::new(
            config.chunk_size,
            config.overlap,
        )?)),
        "sentence" => Ok(Box::new(SentenceAwareChunker::new(
            config.target_chunk_size,
            config.max_chunk_size,
        )?)),
        other => anyhow::bail!("Unknown chunking strategy: '{}'", other),
    }
}

// ============ Fixed-size ============

pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be positive");
        }
        if overlap >= chunk_size {
            anyhow::bail!("overlap must be less than chunk_size");
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let piece: String = chars[start..end].iter().collect();
            // Whitespace-only windows carry no searchable content.
            if !piece.trim().is_empty() {
                chunks.push(piece);
            }
            start += step;
        }

        if chunks.is_empty() {
            vec![text.to_string()]
        } else {
            chunks
        }
    }
}

// ============ Sentence-aware ============

pub struct SentenceAwareChunker {
    target_chunk_size: usize,
    max_chunk_size: usize,
}

impl SentenceAwareChunker {
    pub fn new(target_chunk_size: usize, max_chunk_size: usize) -> Result<Self> {
        if target_chunk_size == 0 {
            anyhow::bail!("target_chunk_size must be positive");
        }
        if max_chunk_size < target_chunk_size {
            anyhow::bail!("max_chunk_size must be >= target_chunk_size");
        }
        Ok(Self {
            target_chunk_size,
            max_chunk_size,
        })
    }
}

impl Chunker for SentenceAwareChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return vec![text.trim().to_string()];
        }

        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0usize;

        for sentence in sentences {
            let sentence_len = sentence.chars().count();

            // A single sentence longer than the hard cap is split mid-sentence.
            if sentence_len > self.max_chunk_size {
                if !current.is_empty() {
                    chunks.push(current.join(" "));
                    current.clear();
                    current_len = 0;
                }
                let chars: Vec<char> = sentence.chars().collect();
                let mut start = 0;
                while start < chars.len() {
                    let end = (start + self.max_chunk_size).min(chars.len());
                    chunks.push(chars[start..end].iter().collect());
                    start = end;
                }
                continue;
            }

            if current_len + sentence_len > self.target_chunk_size && !current.is_empty() {
                chunks.push(current.join(" "));
                current.clear();
                current_len = 0;
            }

            if !current.is_empty() {
                current_len += 1; // joining space
            }
            current_len += sentence_len;
            current.push(sentence);
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        if chunks.is_empty() {
            vec![text.trim().to_string()]
        } else {
            chunks
        }
    }
}

/// Split on runs of `.`, `!`, `?` followed by whitespace or end of input.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            while let Some(&next) = chars.peek() {
                if matches!(next, '.' | '!' | '?') {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            let at_boundary = match chars.peek() {
                None => true,
                Some(&next) => next.is_whitespace(),
            };
            if at_boundary {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_empty_text_yields_no_chunks() {
        let chunker = FixedSizeChunker::new(512, 50).unwrap();
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn fixed_short_text_single_chunk() {
        let chunker = FixedSizeChunker::new(512, 50).unwrap();
        let chunks = chunker.chunk("hello world");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn fixed_windows_overlap_as_specified() {
        // 1050 chars, chunk_size=512, overlap=50 => windows
        // [0,512), [462,974), [924,1050).
        let text: String = (0..1050).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chars: Vec<char> = text.chars().collect();
        let chunker = FixedSizeChunker::new(512, 50).unwrap();
        let chunks = chunker.chunk(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], chars[0..512].iter().collect::<String>());
        assert_eq!(chunks[1], chars[462..974].iter().collect::<String>());
        assert_eq!(chunks[2], chars[924..1050].iter().collect::<String>());
    }

    #[test]
    fn fixed_counts_characters_not_bytes() {
        let text: String = "é".repeat(600);
        let chunker = FixedSizeChunker::new(512, 0).unwrap();
        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 512);
        assert_eq!(chunks[1].chars().count(), 88);
    }

    #[test]
    fn fixed_rejects_overlap_at_chunk_size() {
        assert!(FixedSizeChunker::new(100, 100).is_err());
        assert!(FixedSizeChunker::new(0, 0).is_err());
    }

    #[test]
    fn fixed_whitespace_only_falls_back_to_whole_text() {
        let chunker = FixedSizeChunker::new(4, 0).unwrap();
        let chunks = chunker.chunk("        ");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn fixed_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let chunker = FixedSizeChunker::new(128, 16).unwrap();
        assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
    }

    #[test]
    fn sentence_accumulates_to_target() {
        let chunker = SentenceAwareChunker::new(40, 80).unwrap();
        let chunks = chunker.chunk("One sentence here. Another one follows. And a third too.");
        assert!(chunks.len() >= 2);
        assert!(chunks[0].starts_with("One sentence here."));
    }

    #[test]
    fn sentence_keeps_short_text_whole() {
        let chunker = SentenceAwareChunker::new(200, 400).unwrap();
        let chunks = chunker.chunk("Tiny. Text.");
        assert_eq!(chunks, vec!["Tiny. Text.".to_string()]);
    }

    #[test]
    fn sentence_splits_oversized_sentence() {
        let chunker = SentenceAwareChunker::new(20, 30).unwrap();
        let long = "x".repeat(95);
        let chunks = chunker.chunk(&long);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
        assert_eq!(chunks.concat(), long);
    }

    #[test]
    fn sentence_empty_text_yields_no_chunks() {
        let chunker = SentenceAwareChunker::new(40, 80).unwrap();
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn split_sentences_handles_terminator_runs() {
        let sentences = split_sentences("Wait... really?! Yes. Trailing");
        assert_eq!(
            sentences,
            vec![
                "Wait...".to_string(),
                "really?!".to_string(),
                "Yes.".to_string(),
                "Trailing".to_string()
            ]
        );
    }

    #[test]
    fn config_selects_strategy() {
        let mut config = ChunkingConfig::default();
        config.strategy = "sentence".to_string();
        chunker_from_config(&config).unwrap();
        config.strategy = "fixed".to_string();
        chunker_from_config(&config).unwrap();
    }
}
