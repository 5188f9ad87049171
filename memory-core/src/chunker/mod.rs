//! Chunker: splits long inputs into semantically coherent chunks using
//! one of three strategies, chosen by content kind.

mod ast;
mod heading;
mod prose;

use uuid::Uuid;

/// A content kind recognized by the chunker dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Recognized source language (currently a conservative heuristic:
    /// braces/`fn`/`def` density — see [`ast::looks_like_source`]).
    Source,
    /// Markdown or reST: has heading markers.
    StructuredMarkup,
    /// Anything else: prose.
    Prose,
}

/// One chunk of a (possibly single-chunk) document.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Shared by every chunk of the same source document.
    pub document_id: Uuid,
    /// Position among this document's chunks, starting at 0.
    pub chunk_index: u32,
    /// Total number of chunks in this document.
    pub total_chunks: u32,
    /// The chunk's text.
    pub text: String,
    /// Ancestor heading breadcrumb, for heading-aware chunks. Empty for
    /// the other two strategies.
    pub breadcrumb: Vec<String>,
}

/// Token budget bounds honored by every strategy.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBudget {
    /// Chunks smaller than this are merged with a neighbor where possible.
    pub min_chunk_tokens: usize,
    /// Chunks are never allowed to exceed this (prose packing stops
    /// growing a chunk once it would).
    pub max_chunk_tokens: usize,
    /// Sentence overlap carried into the next prose chunk.
    pub overlap_sentences: usize,
}

impl Default for ChunkBudget {
    fn default() -> Self {
        Self {
            min_chunk_tokens: 50,
            max_chunk_tokens: 400,
            overlap_sentences: 1,
        }
    }
}

/// Rough token estimate: ~4 characters per token, the same heuristic used
/// by the embedding client's batching and the retrieval packer.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4).max(1)
}

/// Classify `content` by kind, for chunker strategy dispatch.
#[must_use]
pub fn classify(content: &str) -> ContentKind {
    if heading::looks_like_structured_markup(content) {
        ContentKind::StructuredMarkup
    } else if ast::looks_like_source(content) {
        ContentKind::Source
    } else {
        ContentKind::Prose
    }
}

/// Split `content` into chunks, picking a strategy via [`classify`] unless
/// `content` fits in a single chunk under the budget, in which case a
/// single whole-document chunk is returned untouched.
#[must_use]
pub fn chunk_content(content: &str, budget: ChunkBudget) -> Vec<Chunk> {
    if estimate_tokens(content) <= budget.max_chunk_tokens {
        let document_id = Uuid::new_v4();
        return vec![Chunk {
            document_id,
            chunk_index: 0,
            total_chunks: 1,
            text: content.to_string(),
            breadcrumb: Vec::new(),
        }];
    }

    let document_id = Uuid::new_v4();
    let raw: Vec<(String, Vec<String>)> = match classify(content) {
        ContentKind::Source => ast::split(content, budget)
            .into_iter()
            .map(|text| (text, Vec::new()))
            .collect(),
        ContentKind::StructuredMarkup => heading::split(content, budget),
        ContentKind::Prose => prose::split(content, budget)
            .into_iter()
            .map(|text| (text, Vec::new()))
            .collect(),
    };

    let total = raw.len() as u32;
    raw.into_iter()
        .enumerate()
        .map(|(index, (text, breadcrumb))| Chunk {
            document_id,
            chunk_index: index as u32,
            total_chunks: total,
            text,
            breadcrumb,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_a_single_chunk() {
        let chunks = chunk_content("a short piece of content", ChunkBudget::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn chunk_indices_are_contiguous() {
        let long_prose = "This is a sentence. ".repeat(500);
        let chunks = chunk_content(&long_prose, ChunkBudget::default());
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
            assert_eq!(chunk.total_chunks, chunks.len() as u32);
        }
        let doc_id = chunks[0].document_id;
        assert!(chunks.iter().all(|c| c.document_id == doc_id));
    }

    #[test]
    fn classifies_markdown_as_structured_markup() {
        let markdown = "# Title\n\nSome text.\n\n## Section\n\nMore text.";
        assert_eq!(classify(markdown), ContentKind::StructuredMarkup);
    }

    #[test]
    fn classifies_rust_source_as_source() {
        let code = "fn main() {\n    let x = 1;\n    println!(\"{}\", x);\n}\n";
        assert_eq!(classify(code), ContentKind::Source);
    }
}
