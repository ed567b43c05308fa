//! BM25 scoring over the candidate window.
//!
//! Each candidate's searchable text is one document; the window itself is
//! the corpus, so document frequencies adapt to whatever set the caller
//! passes in. Scores are length-normalized with the usual k1/b defaults.

use std::collections::{HashMap, HashSet};

use crate::text::token_set;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Best-chunk explain record: the highest-scoring contiguous span of the
/// candidate text.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestChunk {
    pub text: String,
    pub score: f32,
}

struct Document {
    id: String,
    tokens: Vec<String>,
    token_counts: HashMap<String, usize>,
}

/// A scorer over one candidate window.
pub struct Bm25Window {
    documents: Vec<Document>,
    doc_freq: HashMap<String, usize>,
    average_len: f32,
}

fn tokenize_ordered(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| t.len() > 2 && !crate::text::STOP_WORDS.contains(&t.as_str()))
        .collect()
}

impl Bm25Window {
    /// Build the corpus from `(id, text)` candidates.
    pub fn build<'a>(candidates: impl Iterator<Item = (&'a str, &'a str)>) -> Self {
        let mut documents = Vec::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for (id, text) in candidates {
            let tokens = tokenize_ordered(text);
            total_len += tokens.len();
            let mut token_counts: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *token_counts.entry(token.clone()).or_default() += 1;
            }
            for token in token_counts.keys() {
                *doc_freq.entry(token.clone()).or_default() += 1;
            }
            documents.push(Document {
                id: id.to_string(),
                tokens,
                token_counts,
            });
        }

        let average_len = if documents.is_empty() {
            0.0
        } else {
            total_len as f32 / documents.len() as f32
        };
        Self {
            documents,
            doc_freq,
            average_len,
        }
    }

    fn idf(&self, token: &str) -> f32 {
        let n = self.documents.len() as f32;
        let df = *self.doc_freq.get(token).unwrap_or(&0) as f32;
        // The +1 keeps idf positive for tokens present in most documents.
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 scores for every document against the query, keyed by id.
    pub fn score(&self, query: &str) -> HashMap<String, f32> {
        let query_tokens = token_set(query);
        let mut scores = HashMap::new();
        if query_tokens.is_empty() || self.average_len == 0.0 {
            return scores;
        }
        for doc in &self.documents {
            let mut score = 0.0f32;
            let doc_len = doc.tokens.len() as f32;
            for token in &query_tokens {
                let tf = *doc.token_counts.get(token.as_str()).unwrap_or(&0) as f32;
                if tf == 0.0 {
                    continue;
                }
                let idf = self.idf(token);
                let denom = tf + K1 * (1.0 - B + B * doc_len / self.average_len);
                score += idf * tf * (K1 + 1.0) / denom;
            }
            if score > 0.0 {
                scores.insert(doc.id.clone(), score);
            }
        }
        scores
    }
}

/// Chunk span length for best-chunk extraction.
const CHUNK_CHARS: usize = 160;

/// The highest-scoring contiguous span of `text` for the query, used as an
/// explain record in search responses.
pub fn best_chunk(query: &str, text: &str) -> Option<BestChunk> {
    let query_tokens = token_set(query);
    if query_tokens.is_empty() || text.is_empty() {
        return None;
    }

    let mut best: Option<BestChunk> = None;
    let mut current = String::new();
    let mut flush = |chunk: &str, best: &mut Option<BestChunk>| {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            return;
        }
        let chunk_tokens = token_set(chunk);
        let hits = query_tokens.intersection(&chunk_tokens).count();
        if hits == 0 {
            return;
        }
        let score = hits as f32 / query_tokens.len() as f32;
        if best.as_ref().map(|b| score > b.score).unwrap_or(true) {
            *best = Some(BestChunk {
                text: chunk.to_string(),
                score,
            });
        }
    };

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > CHUNK_CHARS {
            flush(&current, &mut best);
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    flush(&current, &mut best);
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_document_outscores_nonmatching() {
        let docs = vec![
            ("d1", "billing invoice export broken"),
            ("d2", "frontend color palette refresh"),
            ("d3", "invoice numbering sequence"),
        ];
        let window = Bm25Window::build(docs.iter().map(|(id, text)| (*id, *text)));
        let scores = window.score("invoice export");
        assert!(scores["d1"] > scores["d3"]);
        assert!(!scores.contains_key("d2"));
    }

    #[test]
    fn rare_terms_weigh_more_than_common_ones() {
        let docs = vec![
            ("d1", "deploy service deploy pipeline deploy"),
            ("d2", "deploy kubernetes helm chart"),
            ("d3", "deploy artifacts"),
        ];
        let window = Bm25Window::build(docs.iter().map(|(id, text)| (*id, *text)));
        // "kubernetes" appears in one doc only; "deploy" is everywhere, so
        // the rare term contributes more per occurrence.
        let rare = window.score("kubernetes");
        let common = window.score("deploy");
        assert_eq!(rare.len(), 1);
        assert!(rare["d2"] > common["d2"]);
    }

    #[test]
    fn empty_query_scores_nothing() {
        let docs = vec![("d1", "anything at all")];
        let window = Bm25Window::build(docs.iter().map(|(id, text)| (*id, *text)));
        assert!(window.score("").is_empty());
        assert!(window.score("a of").is_empty());
    }

    #[test]
    fn best_chunk_picks_span_with_most_query_hits() {
        let text = format!(
            "{} login redirect fails after oauth callback {}",
            "padding words here ".repeat(12),
            "trailing filler text ".repeat(12)
        );
        let chunk = best_chunk("login redirect oauth", &text).unwrap();
        assert!(chunk.text.contains("login redirect"));
        assert!(chunk.score > 0.5);
        assert!(best_chunk("zebra quantum", &text).is_none());
    }
}
