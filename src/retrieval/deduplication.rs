//! Result deduplication by document identity

use crate::document::Document;
use std::collections::HashSet;

/// Deduplicate scored documents by identity, keeping the first (best ranked) instance
pub fn deduplicate_scored(documents: Vec<(Document, f32)>) -> Vec<(Document, f32)> {
    let mut seen: HashSet<String> = HashSet::new();

    documents
        .into_iter()
        .filter(|(doc, _)| seen.insert(doc.identity()))
        .collect()
}

/// Deduplicate documents by identity, keeping the first instance
pub fn deduplicate_documents(documents: Vec<Document>) -> Vec<Document> {
    let mut seen: HashSet<String> = HashSet::new();

    documents
        .into_iter()
        .filter(|doc| seen.insert(doc.identity()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduplication() {
        let docs = vec![
            (Document::new("text1").with_id("1"), 0.9),
            (Document::new("text2").with_id("2"), 0.8),
            (Document::new("text1 again").with_id("1"), 0.7), // Duplicate
        ];

        let deduped = deduplicate_scored(docs);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].0.page_content, "text1");
        assert_eq!(deduped[0].1, 0.9); // Keeps first (highest score)
    }

    #[test]
    fn test_identity_falls_back_to_type_and_content() {
        let docs = vec![
            Document::new("same body").with_type("page"),
            Document::new("same body").with_type("page"),
            Document::new("same body").with_type("message"),
        ];
        assert_eq!(deduplicate_documents(docs).len(), 2);
    }
}
