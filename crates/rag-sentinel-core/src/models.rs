//! Data types that flow through the answering pipeline.
//!
//! Every type derived from a query carries the same `query_id`, computed
//! once at intake by [`identity::query_id`](crate::identity::query_id).

use serde::{Deserialize, Serialize};

/// An ingestion record as it appears on the document stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc: String,
}

/// A query after intent extraction, identity derivation and embedding.
#[derive(Debug, Clone)]
pub struct Query {
    pub user: String,
    pub raw_query: String,
    pub clean_query: String,
    pub alert_enabled: bool,
    pub embedding: Vec<f32>,
    pub query_id: String,
}

/// The top-k documents retrieved for one query, in distance rank.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub query_id: String,
    pub documents: Vec<String>,
}

/// The single answer produced for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub query_id: String,
    pub query: String,
    pub alert_enabled: bool,
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_json_shape() {
        let answer = Answer {
            query_id: "abc".into(),
            query: "q".into(),
            alert_enabled: true,
            response: "r".into(),
        };
        let v = serde_json::to_value(&answer).unwrap();
        assert_eq!(v["query_id"], "abc");
        assert_eq!(v["alert_enabled"], true);
    }

    #[test]
    fn test_document_record_parse() {
        let rec: DocumentRecord = serde_json::from_str(r#"{"doc": "cats are mammals"}"#).unwrap();
        assert_eq!(rec.doc, "cats are mammals");
    }
}
