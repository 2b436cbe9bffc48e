use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::models::LeagueDocument;

/// League document wrapped with CouchDB's identity and revision fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchLeagueDocument {
    /// Document id, the league key.
    #[serde(rename = "_id")]
    pub id: String,
    /// Current revision; absent on first write.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// League fields stored next to the CouchDB metadata.
    #[serde(flatten)]
    pub league: LeagueDocument,
}

impl CouchLeagueDocument {
    /// Wrap a league document for a PUT.
    pub fn new(id: impl Into<String>, rev: Option<String>, league: LeagueDocument) -> Self {
        Self {
            id: id.into(),
            rev,
            league,
        }
    }
}

/// Only the revision of a document, used before overwriting it.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    /// Current revision.
    #[serde(rename = "_rev")]
    pub rev: String,
}

/// Database metadata; only the update sequence is read.
#[derive(Debug, Deserialize)]
pub struct DatabaseInfo {
    /// Opaque sequence of the latest change.
    pub update_seq: Value,
}

/// Response of a long-poll `_changes` request.
#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    /// Changes since the requested sequence.
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    /// Sequence to resume from.
    pub last_seq: Value,
}

/// One row of a `_changes` response.
#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    /// Changed document id.
    pub id: String,
    /// Whether the change was a deletion.
    #[serde(default)]
    pub deleted: bool,
    /// Document body when `include_docs` is set.
    #[serde(default)]
    pub doc: Option<Value>,
}

/// CouchDB 1.x reports numeric sequences, later versions opaque strings.
pub fn sequence_token(seq: &Value) -> String {
    match seq {
        Value::String(token) => token.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn document_fields_are_flattened() {
        let doc = CouchLeagueDocument::new(
            "leagueState",
            Some("1-abc".into()),
            LeagueDocument { teams: Vec::new() },
        );
        let value = serde_json::to_value(doc).unwrap();
        assert_eq!(value, json!({"_id": "leagueState", "_rev": "1-abc", "teams": []}));
    }

    #[test]
    fn sequence_tokens_accept_both_formats() {
        assert_eq!(sequence_token(&json!("12-g1AAAA")), "12-g1AAAA");
        assert_eq!(sequence_token(&json!(42)), "42");
    }

    #[test]
    fn database_info_exposes_the_update_sequence() {
        let info: DatabaseInfo = serde_json::from_value(json!({
            "db_name": "fantasy_golf",
            "doc_count": 1,
            "update_seq": "7-g1AAAA"
        }))
        .unwrap();
        assert_eq!(sequence_token(&info.update_seq), "7-g1AAAA");
    }

    #[test]
    fn deleted_rows_have_no_document() {
        let payload: ChangesResponse = serde_json::from_value(json!({
            "results": [{"id": "leagueState", "deleted": true, "changes": [{"rev": "3-x"}]}],
            "last_seq": "5-y"
        }))
        .unwrap();
        assert!(payload.results[0].deleted);
        assert!(payload.results[0].doc.is_none());
    }
}
