//! Reconciliation of optimistic uploads against the server's document list.

use std::collections::HashSet;

use crate::models::Document;

/// Stable key: id, else storage key, else `name@timestamp`.
pub fn document_key(doc: &Document) -> String {
    if let Some(id) = doc.document_id() {
        return format!("id:{id}");
    }
    if let Some(key) = doc.storage_key() {
        return format!("key:{key}");
    }
    let at = doc
        .created_at
        .map(|t| t.timestamp_millis().to_string())
        .unwrap_or_default();
    format!("name:{}@{}", doc.display_name(), at)
}

/// Server entries first (server order, duplicates collapsed), then
/// optimistic entries the server does not list yet.
pub fn merge_documents(server: &[Document], optimistic: &[Document]) -> Vec<Document> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(server.len() + optimistic.len());

    for doc in server {
        if seen.insert(document_key(doc)) {
            merged.push(doc.clone());
        }
    }
    for doc in optimistic {
        if seen.insert(document_key(doc)) {
            let mut doc = doc.clone();
            doc.optimistic = true;
            merged.push(doc);
        }
    }
    merged
}

/// Drop optimistic entries the server has confirmed. A document confirmed
/// by either its id or its storage key counts.
pub fn prune_confirmed(optimistic: &mut Vec<Document>, server: &[Document]) -> usize {
    let confirmed_ids: HashSet<&str> = server.iter().filter_map(Document::document_id).collect();
    let confirmed_keys: HashSet<&str> = server.iter().filter_map(Document::storage_key).collect();
    let confirmed: HashSet<String> = server.iter().map(document_key).collect();

    let before = optimistic.len();
    optimistic.retain(|doc| {
        let by_id = doc.document_id().is_some_and(|id| confirmed_ids.contains(id));
        let by_key = doc.storage_key().is_some_and(|k| confirmed_keys.contains(k));
        !(by_id || by_key || confirmed.contains(&document_key(doc)))
    });
    before - optimistic.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: Option<&str>, key: Option<&str>, name: &str) -> Document {
        Document {
            id: id.map(str::to_string),
            storage_key: key.map(str::to_string),
            original_name: Some(name.to_string()),
            ..Document::default()
        }
    }

    #[test]
    fn key_prefers_id_then_storage_key() {
        assert_eq!(document_key(&doc(Some("d1"), Some("k1"), "a")), "id:d1");
        assert_eq!(document_key(&doc(None, Some("k1"), "a")), "key:k1");
        assert_eq!(document_key(&doc(None, None, "a.pdf")), "name:a.pdf@");
    }

    #[test]
    fn merge_never_duplicates_and_keeps_server_first() {
        let server = vec![doc(Some("d1"), None, "a"), doc(Some("d2"), None, "b")];
        let optimistic = vec![doc(Some("d2"), None, "b"), doc(None, Some("k3"), "c")];

        let merged = merge_documents(&server, &optimistic);
        let keys: Vec<_> = merged.iter().map(document_key).collect();
        assert_eq!(keys, vec!["id:d1", "id:d2", "key:k3"]);
        assert!(!merged[1].optimistic);
        assert!(merged[2].optimistic);

        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn prune_drops_confirmed_by_storage_key() {
        let mut optimistic = vec![doc(Some("local"), Some("k1"), "a"), doc(None, Some("k2"), "b")];
        let server = vec![doc(Some("d9"), Some("k1"), "a")];

        assert_eq!(prune_confirmed(&mut optimistic, &server), 1);
        assert_eq!(optimistic.len(), 1);
        assert_eq!(optimistic[0].storage_key(), Some("k2"));
    }
}
