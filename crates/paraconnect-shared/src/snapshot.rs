//! Cheap collection fingerprints used to decide whether a re-render is needed.

use chrono::{DateTime, Utc};

use crate::documents::document_key;
use crate::models::{Document, Message, Task};

/// Fingerprint of an id-addressed collection (messages, documents).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionSnapshot {
    pub count: usize,
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub latest_id: Option<String>,
}

/// Fingerprint of the positional task list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskSnapshot {
    pub count: usize,
    pub signature: String,
}

fn latest_of<'a, T>(
    items: &'a [T],
    timestamp: impl Fn(&T) -> Option<DateTime<Utc>>,
    id: impl Fn(&'a T) -> Option<String>,
) -> CollectionSnapshot {
    // Ties keep the later entry so an append with an equal timestamp still registers.
    let latest = items
        .iter()
        .enumerate()
        .max_by_key(|(idx, item)| (timestamp(item), *idx))
        .map(|(_, item)| item);

    CollectionSnapshot {
        count: items.len(),
        latest_timestamp: latest.and_then(&timestamp),
        latest_id: latest.and_then(id),
    }
}

pub fn message_snapshot(messages: &[Message]) -> CollectionSnapshot {
    latest_of(
        messages,
        |m| m.created_at,
        |m| m.message_id().map(str::to_string),
    )
}

pub fn document_snapshot(documents: &[Document]) -> CollectionSnapshot {
    latest_of(documents, |d| d.created_at, |d| Some(document_key(d)))
}

/// Order and completion sensitive: `title:completed` joined by `|`.
pub fn task_snapshot(tasks: &[Task]) -> TaskSnapshot {
    let signature = tasks
        .iter()
        .map(|t| format!("{}:{}", t.title, if t.completed { 1 } else { 0 }))
        .collect::<Vec<_>>()
        .join("|");
    TaskSnapshot {
        count: tasks.len(),
        signature,
    }
}

/// First load always counts as a change.
pub fn changed<S: PartialEq>(previous: Option<&S>, next: &S) -> bool {
    previous.map_or(true, |prev| prev != next)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn message(id: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: Some(id.into()),
            text: Some("hi".into()),
            created_at: Some(at),
            ..Message::default()
        }
    }

    #[test]
    fn message_snapshot_tracks_latest() {
        let t0 = Utc::now();
        let msgs = vec![message("m2", t0 + Duration::seconds(5)), message("m1", t0)];
        let snap = message_snapshot(&msgs);
        assert_eq!(snap.count, 2);
        assert_eq!(snap.latest_id.as_deref(), Some("m2"));
        assert_eq!(snap.latest_timestamp, Some(t0 + Duration::seconds(5)));
        assert_eq!(message_snapshot(&[]), CollectionSnapshot::default());
    }

    #[test]
    fn task_signature_is_order_and_completion_sensitive() {
        let tasks = vec![Task::new("a", false), Task::new("b", true)];
        let base = task_snapshot(&tasks);
        assert_eq!(base.signature, "a:0|b:1");

        let refetched = task_snapshot(&tasks.clone());
        assert!(!changed(Some(&base), &refetched));

        let reordered = task_snapshot(&[Task::new("b", true), Task::new("a", false)]);
        assert!(changed(Some(&base), &reordered));

        let toggled = task_snapshot(&[Task::new("a", true), Task::new("b", true)]);
        assert!(changed(Some(&base), &toggled));
    }

    #[test]
    fn first_load_is_a_change() {
        let snap = task_snapshot(&[]);
        assert!(changed(None, &snap));
        assert!(!changed(Some(&snap), &snap));
    }
}
