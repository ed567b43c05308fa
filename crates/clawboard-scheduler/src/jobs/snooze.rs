//! Snooze revival worker: reactivate topics/tasks whose `snoozed_until`
//! has elapsed. Idempotent with the ingest-path unsnooze.

use std::sync::Arc;

use tracing::{info, warn};

use clawboard_events::{BoardEvent, EventHub};
use clawboard_store::{tasks, topics, Store};
use clawboard_types::{now_iso, TopicStatus};

/// One revival pass. Returns the number of rows revived.
pub fn revive_due(store: &Arc<Store>, hub: &Arc<EventHub>) -> usize {
    let now = now_iso();
    let result = store.write(|conn| {
        let mut events = Vec::new();
        for mut topic in topics::due_snoozed(conn, &now)? {
            topic.snoozed_until = None;
            if topic.status == TopicStatus::Snoozed {
                topic.status = TopicStatus::Active;
            }
            topic.updated_at = now.clone();
            topics::update(conn, &topic)?;
            events.push(
                BoardEvent::new(
                    "topic.upserted",
                    serde_json::to_value(&topic).unwrap_or_default(),
                )
                .with_ts(topic.updated_at.clone()),
            );
        }
        for mut task in tasks::due_snoozed(conn, &now)? {
            task.snoozed_until = None;
            task.updated_at = now.clone();
            tasks::update(conn, &task)?;
            events.push(
                BoardEvent::new(
                    "task.upserted",
                    serde_json::to_value(&task).unwrap_or_default(),
                )
                .with_ts(task.updated_at.clone()),
            );
        }
        Ok(events)
    });
    match result {
        Ok(events) => {
            let revived = events.len();
            for event in events {
                hub.publish(event);
            }
            if revived > 0 {
                info!(revived, "snooze revival pass");
            }
            revived
        }
        Err(err) => {
            warn!(error = %err, "snooze revival failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawboard_types::{create_id, CreatedBy, Topic};

    fn snoozed_topic(until: &str) -> Topic {
        let now = now_iso();
        Topic {
            id: create_id("topic"),
            space_id: "space-default".into(),
            name: "Zzz".into(),
            created_by: CreatedBy::User,
            sort_index: 0,
            color: None,
            description: None,
            priority: None,
            status: TopicStatus::Snoozed,
            snoozed_until: Some(until.into()),
            tags: vec![],
            parent_id: None,
            pinned: false,
            digest: None,
            digest_updated_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn elapsed_snoozes_are_cleared_and_published() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let hub = Arc::new(EventHub::new(50, None));
        let mut subscription = hub.subscribe();

        let due = snoozed_topic("2020-01-01T00:00:00.000Z");
        let future = snoozed_topic("2099-01-01T00:00:00.000Z");
        store
            .write(|conn| {
                topics::insert(conn, &due)?;
                topics::insert(conn, &future)
            })
            .unwrap();

        assert_eq!(revive_due(&store, &hub), 1);

        let revived = store.read(|conn| topics::get(conn, &due.id)).unwrap().unwrap();
        assert_eq!(revived.status, TopicStatus::Active);
        assert!(revived.snoozed_until.is_none());

        let untouched = store
            .read(|conn| topics::get(conn, &future.id))
            .unwrap()
            .unwrap();
        assert_eq!(untouched.status, TopicStatus::Snoozed);

        let event = subscription.try_recv().unwrap();
        assert_eq!(event.event_type, "topic.upserted");

        // Second pass is a no-op.
        assert_eq!(revive_due(&store, &hub), 0);
    }
}
