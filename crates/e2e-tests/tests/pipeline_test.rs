//! End-to-end ingest → classify pipeline scenarios.

use std::sync::Arc;

use clawboard_classifier::ClassifierLlm;
use clawboard_classifier::ScriptedLlm;
use clawboard_ingest::{TaskUpsert, TopicUpsert};
use clawboard_store::{logs, topics};
use clawboard_types::{ClassificationStatus, LogAppend, LogSource, LogType, TopicStatus};
use e2e_tests::TestStack;

#[tokio::test]
async fn idempotent_ingest_returns_one_row() {
    let stack = TestStack::new();
    let payload = LogAppend {
        log_type: Some(LogType::Conversation),
        content: Some("hello".into()),
        source: Some(LogSource {
            channel: Some("discord".into()),
            session_key: Some("channel:general".into()),
            message_id: Some("m1".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let first = stack.ingest.append(payload.clone(), Some("idem-1")).unwrap();
    let second = stack.ingest.append(payload, Some("idem-1")).unwrap();
    assert_eq!(first.id, second.id);

    let matching: Vec<_> = stack
        .store
        .read(|conn| {
            let mut query = clawboard_store::LogQuery::new(100);
            query.include_raw = true;
            logs::list(conn, &query)
        })
        .unwrap()
        .into_iter()
        .filter(|e| e.idempotency_key.as_deref() == Some("idem-1"))
        .collect();
    assert_eq!(matching.len(), 1);
}

#[tokio::test]
async fn task_reference_overrides_topic() {
    let stack = TestStack::new();
    let topic_a = stack
        .ingest
        .upsert_topic(TopicUpsert {
            name: Some("Topic A".into()),
            ..Default::default()
        })
        .unwrap();
    let topic_b = stack
        .ingest
        .upsert_topic(TopicUpsert {
            name: Some("Topic B".into()),
            ..Default::default()
        })
        .unwrap();
    let task = stack
        .ingest
        .upsert_task(TaskUpsert {
            topic_id: Some(topic_a.id.clone()),
            title: Some("Ship the wizard".into()),
            ..Default::default()
        })
        .unwrap();

    let entry = stack
        .ingest
        .append(
            LogAppend {
                log_type: Some(LogType::Conversation),
                content: Some("progress".into()),
                topic_id: Some(topic_b.id.clone()),
                task_id: Some(task.id.clone()),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    assert_eq!(entry.topic_id.as_deref(), Some(topic_a.id.as_str()));
    assert_eq!(entry.task_id.as_deref(), Some(task.id.as_str()));
    assert!(!entry.updated_at.is_empty());
}

#[tokio::test]
async fn reorder_persists_relative_order() {
    let stack = TestStack::new();
    let t1 = stack
        .ingest
        .upsert_topic(TopicUpsert {
            name: Some("First Workstream".into()),
            ..Default::default()
        })
        .unwrap();
    let t2 = stack
        .ingest
        .upsert_topic(TopicUpsert {
            name: Some("Second Workstream".into()),
            ..Default::default()
        })
        .unwrap();
    let t3 = stack
        .ingest
        .upsert_topic(TopicUpsert {
            name: Some("Third Workstream".into()),
            ..Default::default()
        })
        .unwrap();

    let order = vec![t2.id.clone(), t3.id.clone(), t1.id.clone()];
    stack.ingest.reorder_topics(&order).unwrap();

    let listed: Vec<String> = stack
        .store
        .read(|conn| topics::list(conn))
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(listed, order);
}

#[tokio::test]
async fn snooze_revives_on_activity_with_event() {
    let stack = TestStack::new();
    let topic = stack
        .ingest
        .upsert_topic(TopicUpsert {
            name: Some("Snoozy".into()),
            status: Some(TopicStatus::Snoozed),
            snoozed_until: Some(Some("2099-01-01T00:00:00.000Z".into())),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(topic.status, TopicStatus::Snoozed);

    let mut subscription = stack.hub.subscribe();
    stack
        .ingest
        .append(
            LogAppend {
                log_type: Some(LogType::Conversation),
                content: Some("back to work".into()),
                topic_id: Some(topic.id.clone()),
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let revived = stack
        .store
        .read(|conn| topics::get(conn, &topic.id))
        .unwrap()
        .unwrap();
    assert_eq!(revived.status, TopicStatus::Active);
    assert!(revived.snoozed_until.is_none());

    let mut saw_topic_upserted = false;
    while let Some(event) = subscription.try_recv() {
        if event.event_type == "topic.upserted" {
            saw_topic_upserted = true;
        }
    }
    assert!(saw_topic_upserted);
}

#[tokio::test]
async fn classifier_routes_only_the_oldest_bundle() {
    let stack = TestStack::new();
    let session = "channel:general";
    let u1 = stack.turn(session, "user", "Implement X for the billing exporter", "m1");
    stack.turn(session, "assistant", "Plan: schema first.", "m2");
    stack.turn(session, "assistant", "Done with the plan.", "m3");
    let u2 = stack.turn(session, "user", "Completely new request about topic Y", "m4");

    let reply = format!(
        r#"{{"topic": {{"id": null, "name": "Billing Exporter", "create": true}},
            "task": null,
            "summaries": [{{"id": "{}", "summary": "Implement X"}}]}}"#,
        u1.id
    );
    let llm: Arc<dyn ClassifierLlm> = Arc::new(ScriptedLlm::new(vec![Ok(reply)]));
    let classifier = stack.classifier(Some(llm));
    classifier.classify_session(session).await.unwrap();

    let first = stack
        .store
        .read(|conn| logs::get(conn, &u1.id))
        .unwrap()
        .unwrap();
    assert_eq!(first.classification_status, ClassificationStatus::Classified);
    let topic = stack
        .store
        .read(|conn| topics::get(conn, first.topic_id.as_deref().unwrap()))
        .unwrap()
        .unwrap();
    assert_eq!(topic.name, "Billing Exporter");

    // The bundle for U1 ends before U2: the new intent stays pending.
    let second = stack
        .store
        .read(|conn| logs::get(conn, &u2.id))
        .unwrap()
        .unwrap();
    assert_eq!(second.classification_status, ClassificationStatus::Pending);
}

#[tokio::test]
async fn failed_logs_return_to_pending_only_via_replay() {
    let stack = TestStack::new();
    let entry = stack.turn("agent:main:main", "system", "Heartbeat: heartbeat_ok", "m1");
    // The ingest filter terminally failed the heartbeat.
    assert_eq!(entry.classification_status, ClassificationStatus::Failed);

    // A later classifier cycle must not resurrect it.
    let classifier = stack.classifier(None);
    classifier.classify_session("agent:main:main").await.unwrap();
    let row = stack
        .store
        .read(|conn| logs::get(conn, &entry.id))
        .unwrap()
        .unwrap();
    assert_eq!(row.classification_status, ClassificationStatus::Failed);
}
