//! Property-based tests for push ordering
//!
//! Uses proptest to generate random write sequences and verify that the
//! queue always hands parents out before their children.

use chrono::Utc;
use proptest::prelude::*;
use serde_json::json;
use surveysync::app::local_db::LocalDatabase;
use surveysync::app::offline::{sort_for_sync, PendingMutationRecord};
use surveysync::shared::survey::{EntityKind, Floor, Measurement, MutationOp, Project};
use uuid::Uuid;

fn record(kind: EntityKind, seq: i64) -> PendingMutationRecord {
    let entity_id = Uuid::new_v4();
    PendingMutationRecord {
        id: format!("{}_create_{}_{}", kind.as_str(), entity_id, seq),
        seq,
        entity_type: kind,
        entity_id,
        operation: MutationOp::Create,
        payload: json!({ "id": entity_id }),
        enqueued_at: Utc::now(),
        attempts: 0,
        last_error: None,
        next_attempt_at: None,
        parked: false,
    }
}

/// A random local write, resolved against whatever already exists
#[derive(Debug, Clone)]
enum Write {
    Project,
    Floor(usize),
    Measurement(usize),
    RenameProject(usize),
}

fn write_strategy() -> impl Strategy<Value = Write> {
    prop_oneof![
        Just(Write::Project),
        any::<usize>().prop_map(Write::Floor),
        any::<usize>().prop_map(Write::Measurement),
        any::<usize>().prop_map(Write::RenameProject),
    ]
}

proptest! {
    #[test]
    fn test_sort_orders_by_priority_then_seq(kinds in prop::collection::vec(0usize..4, 0..64)) {
        let mut records: Vec<_> = kinds
            .iter()
            .enumerate()
            .map(|(seq, k)| record(EntityKind::ALL[*k], seq as i64))
            .collect();
        sort_for_sync(&mut records);

        prop_assert_eq!(records.len(), kinds.len());
        for pair in records.windows(2) {
            let a = (pair[0].entity_type.sync_priority(), pair[0].seq);
            let b = (pair[1].entity_type.sync_priority(), pair[1].seq);
            prop_assert!(a < b, "{:?} sorted before {:?}", a, b);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_drain_puts_parents_first(writes in prop::collection::vec(write_strategy(), 1..24)) {
        tokio_test::block_on(async {
            let db = LocalDatabase::open_in_memory().await.unwrap();
            let mut projects: Vec<Project> = Vec::new();

            for write in &writes {
                match write {
                    Write::Project => {
                        let project = Project::new(format!("Site {}", projects.len()));
                        db.put(&project).await.unwrap();
                        projects.push(project);
                    }
                    Write::Floor(pick) if !projects.is_empty() => {
                        let project = &projects[pick % projects.len()];
                        db.put(&Floor::new(project.id, "Floor", "1")).await.unwrap();
                    }
                    Write::Measurement(pick) if !projects.is_empty() => {
                        let project = &projects[pick % projects.len()];
                        db.put(&Measurement::new(project.id, None, 0.5, 0.5)).await.unwrap();
                    }
                    Write::RenameProject(pick) if !projects.is_empty() => {
                        let index = pick % projects.len();
                        projects[index].name.push('+');
                        db.put(&projects[index]).await.unwrap();
                    }
                    _ => {}
                }
            }

            let drained = db.queue().drain().await.unwrap();
            let priorities: Vec<u8> = drained.iter().map(|r| r.entity_type.sync_priority()).collect();
            let mut sorted = priorities.clone();
            sorted.sort();
            assert_eq!(priorities, sorted);

            // Every record of one entity keeps its write order
            for pair in drained.windows(2) {
                if pair[0].entity_id == pair[1].entity_id {
                    assert!(pair[0].seq < pair[1].seq);
                }
            }
        });
    }
}
