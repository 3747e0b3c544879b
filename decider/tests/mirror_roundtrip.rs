//! End-to-end mirroring over the transport seam: a live engine publishes
//! snapshots, a decision-free replica rebuilds the same stack.

use decider::core::parse::parse_definition;
use decider::engine::StackEngine;
use decider::io::transport::{DebugPublisher, channel_pair};
use decider::mirror::{MirrorEngine, MirrorState, publish_stack, serialize_stack};
use decider::test_support::ScriptedRegistry;
use decider::tree::Tree;

const DEFINITION: &str = "\
$Patrol
    WAIT --> @Hold
    SEARCH --> $Search
        NEAR --> @Scan radius=2
        FAR --> @Drive, @Scan
";

fn trees() -> (Tree, Tree) {
    (
        parse_definition(DEFINITION).expect("parse"),
        parse_definition(DEFINITION).expect("parse"),
    )
}

fn stack_names(mirror: &MirrorEngine) -> Vec<(String, Option<String>)> {
    mirror
        .stack()
        .map(|(id, reason)| {
            (
                mirror.tree().element(id).name().to_string(),
                reason.map(str::to_string),
            )
        })
        .collect()
}

#[test]
fn published_snapshots_rebuild_the_same_stack() {
    let (producer_tree, replica_tree) = trees();
    let registry = ScriptedRegistry::new();
    registry.set_outcome("Patrol", "SEARCH");
    registry.set_outcome("Search", "NEAR");
    let mut engine = StackEngine::new(producer_tree, Box::new(registry.clone()));

    let (mut publisher, subscription) = channel_pair();
    let mut mirror = MirrorEngine::with_subscription(replica_tree, Box::new(subscription));

    engine.update(&mut (), true).expect("tick");
    let payload = serialize_stack(&engine).expect("serialize").expect("payload");
    publisher.publish(&payload).expect("publish");

    assert!(mirror.poll());
    assert_eq!(mirror.state(), &MirrorState::Valid);
    assert_eq!(
        stack_names(&mirror),
        vec![
            ("Patrol".to_string(), None),
            ("Search".to_string(), Some("SEARCH".to_string())),
            ("Scan".to_string(), Some("NEAR".to_string())),
        ]
    );
    assert_eq!(mirror.active_path(), engine.active_path());
}

#[test]
fn replica_follows_the_producer_across_branch_changes() {
    let (producer_tree, replica_tree) = trees();
    let registry = ScriptedRegistry::new();
    registry.set_outcome("Patrol", "WAIT");
    let mut engine = StackEngine::new(producer_tree, Box::new(registry.clone()));

    let (mut publisher, subscription) = channel_pair();
    let mut mirror = MirrorEngine::with_subscription(replica_tree, Box::new(subscription));

    engine.update(&mut (), true).expect("tick 1");
    publish_stack(&engine, &mut publisher).expect("publish");

    registry.set_outcome("Patrol", "SEARCH");
    registry.set_outcome("Search", "FAR");
    engine.update(&mut (), true).expect("tick 2");
    publish_stack(&engine, &mut publisher).expect("publish");

    // Both snapshots drain in arrival order; the replica ends on the latest.
    assert!(mirror.poll());
    assert_eq!(
        stack_names(&mirror).last().map(|(name, _)| name.clone()),
        Some("Drive, Scan".to_string())
    );
}

#[test]
fn byte_identical_snapshots_are_processed_once() {
    let (producer_tree, replica_tree) = trees();
    let registry = ScriptedRegistry::new();
    registry.set_outcome("Patrol", "WAIT");
    let mut engine = StackEngine::new(producer_tree, Box::new(registry));

    let (mut publisher, subscription) = channel_pair();
    let mut mirror = MirrorEngine::with_subscription(replica_tree, Box::new(subscription));

    engine.update(&mut (), true).expect("tick");
    let payload = serialize_stack(&engine).expect("serialize").expect("payload");
    publisher.publish(&payload).expect("publish");
    publisher.publish(&payload).expect("publish");

    assert!(mirror.poll());
    // Nothing new: the repeat was byte-identical and already applied.
    assert!(!mirror.poll());
}

#[test]
fn close_releases_the_subscription_and_is_idempotent() {
    let (_, replica_tree) = trees();
    let (_publisher, subscription) = channel_pair();
    let mut mirror = MirrorEngine::with_subscription(replica_tree, Box::new(subscription));

    mirror.close();
    mirror.close();
    assert!(!mirror.poll());
    assert_eq!(mirror.state(), &MirrorState::NotReceived);
}
