use std::{collections::BTreeSet, time::Duration};

use glam::Vec3;
use rand::{Rng, SeedableRng, rngs::StdRng};
use warehouse_mirror_core::{
    MirrorConfig, StateMirror,
    scene::{EntityKind, NodeId, SceneGraph},
    snapshot::{RemoteSnapshot, SnapshotMessage, parse_message},
};

fn parse(json: &str) -> RemoteSnapshot {
    match parse_message(json).expect("valid snapshot") {
        SnapshotMessage::Snapshot(snapshot) => snapshot,
        SnapshotMessage::End => panic!("expected a snapshot"),
    }
}

fn fresh_mirror() -> StateMirror<SceneGraph> {
    StateMirror::new(SceneGraph::new(), MirrorConfig::default())
}

/// Handles of every agent and loose box, which must stay stable across
/// identical snapshots.
fn stable_handles(mirror: &StateMirror<SceneGraph>) -> BTreeSet<NodeId> {
    mirror
        .agents()
        .map(|(_, a)| a.handle)
        .chain(mirror.boxes().map(|(_, b)| b.handle))
        .collect()
}

/// Every scene node's position. Shelf stacks are respawned on each call, so
/// nodes are compared by kind and place rather than by id.
fn node_positions(mirror: &StateMirror<SceneGraph>) -> Vec<(EntityKind, [u32; 3])> {
    let mut nodes: Vec<(EntityKind, [u32; 3])> = mirror
        .factory()
        .iter()
        .map(|(_, node)| (node.kind, node.position.to_array().map(f32::to_bits)))
        .collect();
    nodes.sort();
    nodes
}

fn random_snapshot(rng: &mut StdRng) -> RemoteSnapshot {
    let agents: Vec<String> = (0..rng.random_range(0..6))
        .map(|id| {
            format!(
                r#"{{"id": {id}, "position": [{}, {}], "carrying": {}}}"#,
                rng.random_range(0..30),
                rng.random_range(0..30),
                rng.random_bool(0.5)
            )
        })
        .collect();
    let boxes: Vec<String> = (0..rng.random_range(0..15))
        .map(|_| {
            format!(
                r#"{{"position": [{}, {}]}}"#,
                rng.random_range(0..30),
                rng.random_range(0..30)
            )
        })
        .collect();
    let shelves: Vec<String> = (0..3)
        .map(|i| {
            format!(
                r#"{{"position": [{}, 0], "box_count": {}}}"#,
                i * 10,
                rng.random_range(0..=5)
            )
        })
        .collect();
    parse(&format!(
        r#"{{"agents": [{}], "boxes": [{}], "shelves": [{}]}}"#,
        agents.join(","),
        boxes.join(","),
        shelves.join(",")
    ))
}

#[test]
fn test_initialize_creates_one_entity_per_report() {
    let snapshot = parse(
        r#"{
            "agents": [{"id": 1, "position": [0, 0]}, {"id": 2, "position": [4, 4]}],
            "boxes": [{"position": [1, 1]}, {"position": [2, 2]}, {"position": [3, 3]}],
            "shelves": [{"position": [9, 0], "box_count": 0}]
        }"#,
    );
    let mut mirror = fresh_mirror();
    let report = mirror.initialize(&snapshot).unwrap();

    assert_eq!(mirror.agent_count(), 2);
    assert_eq!(mirror.box_count(), 3);
    assert_eq!(mirror.shelves().len(), 1);
    assert_eq!(report.agents.created, 2);
    assert_eq!(report.boxes.created, 3);

    let scene = mirror.factory();
    assert_eq!(scene.count(EntityKind::Agent), 2);
    assert_eq!(scene.count(EntityKind::Box), 3);
    assert_eq!(scene.count(EntityKind::Shelf), 1);
}

#[test]
fn test_reconcile_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let first = random_snapshot(&mut rng);
        let second = random_snapshot(&mut rng);
        let mut mirror = fresh_mirror();
        mirror.initialize(&first).unwrap();

        mirror.reconcile(&second).unwrap();
        let handles = stable_handles(&mirror);
        let positions: Vec<Vec3> = mirror.agents().map(|(_, a)| a.position).collect();
        let box_positions: Vec<Vec3> = mirror.boxes().map(|(_, b)| b.position).collect();
        let nodes = node_positions(&mirror);

        let report = mirror.reconcile(&second).unwrap();
        assert_eq!(report.agents.created, 0);
        assert_eq!(report.boxes.created, 0);
        assert_eq!(report.boxes.destroyed, 0);
        assert_eq!(stable_handles(&mirror), handles);
        let again: Vec<Vec3> = mirror.agents().map(|(_, a)| a.position).collect();
        assert_eq!(again, positions);
        let boxes_again: Vec<Vec3> = mirror.boxes().map(|(_, b)| b.position).collect();
        assert_eq!(boxes_again, box_positions);
        assert_eq!(node_positions(&mirror), nodes);
    }
}

#[test]
fn test_shrinking_box_list_destroys_the_tail() {
    let mut mirror = fresh_mirror();
    mirror
        .initialize(&parse(
            r#"{"agents": [], "boxes": [
                {"position": [1, 1]}, {"position": [2, 2]}, {"position": [3, 3]},
                {"position": [4, 4]}, {"position": [5, 5]}
            ], "shelves": []}"#,
        ))
        .unwrap();

    let report = mirror
        .reconcile(&parse(
            r#"{"agents": [], "boxes": [{"position": [7, 1]}, {"position": [8, 2]}], "shelves": []}"#,
        ))
        .unwrap();

    assert_eq!(report.boxes.destroyed, 3);
    assert_eq!(mirror.box_count(), 2);
    let positions: Vec<Vec3> = mirror.boxes().map(|(_, b)| b.position).collect();
    assert_eq!(
        positions,
        vec![Vec3::new(7.0, 0.5, 1.0), Vec3::new(8.0, 0.5, 2.0)]
    );
    assert_eq!(mirror.factory().count(EntityKind::Box), 2);
}

#[test]
fn test_shelf_stack_matches_box_count() {
    let mut mirror = fresh_mirror();
    mirror
        .initialize(&parse(
            r#"{"agents": [], "boxes": [], "shelves": [{"position": [3, 3], "box_count": 4}]}"#,
        ))
        .unwrap();

    for count in [1, 5, 0, 2] {
        let json = format!(
            r#"{{"agents": [], "boxes": [], "shelves": [{{"position": [3, 3], "box_count": {count}}}]}}"#
        );
        mirror.reconcile(&parse(&json)).unwrap();
        let shelf = &mirror.shelves()[0];
        assert_eq!(shelf.box_count(), count);
        assert_eq!(mirror.factory().children(shelf.handle).len(), count);
        assert_eq!(mirror.factory().count(EntityKind::ShelfBox), count);
    }
}

#[test]
fn test_absent_agents_are_kept() {
    let mut mirror = fresh_mirror();
    mirror
        .initialize(&parse(
            r#"{"agents": [{"id": 1, "position": [0, 0]}, {"id": 2, "position": [5, 5]}], "boxes": [], "shelves": []}"#,
        ))
        .unwrap();
    let handle = mirror.agent(2).unwrap().handle;

    mirror
        .reconcile(&parse(
            r#"{"agents": [{"id": 1, "position": [0, 1]}], "boxes": [], "shelves": []}"#,
        ))
        .unwrap();
    mirror
        .reconcile(&parse(
            r#"{"agents": [{"id": 2, "position": [5, 6]}], "boxes": [], "shelves": []}"#,
        ))
        .unwrap();

    assert_eq!(mirror.agent_count(), 2);
    assert_eq!(mirror.agent(2).unwrap().handle, handle);
    assert_eq!(mirror.agent(2).unwrap().position, Vec3::new(5.0, 0.0, 6.0));
    assert_eq!(mirror.agent(1).unwrap().position, Vec3::new(0.0, 0.0, 1.0));
}

#[test]
fn test_single_shelf_walkthrough() {
    let mut mirror = fresh_mirror();
    mirror
        .initialize(&parse(
            r#"{
                "agents": [{"id": 1, "position": [0, 0]}],
                "boxes": [{"position": [1, 0.5]}],
                "shelves": [{"position": [2, 0], "box_count": 0}]
            }"#,
        ))
        .unwrap();
    assert_eq!(mirror.agent_count(), 1);
    assert_eq!(mirror.box_count(), 1);
    assert_eq!(mirror.shelves()[0].box_count(), 0);

    let report = mirror
        .reconcile_after(
            &parse(
                r#"{
                    "agents": [{"id": 1, "position": [0, 1]}],
                    "boxes": [],
                    "shelves": [{"position": [2, 0], "box_count": 2}]
                }"#,
            ),
            Duration::from_millis(100),
        )
        .unwrap();

    assert_eq!(mirror.agent(1).unwrap().position, Vec3::new(0.0, 0.0, 1.0));
    assert_eq!(report.boxes.destroyed, 1);
    assert_eq!(mirror.box_count(), 0);

    let scene = mirror.factory();
    let shelf = &mirror.shelves()[0];
    let heights: Vec<f32> = scene
        .children(shelf.handle)
        .iter()
        .map(|child| scene.get(*child).unwrap().position.y)
        .collect();
    assert_eq!(heights, vec![0.5, 1.0]);
}

#[test]
fn test_malformed_snapshot_changes_nothing() {
    let mut mirror = fresh_mirror();
    mirror
        .initialize(&parse(
            r#"{"agents": [{"id": 1, "position": [0, 0]}], "boxes": [{"position": [1, 1]}], "shelves": []}"#,
        ))
        .unwrap();

    assert!(parse_message(r#"{"agents": [{"id": 1, "position": [9, 9]}], "boxes": []}"#).is_err());
    assert!(parse_message(r#"{"agents": [{"id": 1, "position": [9]}], "boxes": [], "shelves": []}"#).is_err());
    let mixed = parse(
        r#"{
            "agents": [{"id": 1, "position": [9, 9]}],
            "boxes": [{"id": 4, "position": [2, 2]}, {"position": [3, 3]}],
            "shelves": []
        }"#,
    );
    assert!(mirror.reconcile(&mixed).is_err());

    assert_eq!(mirror.agent(1).unwrap().position, Vec3::ZERO);
    assert_eq!(mirror.box_count(), 1);
    assert_eq!(mirror.step(), 0);
}
