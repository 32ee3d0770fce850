//! Integration tests for the owner/reader synchronization protocol.

use std::sync::Arc;

use axmirror::geometry::Rect;
use axmirror::id::NodeId;
use axmirror::live::StaticLiveTree;
use axmirror::property::{NodeProperty, PropertyValue};
use axmirror::role::Role;
use axmirror::text_run::{TextRun, TextRuns};
use axmirror::tree::{ResolveNodeChanges, SnapshotTreeBuilder, TreeReader, TreeRegistry};
use axmirror_core::invocation::owner_channel;

fn node_id(raw: u64) -> NodeId {
    NodeId::from_raw(raw).unwrap()
}

fn runs(block: u64, text: &str) -> PropertyValue {
    PropertyValue::TextRuns(Arc::new(TextRuns::new(
        NodeId::from_raw(block),
        vec![TextRun::new(text, 0)],
    )))
}

/// root(1) -> [text(2), text(3)]
fn small_live_tree() -> StaticLiveTree {
    let mut live = StaticLiveTree::new();
    live.insert_node(node_id(1), Role::ContentArea, None, vec![node_id(2), node_id(3)]);
    live.insert_node(node_id(2), Role::StaticText, Some(node_id(1)), vec![]);
    live.insert_node(node_id(3), Role::StaticText, Some(node_id(1)), vec![]);
    live.set_property(node_id(2), NodeProperty::TextRuns, runs(1, "foo"));
    live.set_property(node_id(3), NodeProperty::TextRuns, runs(1, "bar"));
    live.set_root(node_id(1));
    live
}

#[test]
fn full_lifecycle_generate_mutate_destroy() {
    let mut live = small_live_tree();
    let registry = TreeRegistry::new();
    let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
    tree.generate_subtree(&live, node_id(1));

    let mut reader = TreeReader::new(tree.clone());
    assert!(reader.apply_pending_changes());
    assert_eq!(reader.len(), 3);
    assert_eq!(reader.root_id(), Some(node_id(1)));

    // Mutate the live tree: drop node 3, add node 4.
    live.insert_node(node_id(4), Role::StaticText, Some(node_id(1)), vec![]);
    live.set_property(node_id(4), NodeProperty::TextRuns, runs(1, "baz"));
    live.set_children(node_id(1), vec![node_id(2), node_id(4)]);
    live.remove(node_id(3));

    tree.update_children(&live, node_id(1), ResolveNodeChanges::Yes);
    tree.process_queued_node_updates(&live);
    assert!(reader.apply_pending_changes());

    assert!(reader.object_for_id(node_id(3)).is_none());
    assert!(reader.object_for_id(node_id(4)).is_some());
    assert_eq!(
        reader.root().unwrap().children_ids(),
        &[node_id(2), node_id(4)]
    );

    // Destroy: the next drain detaches everything and deregisters.
    tree.queue_for_destruction();
    assert!(!reader.apply_pending_changes());
    assert!(reader.is_empty());
    assert!(registry.is_empty());
}

#[test]
fn changes_enqueued_before_drain_are_visible_after_it() {
    let mut live = small_live_tree();
    let registry = TreeRegistry::new();
    let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
    tree.generate_subtree(&live, node_id(1));

    let mut reader = TreeReader::new(tree.clone());
    reader.apply_pending_changes();

    // Queue several categories of change, then drain once; all of them
    // must land atomically.
    live.set_property(
        node_id(2),
        NodeProperty::Title,
        PropertyValue::String("title".into()),
    );
    let properties = [NodeProperty::Title].into_iter().collect();
    tree.update_node_properties(&live, node_id(2), &properties);
    tree.set_focused_node_id(Some(node_id(3)));
    tree.sorted_live_regions_did_change(vec![node_id(2)]);

    reader.apply_pending_changes();
    assert_eq!(
        reader.object_for_id(node_id(2)).unwrap().string_value(NodeProperty::Title),
        "title"
    );
    assert_eq!(reader.focused_node_id(), Some(node_id(3)));
    assert_eq!(reader.sorted_live_regions(), &[node_id(2)]);
}

#[test]
fn removal_and_same_id_append_resolve_to_new_record() {
    let mut live = small_live_tree();
    let registry = TreeRegistry::new();
    let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
    tree.generate_subtree(&live, node_id(1));

    let mut reader = TreeReader::new(tree.clone());
    reader.apply_pending_changes();
    let old_handle = live.handle(node_id(3)).unwrap();
    assert!(old_handle.is_attached());

    // Remove node 3 and append a new node reusing its id, in one drain.
    tree.remove_node(node_id(3), Some(node_id(1)));
    live.insert_node(node_id(3), Role::Button, Some(node_id(1)), vec![]);
    tree.update_node(&live, node_id(3));

    reader.apply_pending_changes();
    let node = reader.object_for_id(node_id(3)).expect("replacement installed");
    assert_eq!(node.role(), Role::Button);
    assert!(!old_handle.is_attached());
    assert!(node.platform_handle().unwrap().is_attached());
}

#[test]
fn reader_blocks_on_owner_thread_for_uncached_frame() {
    let live = small_live_tree();
    let registry = TreeRegistry::new();
    let (proxy, owner_loop) = owner_channel();
    let tree = SnapshotTreeBuilder::new()
        .owner_proxy(proxy)
        .build(&registry)
        .unwrap();
    tree.set_frame_resolver(|id| {
        // Stand-in for a layout query on the owner thread.
        Some(Rect::new(10.0, 20.0, 30.0, 40.0 + id.as_raw() as f32))
    });
    tree.generate_subtree(&live, node_id(1));

    // The reader thread asks for a frame the snapshot doesn't carry and
    // blocks until the owner thread services the request.
    let reader_tree = tree.clone();
    let reader_thread = std::thread::spawn(move || {
        let mut reader = TreeReader::new(reader_tree);
        reader.apply_pending_changes();
        reader.relative_frame(node_id(2))
    });

    // Owner thread: service exactly one blocking invocation.
    owner_loop.service_one().expect("reader request arrives");

    let frame = reader_thread.join().unwrap();
    assert_eq!(frame, Some(Rect::new(10.0, 20.0, 30.0, 42.0)));
    // The round-trip cached the frame for future lock-free reads.
    assert_eq!(
        tree.geometry().frame_for(node_id(2)),
        Some(Rect::new(10.0, 20.0, 30.0, 42.0))
    );
}

#[test]
fn uncached_frame_without_proxy_degrades_to_none() {
    let live = small_live_tree();
    let registry = TreeRegistry::new();
    let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
    tree.generate_subtree(&live, node_id(1));

    let mut reader = TreeReader::new(tree);
    reader.apply_pending_changes();
    // No cached frame, no owner proxy: fail soft, not loud.
    assert_eq!(reader.relative_frame(node_id(2)), None);
}

#[test]
fn drains_move_values_not_references() {
    // A drained record must not be affected by later live-tree mutation
    // of the data it was built from.
    let mut live = small_live_tree();
    live.set_property(
        node_id(2),
        NodeProperty::Description,
        PropertyValue::String("before".into()),
    );
    let registry = TreeRegistry::new();
    let tree = SnapshotTreeBuilder::new().build(&registry).unwrap();
    tree.generate_subtree(&live, node_id(1));

    let mut reader = TreeReader::new(tree);
    reader.apply_pending_changes();

    live.set_property(
        node_id(2),
        NodeProperty::Description,
        PropertyValue::String("after".into()),
    );
    assert_eq!(
        reader.object_for_id(node_id(2)).unwrap().string_value(NodeProperty::Description),
        "before"
    );
}
