use library::graph::{GraphError, GraphEvent, InputRef, Node, NodeDependency, NodeGraph, OutputRef};
use library::model::NodeValue;
use library::nodes::{self, ClipNode, FootageNode, MergeNode, TrackNode};

use uuid::Uuid;

/// footage -> clip -> track, returning (graph, footage, clip, track).
fn chain() -> (NodeGraph, Uuid, Uuid, Uuid) {
    let mut graph = NodeGraph::new();
    let footage = graph.add_node(Box::new(FootageNode::with_source("test://a")));
    let clip = graph.add_node(Box::new(ClipNode::with_timing(0.0, 2.0, 0.0)));
    let track = graph.add_node(Box::new(TrackNode::new()));

    graph
        .connect(
            OutputRef::new(footage, nodes::footage::TEXTURE_OUT),
            InputRef::new(clip, nodes::clip::BUFFER_IN),
        )
        .expect("footage -> clip");
    graph
        .connect(
            OutputRef::new(clip, nodes::clip::BUFFER_OUT),
            InputRef::element(track, nodes::track::CLIPS_IN, 0),
        )
        .expect("clip -> track");
    (graph, footage, clip, track)
}

fn invalidated_nodes(events: &std::sync::mpsc::Receiver<GraphEvent>) -> Vec<Uuid> {
    events
        .try_iter()
        .filter_map(|e| match e {
            GraphEvent::Invalidated { node, .. } => Some(node),
            _ => None,
        })
        .collect()
}

#[test]
fn test_invalidation_reaches_every_downstream_node() {
    let (mut graph, footage, clip, track) = chain();
    let events = graph.subscribe();

    graph
        .set_input_value(clip, nodes::clip::DURATION, NodeValue::Scalar(3.0))
        .expect("set duration");

    // Breadth-first from the edited node: clip first, then track.
    let hit = invalidated_nodes(&events);
    assert_eq!(hit, vec![clip, track]);
    assert!(!hit.contains(&footage), "upstream node must not be notified");
}

#[test]
fn test_invalidation_skips_unconnected_nodes() {
    let (mut graph, _, clip, _) = chain();
    let other = graph.add_node(Box::new(TrackNode::new()));
    let events = graph.subscribe();

    graph
        .set_input_value(clip, nodes::clip::IN_POINT, NodeValue::Scalar(1.0))
        .expect("set in point");

    assert!(!invalidated_nodes(&events).contains(&other));
}

#[test]
fn test_each_edit_bumps_the_epoch() {
    let (mut graph, _, clip, _) = chain();
    let before = graph.current_epoch();
    graph
        .set_input_value(clip, nodes::clip::DURATION, NodeValue::Scalar(5.0))
        .expect("set duration");
    assert!(graph.current_epoch() > before);
}

#[test]
fn test_cycle_rejected_and_graph_unchanged() {
    let mut graph = NodeGraph::new();
    let a = graph.add_node(Box::new(MergeNode::new()));
    let b = graph.add_node(Box::new(MergeNode::new()));

    graph
        .connect(
            OutputRef::new(a, nodes::merge::TEXTURE_OUT),
            InputRef::new(b, nodes::merge::BASE_IN),
        )
        .expect("a -> b");
    let before = graph.connections().to_vec();

    let err = graph
        .connect(
            OutputRef::new(b, nodes::merge::TEXTURE_OUT),
            InputRef::new(a, nodes::merge::BASE_IN),
        )
        .expect_err("b -> a closes a cycle");
    assert_eq!(err, GraphError::CycleDetected);
    assert_eq!(graph.connections(), &before[..], "failed connect must not mutate");
}

#[test]
fn test_self_connection_is_a_cycle() {
    let mut graph = NodeGraph::new();
    let a = graph.add_node(Box::new(MergeNode::new()));
    let err = graph
        .connect(
            OutputRef::new(a, nodes::merge::TEXTURE_OUT),
            InputRef::new(a, nodes::merge::BLEND_IN),
        )
        .expect_err("self loop");
    assert_eq!(err, GraphError::CycleDetected);
}

#[test]
fn test_type_mismatch_rejected() {
    let mut graph = NodeGraph::new();
    let footage = graph.add_node(Box::new(FootageNode::with_source("test://a")));
    let clip = graph.add_node(Box::new(ClipNode::new()));

    let err = graph
        .connect(
            OutputRef::new(footage, nodes::footage::TEXTURE_OUT),
            InputRef::new(clip, nodes::clip::IN_POINT),
        )
        .expect_err("texture into scalar");
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
}

#[test]
fn test_non_array_input_accepts_one_connection() {
    let mut graph = NodeGraph::new();
    let f1 = graph.add_node(Box::new(FootageNode::with_source("test://a")));
    let f2 = graph.add_node(Box::new(FootageNode::with_source("test://b")));
    let clip = graph.add_node(Box::new(ClipNode::new()));

    graph
        .connect(
            OutputRef::new(f1, nodes::footage::TEXTURE_OUT),
            InputRef::new(clip, nodes::clip::BUFFER_IN),
        )
        .expect("first connect");
    let err = graph
        .connect(
            OutputRef::new(f2, nodes::footage::TEXTURE_OUT),
            InputRef::new(clip, nodes::clip::BUFFER_IN),
        )
        .expect_err("second connect on non-array input");
    assert!(matches!(err, GraphError::InputOccupied(_)));
}

#[test]
fn test_disconnect_is_always_safe() {
    let (mut graph, footage, clip, _) = chain();
    let from = OutputRef::new(footage, nodes::footage::TEXTURE_OUT);
    let to = InputRef::new(clip, nodes::clip::BUFFER_IN);

    assert!(graph.disconnect(&from, &to));
    // Removing a missing edge is a no-op.
    assert!(!graph.disconnect(&from, &to));
}

#[test]
fn test_mutation_span_blocks_evaluation() {
    let (mut graph, ..) = chain();
    assert!(graph.evaluation_epoch().is_ok());

    graph.begin_operation();
    assert_eq!(
        graph.evaluation_epoch().expect_err("span open"),
        GraphError::OperationInProgress
    );

    // Spans nest; the barrier lifts only when the outermost closes.
    graph.begin_operation();
    graph.end_operation();
    assert!(graph.evaluation_epoch().is_err());

    graph.end_operation();
    assert!(graph.evaluation_epoch().is_ok());
}

#[test]
fn test_node_removal_rules() {
    let (mut graph, _, clip, _) = chain();

    let err = graph.remove_node(clip).map(|_| ()).expect_err("outside span");
    assert!(matches!(err, GraphError::RemovalOutsideOperation(_)));

    graph.begin_operation();
    let err = graph.remove_node(clip).map(|_| ()).expect_err("still connected");
    assert!(matches!(err, GraphError::NodeStillConnected(_)));

    graph.disconnect_all(clip);
    graph.remove_node(clip).expect("disconnected removal");
    graph.end_operation();
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn test_copies_never_share_input_identity() {
    let original = ClipNode::with_timing(1.0, 2.0, 0.0);
    let mut copy = original.boxed_copy();

    copy.ports_mut().input_mut(nodes::clip::DURATION).unwrap().value = NodeValue::Scalar(9.0);
    assert_eq!(
        original
            .ports()
            .input(nodes::clip::DURATION)
            .unwrap()
            .value
            .as_scalar(),
        Some(2.0),
        "editing the copy must not touch the original"
    );
}

#[test]
fn test_added_input_is_connectable() {
    use library::graph::Input;
    use library::model::ValueType;

    let mut graph = NodeGraph::new();
    let merge = graph.add_node(Box::new(MergeNode::new()));
    let footage = graph.add_node(Box::new(FootageNode::with_source("test://a")));

    graph
        .add_input(merge, Input::new("matte", ValueType::Texture))
        .expect("add input");
    graph
        .connect(
            OutputRef::new(footage, nodes::footage::TEXTURE_OUT),
            InputRef::new(merge, "matte"),
        )
        .expect("connect to added input");
}

// ---------------------------------------------------------------------------
// Digests
// ---------------------------------------------------------------------------

#[test]
fn test_digest_is_deterministic_across_identical_graphs() {
    let (graph_a, _, _, track_a) = chain();
    let (graph_b, _, _, track_b) = chain();

    let dep_a = NodeDependency::frame(track_a, nodes::track::BUFFER_OUT, 1.0);
    let dep_b = NodeDependency::frame(track_b, nodes::track::BUFFER_OUT, 1.0);
    assert_eq!(
        graph_a.hash_dependency(&dep_a).unwrap(),
        graph_b.hash_dependency(&dep_b).unwrap(),
        "same content must digest identically regardless of node identity"
    );
}

#[test]
fn test_digest_tracks_upstream_parameters() {
    let (mut graph, _, clip, track) = chain();
    let dep = NodeDependency::frame(track, nodes::track::BUFFER_OUT, 1.0);

    let before = graph.hash_dependency(&dep).unwrap();
    graph
        .set_input_value(clip, nodes::clip::MEDIA_IN, NodeValue::Scalar(0.5))
        .expect("set media in");
    let after = graph.hash_dependency(&dep).unwrap();
    assert_ne!(before, after);
}

#[test]
fn test_disjoint_time_digests_are_independent() {
    let (mut graph, _, _, track) = chain();
    // Second clip occupying [5, 7) on the same track.
    let far_footage = graph.add_node(Box::new(FootageNode::with_source("test://far")));
    let far_clip = graph.add_node(Box::new(ClipNode::with_timing(5.0, 2.0, 0.0)));
    graph
        .connect(
            OutputRef::new(far_footage, nodes::footage::TEXTURE_OUT),
            InputRef::new(far_clip, nodes::clip::BUFFER_IN),
        )
        .expect("footage -> far clip");
    graph
        .connect(
            OutputRef::new(far_clip, nodes::clip::BUFFER_OUT),
            InputRef::element(track, nodes::track::CLIPS_IN, 1),
        )
        .expect("far clip -> track");

    let near = NodeDependency::frame(track, nodes::track::BUFFER_OUT, 1.0);
    let far = NodeDependency::frame(track, nodes::track::BUFFER_OUT, 6.0);
    let near_before = graph.hash_dependency(&near).unwrap();
    let far_before = graph.hash_dependency(&far).unwrap();

    // Edit only the far clip's media mapping.
    graph
        .set_input_value(far_clip, nodes::clip::MEDIA_IN, NodeValue::Scalar(1.0))
        .expect("set far media in");

    assert_eq!(
        graph.hash_dependency(&near).unwrap(),
        near_before,
        "a block outside t=1 must not contribute to the t=1 digest"
    );
    assert_ne!(graph.hash_dependency(&far).unwrap(), far_before);
}
