use std::sync::Arc;

use library::graph::{GraphEvent, InputRef, NodeGraph, NodeRegistry, OutputRef, save_node};
use library::model::{NodeValue, TimeRange};
use library::nodes::{self, ClipNode, FootageNode, Sequence, TrackNode, TrackType};

use uuid::Uuid;

/// One 2-second clip on one video track of a sequence.
fn sequence_graph() -> (NodeGraph, Uuid, Uuid, Uuid) {
    let mut graph = NodeGraph::new();
    let footage = graph.add_node(Box::new(FootageNode::with_source("test://clip")));
    let clip = graph.add_node(Box::new(ClipNode::with_timing(0.0, 2.0, 0.0)));
    let track = graph.add_node(Box::new(TrackNode::new()));
    let sequence = graph.add_node(Box::new(Sequence::new()));

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
    graph
        .connect(
            OutputRef::new(track, nodes::track::BUFFER_OUT),
            InputRef::element(sequence, &TrackType::Video.input_name(), 0),
        )
        .expect("track -> sequence");
    (graph, clip, track, sequence)
}

fn sequence_ref(graph: &NodeGraph, id: Uuid) -> &Sequence {
    graph
        .node(id)
        .and_then(|n| n.as_any().downcast_ref())
        .expect("sequence node")
}

#[test]
fn test_per_type_and_overall_length() {
    let (graph, _, _, sequence) = sequence_graph();

    assert_eq!(graph.custom_length(sequence, TrackType::Video), 2.0);
    assert_eq!(graph.custom_length(sequence, TrackType::Audio), 0.0);
    assert_eq!(graph.custom_length(sequence, TrackType::Subtitle), 0.0);
    assert_eq!(graph.sequence_length(sequence), 2.0);
}

#[test]
fn test_length_change_is_reemitted() {
    let (mut graph, clip, _, sequence) = sequence_graph();
    assert_eq!(sequence_ref(&graph, sequence).cached_length(), 2.0);
    let events = graph.subscribe();

    // Extending the clip flows through the track into the sequence's
    // derived length signal.
    graph
        .set_input_value(clip, nodes::clip::DURATION, NodeValue::Scalar(3.5))
        .expect("set duration");

    let length_events: Vec<GraphEvent> = events
        .try_iter()
        .filter(|e| matches!(e, GraphEvent::LengthChanged { .. }))
        .collect();
    assert_eq!(
        length_events,
        vec![GraphEvent::LengthChanged {
            node: sequence,
            length: 3.5
        }]
    );
    assert_eq!(sequence_ref(&graph, sequence).cached_length(), 3.5);
}

#[test]
fn test_unchanged_length_is_not_reemitted() {
    let (mut graph, clip, _, _) = sequence_graph();
    let events = graph.subscribe();

    // Moving the media-in point changes content, not length.
    graph
        .set_input_value(clip, nodes::clip::MEDIA_IN, NodeValue::Scalar(0.25))
        .expect("set media in");

    assert!(
        !events
            .try_iter()
            .any(|e| matches!(e, GraphEvent::LengthChanged { .. }))
    );
}

#[test]
fn test_sequence_still_invalidated_through_ignoring_input() {
    let (mut graph, clip, track, sequence) = sequence_graph();
    let events = graph.subscribe();

    graph
        .set_input_value(clip, nodes::clip::DURATION, NodeValue::Scalar(4.0))
        .expect("set duration");

    let hit: Vec<Uuid> = events
        .try_iter()
        .filter_map(|e| match e {
            GraphEvent::Invalidated { node, .. } => Some(node),
            _ => None,
        })
        .collect();
    assert!(hit.contains(&clip));
    assert!(hit.contains(&track));
    assert!(
        hit.contains(&sequence),
        "the derived signal must still reach the sequence"
    );
    assert_eq!(
        hit.iter().filter(|n| **n == sequence).count(),
        1,
        "the sequence must be notified exactly once"
    );
}

#[test]
fn test_track_lists_mirror_connections_in_element_order() {
    let mut graph = NodeGraph::new();
    let sequence = graph.add_node(Box::new(Sequence::new()));
    let t0 = graph.add_node(Box::new(TrackNode::new()));
    let t1 = graph.add_node(Box::new(TrackNode::new()));

    // Connect out of order; the list must still be element-ordered.
    graph
        .connect(
            OutputRef::new(t1, nodes::track::BUFFER_OUT),
            InputRef::element(sequence, &TrackType::Video.input_name(), 1),
        )
        .expect("t1 -> sequence");
    graph
        .connect(
            OutputRef::new(t0, nodes::track::BUFFER_OUT),
            InputRef::element(sequence, &TrackType::Video.input_name(), 0),
        )
        .expect("t0 -> sequence");

    assert_eq!(graph.sequence_tracks(sequence, TrackType::Video), vec![t0, t1]);
    assert!(graph.sequence_tracks(sequence, TrackType::Audio).is_empty());

    graph.disconnect(
        &OutputRef::new(t0, nodes::track::BUFFER_OUT),
        &InputRef::element(sequence, &TrackType::Video.input_name(), 0),
    );
    assert_eq!(graph.sequence_tracks(sequence, TrackType::Video), vec![t1]);
}

#[test]
fn test_unlocked_tracks_skip_locked() {
    let mut graph = NodeGraph::new();
    let sequence = graph.add_node(Box::new(Sequence::new()));
    let t0 = graph.add_node(Box::new(TrackNode::new()));
    let t1 = graph.add_node(Box::new(TrackNode::new()));
    graph
        .connect(
            OutputRef::new(t0, nodes::track::BUFFER_OUT),
            InputRef::element(sequence, &TrackType::Video.input_name(), 0),
        )
        .expect("t0 -> sequence");
    graph
        .connect(
            OutputRef::new(t1, nodes::track::BUFFER_OUT),
            InputRef::element(sequence, &TrackType::Video.input_name(), 1),
        )
        .expect("t1 -> sequence");

    graph
        .set_input_value(t0, nodes::track::LOCKED_IN, NodeValue::Boolean(true))
        .expect("lock t0");

    assert_eq!(graph.unlocked_tracks(sequence, TrackType::Video), vec![t1]);
}

#[test]
fn test_audio_shift_moves_waveform_metadata_only() {
    let mut graph = NodeGraph::new();
    let sequence = graph.add_node(Box::new(Sequence::new()));
    let audio = graph.add_node(Box::new(TrackNode::new()));
    graph
        .connect(
            OutputRef::new(audio, nodes::track::BUFFER_OUT),
            InputRef::element(sequence, &TrackType::Audio.input_name(), 0),
        )
        .expect("audio track -> sequence");

    let peaks_a = Arc::new(vec![0.1f32, 0.5, 0.2]);
    let peaks_b = Arc::new(vec![0.9f32, 0.3]);
    {
        let seq: &mut Sequence = graph
            .node_mut(sequence)
            .and_then(|n| n.as_any_mut().downcast_mut())
            .expect("sequence node");
        let track = &mut seq.track_list_mut(TrackType::Audio).tracks_mut()[0];
        track.waveform.insert(TimeRange::new(0.0, 1.0), Arc::clone(&peaks_a));
        track.waveform.insert(TimeRange::new(2.0, 3.0), Arc::clone(&peaks_b));
    }

    // Shift everything at or after t=2 one second later.
    graph.shift_audio(sequence, 2.0, 3.0);

    let seq = sequence_ref(&graph, sequence);
    let regions = &seq.track_list(TrackType::Audio).tracks()[0].waveform.regions;
    assert_eq!(regions[0].range, TimeRange::new(0.0, 1.0));
    assert_eq!(regions[1].range, TimeRange::new(3.0, 4.0));
    // Peak data is relocated, never re-decoded or copied.
    assert!(Arc::ptr_eq(&regions[0].peaks, &peaks_a));
    assert!(Arc::ptr_eq(&regions[1].peaks, &peaks_b));
}

#[test]
fn test_markers_survive_save_and_load() {
    let mut sequence = Sequence::new();
    sequence.add_marker(4.0, "outro");
    sequence.add_marker(1.5, "intro");

    let saved = save_node(&sequence);
    let registry = NodeRegistry::with_builtins();
    let loaded = registry.load_node(&saved).expect("load sequence");
    let loaded: &Sequence = loaded.as_any().downcast_ref().expect("sequence type");

    // Markers come back time-ordered.
    let names: Vec<&str> = loaded.markers().iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["intro", "outro"]);
    assert_eq!(loaded.markers()[0].time, 1.5);
}
