//! Sequence: the composite timeline node.
//!
//! A Sequence fixes one array-typed track input per track type. The array
//! input is authoritative; each `TrackList` is a derived, ordered index over
//! it, updated only through the connect/disconnect notification path. The
//! track inputs opt out of direct invalidation forwarding; the TrackList's
//! own length signal is the companion derived signal.

use std::any::Any;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LibraryError;
use crate::graph::node::{Input, InputFlags, Node, Output, Ports};
use crate::graph::{GraphEvent, NodeGraph};
use crate::model::{NodeValue, SampleBuffer, TimeRange, ValueDatabase, ValueTable, ValueType};
use crate::nodes::clip::ClipNode;
use crate::nodes::track::TrackNode;

pub const TEXTURE_OUT: &str = "texture";
pub const SAMPLES_OUT: &str = "samples";

const TRACK_INPUT_FORMAT: &str = "track_in_";
const MARKER_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackType {
    Video,
    Audio,
    Subtitle,
}

impl TrackType {
    pub const ALL: [TrackType; 3] = [TrackType::Video, TrackType::Audio, TrackType::Subtitle];

    pub fn index(self) -> usize {
        match self {
            TrackType::Video => 0,
            TrackType::Audio => 1,
            TrackType::Subtitle => 2,
        }
    }

    pub fn input_name(self) -> String {
        format!("{}{}", TRACK_INPUT_FORMAT, self.index())
    }
}

/// Cached waveform region bookkeeping for one audio track.
///
/// Regions reference decoded peak data by `Arc`; structural timeline shifts
/// relocate the ranges only and never touch the peaks.
#[derive(Clone, Debug, Default)]
pub struct WaveformMap {
    pub regions: Vec<WaveformRegion>,
}

#[derive(Clone, Debug)]
pub struct WaveformRegion {
    pub range: TimeRange,
    pub peaks: Arc<Vec<f32>>,
}

impl WaveformMap {
    pub fn insert(&mut self, range: TimeRange, peaks: Arc<Vec<f32>>) {
        self.regions.push(WaveformRegion { range, peaks });
    }

    /// Relocate regions starting at or after `from` by `to - from`.
    /// Metadata-only; no peak data is re-decoded.
    pub fn shift(&mut self, from: f64, to: f64) {
        let delta = to - from;
        for region in &mut self.regions {
            if region.range.start >= from {
                region.range = region.range.shifted(delta);
            }
        }
    }
}

/// Mirror of one connection into a Sequence's track array input.
#[derive(Clone, Debug)]
pub struct Track {
    pub node: Uuid,
    pub element: usize,
    pub waveform: WaveformMap,
}

/// Derived ordered index over one track array input. Never mutated by any
/// caller except through the `track_connected`/`track_disconnected`
/// notification path.
#[derive(Debug)]
pub struct TrackList {
    track_type: TrackType,
    input_name: String,
    tracks: Vec<Track>,
}

impl TrackList {
    fn new(track_type: TrackType) -> Self {
        Self {
            track_type,
            input_name: track_type.input_name(),
            tracks: Vec::new(),
        }
    }

    pub fn track_type(&self) -> TrackType {
        self.track_type
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Mutable access to the mirrored tracks. The list structure itself is
    /// still only changed through the notification path.
    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    fn track_connected(&mut self, node: Uuid, element: usize) {
        debug!("track {} connected to {} [{}]", node, self.input_name, element);
        let track = Track {
            node,
            element,
            waveform: WaveformMap::default(),
        };
        let pos = self
            .tracks
            .iter()
            .position(|t| t.element > element)
            .unwrap_or(self.tracks.len());
        self.tracks.insert(pos, track);
    }

    fn track_disconnected(&mut self, node: Uuid, element: Option<usize>) {
        self.tracks
            .retain(|t| !(t.node == node && element.map_or(true, |e| t.element == e)));
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Marker {
    pub time: f64,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct MarkerSet {
    version: u32,
    markers: Vec<Marker>,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self {
            version: MARKER_VERSION,
            markers: Vec::new(),
        }
    }
}

pub struct Sequence {
    ports: Ports,
    track_lists: [TrackList; 3],
    markers: MarkerSet,
    cached_length: f64,
}

impl Sequence {
    pub const ID: &'static str = "sequence";

    pub fn new() -> Self {
        let inputs = TrackType::ALL
            .iter()
            .map(|t| {
                Input::array(&t.input_name(), ValueType::Any)
                    .with_flags(InputFlags::ARRAY.with_ignored_invalidations())
            })
            .collect();
        Self {
            ports: Ports::new(
                inputs,
                vec![
                    Output::new(TEXTURE_OUT, ValueType::Texture),
                    Output::new(SAMPLES_OUT, ValueType::Samples),
                ],
            ),
            track_lists: [
                TrackList::new(TrackType::Video),
                TrackList::new(TrackType::Audio),
                TrackList::new(TrackType::Subtitle),
            ],
            markers: MarkerSet::default(),
            cached_length: 0.0,
        }
    }

    pub fn track_list(&self, track_type: TrackType) -> &TrackList {
        &self.track_lists[track_type.index()]
    }

    pub fn track_list_mut(&mut self, track_type: TrackType) -> &mut TrackList {
        &mut self.track_lists[track_type.index()]
    }

    pub fn cached_length(&self) -> f64 {
        self.cached_length
    }

    pub(crate) fn set_cached_length(&mut self, length: f64) {
        self.cached_length = length;
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers.markers
    }

    pub fn add_marker(&mut self, time: f64, name: &str) {
        self.markers.markers.push(Marker {
            time,
            name: name.to_string(),
        });
        self.markers
            .markers
            .sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    fn list_for_input(&mut self, input: &str) -> Option<&mut TrackList> {
        self.track_lists.iter_mut().find(|l| l.input_name == input)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for Sequence {
    fn type_id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> String {
        "Sequence".to_string()
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut Ports {
        &mut self.ports
    }

    fn value(
        &self,
        output: &str,
        db: &ValueDatabase,
        _time: f64,
    ) -> Result<ValueTable, LibraryError> {
        match output {
            TEXTURE_OUT => {
                // Stack video tracks bottom-up in element order.
                let mut composite: Option<crate::model::Frame> = None;
                if let Some(table) = db.get(&TrackType::Video.input_name()) {
                    for value in table.iter() {
                        if let NodeValue::Texture(frame) = value {
                            composite = Some(match composite {
                                Some(base) => super::blend_over(&base, frame),
                                None => frame.as_ref().clone(),
                            });
                        }
                    }
                }
                Ok(ValueTable::single(
                    composite
                        .map(|f| NodeValue::Texture(Arc::new(f)))
                        .unwrap_or(NodeValue::None),
                ))
            }
            SAMPLES_OUT => {
                let mut mixed: Option<SampleBuffer> = None;
                if let Some(table) = db.get(&TrackType::Audio.input_name()) {
                    for value in table.iter() {
                        if let NodeValue::Samples(samples) = value {
                            mixed = Some(match mixed {
                                Some(mut acc) => {
                                    for (a, s) in acc.data.iter_mut().zip(samples.data.iter()) {
                                        *a = (*a + *s).clamp(-1.0, 1.0);
                                    }
                                    acc
                                }
                                None => samples.as_ref().clone(),
                            });
                        }
                    }
                }
                Ok(ValueTable::single(
                    mixed
                        .map(|s| NodeValue::Samples(Arc::new(s)))
                        .unwrap_or(NodeValue::None),
                ))
            }
            other => Err(LibraryError::evaluation(format!(
                "sequence has no output {:?}",
                other
            ))),
        }
    }

    fn output_consumes(&self, output: &str, input: &str) -> bool {
        match output {
            TEXTURE_OUT => input == TrackType::Video.input_name(),
            SAMPLES_OUT => input == TrackType::Audio.input_name(),
            _ => true,
        }
    }

    fn input_connected(&mut self, input: &str, element: Option<usize>, from_node: Uuid) {
        if let Some(list) = self.list_for_input(input) {
            list.track_connected(from_node, element.unwrap_or(0));
        }
    }

    fn input_disconnected(&mut self, input: &str, element: Option<usize>, from_node: Uuid) {
        if let Some(list) = self.list_for_input(input) {
            list.track_disconnected(from_node, element);
        }
    }

    fn save_extra(&self) -> Option<serde_json::Value> {
        serde_json::to_value(&self.markers)
            .ok()
            .map(|points| serde_json::json!({ "points": points }))
    }

    fn load_extra(&mut self, value: &serde_json::Value) -> Result<(), LibraryError> {
        let Some(points) = value.get("points") else {
            return Ok(());
        };
        let set: MarkerSet = serde_json::from_value(points.clone())?;
        if set.version > MARKER_VERSION {
            return Err(LibraryError::InvalidArgument(format!(
                "unsupported marker version {}",
                set.version
            )));
        }
        self.markers = set;
        Ok(())
    }

    fn boxed_copy(&self) -> Box<dyn Node> {
        let mut copy = Self::new();
        copy.markers = self.markers.clone();
        // Track lists mirror connections, which a fresh copy does not have.
        copy.ports = Ports::new(
            self.ports.inputs.clone(),
            self.ports.outputs.clone(),
        );
        Box::new(copy)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Graph-level sequence queries
// ---------------------------------------------------------------------------

impl NodeGraph {
    fn sequence_ref(&self, id: Uuid) -> Option<&Sequence> {
        self.node(id).and_then(|n| n.as_any().downcast_ref())
    }

    fn sequence_mut_ref(&mut self, id: Uuid) -> Option<&mut Sequence> {
        self.node_mut(id).and_then(|n| n.as_any_mut().downcast_mut())
    }

    /// Total length of one of a sequence's track lists: the maximum clip end
    /// time over its tracks, or zero when no tracks exist.
    pub fn custom_length(&self, sequence: Uuid, track_type: TrackType) -> f64 {
        let Some(seq) = self.sequence_ref(sequence) else {
            return 0.0;
        };
        seq.track_list(track_type)
            .tracks()
            .iter()
            .map(|t| self.track_length(t.node))
            .fold(0.0, f64::max)
    }

    /// Overall sequence length: the maximum across the per-type lengths.
    pub fn sequence_length(&self, sequence: Uuid) -> f64 {
        TrackType::ALL
            .iter()
            .map(|t| self.custom_length(sequence, *t))
            .fold(0.0, f64::max)
    }

    /// End time of the furthest clip block connected into a track.
    pub fn track_length(&self, track: Uuid) -> f64 {
        if self
            .node(track)
            .and_then(|n| n.as_any().downcast_ref::<TrackNode>())
            .is_none()
        {
            return 0.0;
        }
        self.connections_to_input(track, crate::nodes::track::CLIPS_IN)
            .iter()
            .filter_map(|c| self.node(c.from.node))
            .filter_map(|n| n.as_any().downcast_ref::<ClipNode>())
            .map(|clip| clip.span().end)
            .fold(0.0, f64::max)
    }

    /// Track node ids of one list, in element order.
    pub fn sequence_tracks(&self, sequence: Uuid, track_type: TrackType) -> Vec<Uuid> {
        self.sequence_ref(sequence)
            .map(|seq| {
                seq.track_list(track_type)
                    .tracks()
                    .iter()
                    .map(|t| t.node)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Same as `sequence_tracks`, skipping locked tracks.
    pub fn unlocked_tracks(&self, sequence: Uuid, track_type: TrackType) -> Vec<Uuid> {
        self.sequence_tracks(sequence, track_type)
            .into_iter()
            .filter(|id| {
                self.node(*id)
                    .and_then(|n| n.as_any().downcast_ref::<TrackNode>())
                    .map(|t| !t.is_locked())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Derived-signal refresh: recompute the sequence's length and re-emit
    /// it when changed. No-op for non-sequence nodes.
    pub(crate) fn refresh_sequence(&mut self, node: Uuid) -> bool {
        if self.sequence_ref(node).is_none() {
            return false;
        }
        let length = self.sequence_length(node);
        let changed = {
            let seq = self.sequence_mut_ref(node).unwrap();
            if (seq.cached_length() - length).abs() > f64::EPSILON {
                seq.set_cached_length(length);
                true
            } else {
                false
            }
        };
        if changed {
            debug!("sequence {} length now {}", node, length);
            self.emit(GraphEvent::LengthChanged { node, length });
        }
        true
    }

    /// Structural timeline shift on the audio type: relocate cached waveform
    /// bookkeeping on every audio track by the same delta, without
    /// re-decoding.
    pub fn shift_audio(&mut self, sequence: Uuid, from: f64, to: f64) {
        if let Some(seq) = self.sequence_mut_ref(sequence) {
            for track in &mut seq.track_list_mut(TrackType::Audio).tracks {
                track.waveform.shift(from, to);
            }
        }
    }
}
