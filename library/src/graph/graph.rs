//! The node graph: ownership, connections, mutation spans and invalidation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{Receiver, Sender, channel};

use log::debug;
use thiserror::Error;
use uuid::Uuid;

use crate::graph::dependency::NodeDependency;
use crate::graph::digest::Digest;
use crate::graph::node::{Connection, Input, InputRef, Node, OutputRef};
use crate::model::TimeRange;

#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("connection would create a cycle")]
    CycleDetected,
    #[error("type mismatch: output {output:?} cannot feed input {input:?}")]
    TypeMismatch { output: String, input: String },
    #[error("node {0} not found")]
    NodeNotFound(Uuid),
    #[error("node {node} has no port named {port:?}")]
    PortNotFound { node: Uuid, port: String },
    #[error("input {0:?} already has an incoming connection")]
    InputOccupied(String),
    #[error("a mutation span is open; evaluation may not start")]
    OperationInProgress,
    #[error("node {0} still has connected edges")]
    NodeStillConnected(Uuid),
    #[error("node {0} may only be removed inside a mutation span")]
    RemovalOutsideOperation(Uuid),
}

/// Event delivered to graph subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphEvent {
    /// A node's output may have changed over `range`. Delivered in
    /// breadth-first order from the edited node.
    Invalidated {
        node: Uuid,
        range: TimeRange,
        epoch: u64,
    },
    /// A Sequence's total length changed.
    LengthChanged { node: Uuid, length: f64 },
}

/// Owns nodes and the connection relation between them.
///
/// The connection relation is acyclic at all times: enforced at connect-time,
/// never repaired after the fact. Mutation is confined to a single
/// controlling thread; mutation spans are the cooperative barrier that keeps
/// workers from starting evaluation mid-edit.
pub struct NodeGraph {
    nodes: HashMap<Uuid, Box<dyn Node>>,
    connections: Vec<Connection>,
    operation_depth: u32,
    edit_epoch: u64,
    subscribers: Vec<Sender<GraphEvent>>,
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            connections: Vec::new(),
            operation_depth: 0,
            edit_epoch: 0,
            subscribers: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Node ownership
    // ------------------------------------------------------------------

    pub fn add_node(&mut self, node: Box<dyn Node>) -> Uuid {
        let id = Uuid::new_v4();
        debug!("add node {} ({})", id, node.type_id());
        self.nodes.insert(id, node);
        id
    }

    pub fn node(&self, id: Uuid) -> Option<&dyn Node> {
        self.nodes.get(&id).map(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, id: Uuid) -> Option<&mut (dyn Node + 'static)> {
        self.nodes.get_mut(&id).map(|n| n.as_mut())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.nodes.keys().copied()
    }

    /// Remove a node. Only legal inside a mutation span, and only after all
    /// of the node's edges were disconnected.
    pub fn remove_node(&mut self, id: Uuid) -> Result<Box<dyn Node>, GraphError> {
        if !self.in_operation() {
            return Err(GraphError::RemovalOutsideOperation(id));
        }
        if self
            .connections
            .iter()
            .any(|c| c.from.node == id || c.to.node == id)
        {
            return Err(GraphError::NodeStillConnected(id));
        }
        self.nodes.remove(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Append an input to an existing node.
    pub fn add_input(&mut self, node: Uuid, input: Input) -> Result<(), GraphError> {
        let n = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFound(node))?;
        n.ports_mut().inputs.push(input);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutation spans and edit epochs
    // ------------------------------------------------------------------

    /// Open a mutation span. Reentrant; while any span is open no evaluation
    /// may be started against this graph.
    pub fn begin_operation(&mut self) {
        self.operation_depth += 1;
    }

    pub fn end_operation(&mut self) {
        debug_assert!(self.operation_depth > 0, "unbalanced end_operation");
        self.operation_depth = self.operation_depth.saturating_sub(1);
    }

    pub fn in_operation(&self) -> bool {
        self.operation_depth > 0
    }

    /// Current edit epoch; bumped by every invalidating edit.
    pub fn current_epoch(&self) -> u64 {
        self.edit_epoch
    }

    /// Epoch token required to start evaluation. Rejected, not silently
    /// tolerated, while a mutation span is open.
    pub fn evaluation_epoch(&self) -> Result<u64, GraphError> {
        if self.in_operation() {
            return Err(GraphError::OperationInProgress);
        }
        Ok(self.edit_epoch)
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Incoming connections for one input, ordered by element index.
    pub fn connections_to_input(&self, node: Uuid, input: &str) -> Vec<&Connection> {
        let mut conns: Vec<&Connection> = self
            .connections
            .iter()
            .filter(|c| c.to.node == node && c.to.input == input)
            .collect();
        conns.sort_by_key(|c| c.to.element.unwrap_or(0));
        conns
    }

    pub fn input_connection(&self, to: &InputRef) -> Option<&Connection> {
        self.connections.iter().find(|c| c.to == *to)
    }

    pub fn outgoing_connections(&self, node: Uuid) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.from.node == node)
    }

    /// Connect an output to an input.
    ///
    /// Fails with `CycleDetected` if the input's node already transitively
    /// reaches the output's node, and with `TypeMismatch` if the value types
    /// are incompatible. On failure the connection set is unchanged.
    pub fn connect(&mut self, from: OutputRef, to: InputRef) -> Result<(), GraphError> {
        let from_node = self
            .nodes
            .get(&from.node)
            .ok_or(GraphError::NodeNotFound(from.node))?;
        let to_node = self
            .nodes
            .get(&to.node)
            .ok_or(GraphError::NodeNotFound(to.node))?;

        let output = from_node
            .ports()
            .output(&from.output)
            .ok_or_else(|| GraphError::PortNotFound {
                node: from.node,
                port: from.output.clone(),
            })?;
        let input = to_node
            .ports()
            .input(&to.input)
            .ok_or_else(|| GraphError::PortNotFound {
                node: to.node,
                port: to.input.clone(),
            })?;

        if !input.value_type.accepts(output.value_type) {
            return Err(GraphError::TypeMismatch {
                output: from.output.clone(),
                input: to.input.clone(),
            });
        }

        // A non-array input accepts at most one incoming connection.
        if !input.flags.array
            && self
                .connections
                .iter()
                .any(|c| c.to.node == to.node && c.to.input == to.input)
        {
            return Err(GraphError::InputOccupied(to.input.clone()));
        }

        if self.reaches(to.node, from.node) {
            return Err(GraphError::CycleDetected);
        }

        debug!(
            "connect {}.{} -> {}.{}",
            from.node, from.output, to.node, to.input
        );
        self.connections.push(Connection {
            from: from.clone(),
            to: to.clone(),
        });

        if let Some(n) = self.nodes.get_mut(&to.node) {
            n.input_connected(&to.input, to.element, from.node);
        }
        self.apply_input_change(&to, TimeRange::all());

        Ok(())
    }

    /// Remove a connection. Always safe; removing a missing edge is a no-op.
    /// Returns whether an edge was removed.
    pub fn disconnect(&mut self, from: &OutputRef, to: &InputRef) -> bool {
        let before = self.connections.len();
        self.connections
            .retain(|c| !(c.from == *from && c.to == *to));
        if self.connections.len() == before {
            return false;
        }

        debug!(
            "disconnect {}.{} -> {}.{}",
            from.node, from.output, to.node, to.input
        );
        if let Some(n) = self.nodes.get_mut(&to.node) {
            n.input_disconnected(&to.input, to.element, from.node);
        }
        self.apply_input_change(to, TimeRange::all());
        true
    }

    /// Disconnect every edge touching `node`.
    pub fn disconnect_all(&mut self, node: Uuid) {
        let edges: Vec<(OutputRef, InputRef)> = self
            .connections
            .iter()
            .filter(|c| c.from.node == node || c.to.node == node)
            .map(|c| (c.from.clone(), c.to.clone()))
            .collect();
        for (from, to) in edges {
            self.disconnect(&from, &to);
        }
    }

    /// Whether `from` transitively reaches `to` along connections.
    fn reaches(&self, from: Uuid, to: Uuid) -> bool {
        if from == to {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for conn in self.connections.iter().filter(|c| c.from.node == current) {
                queue.push_back(conn.to.node);
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// Set an input's static value and propagate invalidation.
    pub fn set_input_value(
        &mut self,
        node: Uuid,
        input: &str,
        value: crate::model::NodeValue,
    ) -> Result<(), GraphError> {
        let n = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFound(node))?;
        let port = n
            .ports_mut()
            .input_mut(input)
            .ok_or_else(|| GraphError::PortNotFound {
                node,
                port: input.to_string(),
            })?;
        port.value = value;
        self.apply_input_change(&InputRef::new(node, input), TimeRange::all());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    pub fn subscribe(&mut self) -> Receiver<GraphEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn emit(&mut self, event: GraphEvent) {
        self.subscribers.retain(|s| s.send(event.clone()).is_ok());
    }

    /// React to a change of an input's effective value.
    ///
    /// Inputs flagged `ignore_invalidations` do not trigger direct
    /// propagation; their owning node is refreshed through its derived
    /// signal path instead (a Sequence's TrackList).
    fn apply_input_change(&mut self, to: &InputRef, range: TimeRange) {
        let ignoring = self
            .nodes
            .get(&to.node)
            .and_then(|n| n.ports().input(&to.input))
            .map(|i| i.flags.ignore_invalidations)
            .unwrap_or(false);

        if ignoring {
            self.edit_epoch += 1;
            self.refresh_derived(to.node, range);
        } else {
            self.invalidate(to.node, range);
        }
    }

    /// Deliver an invalidation covering `range` to `node` and, breadth-first
    /// along outgoing connections, to every reachable downstream node.
    pub fn invalidate(&mut self, node: Uuid, range: TimeRange) {
        self.edit_epoch += 1;
        self.propagate(node, range);
    }

    fn propagate(&mut self, node: Uuid, range: TimeRange) {
        let epoch = self.edit_epoch;
        let (order, derived) = self.delivery_set(node);

        for target in order {
            self.emit(GraphEvent::Invalidated {
                node: target,
                range,
                epoch,
            });
        }
        for target in derived {
            self.refresh_derived(target, range);
        }
    }

    /// BFS delivery order from `node`, plus the set of nodes reached only
    /// through invalidation-ignoring inputs (their derived signal owners).
    fn delivery_set(&self, node: Uuid) -> (Vec<Uuid>, Vec<Uuid>) {
        let mut order = vec![node];
        let mut visited: HashSet<Uuid> = HashSet::from([node]);
        let mut derived = Vec::new();
        let mut queue = VecDeque::from([node]);

        while let Some(current) = queue.pop_front() {
            for conn in self.connections.iter().filter(|c| c.from.node == current) {
                let ignoring = self
                    .nodes
                    .get(&conn.to.node)
                    .and_then(|n| n.ports().input(&conn.to.input))
                    .map(|i| i.flags.ignore_invalidations)
                    .unwrap_or(false);
                if ignoring {
                    if !visited.contains(&conn.to.node) && !derived.contains(&conn.to.node) {
                        derived.push(conn.to.node);
                    }
                    continue;
                }
                if visited.insert(conn.to.node) {
                    order.push(conn.to.node);
                    queue.push_back(conn.to.node);
                }
            }
        }
        // A node reached through a normal edge gets its direct delivery;
        // keep the derived set for nodes reachable only through ignoring
        // inputs so they are not notified twice.
        derived.retain(|d| !visited.contains(d));
        (order, derived)
    }

    /// Refresh a node reached through an ignoring input, then continue
    /// propagation from it as its own derived signal.
    ///
    /// The concrete refresh (Sequence length bookkeeping) lives with the
    /// Sequence implementation; see `nodes::sequence`.
    fn refresh_derived(&mut self, node: Uuid, range: TimeRange) {
        self.refresh_sequence(node);

        let epoch = self.edit_epoch;
        let (order, derived) = self.delivery_set(node);
        for target in order {
            self.emit(GraphEvent::Invalidated {
                node: target,
                range,
                epoch,
            });
        }
        for target in derived {
            self.refresh_derived(target, range);
        }
    }

    // ------------------------------------------------------------------
    // Hashing
    // ------------------------------------------------------------------

    /// Deterministic content hash for a dependency: the node's own
    /// contribution followed by every upstream contribution reachable for
    /// the requested output at the requested time, in input order.
    pub fn hash_dependency(&self, dep: &NodeDependency) -> Result<u64, GraphError> {
        let mut digest = Digest::new();
        self.hash_node(dep.node, &dep.output, dep.time(), &mut digest)?;
        Ok(digest.finish())
    }

    fn hash_node(
        &self,
        node_id: Uuid,
        output: &str,
        time: f64,
        digest: &mut Digest,
    ) -> Result<(), GraphError> {
        let node = self.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        node.hash(output, digest, time);

        let input_names: Vec<String> =
            node.ports().inputs.iter().map(|i| i.name.clone()).collect();
        for input in input_names {
            let sub_time = node.input_time(&input, time);
            let conns: Vec<(Option<usize>, OutputRef)> = self
                .connections_to_input(node_id, &input)
                .into_iter()
                .map(|c| (c.to.element, c.from.clone()))
                .collect();
            for (element, from) in conns {
                // Upstream blocks outside the requested time contribute
                // nothing, so digests for disjoint times stay independent.
                if let Some(upstream) = self.node(from.node) {
                    if let Some(block) = upstream.block_range() {
                        if !block.contains(time) {
                            continue;
                        }
                    }
                }
                digest.write_str(&input);
                digest.write_u64(element.unwrap_or(0) as u64);
                self.hash_node(from.node, &from.output, sub_time, digest)?;
            }
        }
        Ok(())
    }
}
