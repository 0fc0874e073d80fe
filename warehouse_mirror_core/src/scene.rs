use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use tracing::debug;

/// The kinds of proxy the mirror asks a scene to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Agent,
    Box,
    Shelf,
    /// A box stacked on a shelf; always parented to that shelf.
    ShelfBox,
}

/// Creates, moves and destroys renderable proxies on behalf of the mirror.
///
/// Implementations own the proxies; the mirror only keeps handles.
pub trait EntityFactory {
    type Handle: Copy + Eq + std::fmt::Debug;

    fn spawn(&mut self, kind: EntityKind, position: Vec3) -> Self::Handle;

    /// Spawns a proxy owned by `parent`. Despawning the parent despawns it too.
    fn spawn_child(&mut self, parent: Self::Handle, kind: EntityKind, position: Vec3)
    -> Self::Handle;

    fn despawn(&mut self, handle: Self::Handle);

    fn set_position(&mut self, handle: Self::Handle, position: Vec3);

    fn set_orientation(&mut self, handle: Self::Handle, orientation: Quat);
}

pub type NodeId = u64;

/// A proxy held by [`SceneGraph`].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: EntityKind,
    pub position: Vec3,
    pub orientation: Quat,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// In-memory scene graph. Node ids are never reused.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: BTreeMap<NodeId, Node>,
    next_id: NodeId,
    spawned: usize,
    despawned: usize,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of live nodes of the given kind.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.nodes.values().filter(|n| n.kind == kind).count()
    }

    /// Children of `id`, or an empty slice when the node does not exist.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    /// Total nodes ever spawned.
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    /// Total nodes ever despawned, children included.
    pub fn despawned(&self) -> usize {
        self.despawned
    }

    fn insert(&mut self, kind: EntityKind, position: Vec3, parent: Option<NodeId>) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.spawned += 1;
        self.nodes.insert(
            id,
            Node {
                kind,
                position,
                orientation: Quat::IDENTITY,
                parent,
                children: Vec::new(),
            },
        );
        id
    }
}

impl EntityFactory for SceneGraph {
    type Handle = NodeId;

    fn spawn(&mut self, kind: EntityKind, position: Vec3) -> NodeId {
        self.insert(kind, position, None)
    }

    fn spawn_child(&mut self, parent: NodeId, kind: EntityKind, position: Vec3) -> NodeId {
        if !self.nodes.contains_key(&parent) {
            debug!(parent, "spawning child of missing node as a root");
            return self.insert(kind, position, None);
        }
        let id = self.insert(kind, position, Some(parent));
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(id);
        }
        id
    }

    fn despawn(&mut self, handle: NodeId) {
        let Some(node) = self.nodes.remove(&handle) else {
            debug!(handle, "despawn of unknown node ignored");
            return;
        };
        self.despawned += 1;
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != handle);
        }
        let mut pending = node.children;
        while let Some(child) = pending.pop() {
            if let Some(removed) = self.nodes.remove(&child) {
                self.despawned += 1;
                pending.extend(removed.children);
            }
        }
    }

    fn set_position(&mut self, handle: NodeId, position: Vec3) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.position = position;
        }
    }

    fn set_orientation(&mut self, handle: NodeId, orientation: Quat) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.orientation = orientation;
        }
    }
}
