//! In-memory scene graph the rigs are built on.
//!
//! The scene is an arena of named nodes forming a DAG (transforms, joints,
//! shapes, IK handles, constraints) plus object sets and message-style links.
//! Nodes carry translate/rotate/scale channels with per-channel locks and
//! typed attributes that can be connected through simple unit operations.
//!
//! World matrices are evaluated lazily (see [`eval`]) and cached until the
//! next mutation, so build code can freely interleave queries and edits.
//!
//! ## Example
//!
//! ```
//! use rigkit::scene::{Scene, ConstraintOptions};
//! use rigkit::util::Vector;
//!
//! let mut scene = Scene::new();
//! let a = scene.create_transform("a", None)?;
//! let b = scene.create_transform("b", Some(a))?;
//! scene.set_translate(a, Vector::new(0.0, 1.0, 0.0))?;
//! assert_eq!(scene.world_position(b)?, Vector::new(0.0, 1.0, 0.0));
//! # Ok::<(), rigkit::Error>(())
//! ```

mod attr;
mod constraint;
mod eval;
mod ik;
mod import;
mod node;

pub use attr::{to_bool, Attr, AttrValue, Connection, Plug, PlugOp};
pub use constraint::{ConstraintData, ConstraintKind, ConstraintOptions, ConstraintTarget};
pub use ik::{solve_aim, solve_rotate_plane, solve_two_bone, IkHandleData, IkRest, IkSolver, IK_BLEND_ATTR};
pub use import::{JointDescription, MeshDescription, SceneDescription};
pub use node::{Channels, CurveData, Node, NodeId, NodeKind, SetData, SurfaceData};

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Write as _};

use tracing::trace;

use crate::util::{euler_xyz_to_quat, quat_to_euler_xyz, DQuat, Error, Result, Transform, Vector};

use eval::Evaluator;

/// Visibility attribute present on every DAG node.
pub const VISIBILITY_ATTR: &str = "v";

/// Kind of message link between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Pick-walk edge: `from` walks up to `to`.
    PickParent,
    /// Snap edge: `to` is a snap source of `from`.
    Snap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Link {
    kind: LinkKind,
    from: NodeId,
    to: NodeId,
}

/// Scene graph.
#[derive(Default)]
pub struct Scene {
    nodes: Vec<Option<Node>>,
    names: HashMap<String, NodeId>,
    links: Vec<Link>,
    cache: RefCell<HashMap<NodeId, Transform>>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.len())
            .field("links", &self.links.len())
            .finish()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Node lifetime
    // ========================================================================

    /// Create a node. Fails if the name is taken or empty.
    pub fn create_node(&mut self, name: &str, kind: NodeKind, parent: Option<NodeId>) -> Result<NodeId> {
        if name.is_empty() {
            return Err(Error::config("node name is empty"));
        }
        if self.names.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        if let Some(p) = parent {
            self.node(p)?;
        }
        let is_set = matches!(kind, NodeKind::ObjectSet(_));
        let id = NodeId(self.nodes.len() as u32);
        let mut node = Node::new(name.to_string(), kind, if is_set { None } else { parent });
        if !is_set {
            node.attrs.insert(VISIBILITY_ATTR.to_string(), Attr::boolean(true).keyable(true));
        }
        self.nodes.push(Some(node));
        self.names.insert(name.to_string(), id);
        if let (Some(p), false) = (parent, is_set) {
            self.node_mut(p)?.children.push(id);
        }
        self.invalidate();
        trace!("created {name}");
        Ok(id)
    }

    pub fn create_transform(&mut self, name: &str, parent: Option<NodeId>) -> Result<NodeId> {
        self.create_node(name, NodeKind::Transform, parent)
    }

    pub fn create_joint(&mut self, name: &str, parent: Option<NodeId>) -> Result<NodeId> {
        self.create_node(name, NodeKind::Joint, parent)
    }

    /// Delete a node, its descendants and everything that only exists for them
    /// (constraints, IK handles, effectors). Links, set membership, attribute
    /// connections and constraint targets pointing at deleted nodes are removed.
    pub fn delete(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));

        // IK handles lose their meaning when a chain joint goes away.
        loop {
            let extra: Vec<NodeId> = self
                .iter()
                .filter(|(hid, n)| {
                    !doomed.contains(hid)
                        && match &n.kind {
                            NodeKind::IkHandle(d) => {
                                d.joints.iter().any(|j| doomed.contains(j)) || doomed.contains(&d.effector)
                            }
                            _ => false,
                        }
                })
                .map(|(hid, _)| hid)
                .collect();
            if extra.is_empty() {
                break;
            }
            for h in extra {
                doomed.push(h);
                doomed.extend(self.descendants(h));
                if let Ok(d) = self.ik_handle(h) {
                    doomed.push(d.effector);
                }
            }
        }
        doomed.sort();
        doomed.dedup();

        if let Some(p) = self.parent(id) {
            if let Ok(parent) = self.node_mut(p) {
                parent.children.retain(|c| *c != id);
            }
        }
        for &d in &doomed {
            if let Some(n) = self.nodes.get_mut(d.index()).and_then(Option::take) {
                self.names.remove(&n.name);
                if let Some(p) = n.parent {
                    if let Some(Some(parent)) = self.nodes.get_mut(p.index()) {
                        parent.children.retain(|c| *c != d);
                    }
                }
            }
        }
        self.links.retain(|l| !doomed.contains(&l.from) && !doomed.contains(&l.to));

        // Scrub references held by surviving nodes.
        let mut emptied = Vec::new();
        for (idx, slot) in self.nodes.iter_mut().enumerate() {
            let Some(node) = slot else { continue };
            node.rotate_inputs.retain(|r| !doomed.contains(r));
            node.constraints.retain(|c| !doomed.contains(c));
            node.instanced_shapes.retain(|s| !doomed.contains(s));
            for attr in node.attrs.values_mut() {
                if attr.input.as_ref().is_some_and(|c| doomed.contains(&c.source.node)) {
                    attr.input = None;
                }
            }
            match &mut node.kind {
                NodeKind::ObjectSet(set) => set.members.retain(|m| !doomed.contains(m)),
                NodeKind::Surface(s) => s.drivers.retain(|m| !doomed.contains(m)),
                NodeKind::Constraint(c) => {
                    let keep: Vec<bool> = c.targets.iter().map(|t| !doomed.contains(&t.node)).collect();
                    if keep.iter().any(|k| !k) {
                        // Weight attrs are positional; shift them with their targets.
                        let mut weights = Vec::new();
                        for (i, k) in keep.iter().enumerate() {
                            if *k {
                                weights.push(node.attrs.get(&format!("w{i}")).cloned());
                            }
                        }
                        for i in 0..keep.len() {
                            node.attrs.remove(&format!("w{i}"));
                        }
                        for (i, w) in weights.into_iter().enumerate() {
                            node.attrs.insert(format!("w{i}"), w.unwrap_or_else(|| Attr::float(1.0)));
                        }
                        let mut i = 0;
                        c.targets.retain(|_| {
                            let k = keep[i];
                            i += 1;
                            k
                        });
                        if c.targets.is_empty() {
                            emptied.push(NodeId(idx as u32));
                        }
                    }
                }
                _ => {}
            }
        }
        self.invalidate();
        trace!("deleted {} nodes", doomed.len());
        for cns in emptied {
            if self.contains(cns) {
                self.delete(cns)?;
            }
        }
        Ok(())
    }

    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<()> {
        if self.names.contains_key(new_name) {
            return Err(Error::DuplicateName(new_name.to_string()));
        }
        let old = std::mem::replace(&mut self.node_mut(id)?.name, new_name.to_string());
        self.names.remove(&old);
        self.names.insert(new_name.to_string(), id);
        Ok(())
    }

    /// `base` if free, otherwise `base1`, `base2`, ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.names.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{base}{i}"))
            .find(|n| !self.names.contains_key(n))
            .unwrap_or_else(|| base.to_string())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Node id by name, or `NodeNotFound`.
    pub fn id(&self, name: &str) -> Result<NodeId> {
        self.find(name).ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::NodeNotFound(format!("{id:?}")))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::NodeNotFound(format!("{id:?}")))
    }

    /// Node name, or `<deleted>` for stale ids.
    pub fn name(&self, id: NodeId) -> &str {
        self.node(id).map(|n| n.name.as_str()).unwrap_or("<deleted>")
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).ok().map(|n| &n.kind)
    }

    pub fn is_joint(&self, id: NodeId) -> bool {
        self.node(id).map(|n| n.is_joint()).unwrap_or(false)
    }

    /// Live nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i as u32), n)))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// DAG nodes without a parent.
    pub fn roots(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, n)| n.parent.is_none() && n.is_dag())
            .map(|(id, _)| id)
            .collect()
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// All descendants, depth first, parents before children.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Parents from the immediate one up to the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            out.push(p);
            cur = self.parent(p);
        }
        out
    }

    /// Shape children of a transform.
    pub fn shapes(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.node(*c).map(|n| n.kind.is_shape()).unwrap_or(false))
            .collect()
    }

    /// Move `child` under `parent` (or to the root). With `keep_world` the
    /// world transform is preserved by rewriting local channels.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>, keep_world: bool) -> Result<()> {
        if let Some(p) = parent {
            if p == child || self.ancestors(p).contains(&child) {
                return Err(Error::config(format!(
                    "cannot parent {} under its own descendant {}",
                    self.name(child),
                    self.name(p)
                )));
            }
            self.node(p)?;
        }
        let world = if keep_world { Some(self.world_matrix(child)?) } else { None };
        if let Some(old) = self.parent(child) {
            self.node_mut(old)?.children.retain(|c| *c != child);
        }
        self.node_mut(child)?.parent = parent;
        if let Some(p) = parent {
            self.node_mut(p)?.children.push(child);
        }
        self.invalidate();
        if let Some(w) = world {
            self.write_world(child, w, false)?;
        }
        Ok(())
    }

    // ========================================================================
    // Channels and matrices
    // ========================================================================

    pub(crate) fn invalidate(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Evaluated world matrix.
    pub fn world_matrix(&self, id: NodeId) -> Result<Transform> {
        self.node(id)?;
        let mut cache = self.cache.borrow_mut();
        Evaluator::new(self, &mut cache).world(id)
    }

    pub fn world_position(&self, id: NodeId) -> Result<Vector> {
        Ok(self.world_matrix(id)?.translation())
    }

    /// Interpolated frame on a strip surface.
    pub fn surface_frame(&self, surface: NodeId, u: f64) -> Result<Transform> {
        let mut cache = self.cache.borrow_mut();
        Evaluator::new(self, &mut cache).surface_frame(surface, u)
    }

    /// Local matrix from channels (constraints not applied).
    pub fn local_matrix(&self, id: NodeId) -> Result<Transform> {
        Ok(self.node(id)?.channel_matrix())
    }

    pub fn translate(&self, id: NodeId) -> Result<Vector> {
        Ok(self.node(id)?.translate)
    }

    pub fn rotate(&self, id: NodeId) -> Result<DQuat> {
        Ok(self.node(id)?.rotate)
    }

    /// Rotate channel as XYZ Euler degrees.
    pub fn rotate_euler(&self, id: NodeId) -> Result<Vector> {
        Ok(quat_to_euler_xyz(self.node(id)?.rotate))
    }

    pub fn scale(&self, id: NodeId) -> Result<Vector> {
        Ok(self.node(id)?.scale)
    }

    /// Set the translate channels; fails if a changed axis is locked.
    pub fn set_translate(&mut self, id: NodeId, t: Vector) -> Result<()> {
        let node = self.node(id)?;
        for axis in 0..3 {
            if node.locked.contains(Channels::translate_axis(axis)) && (node.translate[axis] - t[axis]).abs() > 1e-12 {
                return Err(Error::Locked(format!("{}.t{}", node.name, ['x', 'y', 'z'][axis])));
            }
        }
        self.node_mut(id)?.translate = t;
        self.invalidate();
        Ok(())
    }

    /// Set the rotate channels; fails if a changed axis is locked.
    pub fn set_rotate(&mut self, id: NodeId, r: DQuat) -> Result<()> {
        let node = self.node(id)?;
        if node.locked.intersects(Channels::ROTATE) {
            let cur = quat_to_euler_xyz(node.rotate);
            let new = quat_to_euler_xyz(r);
            for axis in 0..3 {
                if node.locked.contains(Channels::rotate_axis(axis)) && (cur[axis] - new[axis]).abs() > 1e-9 {
                    return Err(Error::Locked(format!("{}.r{}", node.name, ['x', 'y', 'z'][axis])));
                }
            }
        }
        self.node_mut(id)?.rotate = r.normalize();
        self.invalidate();
        Ok(())
    }

    /// Set the rotate channels from XYZ Euler degrees.
    pub fn set_rotate_euler(&mut self, id: NodeId, degrees: Vector) -> Result<()> {
        self.set_rotate(id, euler_xyz_to_quat(degrees))
    }

    pub fn set_scale(&mut self, id: NodeId, s: Vector) -> Result<()> {
        let node = self.node(id)?;
        for axis in 0..3 {
            if node.locked.contains(Channels::scale_axis(axis)) && (node.scale[axis] - s[axis]).abs() > 1e-12 {
                return Err(Error::Locked(format!("{}.s{}", node.name, ['x', 'y', 'z'][axis])));
            }
        }
        self.node_mut(id)?.scale = s;
        self.invalidate();
        Ok(())
    }

    /// Joint orient (applied after rotate).
    pub fn set_orient(&mut self, id: NodeId, orient: DQuat) -> Result<()> {
        self.node_mut(id)?.orient = orient.normalize();
        self.invalidate();
        Ok(())
    }

    pub fn set_inherits_transform(&mut self, id: NodeId, inherits: bool) -> Result<()> {
        let world = self.world_matrix(id)?;
        self.node_mut(id)?.inherits_transform = inherits;
        self.invalidate();
        self.write_world(id, world, false)
    }

    /// Make `id`'s rotate channel follow `source`'s rotate channel (added on top).
    pub fn connect_rotate(&mut self, source: NodeId, id: NodeId) -> Result<()> {
        self.node(source)?;
        let node = self.node_mut(id)?;
        if !node.rotate_inputs.contains(&source) {
            node.rotate_inputs.push(source);
        }
        self.invalidate();
        Ok(())
    }

    /// Move a node so its world matrix matches `world`, writing its local
    /// channels. Locked channels keep their values.
    pub fn set_world_matrix(&mut self, id: NodeId, world: Transform) -> Result<()> {
        self.write_world(id, world, true)
    }

    fn write_world(&mut self, id: NodeId, world: Transform, respect_locks: bool) -> Result<()> {
        let (translate, rotate, scale) = self.solve_channels(id, world, respect_locks)?;
        let node = self.node_mut(id)?;
        node.translate = translate;
        node.rotate = rotate;
        node.scale = scale;
        self.invalidate();
        Ok(())
    }

    /// Translate, rotate and scale channels that would put `id` at `world`,
    /// keeping locked channels. Nothing is written.
    pub fn channels_for_world(&self, id: NodeId, world: Transform) -> Result<(Vector, DQuat, Vector)> {
        self.solve_channels(id, world, true)
    }

    fn solve_channels(&self, id: NodeId, world: Transform, respect_locks: bool) -> Result<(Vector, DQuat, Vector)> {
        let node = self.node(id)?;
        let parent_world = match node.parent {
            Some(p) if node.inherits_transform => self.world_matrix(p)?,
            _ => Transform::IDENTITY,
        };
        let local = world * parent_world.inverse()?;
        let node = self.node(id)?;
        let locked = if respect_locks { node.locked } else { Channels::NONE };

        let mut translate = local.translation();
        let mut scale = local.scale();
        for axis in 0..3 {
            if locked.contains(Channels::translate_axis(axis)) {
                translate[axis] = node.translate[axis];
            }
            if locked.contains(Channels::scale_axis(axis)) {
                scale[axis] = node.scale[axis];
            }
        }
        if local.determinant() < 0.0 {
            scale.x = -scale.x;
        }

        let mut rotate = node.orient.inverse() * local.rotation();
        if locked.intersects(Channels::ROTATE) {
            let cur = quat_to_euler_xyz(node.rotate);
            let mut e = quat_to_euler_xyz(rotate);
            for axis in 0..3 {
                if locked.contains(Channels::rotate_axis(axis)) {
                    e[axis] = cur[axis];
                }
            }
            rotate = euler_xyz_to_quat(e);
        }
        Ok((translate, rotate.normalize(), scale))
    }

    pub fn lock(&mut self, id: NodeId, channels: Channels) -> Result<()> {
        self.node_mut(id)?.locked.insert(channels);
        if channels.contains(Channels::V) {
            if let Some(a) = self.node_mut(id)?.attrs.get_mut(VISIBILITY_ATTR) {
                a.locked = true;
            }
        }
        Ok(())
    }

    pub fn unlock(&mut self, id: NodeId, channels: Channels) -> Result<()> {
        self.node_mut(id)?.locked.remove(channels);
        if channels.contains(Channels::V) {
            if let Some(a) = self.node_mut(id)?.attrs.get_mut(VISIBILITY_ATTR) {
                a.locked = false;
            }
        }
        Ok(())
    }

    pub fn lock_and_hide(&mut self, id: NodeId, channels: Channels) -> Result<()> {
        self.lock(id, channels)?;
        self.node_mut(id)?.hidden.insert(channels);
        Ok(())
    }

    pub fn unlock_and_show(&mut self, id: NodeId, channels: Channels) -> Result<()> {
        self.unlock(id, channels)?;
        self.node_mut(id)?.hidden.remove(channels);
        Ok(())
    }

    /// Channels that can be set on a node.
    pub fn free_channels(&self, id: NodeId) -> Result<Channels> {
        let locked = self.node(id)?.locked;
        let mut free = Channels::SRT;
        free.remove(locked);
        Ok(free)
    }

    /// Return every unlocked channel to its default (zero translate and
    /// rotate, unit scale).
    pub fn reset_channels(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let locked = node.locked;
        let mut t = node.translate;
        let mut s = node.scale;
        let mut e = quat_to_euler_xyz(node.rotate);
        for axis in 0..3 {
            if !locked.contains(Channels::translate_axis(axis)) {
                t[axis] = 0.0;
            }
            if !locked.contains(Channels::scale_axis(axis)) {
                s[axis] = 1.0;
            }
            if !locked.contains(Channels::rotate_axis(axis)) {
                e[axis] = 0.0;
            }
        }
        let node = self.node_mut(id)?;
        node.translate = t;
        node.scale = s;
        node.rotate = euler_xyz_to_quat(e);
        self.invalidate();
        Ok(())
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Add an attribute. Fails if it already exists.
    pub fn add_attr(&mut self, id: NodeId, name: &str, attr: Attr) -> Result<Plug> {
        let node = self.node_mut(id)?;
        if node.attrs.contains_key(name) {
            return Err(Error::config(format!("attribute {}.{} already exists", node.name, name)));
        }
        node.attrs.insert(name.to_string(), attr);
        Ok(Plug::new(id, name))
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.node(id).map(|n| n.attrs.contains_key(name)).unwrap_or(false)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Result<&Attr> {
        let node = self.node(id)?;
        node.attrs.get(name).ok_or_else(|| Error::attr(&node.name, name))
    }

    fn attr_mut(&mut self, id: NodeId, name: &str) -> Result<&mut Attr> {
        let node = self.node_mut(id)?;
        let node_name = node.name.clone();
        node.attrs.get_mut(name).ok_or_else(|| Error::attr(node_name, name))
    }

    /// Set an attribute value. Numbers are coerced to the attribute's type and
    /// clamped to its range. Locked or connected attributes are refused.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        let value = value.into();
        let full = format!("{}.{}", self.name(id), name);
        let attr = self.attr_mut(id, name)?;
        if attr.locked {
            return Err(Error::Locked(full));
        }
        if attr.input.is_some() {
            return Err(Error::config(format!("{full} is connected")));
        }
        attr.value = match (value.as_f64(), attr.value.is_numeric()) {
            (Some(v), true) => attr.value.with_number(attr.clamp(v)),
            _ => value,
        };
        self.invalidate();
        Ok(())
    }

    pub fn lock_attr(&mut self, id: NodeId, name: &str, locked: bool) -> Result<()> {
        self.attr_mut(id, name)?.locked = locked;
        Ok(())
    }

    /// Connect `source` into `dest` through `op`, replacing any existing input.
    pub fn connect(&mut self, source: &Plug, dest: &Plug, op: PlugOp) -> Result<()> {
        self.attr(source.node, &source.attr)?;
        if source == dest {
            return Err(Error::Cycle(format!("{}.{}", self.name(dest.node), dest.attr)));
        }
        let attr = self.attr_mut(dest.node, &dest.attr)?;
        attr.input = Some(Connection { source: source.clone(), op });
        self.invalidate();
        Ok(())
    }

    pub fn disconnect(&mut self, dest: &Plug) -> Result<()> {
        self.attr_mut(dest.node, &dest.attr)?.input = None;
        self.invalidate();
        Ok(())
    }

    /// Incoming connection of an attribute.
    pub fn input(&self, dest: &Plug) -> Option<&Connection> {
        self.attr(dest.node, &dest.attr).ok().and_then(|a| a.input.as_ref())
    }

    /// Attributes fed by `source`.
    pub fn outputs(&self, source: &Plug) -> Vec<Plug> {
        let mut out = Vec::new();
        for (id, node) in self.iter() {
            for (name, attr) in &node.attrs {
                if attr.input.as_ref().is_some_and(|c| &c.source == source) {
                    out.push(Plug::new(id, name.clone()));
                }
            }
        }
        out
    }

    /// Evaluated numeric value, following connections.
    pub fn get_attr_f64(&self, id: NodeId, name: &str) -> Result<f64> {
        self.eval_attr(id, name, 0)
    }

    /// Evaluated boolean value (numbers truncate toward zero).
    pub fn get_attr_bool(&self, id: NodeId, name: &str) -> Result<bool> {
        Ok(to_bool(self.get_attr_f64(id, name)?))
    }

    pub fn get_attr_str(&self, id: NodeId, name: &str) -> Result<String> {
        let attr = self.attr(id, name)?;
        attr.value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::config(format!("{}.{} is not a string", self.name(id), name)))
    }

    pub fn get_attr_matrix(&self, id: NodeId, name: &str) -> Result<Transform> {
        let attr = self.attr(id, name)?;
        attr.value
            .as_matrix()
            .ok_or_else(|| Error::config(format!("{}.{} is not a matrix", self.name(id), name)))
    }

    pub fn get_attr_triple(&self, id: NodeId, name: &str) -> Result<Vector> {
        let attr = self.attr(id, name)?;
        attr.value
            .as_triple()
            .ok_or_else(|| Error::config(format!("{}.{} is not a triple", self.name(id), name)))
    }

    fn eval_attr(&self, id: NodeId, name: &str, depth: usize) -> Result<f64> {
        if depth > 64 {
            return Err(Error::Cycle(format!("{}.{}", self.name(id), name)));
        }
        let attr = self.attr(id, name)?;
        let raw = match &attr.input {
            Some(c) => c.op.apply(self.eval_attr(c.source.node, &c.source.attr, depth + 1)?),
            None => attr
                .value
                .as_f64()
                .ok_or_else(|| Error::config(format!("{}.{} is not numeric", self.name(id), name)))?,
        };
        let v = attr.clamp(raw);
        Ok(match attr.value {
            AttrValue::Bool(_) => {
                if to_bool(v) {
                    1.0
                } else {
                    0.0
                }
            }
            AttrValue::Int(_) => v.trunc(),
            _ => v,
        })
    }

    /// Find an attribute on a node or any of its (instanced) shapes.
    pub fn find_attr(&self, id: NodeId, name: &str) -> Option<Plug> {
        if self.has_attr(id, name) && name != VISIBILITY_ATTR {
            return Some(Plug::new(id, name));
        }
        let node = self.node(id).ok()?;
        self.shapes(id)
            .into_iter()
            .chain(node.instanced_shapes.iter().copied())
            .find(|s| self.has_attr(*s, name))
            .map(|s| Plug::new(s, name))
    }

    /// Evaluated visibility of a node itself.
    pub fn is_visible(&self, id: NodeId) -> Result<bool> {
        self.get_attr_bool(id, VISIBILITY_ATTR)
    }

    /// Visible and every ancestor visible.
    pub fn is_displayed(&self, id: NodeId) -> Result<bool> {
        if !self.is_visible(id)? {
            return Ok(false);
        }
        for a in self.ancestors(id) {
            if !self.is_visible(a)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Instance a shape under another transform.
    pub fn instance_shape(&mut self, shape: NodeId, under: NodeId) -> Result<()> {
        if !self.node(shape)?.kind.is_shape() {
            return Err(Error::config(format!("{} is not a shape", self.name(shape))));
        }
        let node = self.node_mut(under)?;
        if !node.instanced_shapes.contains(&shape) {
            node.instanced_shapes.push(shape);
        }
        Ok(())
    }

    // ========================================================================
    // Links and sets
    // ========================================================================

    /// Add a link. Adding the same link twice is a no-op.
    pub fn add_link(&mut self, kind: LinkKind, from: NodeId, to: NodeId) -> Result<()> {
        self.node(from)?;
        self.node(to)?;
        let link = Link { kind, from, to };
        if !self.links.contains(&link) {
            self.links.push(link);
        }
        Ok(())
    }

    /// Remove a link. Returns whether it existed.
    pub fn remove_link(&mut self, kind: LinkKind, from: NodeId, to: NodeId) -> bool {
        let before = self.links.len();
        self.links.retain(|l| *l != Link { kind, from, to });
        self.links.len() != before
    }

    /// Link targets of `from`, in insertion order.
    pub fn links_from(&self, kind: LinkKind, from: NodeId) -> Vec<NodeId> {
        self.links.iter().filter(|l| l.kind == kind && l.from == from).map(|l| l.to).collect()
    }

    /// Link sources pointing at `to`, in insertion order.
    pub fn links_to(&self, kind: LinkKind, to: NodeId) -> Vec<NodeId> {
        self.links.iter().filter(|l| l.kind == kind && l.to == to).map(|l| l.from).collect()
    }

    pub fn create_set(&mut self, name: &str) -> Result<NodeId> {
        self.create_node(name, NodeKind::ObjectSet(SetData::default()), None)
    }

    pub fn add_to_set(&mut self, set: NodeId, members: &[NodeId]) -> Result<()> {
        for m in members {
            self.node(*m)?;
        }
        let set_name = self.name(set).to_string();
        match &mut self.node_mut(set)?.kind {
            NodeKind::ObjectSet(data) => {
                for m in members {
                    if !data.members.contains(m) {
                        data.members.push(*m);
                    }
                }
                Ok(())
            }
            _ => Err(Error::config(format!("{set_name} is not an object set"))),
        }
    }

    pub fn set_members(&self, set: NodeId) -> Result<Vec<NodeId>> {
        match &self.node(set)?.kind {
            NodeKind::ObjectSet(data) => Ok(data.members.clone()),
            _ => Err(Error::config(format!("{} is not an object set", self.name(set)))),
        }
    }

    /// Sets that directly contain `member`.
    pub fn sets_containing(&self, member: NodeId) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, n)| matches!(&n.kind, NodeKind::ObjectSet(d) if d.members.contains(&member)))
            .map(|(id, _)| id)
            .collect()
    }

    // ========================================================================
    // Debug output
    // ========================================================================

    /// Indented DAG listing.
    pub fn format_tree(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            self.format_node(root, 0, &mut out);
        }
        out
    }

    fn format_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let Ok(node) = self.node(id) else { return };
        let _ = writeln!(out, "{:indent$}{} ({})", "", node.name, node.kind.type_name(), indent = depth * 2);
        for &c in &node.children {
            self.format_node(c, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec_approx_eq;

    #[test]
    fn test_duplicate_names() {
        let mut scene = Scene::new();
        scene.create_transform("a", None).expect("a");
        assert!(matches!(scene.create_transform("a", None), Err(Error::DuplicateName(_))));
        assert_eq!(scene.unique_name("a"), "a1");
    }

    #[test]
    fn test_world_and_reparent() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        let b = scene.create_transform("b", None).expect("b");
        scene.set_translate(a, Vector::new(1.0, 0.0, 0.0)).expect("t");
        scene.set_translate(b, Vector::new(0.0, 2.0, 0.0)).expect("t");
        scene.set_parent(b, Some(a), true).expect("parent");
        assert!(vec_approx_eq(scene.translate(b).expect("t"), Vector::new(-1.0, 2.0, 0.0), 1e-12));
        assert!(vec_approx_eq(scene.world_position(b).expect("w"), Vector::new(0.0, 2.0, 0.0), 1e-12));
        assert!(scene.set_parent(a, Some(b), false).is_err());
    }

    #[test]
    fn test_locks() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        scene.lock(a, Channels::TRANSLATE).expect("lock");
        assert!(matches!(scene.set_translate(a, Vector::X), Err(Error::Locked(_))));
        scene
            .set_world_matrix(a, Transform::from_translation(Vector::X))
            .expect("locked channels are skipped");
        assert_eq!(scene.translate(a).expect("t"), Vector::ZERO);
    }

    #[test]
    fn test_locked_rotate_axes_are_kept() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        scene.lock(a, Channels::RX | Channels::RY).expect("lock");
        let world = Transform::from_euler_xyz(Vector::new(30.0, 0.0, 45.0));
        scene.set_world_matrix(a, world).expect("world");
        let e = scene.rotate_euler(a).expect("euler");
        assert!(vec_approx_eq(e, Vector::new(0.0, 0.0, 45.0), 1e-6));
    }

    #[test]
    fn test_connections() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        let b = scene.create_transform("b", None).expect("b");
        let blend = scene.add_attr(a, "blend", Attr::float(0.0).with_range(0.0, 1.0)).expect("attr");
        scene.connect(&blend, &Plug::new(b, "v"), PlugOp::Add(0.5)).expect("connect");
        assert!(!scene.is_visible(b).expect("v"));
        scene.set_attr(a, "blend", 0.5).expect("set");
        assert!(scene.is_visible(b).expect("v"));
        scene.set_attr(a, "blend", 7.0).expect("set");
        assert_eq!(scene.get_attr_f64(a, "blend").expect("get"), 1.0);
        assert!(scene.set_attr(b, "v", true).is_err());
    }

    #[test]
    fn test_delete_cleans_up() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        let b = scene.create_transform("b", Some(a)).expect("b");
        let c = scene.create_transform("c", None).expect("c");
        let cns = scene.parent_constraint(&[b], c, ConstraintOptions::offset()).expect("cns");
        scene.add_link(LinkKind::PickParent, c, b).expect("link");
        let set = scene.create_set("s").expect("set");
        scene.add_to_set(set, &[b, c]).expect("members");

        scene.delete(a).expect("delete");
        assert!(!scene.exists("a") && !scene.exists("b"));
        assert!(!scene.contains(cns));
        assert!(scene.links_from(LinkKind::PickParent, c).is_empty());
        assert_eq!(scene.set_members(set).expect("members"), vec![c]);
        assert!(scene.node(c).expect("c").constraints.is_empty());
    }

    #[test]
    fn test_links_idempotent() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        let b = scene.create_transform("b", None).expect("b");
        scene.add_link(LinkKind::Snap, a, b).expect("link");
        scene.add_link(LinkKind::Snap, a, b).expect("link");
        assert_eq!(scene.links_from(LinkKind::Snap, a), vec![b]);
        assert_eq!(scene.links_to(LinkKind::Snap, b), vec![a]);
        assert!(scene.remove_link(LinkKind::Snap, a, b));
        assert!(!scene.remove_link(LinkKind::Snap, a, b));
        assert!(scene.links_from(LinkKind::Snap, a).is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        let b = scene.create_transform("b", None).expect("b");
        scene.point_constraint(&[a], b, ConstraintOptions::snap()).expect("cns");
        scene.point_constraint(&[b], a, ConstraintOptions::snap()).expect("cns");
        assert!(matches!(scene.world_matrix(a), Err(Error::Cycle(_))));
    }
}
