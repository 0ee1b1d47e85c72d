//! Demand-driven evaluation of world matrices.
//!
//! A node's world matrix is its channel matrix composed with its parent's world,
//! then overridden by its constraints in creation order, then (for joints inside
//! an IK chain) blended toward the solved rotation. Results are memoised until
//! the next scene mutation.

use std::collections::HashMap;

use crate::util::{blend_rotations, DQuat, Error, Result, Transform, Vector, DEGENERATE_EPSILON};

use super::constraint::{ConstraintData, ConstraintKind};
use super::ik::{solve_aim, solve_rotate_plane, IkSolver, IK_BLEND_ATTR};
use super::node::{NodeId, NodeKind};
use super::Scene;

pub(crate) struct Evaluator<'a> {
    scene: &'a Scene,
    cache: &'a mut HashMap<NodeId, Transform>,
    pre_ik: HashMap<NodeId, Transform>,
    solved: HashMap<NodeId, Vec<(NodeId, DQuat)>>,
    stack: Vec<NodeId>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(scene: &'a Scene, cache: &'a mut HashMap<NodeId, Transform>) -> Self {
        Self {
            scene,
            cache,
            pre_ik: HashMap::new(),
            solved: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Final world matrix of a node.
    pub(crate) fn world(&mut self, id: NodeId) -> Result<Transform> {
        if let Some(w) = self.cache.get(&id) {
            return Ok(*w);
        }
        if self.stack.contains(&id) {
            return Err(Error::Cycle(self.scene.name(id).to_string()));
        }
        self.stack.push(id);
        let result = self.compute_world(id);
        self.stack.pop();
        let w = result?;
        self.cache.insert(id, w);
        Ok(w)
    }

    fn compute_world(&mut self, id: NodeId) -> Result<Transform> {
        let pre = self.pre_ik_world(id)?;
        if !self.scene.node(id)?.is_joint() {
            return Ok(pre);
        }

        let mut rotation = pre.rotation();
        for handle in self.scene.ik_handles_on(id) {
            let blend = self.scene.get_attr_f64(handle, IK_BLEND_ATTR)?.clamp(0.0, 1.0);
            if blend <= 0.0 {
                continue;
            }
            let solution = self.solve(handle)?;
            if let Some((_, ik_rot)) = solution.iter().find(|(j, _)| *j == id) {
                rotation = rotation.slerp(*ik_rot, blend);
            }
        }
        Ok(Transform::from_scale(pre.scale()) * Transform::from_rotation_translation(rotation, pre.translation()))
    }

    /// World matrix before IK blending: channels, parent and constraints.
    fn pre_ik_world(&mut self, id: NodeId) -> Result<Transform> {
        if let Some(w) = self.pre_ik.get(&id) {
            return Ok(*w);
        }
        let scene = self.scene;
        let node = scene.node(id)?;

        let parent_world = match node.parent {
            Some(p) if node.inherits_transform => self.world(p)?,
            _ => Transform::IDENTITY,
        };

        let mut rotate = node.rotate;
        for &input in &node.rotate_inputs {
            if let Ok(src) = scene.node(input) {
                rotate = src.rotate * rotate;
            }
        }
        let local = Transform::from_scale(node.scale)
            * Transform::from_quat(node.orient * rotate)
            * Transform::from_translation(node.translate);
        let mut world = local * parent_world;

        for &cns in &node.constraints {
            let data = match &scene.node(cns)?.kind {
                NodeKind::Constraint(d) => d,
                _ => continue,
            };
            if data.kind == ConstraintKind::PoleVector {
                continue;
            }
            if let Some((t, r)) = self.constraint_result(cns, data)? {
                world = apply_constraint(world, parent_world, data, t, r)?;
            }
        }

        self.pre_ik.insert(id, world);
        Ok(world)
    }

    /// Weighted world translation and rotation a constraint asks for.
    fn constraint_result(&mut self, cns: NodeId, data: &ConstraintData) -> Result<Option<(Vector, DQuat)>> {
        let mut weighted = Vec::with_capacity(data.targets.len());
        let mut total = 0.0;
        for (i, target) in data.targets.iter().enumerate() {
            let w = self.scene.get_attr_f64(cns, &format!("w{i}"))?.max(0.0);
            if w <= 0.0 {
                continue;
            }
            let frame = match data.kind {
                ConstraintKind::Strip => self.surface_frame(target.node, data.u)?,
                _ => self.world(target.node)?,
            };
            let (t, r) = match data.kind {
                ConstraintKind::Parent | ConstraintKind::Strip => {
                    let m = target.offset * frame.normalized();
                    (m.translation(), m.rotation())
                }
                ConstraintKind::Point => (frame.translation() + target.offset.translation(), DQuat::IDENTITY),
                ConstraintKind::Orient => (Vector::ZERO, frame.rotation() * target.offset.rotation()),
                ConstraintKind::PoleVector => (frame.translation(), DQuat::IDENTITY),
            };
            weighted.push((t, r, w));
            total += w;
        }
        if total < DEGENERATE_EPSILON {
            return Ok(None);
        }
        let t = weighted.iter().fold(Vector::ZERO, |acc, (t, _, w)| acc + *t * *w) / total;
        let rots: Vec<(DQuat, f64)> = weighted.iter().map(|(_, r, w)| (*r, *w / total)).collect();
        Ok(Some((t, blend_rotations(&rots))))
    }

    /// Frame on a strip surface: its drivers interpolated at `u`.
    pub(crate) fn surface_frame(&mut self, surface: NodeId, u: f64) -> Result<Transform> {
        let drivers = match &self.scene.node(surface)?.kind {
            NodeKind::Surface(s) => s.drivers.clone(),
            _ => return Err(Error::config(format!("{} is not a surface", self.scene.name(surface)))),
        };
        if drivers.is_empty() {
            return self.world(surface);
        }
        let span = (drivers.len() - 1) as f64;
        let x = u.clamp(0.0, 1.0) * span;
        let i = (x.floor() as usize).min(drivers.len().saturating_sub(2));
        let f = if drivers.len() == 1 { 0.0 } else { x - i as f64 };
        let a = self.world(drivers[i])?;
        let b = self.world(drivers[(i + 1).min(drivers.len() - 1)])?;
        let t = a.translation().lerp(b.translation(), f);
        let r = a.rotation().slerp(b.rotation(), f);
        Ok(Transform::from_rotation_translation(r, t))
    }

    /// Solved world rotations of a handle's joints, memoised per evaluation.
    fn solve(&mut self, handle: NodeId) -> Result<Vec<(NodeId, DQuat)>> {
        if let Some(s) = self.solved.get(&handle) {
            return Ok(s.clone());
        }
        let scene = self.scene;
        let data = scene.ik_handle(handle)?;
        let mut out = Vec::new();
        if data.is_solvable() {
            let goal = self.world(handle)?.translation();
            let start = self.pre_ik_world(data.joints[0])?.translation();
            let rest = &data.rest;
            match data.solver {
                IkSolver::RotatePlane => {
                    let pole = self.pole_position(handle)?;
                    let rots = solve_rotate_plane(&rest.positions, &rest.rotations, start, goal, pole);
                    out.extend(data.solved_joints().iter().copied().zip(rots));
                }
                IkSolver::SingleChain => {
                    let delta = match scene.parent(data.joints[0]) {
                        Some(p) => self.world(p)?.rotation() * rest.parent_rotation.inverse(),
                        None => DQuat::IDENTITY,
                    };
                    let rest_dir = rest.positions[1] - rest.positions[0];
                    out.push((data.joints[0], solve_aim(rest_dir, rest.rotations[0], delta, start, goal)));
                }
            }
        }
        self.solved.insert(handle, out.clone());
        Ok(out)
    }

    fn pole_position(&mut self, handle: NodeId) -> Result<Option<Vector>> {
        let scene = self.scene;
        for cns in scene.constraints_of(handle, ConstraintKind::PoleVector) {
            let data = scene.constraint(cns)?;
            if let Some((t, _)) = self.constraint_result(cns, data)? {
                return Ok(Some(t));
            }
        }
        Ok(None)
    }
}

/// Write a constraint's result into a world matrix, honoring skipped channels.
fn apply_constraint(
    world: Transform,
    parent_world: Transform,
    data: &ConstraintData,
    t: Vector,
    r: DQuat,
) -> Result<Transform> {
    let parent_inv = parent_world.inverse()?;
    let local = world * parent_inv;
    let mut translation = local.translation();
    let mut rotation = local.rotation();
    let scale = local.scale();

    if data.kind.drives_translation() {
        let wanted = parent_inv.transform_point(t);
        for axis in 0..3 {
            if !data.skip_translate[axis] {
                translation[axis] = wanted[axis];
            }
        }
    }
    if data.kind.drives_rotation() && !data.skip_rotate {
        rotation = parent_world.rotation().inverse() * r;
    }
    let local = Transform::from_scale(scale) * Transform::from_rotation_translation(rotation, translation);
    Ok(local * parent_world)
}
