//! Pins: the hooks a limb receives its parent and world spaces through.

use tracing::{debug, info};

use crate::ctrl;
use crate::joint;
use crate::name;
use crate::scene::{Attr, ConstraintKind, ConstraintOptions, LinkKind, NodeId, Scene};
use crate::util::{Error, Result};

use super::{BuildContext, Limb};

/// What a limb is attached to.
#[derive(Clone, Copy, Debug)]
pub enum Driver<'a> {
    /// Another limb; resolves to its end joint, start joint or end control.
    Limb(&'a Limb),
    Node(NodeId),
}

impl Limb {
    fn add_pin(&self, ctx: &mut BuildContext<'_>, desc: &str) -> Result<NodeId> {
        let limb_node = self.require(self.limb_node, "limb node")?;
        let pin = ctx.scene.create_transform(&self.node_name(desc)?, Some(limb_node))?;
        if let Some(start) = self.start {
            let world = ctx.scene.world_matrix(start)?;
            ctx.scene.set_world_matrix(pin, world)?;
        }
        Ok(pin)
    }

    /// Transform receiving the incoming local parent, placed on the start joint.
    pub fn add_pin_parent(&mut self, ctx: &mut BuildContext<'_>) -> Result<NodeId> {
        debug!("adding pin parent");
        let pin = self.add_pin(ctx, name::PIN_PARENT)?;
        self.pin_parent = Some(pin);
        Ok(pin)
    }

    /// Transform receiving the incoming world space, placed on the start joint.
    pub fn add_pin_world(&mut self, ctx: &mut BuildContext<'_>) -> Result<NodeId> {
        debug!("adding pin world");
        let pin = self.add_pin(ctx, name::PIN_WORLD)?;
        self.pin_world = Some(pin);
        Ok(pin)
    }

    /// Pin parent and pin world plus a `pinBlend` transform that follows the
    /// pin parent's position and blends its orientation between the two by
    /// the `localWorldBlend` limb attribute.
    pub fn add_pin_blend(&mut self, ctx: &mut BuildContext<'_>) -> Result<NodeId> {
        debug!("adding pin blend");
        let blend = self.add_attr_limb(
            ctx.scene,
            name::LIMB_BLEND_ATTR,
            Attr::float(0.0).with_range(0.0, 1.0).keyable(true),
        )?;
        let pin_parent = self.add_pin_parent(ctx)?;
        let pin_world = self.add_pin_world(ctx)?;
        let pin_blend = self.add_pin(ctx, name::PIN_BLEND)?;

        let scene = &mut *ctx.scene;
        scene.parent_constraint(&[pin_parent], pin_blend, ConstraintOptions::snap().skip_rotate())?;
        scene.blend_constraint(
            ConstraintKind::Orient,
            pin_parent,
            pin_world,
            pin_blend,
            &blend,
            ConstraintOptions::offset(),
        )?;
        scene.set_parent(pin_parent, Some(pin_world), true)?;
        self.pin_blend = Some(pin_blend);
        Ok(pin_blend)
    }

    /// Parent-constrain the pin parent to `driver`, keeping the current
    /// offset, and add a pick-walk edge from this limb's start control to the
    /// control driving the driver, when there is one.
    pub fn attach_local(&self, scene: &mut Scene, driver: Driver<'_>) -> Result<()> {
        let pin = self
            .pin_parent
            .ok_or_else(|| Error::config(format!("{self}: cannot constrain, pinParent not found")))?;
        let target = resolve_driver(scene, driver)?;
        info!("wiring {self} pinParent to {}", scene.name(target));
        scene.parent_constraint(&[target], pin, ConstraintOptions::offset())?;

        let Some(start_ctrl) = self.start_ctrl else {
            debug!("{self} has no start ctrl, skipping pick-walk");
            return Ok(());
        };
        let parent_ctrl = match driver {
            Driver::Limb(other) => other.end_ctrl,
            Driver::Node(node) if ctrl::is_ctrl(scene, node) => Some(node),
            Driver::Node(node) => joint::ctrl_from_joint(scene, node),
        };
        match parent_ctrl {
            Some(p) => {
                debug!("pick-walk {} -> {}", scene.name(start_ctrl), scene.name(p));
                scene.add_link(LinkKind::PickParent, start_ctrl, p)?;
            }
            None => debug!("no pick parent found on {}, skipping", scene.name(target)),
        }
        Ok(())
    }

    /// Parent-constrain the pin world to `driver`, keeping the current offset.
    pub fn attach_world(&self, scene: &mut Scene, driver: Driver<'_>) -> Result<()> {
        let pin = self
            .pin_world
            .ok_or_else(|| Error::config(format!("{self}: cannot constrain, pinWorld not found")))?;
        let target = resolve_driver(scene, driver)?;
        info!("wiring {self} pinWorld to {}", scene.name(target));
        scene.parent_constraint(&[target], pin, ConstraintOptions::offset())?;
        Ok(())
    }
}

fn resolve_driver(scene: &Scene, driver: Driver<'_>) -> Result<NodeId> {
    let node = match driver {
        Driver::Limb(limb) => limb
            .end
            .or(limb.start)
            .or(limb.end_ctrl)
            .ok_or_else(|| Error::config(format!("{limb} has no joint or control to attach to")))?,
        Driver::Node(node) => node,
    };
    scene.node(node)?;
    Ok(node)
}
