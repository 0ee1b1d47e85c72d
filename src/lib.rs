//! # rigkit
//!
//! Procedural character rigging on an in-memory scene graph.
//!
//! A rig is described as a short build script: import a skeleton, add
//! modular limbs on joint ranges, wire limbs to each other. The toolkit
//! builds the network of transforms, constraints, IK solvers, blend weights
//! and animation controls, and evaluates it on demand.
//!
//! ## Modules
//!
//! - [`util`] - Errors and vector/transform math
//! - [`name`] - `Part_Loc_Desc` naming and mirroring
//! - [`scene`] - Scene graph: nodes, attributes, constraints, IK, import
//! - [`joint`] - Joint chain navigation
//! - [`ctrl`] - Animation controls
//! - [`appearance`] - Saving and loading control shapes and colors
//! - [`limb`] - Limb lifecycle, chain builders and the limb catalog
//! - [`rig`] - Rig assembly and animator tools
//! - [`script`] - Declarative JSON build scripts
//!
//! ## Example
//!
//! ```
//! use rigkit::prelude::*;
//!
//! let mut rig = Rig::new(RigConfig::named("Prop"));
//! rig.create(&|rig: &mut Rig| -> rigkit::Result<()> {
//!     let j = rig.scene.create_joint("prop", rig.skel_group)?;
//!     let limb = Limb::new(Name::new("Prop", Location::Mid, "01"), LimbKind::FkChain).joints("prop", Some("prop"));
//!     rig.add_limb(limb)?;
//!     rig.scene.set_translate(j, Vector::new(0.0, 1.0, 0.0))
//! })?;
//! println!("{}", rig.scene.format_tree());
//! # Ok::<(), rigkit::Error>(())
//! ```

pub mod util;
pub mod name;
pub mod scene;
pub mod joint;
pub mod ctrl;
pub mod appearance;
pub mod limb;
pub mod rig;
pub mod script;

// Re-export commonly used types
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result, Transform, Vector};
    pub use crate::name::{Location, Mirror, Name};
    pub use crate::scene::{NodeId, Scene};
    pub use crate::limb::{BuildContext, Limb, LimbKind};
    pub use crate::rig::{AttachTo, BuildScript, Rig, RigConfig};
    pub use crate::script::RigScript;
}
