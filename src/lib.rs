//! rotordyn - A native Rust rotordynamics finite element library
//!
//! Models flexible rotors as Timoshenko shaft elements carrying disks, gears,
//! bearings and magnetic bearings, and supports:
//! - Global M, K, C and G assembly with deterministic DOF numbering
//! - Static deflection with bearing reactions, undamped critical speed maps
//! - Modal analysis with whirl direction and mode classification
//! - Campbell diagrams with mode tracking across speeds
//! - Frequency and unbalance response
//! - Time integration (state space and Newmark with a per-step force callback)
//! - Active magnetic bearing control and rotor-stator rubbing
//! - Gear-coupled multi-rotor trains
//!
//! ## Example
//! ```rust
//! use rotordyn::prelude::*;
//!
//! let steel = Material::steel();
//! let rotor = Rotor::builder()
//!     .add_shafts((0..6).map(|_| ShaftElement::new(0.25, 0.0, 0.05, steel.clone())))
//!     .add_disk(DiskElement::from_geometry(2, &steel, 0.07, 0.05, 0.28))
//!     .add_disk(DiskElement::from_geometry(4, &steel, 0.07, 0.05, 0.35))
//!     .add_bearing(BearingElement::new(0, 1e6, 0.0))
//!     .add_bearing(BearingElement::new(6, 1e6, 0.0))
//!     .build()
//!     .unwrap();
//!
//! let modal = rotor.run_modal(0.0, &ModalOptions::new(4)).unwrap();
//! assert_eq!(modal.num_modes(), 4);
//! ```

pub mod analysis;
pub mod control;
pub mod dof;
pub mod elements;
pub mod error;
pub mod faults;
pub mod loads;
pub mod math;
pub mod multirotor;
pub mod results;
pub mod rotor;

// Re-export common types
pub mod prelude {
    pub use crate::analysis::{
        AmbControl, CampbellOptions, CancelToken, ConvergencePolicy, ModalOptions, NewmarkConfig,
        SpeedProfile, TimeMethod, TimeResponseOptions,
    };
    pub use crate::control::{AmbController, ControlLaw, ForceFn, RhsForce, StepState};
    pub use crate::elements::{
        AmbGains, BearingElement, Coefficient, CouplingElement, DiskElement, GearElement,
        MagneticBearingElement, Material, PointMass, ShaftElement,
    };
    pub use crate::error::{RotorError, RotorResult};
    pub use crate::faults::Rubbing;
    pub use crate::loads::{unbalance_force_over_time, Unbalance};
    pub use crate::multirotor::{GearMesh, MultiRotor};
    pub use crate::results::{
        CampbellResult, ForcedResponseResult, FrequencyResponseResult, ModalResult, ModeType,
        NodeDeflection, Orbit, StaticResult, SupportReaction, TimeResponseResult, UcsResult, Whirl,
    };
    pub use crate::rotor::{MagneticModel, Rotor, RotorSystem, Support};
}
