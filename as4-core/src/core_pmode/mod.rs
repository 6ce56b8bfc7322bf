//! Processing mode and partition channel resolution

pub mod mpc;
pub mod pmode;
pub mod resolver;

pub use mpc::{Mpc, MPC_OBJECT_TYPE};
pub use pmode::{MepBinding, PMode, PModeRetry, PModeSecurity};
pub use resolver::{LookupError, MpcRegistry, MpcResolver, PModeRegistry, PModeResolver};
