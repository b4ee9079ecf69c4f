//! Pieces shared by the controller library and the simulator binary:
//! the two-phase register type, byte-lane masks and command line options.

pub mod cli;
pub mod reg;
pub mod util;

pub use reg::{Commit, Reg};
