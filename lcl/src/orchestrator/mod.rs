//! The register and measure commands as explicit state sequences.
//!
//! Both run on the caller's task and await one collaborator at a time.
//! Every state entered is logged at debug level.

mod measure;
mod register;

pub use self::measure::{MeasureState, Measurer, PreparedReport};
pub use self::register::{RegisterState, Registrar};
