pub mod boundary;
pub mod elevation;
pub mod loader;
pub mod params;
pub mod validity;

pub use boundary::BoundaryTracker;
pub use elevation::ElevationTable;
pub use loader::load_beam;
pub use params::{FieldParams, ParamSynchronizer, ParameterBlock};
pub use validity::Rejection;
