pub mod constraint;
pub mod dist;

pub use constraint::{ConstraintList, ConstraintOp, NameConstraint};
pub use dist::{split_name_version, DistInfo};
