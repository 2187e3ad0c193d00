pub mod fitted;
pub mod structure;
pub mod topology;

pub use fitted::FittedTree;
pub use structure::{NodeStatus, StructureValues, TreePath};
pub use topology::TreeTopology;
