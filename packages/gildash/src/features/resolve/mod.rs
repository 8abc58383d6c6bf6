//! Relation-walking resolvers: re-export chains and heritage trees.

pub mod heritage;
pub mod reexport;
