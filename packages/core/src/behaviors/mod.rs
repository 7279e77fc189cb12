//! Tree Node Behavior
//!
//! This module provides the lifecycle rules a tree node follows when it is
//! persisted:
//!
//! - `TreeBehavior` trait - Hooks deciding when paths are assigned, when cycle
//!   detection runs and when a subtree is rebuilt
//! - `DefaultTreeBehavior` - The standard rules
//! - Path computation and circular reference checks shared by the service
//!
//! The tree service drives the pipeline (validate, detect cycle, persist,
//! rebuild subtree); behaviors only decide and compute.

mod tree_behavior;

pub use tree_behavior::{
    build_path, has_circular_reference, path_assignment, DefaultTreeBehavior, PathAssignment,
    TreeBehavior,
};
