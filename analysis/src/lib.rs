//! This crate contains a set of helpers to build static analysis
//! tools based on abstract interpretation. The building blocks
//! include the traits and iteration utilities for control flow
//! graphs, the lattice traits with a curated set of implementations
//! (most prominently the flat lattice of constants used by constant
//! propagation), a monotone fixpoint solver, and common analyses
//! like dominator calculations that only depend on the shape of the
//! graph.
//!
//! Look at the dex-lib crate for a control flow graph built from a
//! linear instruction stream on top of these helpers.

/// Collection of commonly used analyses like dominator sets and
/// immediate dominators. These are independent of the actual
/// operations, only based on the shape of the control flow graph.
pub mod analyses;

/// Traits for defining control flow graphs with typed edges, and
/// algorithms and data structures to make it easier to work with
/// them.
pub mod cfg;

/// A curated collection of semi-lattices and lattices, including
/// transformers to build larger lattices from smaller ones.
pub mod domains;

/// Implementations of fixed-point iteration algorithms using
/// worklists.
pub mod solvers;
