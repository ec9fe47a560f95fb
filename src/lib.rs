//! Infrastructure definitions for alcf_ceilometer: per-environment
//! configuration consolidation, the application stack, the delivery
//! pipeline and access to deployed stack outputs.

pub mod config;
pub mod git;
pub mod merge;
pub mod outputs;
pub mod stacks;
pub mod writer;
