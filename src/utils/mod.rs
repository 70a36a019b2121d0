// Utility modules for workflowmonit

pub mod common;
pub mod metrics;
