// Per-workflow processing stages: condensing raw error logs, aggregating
// telemetry into documents, extracting classifier features, labeling.

pub mod aggregator;
pub mod condenser;
pub mod document;
pub mod features;
pub mod labels;
