// tests/aggregator_test.rs

use std::collections::BTreeMap;

use workflowmonit::pipeline::aggregator::ErrorAggregator;
use workflowmonit::pipeline::condenser::LogCondenser;
use workflowmonit::telemetry::{
    ErrorCell, FlatErrorCounts, JobDetail, LogSample, SiteErrorDetail, StepErrors, NOT_REPORTED,
};

fn cell(error_type: &str, exit_code: i64, details: &str) -> ErrorCell {
    ErrorCell {
        error_type: error_type.to_string(),
        exit_code,
        details: details.to_string(),
    }
}

fn sample(timestamp: i64, cells: Vec<ErrorCell>) -> LogSample {
    let mut errors = BTreeMap::new();
    errors.insert("details".to_string(), cells);
    LogSample { timestamp, errors }
}

fn jobdetail_with(
    task: &str,
    code: &str,
    site: &str,
    samples: Vec<LogSample>,
    error_count: i64,
) -> JobDetail {
    let mut sites = BTreeMap::new();
    sites.insert(
        site.to_string(),
        SiteErrorDetail {
            samples,
            error_count,
        },
    );
    let mut jobfailed = BTreeMap::new();
    jobfailed.insert(code.to_string(), sites);
    let mut detail = JobDetail::new();
    detail.insert(
        task.to_string(),
        StepErrors {
            jobfailed,
            submitfailed: BTreeMap::new(),
        },
    );
    detail
}

fn flat_with(task: &str, code: &str, site: &str, counts: i64) -> FlatErrorCounts {
    let mut sites = BTreeMap::new();
    sites.insert(site.to_string(), counts);
    let mut codes = BTreeMap::new();
    codes.insert(code.to_string(), sites);
    let mut flat = FlatErrorCounts::new();
    flat.insert(task.to_string(), codes);
    flat
}

#[test]
fn flat_summary_is_authoritative_for_existence() {
    let aggregator = ErrorAggregator::new(LogCondenser::default());

    // The nested tree knows about a (code, site) pair the flat summary
    // does not carry; it must not surface.
    let jobdetail = jobdetail_with(
        "/wf/TaskA",
        "8021",
        "T2_US_MIT",
        vec![sample(1, vec![cell("Fatal Exception", 8021, "boom")])],
        7,
    );
    let flat = flat_with("/wf/TaskA", "99109", "T1_DE_KIT", 3);

    let merged = aggregator.aggregate(&jobdetail, &flat);
    let entry = &merged["TaskA"];
    assert_eq!(entry.errors.len(), 1);
    assert_eq!(entry.errors[0].error_code, 99109);
    assert_eq!(entry.errors[0].site_name, "T1_DE_KIT");
    assert!(entry.errors[0].error_chain.is_empty());
}

#[test]
fn zero_counts_and_code_zero_are_skipped() {
    let aggregator = ErrorAggregator::new(LogCondenser::default());

    let jobdetail = jobdetail_with(
        "/wf/TaskA",
        "0",
        "T2_US_MIT",
        vec![sample(1, vec![cell("StepSuccess", 0, "fine")])],
        4,
    );
    let mut flat = flat_with("/wf/TaskA", "8021", "T2_US_MIT", 0);
    flat.get_mut("/wf/TaskA")
        .unwrap()
        .get_mut("8021")
        .unwrap()
        .insert("T1_DE_KIT".to_string(), 5);

    let merged = aggregator.aggregate(&jobdetail, &flat);
    let entry = &merged["TaskA"];
    // The zero-count site row vanished, code "0" contributed nothing.
    assert_eq!(entry.errors.len(), 1);
    assert_eq!(entry.errors[0].site_name, "T1_DE_KIT");
    assert_eq!(entry.errors[0].counts, 5);
}

#[test]
fn not_reported_pseudo_code_becomes_site_list() {
    let aggregator = ErrorAggregator::new(LogCondenser::default());

    let mut flat = flat_with("/wf/TaskA", "8021", "T2_US_MIT", 2);
    let mut nr_sites = BTreeMap::new();
    nr_sites.insert("T3_US_OSG".to_string(), 0);
    flat.get_mut("/wf/TaskA")
        .unwrap()
        .insert(NOT_REPORTED.to_string(), nr_sites);

    let merged = aggregator.aggregate(&JobDetail::new(), &flat);
    let entry = &merged["TaskA"];
    assert_eq!(entry.site_not_reported, vec!["T3_US_OSG".to_string()]);
    assert_eq!(entry.errors.len(), 1);
}

#[test]
fn secondary_codes_exclude_the_enclosing_code() {
    let aggregator = ErrorAggregator::new(LogCondenser::default());

    let jobdetail = jobdetail_with(
        "/wf/TaskA",
        "8021",
        "T2_US_MIT",
        vec![sample(
            1,
            vec![
                cell("Fatal Exception", 8021, "primary failure"),
                cell("PerformanceKill", 50664, "exceeded time"),
            ],
        )],
        9,
    );
    let flat = flat_with("/wf/TaskA", "8021", "T2_US_MIT", 9);

    let merged = aggregator.aggregate(&jobdetail, &flat);
    let entry = &merged["TaskA"].errors[0];
    assert!(entry.secondary_error_codes.contains(&50664));
    assert!(!entry.secondary_error_codes.contains(&8021));
    assert_eq!(entry.error_chain.len(), 2);
}

#[test]
fn duplicate_cells_collapse_within_a_sample() {
    let aggregator = ErrorAggregator::new(LogCondenser::default());

    let duplicated = cell("Fatal Exception", 8021, "same text");
    let jobdetail = jobdetail_with(
        "/wf/TaskA",
        "8021",
        "T2_US_MIT",
        vec![sample(1, vec![duplicated.clone(), duplicated])],
        3,
    );
    let flat = flat_with("/wf/TaskA", "8021", "T2_US_MIT", 3);

    let merged = aggregator.aggregate(&jobdetail, &flat);
    assert_eq!(merged["TaskA"].errors[0].error_chain.len(), 1);
}

#[test]
fn enrichment_uses_the_last_sample() {
    let aggregator = ErrorAggregator::new(LogCondenser::default());

    let jobdetail = jobdetail_with(
        "/wf/TaskA",
        "8021",
        "T2_US_MIT",
        vec![
            sample(1, vec![cell("Fatal Exception", 134, "first observation")]),
            sample(2, vec![cell("Fatal Exception", 50115, "second observation")]),
        ],
        6,
    );
    let flat = flat_with("/wf/TaskA", "8021", "T2_US_MIT", 6);

    let merged = aggregator.aggregate(&jobdetail, &flat);
    let entry = &merged["TaskA"].errors[0];
    assert!(entry.secondary_error_codes.contains(&50115));
    assert!(!entry.secondary_error_codes.contains(&134));
    assert_eq!(entry.error_chain[0].description, "second observation");
}
