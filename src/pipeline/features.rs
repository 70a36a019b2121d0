use std::collections::BTreeMap;

use crate::data_model::WorkflowDocument;

/// Number of features in the extraction contract. The order of
/// [`FeatureVector::NAMES`] is part of the contract and must not change
/// without retraining downstream models.
pub const FEATURE_COUNT: usize = 19;

/// One extracted feature row. Missing inputs are encoded as sentinels:
/// `-1` (or `-1.0`) for absent aggregates, `NaN` for an unknown running
/// time.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub const NAMES: [&'static str; FEATURE_COUNT] = [
        "failureRate",
        "totalError",
        "sites_siteCounts",
        "type",
        "sites_errorPerSite_max",
        "sites_errorPerSite_min",
        "sites_errorPerSite_median",
        "sites_errorPerSite_mean",
        "sites_errorPerSite_stdDev",
        "errorCode_primary_multiplicity",
        "errorCode_primary_leadingCode",
        "errorCode_primary_leadingRatio",
        "errorCode_secondary_multiplicity",
        "errorCode_secondary_leadingCode",
        "errorCode_secondary_leadingRatio",
        "errorKeywords_multiplicity",
        "errorKeywords_leading",
        "errorKeywords_leadingRatio",
        "time_sinceOpenInHour",
    ];
}

/// Keywords contain buzzwords like error(s), failure(s), failed by
/// construction; those and separator chars are stripped before encoding.
const KEYWORD_NOISE: [&str; 8] = [
    "-", "_", "errors", "error", "failures", "failure", "failed", "fail",
];

/// Signature words, each weighted by 1000 times its 1-based position.
/// A keyword without any of them encodes as its residual length, which
/// stays below the first weight band.
const SIGNATURE_WORDS: [&str; 13] = [
    "step",
    "submit",
    "report",
    "job",
    "log",
    "rss",
    "assert",
    "performance",
    "fileopen",
    "hlt",
    "reco",
    "script",
    "event",
];

fn site_error_totals(doc: &WorkflowDocument) -> BTreeMap<&str, i64> {
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for task in &doc.tasks {
        for se in &task.site_errors {
            *totals.entry(se.site.as_str()).or_insert(0) += se.counts;
        }
    }
    totals
}

fn primary_code_totals(doc: &WorkflowDocument) -> BTreeMap<i64, i64> {
    let mut totals: BTreeMap<i64, i64> = BTreeMap::new();
    for task in &doc.tasks {
        for err in &task.errors {
            *totals.entry(err.error_code).or_insert(0) += err.counts;
        }
    }
    totals
}

fn secondary_code_totals(doc: &WorkflowDocument) -> BTreeMap<i64, i64> {
    let mut totals: BTreeMap<i64, i64> = BTreeMap::new();
    for task in &doc.tasks {
        for err in &task.errors {
            for code in &err.secondary_error_codes {
                *totals.entry(*code).or_insert(0) += err.counts;
            }
        }
    }
    totals
}

fn keyword_totals(doc: &WorkflowDocument) -> BTreeMap<&str, i64> {
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for task in &doc.tasks {
        for err in &task.errors {
            for kw in &err.error_keywords {
                *totals.entry(kw.as_str()).or_insert(0) += err.counts;
            }
        }
    }
    totals
}

/// Entry with the highest total; ties break toward the smaller key, which
/// is the iteration order of the sorted map.
fn leading<K: Copy + Ord>(totals: &BTreeMap<K, i64>) -> Option<(K, i64)> {
    let mut best: Option<(K, i64)> = None;
    for (key, count) in totals {
        match best {
            Some((_, best_count)) if *count <= best_count => {}
            _ => best = Some((*key, *count)),
        }
    }
    best
}

fn leading_ratio<K: Copy + Ord>(totals: &BTreeMap<K, i64>) -> f64 {
    match leading(totals) {
        Some((_, top)) => {
            let sum: i64 = totals.values().sum();
            top as f64 / sum as f64
        }
        None => -1.0,
    }
}

fn encode_type(wf_type: Option<&str>) -> f64 {
    match wf_type {
        Some("TaskChain") => 0.0,
        Some("ReReco") => 1.0,
        Some("StepChain") => 2.0,
        _ => -1.0,
    }
}

/// Rule-based numeric encoding of the leading error keyword: strip noise
/// words, add 1000 * w for every signature word present (removing it),
/// then add the residual length.
fn encode_keyword(keyword: &str) -> f64 {
    let mut residual = keyword.to_lowercase();
    for noise in KEYWORD_NOISE {
        residual = residual.replace(noise, "");
    }

    let mut total: i64 = 0;
    for (w, sig) in SIGNATURE_WORDS.iter().enumerate() {
        if residual.contains(sig) {
            total += 1000 * (w as i64 + 1);
            residual = residual.replace(sig, "");
        }
    }
    total += residual.chars().count() as i64;
    total as f64
}

fn median(sorted: &[i64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    }
}

fn sample_std_dev(values: &[i64], mean: f64) -> f64 {
    let n = values.len();
    let var: f64 = values
        .iter()
        .map(|v| {
            let d = *v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / (n as f64 - 1.0);
    var.sqrt()
}

/// Hours since the workflow first entered `running-open`, `NaN` when that
/// transition never happened.
pub fn time_since_open_hours(doc: &WorkflowDocument, now: i64) -> f64 {
    doc.transitions
        .iter()
        .find(|t| t.status == "running-open")
        .map(|t| t.update_time)
        .filter(|opened| *opened != 0)
        .map(|opened| (now - opened) as f64 / 3600.0)
        .unwrap_or(f64::NAN)
}

/// Extracts the fixed feature row from one workflow document. Deterministic
/// for a given document and `now`.
pub fn extract(doc: &WorkflowDocument, now: i64) -> FeatureVector {
    let site_totals = site_error_totals(doc);
    let mut per_site: Vec<i64> = site_totals.values().copied().collect();
    per_site.sort_unstable();

    let (site_max, site_min, site_median, site_mean) = if per_site.is_empty() {
        (-1.0, -1.0, -1.0, -1.0)
    } else {
        let sum: i64 = per_site.iter().sum();
        (
            *per_site.last().unwrap_or(&0) as f64,
            per_site[0] as f64,
            median(&per_site),
            sum as f64 / per_site.len() as f64,
        )
    };
    let site_std = if per_site.len() > 1 {
        let mean = per_site.iter().sum::<i64>() as f64 / per_site.len() as f64;
        sample_std_dev(&per_site, mean)
    } else {
        -1.0
    };

    let primary = primary_code_totals(doc);
    let secondary = secondary_code_totals(doc);
    let keywords = keyword_totals(doc);

    let primary_leading = leading(&primary).map(|(code, _)| code as f64).unwrap_or(-1.0);
    let secondary_leading = leading(&secondary)
        .map(|(code, _)| code as f64)
        .unwrap_or(-1.0);
    // An absent leading keyword encodes as the empty string, weight 0.
    let keyword_leading = leading(&keywords).map(|(kw, _)| kw).unwrap_or("");

    FeatureVector {
        values: [
            doc.failure_rate,
            doc.total_error as f64,
            site_totals.len() as f64,
            encode_type(doc.wf_type.as_deref()),
            site_max,
            site_min,
            site_median,
            site_mean,
            site_std,
            primary.len() as f64,
            primary_leading,
            leading_ratio(&primary),
            secondary.len() as f64,
            secondary_leading,
            leading_ratio(&secondary),
            keywords.len() as f64,
            encode_keyword(keyword_leading),
            leading_ratio(&keywords),
            time_since_open_hours(doc, now),
        ],
    }
}
