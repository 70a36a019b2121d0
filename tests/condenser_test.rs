// tests/condenser_test.rs

use workflowmonit::config::CondenserSettings;
use workflowmonit::pipeline::condenser::LogCondenser;

#[test]
fn single_line_logs_pass_through_trimmed() {
    let condenser = LogCondenser::default();
    assert_eq!(
        condenser.shorten("  Fatal exception in cmsRun  "),
        "Fatal exception in cmsRun"
    );
}

#[test]
fn shorten_keeps_buzzed_pieces_and_skips_ignored_ones() {
    let condenser = LogCondenser::default();
    let log = "Begin processing the 1st record\n\
               An exception occurred while running the job\n\
               Job has ended gracefully";

    // The first piece contains "begin", the last "end"; only the middle
    // piece carries a buzzword and survives.
    assert_eq!(
        condenser.shorten(log),
        "An exception occurred while running the job"
    );
}

#[test]
fn shorten_is_idempotent() {
    let condenser = LogCondenser::default();
    let log = "Begin step\nerror reading branch from input file\ntimeout on open";
    let once = condenser.shorten(log);
    assert_eq!(condenser.shorten(&once), once);
}

#[test]
fn repeated_buzzed_pieces_are_emitted_once_in_scan_order() {
    let condenser = LogCondenser::default();
    let log = "error reading input branch\n\
               timeout while opening file\n\
               error reading input branch";

    assert_eq!(
        condenser.shorten(log),
        "error reading input branch; timeout while opening file"
    );
}

#[test]
fn shorten_strips_markup_from_pieces() {
    let condenser = LogCondenser::default();
    let log = "something happened\n<b>fatal error</b> [stderr] while staging out the file";
    assert_eq!(condenser.shorten(log), "fatal error while staging out the file");
}

#[test]
fn shorten_falls_back_to_first_attention_piece() {
    let condenser = LogCondenser::default();
    // No buzzword anywhere; first non-ignored piece wins.
    let log = "step one finished late\nnothing else to report";
    assert_eq!(condenser.shorten(log), "step one finished late");
}

#[test]
fn keywords_keep_compounds_but_not_bare_buzzwords() {
    let condenser = LogCondenser::default();
    let kws = condenser.keywords("Fatal exception JobFailed TimeoutError error");

    // "JobFailed" contains "fail", "TimeoutError" contains a whitelist
    // word; the bare buzzwords "exception" and "error" are not keywords
    // themselves.
    assert!(kws.contains("JobFailed"));
    assert!(kws.contains("TimeoutError"));
    assert!(!kws.contains("exception"));
    assert!(!kws.contains("error"));
}

#[test]
fn keywords_respect_the_blacklist() {
    let settings = CondenserSettings {
        blacklist_words: vec!["JobFailed".to_string()],
        ..CondenserSettings::default()
    };
    let condenser = LogCondenser::new(settings);
    let kws = condenser.keywords("JobFailed TimeoutError");

    assert!(!kws.contains("JobFailed"));
    assert!(kws.contains("TimeoutError"));
}

#[test]
fn cleanup_normalizes_whitespace_and_quotes() {
    let condenser = LogCondenser::default();
    assert_eq!(
        condenser.cleanup("a  \"quoted\"   <tag>word</tag> [label] b\\c"),
        "a quoted word bc"
    );
}
