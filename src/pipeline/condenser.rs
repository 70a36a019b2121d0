use std::collections::BTreeSet;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::CondenserSettings;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.*?>").expect("valid regex"));
static BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.*?\]").expect("valid regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static PIECE_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"; |, |:|\*|\n+").expect("valid regex"));
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid regex"));

/// Condenses lengthy multi-line error logs into one informative line and
/// extracts keyword sets from them. Pure text processing, driven entirely by
/// the configured word lists.
#[derive(Debug, Clone)]
pub struct LogCondenser {
    settings: CondenserSettings,
}

impl Default for LogCondenser {
    fn default() -> Self {
        LogCondenser::new(CondenserSettings::default())
    }
}

impl LogCondenser {
    pub fn new(settings: CondenserSettings) -> Self {
        LogCondenser { settings }
    }

    /// Cleans up one log piece: strip HTML-like `<...>` tags and square
    /// bracket `[...]` labels, drop backslashes, collapse whitespace runs
    /// and remove quotes.
    pub fn cleanup(&self, desc: &str) -> String {
        let cleaned = HTML_TAG_RE.replace_all(desc, "");
        let cleaned = BRACKET_RE.replace_all(&cleaned, "");
        let cleaned = cleaned.replace('\\', "");
        let cleaned = WHITESPACE_RE.replace_all(&cleaned, " ");
        cleaned.replace('"', "'").replace('\'', "")
    }

    /// Prunes a lengthy error log to a short message.
    ///
    /// A log without a line break is already short and is returned as-is
    /// (trimmed). Otherwise the log is split on common delimiters and each
    /// piece cleaned; pieces containing an ignore word are skipped, the
    /// rest draw attention, and attention pieces containing a buzzword are
    /// "buzzed". Buzzed pieces of more than two words win (joined with
    /// `; `, deduplicated in first-occurrence order), then the first
    /// attention piece, then the first cleaned piece.
    pub fn shorten(&self, log: &str) -> String {
        let log = log.trim();
        if !log.contains('\n') {
            return log.to_string();
        }

        let pieces: Vec<String> = PIECE_SPLIT_RE
            .split(log)
            .map(|p| self.cleanup(p))
            .collect();

        let mut attentioned: Vec<String> = Vec::new();
        let mut buzzed: Vec<String> = Vec::new();

        for piece in &pieces {
            let piece = piece.trim();
            let raw = piece.to_lowercase();

            if self.settings.ignore_words.iter().any(|kw| raw.contains(kw)) {
                continue;
            }
            attentioned.push(piece.to_string());

            if self.settings.buzzwords.iter().any(|kw| raw.contains(kw)) {
                buzzed.push(piece.to_string());
            }
        }

        // Deduplicate by value but keep the scan order, so the output does
        // not depend on any set iteration order.
        let mut seen: HashSet<&str> = HashSet::new();
        let informative: Vec<&str> = buzzed
            .iter()
            .map(|s| s.as_str())
            .filter(|s| s.split(' ').count() > 2)
            .filter(|s| seen.insert(*s))
            .collect();

        if !informative.is_empty() {
            return informative.join("; ");
        }

        if let Some(first) = attentioned.first() {
            return first.clone();
        }
        pieces.first().map(|s| s.trim().to_string()).unwrap_or_default()
    }

    /// Extracts keywords from a shortened error log.
    ///
    /// A token is kept when it contains a whitelist word, or when it
    /// contains a keyword buzzword while not being exactly one itself.
    /// Blacklisted words are removed from the result.
    pub fn keywords(&self, description: &str) -> BTreeSet<String> {
        let mut kwset: BTreeSet<String> = BTreeSet::new();

        for token in WORD_RE.find_iter(description) {
            let word = token.as_str().trim();
            let raw = word.to_lowercase();

            if self
                .settings
                .whitelist_words
                .iter()
                .any(|kw| raw.contains(kw))
            {
                kwset.insert(word.to_string());
            }

            for kw in &self.settings.keyword_buzzwords {
                if raw.contains(kw) && !self.settings.keyword_buzzwords.contains(&raw) {
                    kwset.insert(word.to_string());
                }
            }
        }

        for kw in &self.settings.blacklist_words {
            kwset.remove(kw);
        }

        kwset
    }
}
