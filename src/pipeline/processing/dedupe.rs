use std::collections::BTreeSet;

use crate::app::ports::Deduper;
use crate::common::constants::MATCH_THRESHOLD;
use crate::domain::{MatchCandidate, Record};

/// Pairwise duplicate scoring over name, contact and address
#[derive(Debug, Clone)]
pub struct TokenSetDeduper {
    threshold: f64,
}

impl Default for TokenSetDeduper {
    fn default() -> Self {
        Self::new(MATCH_THRESHOLD)
    }
}

impl TokenSetDeduper {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Average of name, best-of email/phone, and address similarity
    pub fn pair_score(&self, a: &Record, b: &Record) -> f64 {
        let field = |r: &Record, k: &str| r.get_str(k).unwrap_or("").to_string();
        let name = token_set_similarity(&field(a, "name"), &field(b, "name"));
        let contact = token_set_similarity(&field(a, "email"), &field(b, "email"))
            .max(token_set_similarity(&field(a, "phone"), &field(b, "phone")));
        let address = token_set_similarity(&field(a, "address"), &field(b, "address"));
        (name + contact + address) / 3.0
    }
}

impl Deduper for TokenSetDeduper {
    fn candidates(&self, records: &[Record]) -> Vec<MatchCandidate> {
        let mut out = Vec::new();
        for i in 0..records.len() {
            for j in (i + 1)..records.len() {
                let score = self.pair_score(&records[i], &records[j]);
                if score >= self.threshold {
                    out.push(MatchCandidate {
                        i,
                        j,
                        score: (score * 1000.0).round() / 1000.0,
                    });
                }
            }
        }
        out
    }
}

fn tokens(s: &str) -> BTreeSet<String> {
    s.split(|c: char| !c.is_alphanumeric() && c != '@' && c != '.')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Order-insensitive similarity in `[0, 1]`, tolerant of extra tokens on one side.
///
/// Blank inputs score 0.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let (ta, tb) = (tokens(a), tokens(b));
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let join = |set: Vec<&String>| set.into_iter().map(String::as_str).collect::<Vec<_>>().join(" ");
    let common = join(ta.intersection(&tb).collect());
    let only_a = join(ta.difference(&tb).collect());
    let only_b = join(tb.difference(&ta).collect());

    let combine = |rest: &str| match (common.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => common.clone(),
        (false, false) => format!("{} {}", common, rest),
    };
    let with_a = combine(&only_a);
    let with_b = combine(&only_b);

    let mut best = strsim::normalized_levenshtein(&with_a, &with_b);
    if !common.is_empty() {
        best = best
            .max(strsim::normalized_levenshtein(&common, &with_a))
            .max(strsim::normalized_levenshtein(&common, &with_b));
    }
    best
}
