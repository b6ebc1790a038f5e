//! Trigram string similarity with `pg_trgm` semantics.
//!
//! Lets the in-memory store score lexical candidates the same way the
//! PostgreSQL gateway does with `similarity(content, query)`:
//!
//! - text is lower-cased and split into words of alphanumeric characters;
//! - each word is padded with two spaces in front and one behind;
//! - the score is the Jaccard index of the two trigram sets.

use std::collections::HashSet;

/// Extract the set of padded word trigrams from `text`.
pub fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let mut set = HashSet::new();
    let lowered = text.to_lowercase();

    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for w in padded.windows(3) {
            set.insert([w[0], w[1], w[2]]);
        }
    }

    set
}

/// Trigram similarity in `[0.0, 1.0]`; `0.0` when either side has no words.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    shared as f64 / union as f64
}
