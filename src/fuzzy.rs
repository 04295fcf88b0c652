//! Edit-distance string similarity
//!
//! Small helpers shared by wake-phrase detection and dungeon-name matching.
//! Transcripts arrive misheard ("garvis", "ossuray"), so exact lookups are
//! backed by a normalized-similarity fallback with a configurable cutoff.

/// Levenshtein edit distance between two strings, by character.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Normalized similarity in `[0.0, 1.0]`; 1.0 means equal strings.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f32 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f32 / longest as f32
}

/// Find the candidate most similar to `word`, if any clears `cutoff`.
#[must_use]
pub fn closest_match<'a>(word: &str, candidates: &[&'a str], cutoff: f32) -> Option<&'a str> {
    let mut best: Option<(&str, f32)> = None;
    for candidate in candidates {
        let score = similarity(word, candidate);
        if score >= cutoff && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(c, _)| c)
}
