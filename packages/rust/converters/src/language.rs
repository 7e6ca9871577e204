//! Keyword-frequency language guess for plain text.

use std::collections::HashMap;

/// Common function words per language. Order breaks ties.
const STOPWORDS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "is", "are", "of", "to", "in", "that", "with", "for", "this", "was", "it", "be"]),
    ("es", &["el", "la", "los", "las", "y", "es", "son", "que", "del", "por", "con", "para", "una", "como"]),
    ("fr", &["le", "la", "les", "et", "est", "sont", "des", "que", "pour", "avec", "une", "dans", "qui", "pas"]),
    ("de", &["der", "die", "das", "und", "ist", "sind", "nicht", "mit", "ein", "eine", "für", "auf", "auch", "den"]),
    ("it", &["il", "lo", "gli", "e", "è", "sono", "che", "della", "per", "con", "una", "non", "nel", "questo"]),
    ("pt", &["o", "os", "as", "e", "é", "são", "que", "do", "da", "não", "com", "para", "uma", "em"]),
    ("nl", &["de", "het", "een", "en", "is", "zijn", "niet", "van", "met", "voor", "dat", "op", "ook", "wordt"]),
];

/// Minimum number of stopword hits before a guess is made.
const MIN_HITS: usize = 3;

/// Guess the ISO 639-1 code of `text`, or `None` when no language clearly leads.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let mut frequencies: HashMap<String, usize> = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
    {
        *frequencies.entry(word.to_lowercase()).or_default() += 1;
    }

    let mut best: Option<(&'static str, usize)> = None;
    for &(code, words) in STOPWORDS {
        let hits: usize = words
            .iter()
            .filter_map(|w| frequencies.get(*w))
            .sum();
        if best.is_none_or(|(_, top)| hits > top) {
            best = Some((code, hits));
        }
    }

    best.filter(|(_, hits)| *hits >= MIN_HITS).map(|(code, _)| code)
}
