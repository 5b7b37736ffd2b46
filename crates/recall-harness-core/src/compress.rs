//! Sentence-level fact compression.
//!
//! A selected fragment is split into sentences, each sentence is scored by
//! an information-density heuristic, and the densest sentences are
//! concatenated until `max_sentences` are used or the character budget is
//! reached. The last sentence may overrun the budget by
//! `CompressionParams::overrun` so a fact is not cut mid-statement.
//!
//! All lengths are counted in `char`s.

use std::sync::LazyLock;

use regex::Regex;

use crate::params::CompressionParams;

const ELLIPSIS: char = '…';

const DECISION_WEIGHT: f64 = 5.0;
const NONCE_WEIGHT: f64 = 5.0;
const NUMBER_WEIGHT: f64 = 1.0;
const PERCENT_WEIGHT: f64 = 0.5;
const TECHNICAL_WEIGHT: f64 = 1.0;
const PROPER_NOUN_WEIGHT: f64 = 0.5;

/// Decision records and tracker keys: `ADR-12`, `RFC-7231`, `PROJ-881`.
static DECISION_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Z0-9]{1,9}-\d+\b").ok());
static NONCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\bnonce\b|\b[0-9a-f]{12,64}\b|\b0x[0-9a-fA-F]{8,}\b").ok()
});
static NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:[.,]\d+)*\b").ok());
static PERCENT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d%").ok());
static TECHNICAL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"\b\w+(?:::\w+)+|\b\w+\(\)|\b[a-z]+_[a-z0-9_]+\b|\b[a-z]+[A-Z]\w*\b|\b[A-Za-z]\w*\.[A-Za-z]\w*\b",
    )
    .ok()
});

fn count(pattern: &LazyLock<Option<Regex>>, text: &str) -> usize {
    pattern.as_ref().map_or(0, |re| re.find_iter(text).count())
}

/// A compressed fact and how many sentences went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Compressed {
    pub text: String,
    pub sentences: usize,
}

/// Split text into sentences.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace (or the end of
/// the text), or at a blank line. Single newlines are folded into spaces
/// and internal whitespace runs are collapsed.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            if chars.peek() == Some(&'\n') {
                flush(&mut sentences, &mut current);
            } else {
                current.push(' ');
            }
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|n| n.is_whitespace()) {
            flush(&mut sentences, &mut current);
        }
    }
    flush(&mut sentences, &mut current);
    sentences
}

fn flush(sentences: &mut Vec<String>, current: &mut String) {
    let sentence = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
    current.clear();
}

/// Information density of a sentence: weighted identifier, number and
/// proper-noun hits, scaled down by the square root of the word count.
pub fn sentence_density(sentence: &str) -> f64 {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let proper_nouns = words
        .iter()
        .skip(1)
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .count();

    let weighted = count(&DECISION_ID, sentence) as f64 * DECISION_WEIGHT
        + count(&NONCE, sentence) as f64 * NONCE_WEIGHT
        + count(&NUMBER, sentence) as f64 * NUMBER_WEIGHT
        + count(&PERCENT, sentence) as f64 * PERCENT_WEIGHT
        + count(&TECHNICAL, sentence) as f64 * TECHNICAL_WEIGHT
        + proper_nouns as f64 * PROPER_NOUN_WEIGHT;

    weighted / (words.len() as f64).sqrt()
}

/// Cut `text` to at most `max_chars` chars, ending in `…` when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    out.push(ELLIPSIS);
    out
}

/// Compress `text` into a fact of at most `max_chars × (1 + overrun)` chars
/// and `max_sentences` sentences. Returns `None` when no sentence is long
/// enough to carry a fact.
pub fn compress(text: &str, max_chars: usize, params: &CompressionParams) -> Option<Compressed> {
    let mut ranked: Vec<(usize, String, f64)> = split_sentences(text)
        .into_iter()
        .filter(|s| s.chars().count() >= params.min_sentence_chars)
        .enumerate()
        .map(|(pos, s)| {
            let density = sentence_density(&s);
            (pos, s, density)
        })
        .collect();
    if ranked.is_empty() || max_chars == 0 {
        return None;
    }
    ranked.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let hard_limit = (max_chars as f64 * (1.0 + params.overrun)).floor() as usize;
    let mut out = String::new();
    let mut out_len = 0usize;
    let mut used = 0usize;

    for (_, sentence, _) in ranked {
        if used >= params.max_sentences || out_len >= max_chars {
            break;
        }
        let sentence_len = sentence.chars().count();
        let sep = usize::from(used > 0);
        let next_len = out_len + sep + sentence_len;

        if next_len <= max_chars {
            push_sentence(&mut out, &sentence, sep);
            out_len = next_len;
            used += 1;
        } else if next_len <= hard_limit {
            push_sentence(&mut out, &sentence, sep);
            used += 1;
            break;
        } else if used == 0 {
            out = truncate_chars(&sentence, max_chars);
            used = 1;
            break;
        }
    }

    if out.trim().is_empty() {
        return None;
    }
    Some(Compressed {
        text: out,
        sentences: used,
    })
}

fn push_sentence(out: &mut String, sentence: &str, sep: usize) {
    if sep > 0 {
        out.push(' ');
    }
    out.push_str(sentence);
}
