//! Version tokenization and comparison.
//!
//! Versions split on `.` and `-` into numeric and textual tokens which are
//! compared pairwise. A trailing textual token marks a pre-release, so
//! `1.0` sorts above `1.0-beta` while `1.0.1` sorts above `1.0`.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Num(u64),
    Text(&'a str),
}

fn tokenize(version: &str) -> Vec<Token<'_>> {
    version
        .split(['.', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<u64>() {
            Ok(n) => Token::Num(n),
            Err(_) => Token::Text(part),
        })
        .collect()
}

fn compare_tokens(a: &Token<'_>, b: &Token<'_>) -> Ordering {
    match (a, b) {
        (Token::Num(a), Token::Num(b)) => a.cmp(b),
        (Token::Text(a), Token::Text(b)) => a.cmp(b),
        // a release token outranks a pre-release marker
        (Token::Num(_), Token::Text(_)) => Ordering::Greater,
        (Token::Text(_), Token::Num(_)) => Ordering::Less,
    }
}

/// Total order over version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    let ta = tokenize(a);
    let tb = tokenize(b);
    for i in 0..ta.len().max(tb.len()) {
        let order = match (ta.get(i), tb.get(i)) {
            (Some(a), Some(b)) => compare_tokens(a, b),
            // missing tokens sort below numbers but above pre-release text
            (Some(Token::Num(_)), None) => Ordering::Greater,
            (Some(Token::Text(_)), None) => Ordering::Less,
            (None, Some(Token::Num(_))) => Ordering::Less,
            (None, Some(Token::Text(_))) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if order != Ordering::Equal {
            return order;
        }
    }
    Ordering::Equal
}

/// Componentwise equality after tokenization.
pub fn equals(a: &str, b: &str) -> bool {
    compare(a, b) == Ordering::Equal
}
