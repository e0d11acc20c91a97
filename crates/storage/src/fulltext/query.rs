//! Fulltext term syntax
//!
//! Each term handed to `get_fulltext_rows` is parsed on its own:
//!
//! | syntax        | meaning                                       |
//! |---------------|-----------------------------------------------|
//! | `dog`         | exact term                                    |
//! | `"red car"`   | phrase, tokens at consecutive positions       |
//! | `dgo~1`       | fuzzy, Levenshtein distance up to 1 (max 2)   |
//! | `dog~`        | fuzzy with the default distance of 2          |
//! | `do*`         | prefix                                        |
//!
//! A bare term that tokenizes into several tokens (`red-car`) is a phrase.

use super::tokenizer::tokenize;

/// Largest edit distance accepted for fuzzy terms
pub const MAX_EDITS: usize = 2;

/// One parsed query clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermQuery {
    /// Exact token
    Term(String),
    /// Consecutive tokens
    Phrase(Vec<String>),
    /// Tokens within an edit distance
    Fuzzy {
        /// Base token
        term: String,
        /// Maximum Levenshtein distance
        max_edits: usize,
    },
    /// Tokens starting with a prefix
    Prefix(String),
    /// Nothing searchable left after tokenization
    Empty,
}

impl TermQuery {
    /// Parse one raw query term
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            return Self::from_tokens(tokenize(&raw[1..raw.len() - 1]));
        }
        if let Some((base, edits)) = raw.rsplit_once('~') {
            let max_edits = if edits.is_empty() {
                MAX_EDITS
            } else {
                match edits.parse::<usize>() {
                    Ok(n) => n.min(MAX_EDITS),
                    Err(_) => return Self::from_tokens(tokenize(raw)),
                }
            };
            let mut tokens = tokenize(base);
            return match tokens.len() {
                0 => TermQuery::Empty,
                1 => TermQuery::Fuzzy {
                    term: tokens.remove(0),
                    max_edits,
                },
                _ => TermQuery::Phrase(tokens),
            };
        }
        if let Some(prefix) = raw.strip_suffix('*') {
            let mut tokens = tokenize(prefix);
            if tokens.len() == 1 {
                return TermQuery::Prefix(tokens.remove(0));
            }
            return Self::from_tokens(tokens);
        }
        Self::from_tokens(tokenize(raw))
    }

    fn from_tokens(mut tokens: Vec<String>) -> Self {
        match tokens.len() {
            0 => TermQuery::Empty,
            1 => TermQuery::Term(tokens.remove(0)),
            _ => TermQuery::Phrase(tokens),
        }
    }

    /// Whether a single token satisfies this clause (phrases never do)
    pub fn matches_token(&self, token: &str) -> bool {
        match self {
            TermQuery::Term(t) => t == token,
            TermQuery::Fuzzy { term, max_edits } => {
                levenshtein_within(term, token, *max_edits)
            }
            TermQuery::Prefix(p) => token.starts_with(p.as_str()),
            TermQuery::Phrase(_) | TermQuery::Empty => false,
        }
    }

    /// Number of matches of this clause in a token stream
    pub fn count_in(&self, tokens: &[String]) -> usize {
        match self {
            TermQuery::Empty => 0,
            TermQuery::Phrase(phrase) => {
                if phrase.is_empty() || phrase.len() > tokens.len() {
                    return 0;
                }
                tokens
                    .windows(phrase.len())
                    .filter(|w| w.iter().zip(phrase).all(|(a, b)| a == b))
                    .count()
            }
            _ => tokens.iter().filter(|t| self.matches_token(t)).count(),
        }
    }
}

/// Levenshtein distance of `a` and `b` is at most `max`
pub fn levenshtein_within(a: &str, b: &str, max: usize) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return false;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        let mut row_min = curr[0];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            row_min = row_min.min(curr[j]);
        }
        if row_min > max {
            return false;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()] <= max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        tokenize(s)
    }

    #[test]
    fn test_parse_term() {
        assert_eq!(TermQuery::parse("Dog"), TermQuery::Term("dog".into()));
    }

    #[test]
    fn test_parse_phrase() {
        assert_eq!(
            TermQuery::parse("\"red car\""),
            TermQuery::Phrase(vec!["red".into(), "car".into()])
        );
        assert_eq!(
            TermQuery::parse("red-car"),
            TermQuery::Phrase(vec!["red".into(), "car".into()])
        );
    }

    #[test]
    fn test_parse_fuzzy() {
        assert_eq!(
            TermQuery::parse("dgo~1"),
            TermQuery::Fuzzy {
                term: "dgo".into(),
                max_edits: 1
            }
        );
        assert_eq!(
            TermQuery::parse("dog~"),
            TermQuery::Fuzzy {
                term: "dog".into(),
                max_edits: 2
            }
        );
        assert_eq!(
            TermQuery::parse("dog~9"),
            TermQuery::Fuzzy {
                term: "dog".into(),
                max_edits: 2
            }
        );
    }

    #[test]
    fn test_parse_prefix_and_empty() {
        assert_eq!(TermQuery::parse("ca*"), TermQuery::Prefix("ca".into()));
        assert_eq!(TermQuery::parse("!!"), TermQuery::Empty);
    }

    #[test]
    fn test_count_phrase() {
        let q = TermQuery::parse("\"red car\"");
        assert_eq!(q.count_in(&toks("a red car and a red car, red bus")), 2);
        assert_eq!(q.count_in(&toks("car red")), 0);
    }

    #[test]
    fn test_count_fuzzy() {
        let q = TermQuery::parse("dgo~1");
        // "dog" is two substitutions away from "dgo"
        assert_eq!(q.count_in(&toks("dog dgo dga")), 2);
    }

    #[test]
    fn test_levenshtein() {
        assert!(levenshtein_within("kitten", "sitting", 3));
        assert!(!levenshtein_within("kitten", "sitting", 2));
        assert!(levenshtein_within("", "ab", 2));
        assert!(levenshtein_within("same", "same", 0));
    }
}
