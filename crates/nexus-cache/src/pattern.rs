//! Key pattern matching shared by both tiers and the invalidation rules.
//!
//! Supports the subset of Redis glob syntax the cache uses: `*` matches any
//! run of characters, `?` matches exactly one and `\` makes the next
//! character literal.

/// Characters with a meaning in Redis glob patterns.
const GLOB_SPECIAL: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Returns true if `key` contains a wildcard and must be expanded.
#[must_use]
pub fn is_pattern(key: &str) -> bool {
    key.contains('*')
}

/// Escapes `text` so it matches itself literally inside a glob pattern.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if GLOB_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Clone, Copy, PartialEq)]
enum Token {
    Any,
    One,
    Literal(char),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '*' => Token::Any,
            '?' => Token::One,
            '\\' => Token::Literal(chars.next().unwrap_or('\\')),
            other => Token::Literal(other),
        });
    }
    tokens
}

/// Glob-style match of `key` against `pattern`.
#[must_use]
pub fn matches(pattern: &str, key: &str) -> bool {
    let pattern = tokenize(pattern);
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        let single = p < pattern.len()
            && match pattern[p] {
                Token::One => true,
                Token::Literal(c) => c == key[k],
                Token::Any => false,
            };

        if single {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == Token::Any {
            backtrack = Some((p, k));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            k = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|token| *token == Token::Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("economics", "economics"));
        assert!(!matches("economics", "economics:v2"));
    }

    #[test]
    fn test_trailing_wildcard() {
        assert!(matches("tok:*", "tok:1"));
        assert!(matches("tok:*", "tok:"));
        assert!(!matches("tok:*", "other"));
    }

    #[test]
    fn test_inner_wildcards() {
        assert!(matches("vm-query:*:getQuorum*", "vm-query:erd1abc:getQuorum:0"));
        assert!(matches("*Price*", "currentPrice"));
        assert!(matches("shardNonce:?", "shardNonce:1"));
        assert!(!matches("shardNonce:?", "shardNonce:12"));
    }

    #[test]
    fn test_escaped_text_matches_literally() {
        assert_eq!(escape("a?b[1]*"), "a\\?b\\[1\\]\\*");
        assert!(matches(&format!("*{}*", escape("n?")), "tok:n?:1"));
        assert!(!matches(&format!("*{}*", escape("n?")), "tok:nx:1"));
        assert!(matches(&escape("back\\slash"), "back\\slash"));
    }

    #[test]
    fn test_is_pattern() {
        assert!(is_pattern("tok:*"));
        assert!(!is_pattern("tok:1"));
    }
}
