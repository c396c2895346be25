//! Glob matching with the KEYS / PSUBSCRIBE dialect: `*`, `?`, `[abc]`,
//! `[a-z]`, `[^a]` and `\` escapes.

/// Returns true when `text` matches the glob `pattern`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

/// Escapes `*`, `?`, `[`, `]` and backslashes so `literal` matches only itself.
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    // Backtrack point for the last `*` seen: (pattern idx after star, text idx)
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    star = Some((p + 1, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    }
                }
                '\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }
        match star {
            Some((sp, st)) => {
                p = sp;
                t = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Evaluates a `[...]` class starting at `pattern[start]`.
/// Returns (matched, index after the closing bracket), or None if unterminated.
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(pattern.get(i), Some('^') | Some('!'));
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let cur = pattern[i];
        if cur == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;
        let lo = if cur == '\\' && i + 1 < pattern.len() {
            i += 1;
            pattern[i]
        } else {
            cur
        };
        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            let hi = pattern[i + 2];
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_star() {
        assert!(glob_match("user:1", "user:1"));
        assert!(!glob_match("user:1", "user:10"));
        assert!(glob_match("user:*", "user:10"));
        assert!(glob_match("user:*", "user:"));
        assert!(glob_match("*", ""));
        assert!(glob_match("*:profile", "user:7:profile"));
        assert!(!glob_match("*:profile", "user:7:settings"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
    }

    #[test]
    fn test_escaped_literal_matches_only_itself() {
        let prefix = escape_glob("t[1]*?\\:");
        assert_eq!(prefix, "t\\[1\\]\\*\\?\\\\:");
        assert!(glob_match(&format!("{}*", prefix), "t[1]*?\\:key"));
        assert!(!glob_match(&format!("{}*", prefix), "t1xy\\:key"));
        assert!(!glob_match(&format!("{}*", prefix), "other:key"));
    }

    #[test]
    fn test_question_mark() {
        assert!(glob_match("h?llo", "hello"));
        assert!(!glob_match("h?llo", "hllo"));
    }

    #[test]
    fn test_classes() {
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[ae]llo", "hillo"));
        assert!(glob_match("h[^e]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("key[0-9]", "key7"));
        assert!(!glob_match("key[0-9]", "keyx"));
    }

    #[test]
    fn test_escape() {
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
    }
}
