//! Glob matching for `KEYS`.
//!
//! Supports `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes, on raw bytes.

/// Returns `true` if `text` matches the glob `pattern`.
///
/// Every token but `*` consumes exactly one byte, so only the most recent
/// star needs a resume point. Matching is O(pattern * text) at worst.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Pattern index after the last star, and the text index it resumes from.
    let mut resume: Option<(usize, usize)> = None;

    while t < text.len() {
        match step(pattern, p, text[t]) {
            Step::Star => {
                p += 1;
                resume = Some((p, t));
                continue;
            }
            Step::Next(next) => {
                p = next;
                t += 1;
                continue;
            }
            Step::Fail => {}
        }

        match resume {
            Some((after_star, from)) => {
                p = after_star;
                t = from + 1;
                resume = Some((after_star, t));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

enum Step {
    Star,
    /// Byte matched; continue at this pattern index
    Next(usize),
    Fail,
}

/// Tries the pattern token at `p` against one byte of text.
fn step(pattern: &[u8], p: usize, c: u8) -> Step {
    let Some(&token) = pattern.get(p) else {
        return Step::Fail;
    };

    match token {
        b'*' => Step::Star,
        b'?' => Step::Next(p + 1),
        b'[' => match match_class(&pattern[p + 1..], c) {
            Some((true, after)) => Step::Next(pattern.len() - after.len()),
            _ => Step::Fail,
        },
        b'\\' if p + 1 < pattern.len() => {
            if pattern[p + 1] == c {
                Step::Next(p + 2)
            } else {
                Step::Fail
            }
        }
        literal if literal == c => Step::Next(p + 1),
        _ => Step::Fail,
    }
}

/// Matches `c` against a class body (the bytes after `[`). Returns whether it
/// matched and the pattern remainder after `]`, or `None` if unterminated.
fn match_class(class: &[u8], c: u8) -> Option<(bool, &[u8])> {
    let (negate, mut i) = match class.first() {
        Some(b'^') => (true, 1),
        _ => (false, 0),
    };
    let mut matched = false;

    while i < class.len() && class[i] != b']' {
        if class[i] == b'\\' && i + 1 < class.len() {
            matched |= class[i + 1] == c;
            i += 2;
        } else if i + 2 < class.len() && class[i + 1] == b'-' && class[i + 2] != b']' {
            let (lo, hi) = (class[i].min(class[i + 2]), class[i].max(class[i + 2]));
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= class[i] == c;
            i += 1;
        }
    }

    if i >= class.len() {
        return None;
    }
    Some((matched != negate, &class[i + 1..]))
}
