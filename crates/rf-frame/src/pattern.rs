//! Shell-style branch selection: `*`, `?`, `[...]`, `[!...]` and `{A,B}` alternation.

use glob::{MatchOptions, Pattern};

use crate::error::{FrameError, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Expand brace alternations: `"{A,B}C"` becomes `["AC", "BC"]`.
///
/// The right-most group is expanded first and the results are expanded
/// again, so nested and sequential groups multiply out. A group without a
/// comma (e.g. `"{x}"`) is kept literally, and `\}` always stands for a
/// literal `}`. Duplicates are dropped, keeping the first occurrence.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let mut out = Vec::new();
    expand_into(pattern.chars().collect(), &mut out);
    let mut seen = std::collections::HashSet::new();
    out.retain(|p| seen.insert(p.clone()));
    out
}

fn expand_into(s: Vec<char>, out: &mut Vec<String>) {
    let Some((open, close)) = find_group(&s) else {
        out.push(s.iter().collect::<String>().replace("\\}", "}"));
        return;
    };
    let inner = &s[open + 1..close];
    if inner.contains(&',') {
        for alt in inner.split(|&c| c == ',') {
            let mut next = s[..open].to_vec();
            next.extend_from_slice(alt);
            next.extend_from_slice(&s[close + 1..]);
            expand_into(next, out);
        }
    } else {
        // escape the closing brace so this group is no longer found
        let mut next = s[..close].to_vec();
        next.push('\\');
        next.extend_from_slice(&s[close..]);
        expand_into(next, out);
    }
}

/// Locate the brace group to expand next as `(open, close)` indices.
///
/// Picks the right-most `{` that has a closing `}` at least two characters
/// later whose preceding character is not `\`, and the first such `}`.
fn find_group(s: &[char]) -> Option<(usize, usize)> {
    (0..s.len()).rev().filter(|&i| s[i] == '{').find_map(|open| {
        (open + 3..s.len()).find(|&j| s[j] == '}' && s[j - 1] != '\\').map(|close| (open, close))
    })
}

fn compile(pattern: &str) -> Result<Pattern> {
    // runs of `*` mean the same as one `*` here, and a lone `**` is rejected by `glob`
    let mut collapsed = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if !(c == '*' && collapsed.ends_with('*')) {
            collapsed.push(c);
        }
    }
    Pattern::new(&collapsed).map_err(|e| FrameError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })
}

/// Whether `name` matches a single (already brace-expanded) pattern.
pub fn matches(pattern: &str, name: &str) -> Result<bool> {
    Ok(compile(pattern)?.matches_with(name, MATCH_OPTIONS))
}

/// Select branches matching any of `patterns`.
///
/// Patterns are brace-expanded and visited in order; each contributes the
/// branches it matches, in branch order, that were not selected before.
/// With `fail`, an expanded pattern matching no branch at all is an error.
pub fn match_branches<S: AsRef<str>>(
    branches: &[S],
    patterns: &[String],
    fail: bool,
) -> Result<Vec<String>> {
    let mut selected: Vec<String> = Vec::new();
    for pattern in patterns.iter().flat_map(|p| expand_braces(p)) {
        let compiled = compile(&pattern)?;
        let mut found = false;
        for branch in branches.iter().map(AsRef::as_ref) {
            if compiled.matches_with(branch, MATCH_OPTIONS) {
                found = true;
                if !selected.iter().any(|s| s == branch) {
                    selected.push(branch.to_string());
                }
            }
        }
        if !found {
            if fail {
                return Err(FrameError::PatternNoMatch(pattern));
            }
            log::debug!("pattern '{}' matched no branch", pattern);
        }
    }
    Ok(selected)
}
