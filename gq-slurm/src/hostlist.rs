use std::cmp::Ordering;
use std::collections::HashSet;

use thiserror::Error;

/// Hard ceiling on the size of any single range and of any one part's
/// cross product. Oversized expressions are rejected, never truncated.
pub const MAX_EXPANSION: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostlistError {
    #[error("unbalanced or nested brackets in '{0}'")]
    UnbalancedBrackets(String),
    #[error("invalid range token '{0}': expected N or N-M")]
    InvalidRange(String),
    #[error("descending range '{0}'")]
    DescendingRange(String),
    #[error("expansion exceeds {MAX_EXPANSION} entries")]
    TooManyHosts,
}

/// Expands a Slurm hostlist expression into individual hostnames,
/// deduplicated in first-seen order.
///
/// # Examples
///
/// * `"n01,n02"` -> `["n01", "n02"]`
/// * `"compute-b[10-12,15]"` -> `["compute-b10", "compute-b11", "compute-b12", "compute-b15"]`
/// * `"gpu-a[01-02]-ib"` -> `["gpu-a01-ib", "gpu-a02-ib"]`
pub fn expand(hostlist: &str) -> Result<Vec<String>, HostlistError> {
    expand_with(hostlist, false, false)
}

/// Like [`expand`], with duplicates optionally kept and the result
/// optionally ordered by [`natural_cmp`].
pub fn expand_with(
    hostlist: &str,
    allow_duplicates: bool,
    sort: bool,
) -> Result<Vec<String>, HostlistError> {
    let mut hosts = Vec::new();
    for part in split_parts(hostlist)? {
        hosts.extend(expand_part(&part)?);
        if hosts.len() > MAX_EXPANSION {
            return Err(HostlistError::TooManyHosts);
        }
    }

    if !allow_duplicates {
        let mut seen = HashSet::new();
        hosts.retain(|host| seen.insert(host.clone()));
    }

    if sort {
        hosts.sort_by(|a, b| natural_cmp(a, b));
    }

    Ok(hosts)
}

/// Splits the expression on top-level commas, tracking bracket depth so
/// that `"node[01-02],login01"` separates correctly. Brackets never nest:
/// any depth above 1 or below 0, or a bracket left open at the end, is
/// malformed.
fn split_parts(hostlist: &str) -> Result<Vec<String>, HostlistError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;

    for ch in hostlist.chars() {
        match ch {
            '[' => {
                depth += 1;
                if depth > 1 {
                    return Err(HostlistError::UnbalancedBrackets(hostlist.to_string()));
                }
            }
            ']' => {
                depth -= 1;
                if depth < 0 {
                    return Err(HostlistError::UnbalancedBrackets(hostlist.to_string()));
                }
            }
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }

    if depth != 0 {
        return Err(HostlistError::UnbalancedBrackets(hostlist.to_string()));
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    Ok(parts)
}

/// Expands one part as (literal prefix, bracketed range-list, remainder).
/// The remainder is expanded first (recursion bottoms out on the empty
/// string, which expands to one empty string), then cross-joined with the
/// bracket expansion: outer loop over the range, inner over the remainder.
fn expand_part(part: &str) -> Result<Vec<String>, HostlistError> {
    let Some(open) = part.find('[') else {
        return Ok(vec![part.to_string()]);
    };
    let close = match part.find(']') {
        Some(close) if close > open => close,
        _ => return Err(HostlistError::UnbalancedBrackets(part.to_string())),
    };

    let tails = expand_part(&part[close + 1..])?;
    let heads = expand_rangelist(&part[open + 1..close], &part[..open])?;

    match heads.len().checked_mul(tails.len()) {
        Some(product) if product <= MAX_EXPANSION => {}
        _ => return Err(HostlistError::TooManyHosts),
    }

    let mut expanded = Vec::with_capacity(heads.len() * tails.len());
    for head in &heads {
        for tail in &tails {
            expanded.push(format!("{head}{tail}"));
        }
    }
    Ok(expanded)
}

/// Expands one bracket's comma-separated range-list, prefixing every entry.
/// Tokens are either a bare integer or `low-high`; ranges keep the
/// zero-padding of the written `low` end, so `[07-10]` yields `07`..`10`.
pub fn expand_rangelist(rangelist: &str, prefix: &str) -> Result<Vec<String>, HostlistError> {
    let mut expanded = Vec::new();

    for token in rangelist.split(',') {
        let token = token.trim();
        if let Some((low_str, high_str)) = token.split_once('-') {
            let low = parse_range_int(low_str, token)?;
            let high = parse_range_int(high_str, token)?;
            if high < low {
                return Err(HostlistError::DescendingRange(token.to_string()));
            }
            // Checked arithmetic: a span like 0-u64::MAX would otherwise
            // overflow the count and dodge the ceiling entirely.
            let count = high
                .checked_sub(low)
                .and_then(|span| span.checked_add(1))
                .filter(|&count| count <= MAX_EXPANSION as u64)
                .ok_or(HostlistError::TooManyHosts)? as usize;
            if expanded.len() + count > MAX_EXPANSION {
                return Err(HostlistError::TooManyHosts);
            }
            let width = low_str.len();
            for n in low..=high {
                expanded.push(format!("{prefix}{n:0width$}"));
            }
        } else {
            parse_range_int(token, token)?;
            expanded.push(format!("{prefix}{token}"));
            if expanded.len() > MAX_EXPANSION {
                return Err(HostlistError::TooManyHosts);
            }
        }
    }

    Ok(expanded)
}

fn parse_range_int(text: &str, token: &str) -> Result<u64, HostlistError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HostlistError::InvalidRange(token.to_string()));
    }
    text.parse()
        .map_err(|_| HostlistError::InvalidRange(token.to_string()))
}

enum Chunk<'a> {
    Num(u64, &'a str),
    Text(&'a str),
}

/// Splits a name into alternating digit and non-digit runs.
fn natural_key(name: &str) -> Vec<Chunk<'_>> {
    let bytes = name.as_bytes();
    let mut key = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let digits = bytes[i].is_ascii_digit();
        while i < bytes.len() && bytes[i].is_ascii_digit() == digits {
            i += 1;
        }
        let run = &name[start..i];
        key.push(if digits {
            Chunk::Num(run.parse().unwrap_or(u64::MAX), run)
        } else {
            Chunk::Text(run)
        });
    }
    key
}

/// Orders host names the way an operator expects: digit runs compare
/// numerically, everything else lexically, so `n2 < n10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let key_a = natural_key(a);
    let key_b = natural_key(b);

    for pair in key_a.iter().zip(key_b.iter()) {
        let ord = match pair {
            (Chunk::Num(m, raw_m), Chunk::Num(n, raw_n)) => m.cmp(n).then_with(|| raw_m.cmp(raw_n)),
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
            // A digit run sorts before a non-digit run at the same position.
            (Chunk::Num(..), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Num(..)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    key_a.len().cmp(&key_b.len()).then_with(|| a.cmp(b))
}
