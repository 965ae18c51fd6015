//! Trip-identifier normalization and variant generation.
//!
//! Static schedules and real-time feeds rarely agree on trip-id spelling:
//! feeds prepend numeric tags (`0#4930-11`), namespace prefixes
//! (`agency:4930_11`), swap separators, or pad with zeros. Two strategies
//! live here and must not be merged:
//!
//! - **Permissive** (`normalize` + `variants`): canonicalizes aggressively
//!   and fans out alternate spellings, for stop-level arrival matching where
//!   downstream plausibility windows reject false positives.
//! - **Strict** (`strip_feed_prefix`): removes only the leading numeric feed
//!   tag and keeps everything else verbatim, for resolving route labels
//!   shown to users, where a wrong match fabricates a route.

/// Separators that survive normalization.
const SEPARATORS: [char; 3] = ['-', '_', '.'];

/// Strip only a leading `<digits>#` feed tag, keeping the rest verbatim.
///
/// This is the whole of the strict strategy: `0#4930-11` becomes `4930-11`,
/// anything without the tag passes through untouched (trimmed).
pub fn strip_feed_prefix(raw: &str) -> &str {
    let s = raw.trim();
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = s[digits..].strip_prefix('#') {
            return rest;
        }
    }
    s
}

/// Normalize a trip id into a canonical lower-case key.
///
/// Steps: trim; drop a `<digits>#` feed tag; drop an `agency:`/`trip:`
/// namespace or any short (≤5 chars) prefix before the first colon; keep
/// only `[A-Za-z0-9_.-]`; trim separators at the edges; drop trailing
/// zero-padding after a separator; lower-case. Returns `None` when nothing
/// survives.
pub fn normalize(raw: &str) -> Option<String> {
    let mut s = strip_feed_prefix(raw);

    // Namespace prefixes: well-known ones first, then any short generic one.
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("agency:") {
        s = &s["agency:".len()..];
    } else if lower.starts_with("trip:") {
        s = &s["trip:".len()..];
    } else if let Some(colon) = s.find(':') {
        if colon > 0 && colon < 6 {
            s = &s[colon + 1..];
        }
    }

    let mut out: String = s
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || SEPARATORS.contains(c))
        .collect();

    let trimmed = out.trim_matches(|c| SEPARATORS.contains(&c));
    out = trimmed.to_string();

    // Trailing zero-padding: "4930-0", "4930_00" and the like. Everything
    // is ASCII by now, so byte indexing is safe.
    loop {
        let bytes = out.as_bytes();
        let zeros = bytes.iter().rev().take_while(|&&b| b == b'0').count();
        if zeros == 0 || zeros == bytes.len() {
            break;
        }
        let sep_idx = bytes.len() - zeros - 1;
        if SEPARATORS.contains(&(bytes[sep_idx] as char)) {
            out.truncate(sep_idx);
        } else {
            break;
        }
    }

    out.make_ascii_lowercase();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Generate the deduplicated spelling variants used for feed/schedule
/// matching.
///
/// Always non-empty for a non-blank input: when normalization collapses to
/// nothing, the raw id (trimmed, lower-cased) is used as a fallback variant
/// so real-time data is never silently dropped. When `normalize` succeeds,
/// the normalized key is always the first variant.
pub fn variants(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    let norm = match normalize(raw) {
        Some(n) => n,
        None => {
            let fallback = raw.trim().to_ascii_lowercase();
            if !fallback.is_empty() {
                out.push(fallback);
            }
            return out;
        }
    };

    let mut push = |v: String, out: &mut Vec<String>| {
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    };

    push(norm.clone(), &mut out);
    push(norm.chars().filter(|c| !SEPARATORS.contains(c)).collect(), &mut out);
    if norm.contains('-') {
        push(norm.replace('-', "_"), &mut out);
    }
    if norm.contains('_') {
        push(norm.replace('_', "-"), &mut out);
    }
    if norm.contains('.') {
        push(norm.replace('.', "-"), &mut out);
        push(norm.replace('.', "_"), &mut out);
        push(norm.replace('.', ""), &mut out);
    }

    out
}
