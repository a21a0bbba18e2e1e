//! Small string helpers for logs and diagnostics.

/// Single-line preview of user or model text: newlines collapsed, cut to
/// `max_chars` characters (UTF-8 safe) with "..." appended when shortened.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", flat[..idx].trim_end()),
        None => flat,
    }
}

/// Show only the edges of a credential, e.g. `AIza…x9Qk`.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
