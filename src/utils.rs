const EMPTY_TITLE: &str = "dataset";

/// Turn a dataset title into a filename stem.
///
/// Every run of characters that are not alphanumeric or `_` becomes a single
/// `-`; leading and trailing hyphens are dropped. Applying it twice is a no-op.
pub fn safe_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }

    if out.is_empty() {
        EMPTY_TITLE.to_string()
    } else {
        out
    }
}

/// Collapse internal whitespace and trim.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
