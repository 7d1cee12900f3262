/// Canonicalizes a human title into an identifier usable both as a file stem
/// and as the path part of a `<namespace>:<identifier>` sound name.
///
/// Trims, lowercases, turns spaces and hyphens into underscores, drops every
/// character outside `[a-z0-9/._-]` and collapses underscore runs. Collapsing
/// happens after the strip so that `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(raw_title: &str) -> String {
    let lowered = raw_title.trim().to_lowercase().replace([' ', '-'], "_");

    let mut out = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if !is_allowed(c) {
            continue;
        }
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Keeps a normalized identifier inside the directory it is joined onto:
/// empty, `.` and `..` segments are dropped, so the result is a relative
/// path of plain segments (or empty).
pub fn confine_relative(identifier: &str) -> String {
    identifier
        .split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .collect::<Vec<_>>()
        .join("/")
}

fn is_allowed(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '/' | '.' | '_' | '-')
}

/// Turns a pack title into a single directory name. Titles come from
/// playlists and `pack.json`, so anything a filesystem rejects is replaced.
pub fn sanitize_dir_name(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "pack".to_string()
    } else {
        trimmed.to_string()
    }
}
