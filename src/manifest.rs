//! Parsing and writing `pure/filelist.txt`, the manifest of
//! `(virtual_path, branch_identifier, size_in_bytes)` records carried on the
//! repository's default branch.
//!
//! Fields are space-delimited; the quote character is `|`. Minimal quoting:
//! a path is wrapped in `|...|` only when it contains a space or a literal
//! `|` (which is itself escaped by doubling). Parsers treat only the last
//! two whitespace-separated tokens as positional (branch, then size) so
//! unquoted paths containing spaces still round-trip.

use crate::error::GitFsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub virtual_path: String,
    pub branch: String,
    pub size: u64,
}

/// Renders a single manifest record line (without trailing newline).
pub fn format_record(entry: &ManifestEntry) -> String {
    let path = quote_path(&entry.virtual_path);
    format!("{} {} {}", path, entry.branch, entry.size)
}

fn quote_path(path: &str) -> String {
    if path.contains(' ') || path.contains('|') {
        format!("|{}|", path.replace('|', "||"))
    } else {
        path.to_string()
    }
}

fn unquote_path(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('|') && raw.ends_with('|') {
        raw[1..raw.len() - 1].replace("||", "|")
    } else {
        raw.to_string()
    }
}

/// Parses one non-empty manifest line into a record. The last two
/// whitespace-separated tokens are the branch and size; everything before
/// them (rejoined with a single space) is the path.
pub fn parse_line(line_no: usize, line: &str) -> Result<ManifestEntry, GitFsError> {
    let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.len() < 3 {
        return Err(GitFsError::ManifestParse {
            line_no,
            raw: line.to_string(),
        });
    }
    let (path_tokens, rest) = tokens.split_at(tokens.len() - 2);
    let branch = rest[0].to_string();
    let size: u64 = rest[1].parse().map_err(|_| GitFsError::ManifestParse {
        line_no,
        raw: line.to_string(),
    })?;
    let virtual_path = unquote_path(&path_tokens.join(" "));
    Ok(ManifestEntry {
        virtual_path,
        branch,
        size,
    })
}

/// Parses the full manifest file content, skipping blank lines. A malformed
/// line is reported but does not abort parsing of the remaining lines --
/// bootstrap logs it and moves on, matching the best-effort reconciliation
/// posture of the rest of this system.
pub fn parse_all(content: &str) -> (Vec<ManifestEntry>, Vec<GitFsError>) {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(idx + 1, line) {
            Ok(entry) => entries.push(entry),
            Err(err) => errors.push(err),
        }
    }
    (entries, errors)
}

/// Strips git conflict-marker lines (`<<<<<<<`, `=======`, `>>>>>>>`),
/// yielding the additive union of both sides of the conflict.
pub fn resolve_additive_conflict(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            !(line.starts_with("<<<<<<<")
                || line.starts_with("=======")
                || line.starts_with(">>>>>>>"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_record() {
        let entry = ManifestEntry {
            virtual_path: "a/b".to_string(),
            branch: "deadbeef".to_string(),
            size: 42,
        };
        let line = format_record(&entry);
        assert_eq!(parse_line(1, &line).unwrap(), entry);
    }

    #[test]
    fn round_trips_path_with_space() {
        let entry = ManifestEntry {
            virtual_path: "a dir/b file.txt".to_string(),
            branch: "abc123".to_string(),
            size: 7,
        };
        let line = format_record(&entry);
        assert_eq!(parse_line(1, &line).unwrap(), entry);
    }

    #[test]
    fn unquoted_path_with_space_still_parses_positionally() {
        // No quoting at all: last two tokens are still positional.
        let line = "a dir/b file.txt abc123 7";
        let entry = parse_line(1, line).unwrap();
        assert_eq!(entry.virtual_path, "a dir/b file.txt");
        assert_eq!(entry.branch, "abc123");
        assert_eq!(entry.size, 7);
    }

    #[test]
    fn malformed_line_is_reported_not_panicked() {
        let (entries, errors) = parse_all("a/b branch\nc/d branch2 5\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn additive_conflict_resolution_keeps_both_sides() {
        let content = "a/b br1 1\n<<<<<<< HEAD\nc/d br2 2\n=======\ne/f br3 3\n>>>>>>> other\n";
        let resolved = resolve_additive_conflict(content);
        let (entries, _) = parse_all(&resolved);
        assert_eq!(entries.len(), 3);
    }
}
