//! Splitting and normalizing virtual paths, and hashing a path to a branch
//! identifier on the remote.

use sha1::{Digest, Sha1};

/// Strips a leading `/` and splits the remainder into path components.
///
/// Empty input (or a bare `/`) yields an empty component list and an empty
/// normalized string.
pub fn split(path: &str) -> (String, Vec<String>) {
    let normalized = path.strip_prefix('/').unwrap_or(path).to_string();
    let components = normalized
        .split('/')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    (normalized, components)
}

/// The branch identifier for a normalized virtual path: the hex SHA-1 digest
/// of its UTF-8 bytes, with the final hex character dropped.
pub fn branch_of(normalized_path: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(normalized_path.as_bytes());
    let digest = hasher.finalize();
    let hex = hex_encode(&digest);
    hex[..hex.len() - 1].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_strips_leading_slash() {
        let (normalized, components) = split("/a/b/c.txt");
        assert_eq!(normalized, "a/b/c.txt");
        assert_eq!(components, vec!["a", "b", "c.txt"]);
    }

    #[test]
    fn split_empty_path_yields_empty_components() {
        let (normalized, components) = split("/");
        assert_eq!(normalized, "");
        assert!(components.is_empty());
    }

    #[test]
    fn split_relative_path_without_leading_slash() {
        let (normalized, components) = split("a/b");
        assert_eq!(normalized, "a/b");
        assert_eq!(components, vec!["a", "b"]);
    }

    #[test]
    fn branch_of_is_pure() {
        assert_eq!(branch_of("a/b"), branch_of("a/b"));
    }

    #[test]
    fn branch_of_drops_final_hex_char() {
        // sha1("a/b") = 3ec69c85a4ff96830024afeef2d4e512181c8f7b (40 hex chars)
        let branch = branch_of("a/b");
        assert_eq!(branch.len(), 39);
        assert_eq!(branch, "3ec69c85a4ff96830024afeef2d4e512181c8f7");
    }

    #[test]
    fn branch_of_differs_across_paths() {
        assert_ne!(branch_of("a/b"), branch_of("a/c"));
    }
}
