//! The in-memory recursive namespace mirroring the manifest plus locally
//! created entries.
//!
//! A directory name maps to another mapping; a filename maps to an integer
//! byte count. This mirrors Python's nested-dict `dir_structure` from the
//! reference implementation, but as a tagged variant so a reader can tell
//! file and directory nodes apart without inspecting their contents.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Directory(BTreeMap<String, Node>),
    File(u64),
}

impl Node {
    pub fn new_root() -> Node {
        Node::Directory(BTreeMap::new())
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_directory(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Directory(map) => Some(map),
            Node::File(_) => None,
        }
    }

    pub fn as_file_size(&self) -> Option<u64> {
        match self {
            Node::File(size) => Some(*size),
            Node::Directory(_) => None,
        }
    }

    /// Looks up the node at `components` relative to `self`. An empty
    /// component list returns `self`.
    pub fn get<'a>(&'a self, components: &[String]) -> Option<&'a Node> {
        let mut current = self;
        for component in components {
            current = current.as_directory()?.get(component)?;
        }
        Some(current)
    }

    /// Sets the node at `components` to `value`, creating intermediate
    /// directories as needed. A no-op on an empty component list (there is
    /// nowhere to store the value).
    pub fn set(&mut self, components: &[String], value: Node) {
        let Some((last, ancestors)) = components.split_last() else {
            return;
        };
        let mut current = self;
        for component in ancestors {
            current = current
                .as_directory_mut_or_insert(component.clone())
                .expect("ancestor component collided with a file leaf");
        }
        if let Node::Directory(map) = current {
            map.insert(last.clone(), value);
        }
    }

    /// Removes the leaf at `components`. If `collapse_empty` is set, walks
    /// back up the ancestor chain removing directories that became empty.
    pub fn delete(&mut self, components: &[String], collapse_empty: bool) {
        let Some((last, ancestors)) = components.split_last() else {
            return;
        };
        if let Some(parent) = self.get_mut(ancestors) {
            if let Node::Directory(map) = parent {
                map.remove(last);
            }
        }
        if collapse_empty {
            for depth in (0..ancestors.len()).rev() {
                let path = &ancestors[..=depth];
                let is_empty = self
                    .get(path)
                    .and_then(Node::as_directory)
                    .map(BTreeMap::is_empty)
                    .unwrap_or(false);
                if !is_empty {
                    break;
                }
                let (leaf, rest) = path.split_last().unwrap();
                if let Some(Node::Directory(map)) = self.get_mut(rest) {
                    map.remove(leaf);
                }
            }
        }
    }

    fn get_mut<'a>(&'a mut self, components: &[String]) -> Option<&'a mut Node> {
        let mut current = self;
        for component in components {
            current = match current {
                Node::Directory(map) => map.get_mut(component)?,
                Node::File(_) => return None,
            };
        }
        Some(current)
    }

    fn as_directory_mut_or_insert(&mut self, component: String) -> Option<&mut Node> {
        match self {
            Node::Directory(map) => Some(
                map.entry(component)
                    .or_insert_with(|| Node::Directory(BTreeMap::new())),
            ),
            Node::File(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comps(s: &str) -> Vec<String> {
        s.split('/').map(str::to_string).collect()
    }

    #[test]
    fn set_and_get_nested_file() {
        let mut root = Node::new_root();
        root.set(&comps("a/b/c.txt"), Node::File(5));
        assert_eq!(root.get(&comps("a/b/c.txt")), Some(&Node::File(5)));
        assert!(root.get(&comps("a")).unwrap().is_directory());
        assert!(root.get(&comps("a/b")).unwrap().is_directory());
    }

    #[test]
    fn get_missing_path_is_none() {
        let root = Node::new_root();
        assert_eq!(root.get(&comps("missing")), None);
    }

    #[test]
    fn delete_without_collapse_leaves_empty_ancestors() {
        let mut root = Node::new_root();
        root.set(&comps("a/b"), Node::File(1));
        root.delete(&comps("a/b"), false);
        assert!(root.get(&comps("a")).unwrap().as_directory().unwrap().is_empty());
    }

    #[test]
    fn delete_with_collapse_removes_empty_ancestor_chain() {
        let mut root = Node::new_root();
        root.set(&comps("a/b/c"), Node::File(1));
        root.delete(&comps("a/b/c"), true);
        assert_eq!(root.get(&comps("a")), None);
    }

    #[test]
    fn delete_with_collapse_stops_at_non_empty_ancestor() {
        let mut root = Node::new_root();
        root.set(&comps("a/b/c"), Node::File(1));
        root.set(&comps("a/other"), Node::File(2));
        root.delete(&comps("a/b/c"), true);
        assert_eq!(root.get(&comps("a/b")), None);
        assert!(root.get(&comps("a")).is_some());
        assert_eq!(root.get(&comps("a/other")), Some(&Node::File(2)));
    }
}
