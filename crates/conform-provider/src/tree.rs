use std::collections::BTreeMap;

use crate::error::ProviderError;

/// The host-file editor: a tree of `/files/…` paths with string values,
/// in the style of an augeas context. Sibling list entries are addressed
/// with a bracketed index suffix (`…/alias[1]`, `…/alias[2]`).
pub trait TreeEditor {
    /// Direct child nodes matching a `<base>/*` pattern, sorted.
    fn matches(&self, pattern: &str) -> Result<Vec<String>, ProviderError>;

    fn get(&self, path: &str) -> Result<Option<String>, ProviderError>;

    fn set(&mut self, path: &str, value: &str) -> Result<(), ProviderError>;

    /// Remove `path` and everything beneath it (including indexed
    /// siblings). Returns how many nodes were removed.
    fn rm(&mut self, path: &str) -> Result<usize, ProviderError>;

    /// Values of the node named by `pattern` and all its indexed siblings,
    /// in index order.
    fn get_all(&self, pattern: &str) -> Result<Vec<String>, ProviderError>;
}

/// In-memory tree editor over a flat path→value map.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    nodes: BTreeMap<String, String>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, value: impl Into<String>) {
        self.nodes.insert(path.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The numeric index of an indexed sibling path, e.g. `…/alias[3]` → 3.
/// A bare (unindexed) path counts as index 0.
fn sibling_index(path: &str, base: &str) -> Option<u32> {
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        return Some(0);
    }
    rest.strip_prefix('[')?.strip_suffix(']')?.parse().ok()
}

impl TreeEditor for MemoryTree {
    fn matches(&self, pattern: &str) -> Result<Vec<String>, ProviderError> {
        let base = pattern.strip_suffix("/*").ok_or_else(|| {
            ProviderError::new("tree match", format!("unsupported pattern '{}'", pattern))
        })?;
        let prefix = format!("{}/", base);

        let mut children: Vec<String> = Vec::new();
        for key in self.nodes.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                let child = match rest.find('/') {
                    Some(i) => &rest[..i],
                    None => rest,
                };
                let path = format!("{}/{}", base, child);
                if !children.contains(&path) {
                    children.push(path);
                }
            }
        }
        children.sort();
        Ok(children)
    }

    fn get(&self, path: &str) -> Result<Option<String>, ProviderError> {
        Ok(self.nodes.get(path).cloned())
    }

    fn set(&mut self, path: &str, value: &str) -> Result<(), ProviderError> {
        self.nodes.insert(path.to_string(), value.to_string());
        Ok(())
    }

    fn rm(&mut self, path: &str) -> Result<usize, ProviderError> {
        let subtree = format!("{}/", path);
        let indexed = format!("{}[", path);
        let before = self.nodes.len();
        self.nodes
            .retain(|k, _| k != path && !k.starts_with(&subtree) && !k.starts_with(&indexed));
        Ok(before - self.nodes.len())
    }

    fn get_all(&self, pattern: &str) -> Result<Vec<String>, ProviderError> {
        let mut found: Vec<(u32, String)> = self
            .nodes
            .iter()
            .filter_map(|(k, v)| sibling_index(k, pattern).map(|i| (i, v.clone())))
            .collect();
        found.sort_by_key(|(i, _)| *i);
        Ok(found.into_iter().map(|(_, v)| v).collect())
    }
}
