use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CmdId;

/// Address of a command nested inside containers: the top-level command id followed by one
/// child index per level, e.g. `[submit, command buffer, command]`.
///
/// Orders lexicographically, so a container sorts before everything inside it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubCmdIdx(Vec<u64>);

impl SubCmdIdx {
    pub fn new() -> Self {
        Self::default()
    }

    /// The address of top-level command `id` itself.
    pub fn top(id: CmdId) -> Self {
        Self(vec![id.0])
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, index: u64) {
        self.0.push(index);
    }

    /// The address of child `index` of the command at `self`.
    pub fn child(&self, index: u64) -> Self {
        let mut idx = self.clone();
        idx.push(index);
        idx
    }

    pub fn join(&self, suffix: &SubCmdIdx) -> Self {
        let mut idx = self.clone();
        idx.0.extend_from_slice(&suffix.0);
        idx
    }

    pub fn parent(&self) -> Option<SubCmdIdx> {
        let (_, parent) = self.0.split_last()?;
        Some(Self(parent.to_vec()))
    }

    /// True when `other` is a prefix of `self`, i.e. the command at `other` contains (or is)
    /// the command at `self`.
    pub fn contains(&self, other: &SubCmdIdx) -> bool {
        self.0.starts_with(&other.0)
    }

    /// The part of `self` below `prefix`, if `prefix` contains `self`.
    pub fn strip_prefix(&self, prefix: &SubCmdIdx) -> Option<SubCmdIdx> {
        self.0.strip_prefix(prefix.0.as_slice()).map(|rest| Self(rest.to_vec()))
    }
}

impl From<Vec<u64>> for SubCmdIdx {
    fn from(indices: Vec<u64>) -> Self {
        Self(indices)
    }
}

impl From<&[u64]> for SubCmdIdx {
    fn from(indices: &[u64]) -> Self {
        Self(indices.to_vec())
    }
}

impl fmt::Display for SubCmdIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{index}")?;
        }
        f.write_str("]")
    }
}

/// Prefix tree keyed by [`SubCmdIdx`]. Every node may hold a value; children are kept in
/// index order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubCmdIdxTrie<V> {
    value: Option<V>,
    children: BTreeMap<u64, SubCmdIdxTrie<V>>,
}

impl<V> Default for SubCmdIdxTrie<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<V> SubCmdIdxTrie<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` at `idx`, returning the value it replaces.
    pub fn insert(&mut self, idx: &SubCmdIdx, value: V) -> Option<V> {
        let node = idx
            .as_slice()
            .iter()
            .fold(self, |node, index| node.children.entry(*index).or_default());
        node.value.replace(value)
    }

    pub fn get(&self, idx: &SubCmdIdx) -> Option<&V> {
        self.node(idx)?.value.as_ref()
    }

    /// The subtree rooted at `idx`.
    pub fn node(&self, idx: &SubCmdIdx) -> Option<&SubCmdIdxTrie<V>> {
        idx.as_slice()
            .iter()
            .try_fold(self, |node, index| node.children.get(index))
    }

    /// Detaches and returns the subtree rooted at `idx`. Removing the empty address takes
    /// the whole trie.
    pub fn remove_subtree(&mut self, idx: &SubCmdIdx) -> Option<SubCmdIdxTrie<V>> {
        let Some((last, parents)) = idx.as_slice().split_last() else {
            return Some(std::mem::take(self));
        };
        let mut node = self;
        for index in parents {
            node = node.children.get_mut(index)?;
        }
        node.children.remove(last)
    }

    /// The value stored at this node itself.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn child(&self, index: u64) -> Option<&SubCmdIdxTrie<V>> {
        self.children.get(&index)
    }

    /// Direct children in index order.
    pub fn children(&self) -> impl Iterator<Item = (u64, &SubCmdIdxTrie<V>)> {
        self.children.iter().map(|(index, node)| (*index, node))
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// All stored values in address order, parents before children.
    pub fn values(&self) -> Vec<&V> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.extend(node.value.as_ref());
            stack.extend(node.children.values().rev());
        }
        out
    }
}
