//! Secondary lookup indices.
//!
//! The indices are derived from the node set and never authoritative. Every
//! insertion and removal in [`ProtocolGraph`](super::ProtocolGraph) updates
//! them in the same `&mut self` call, and [`GraphIndices::verify`] can check
//! that they have not diverged.

use crate::domain::{Node, NodeKind};
use crate::urn;
use std::collections::{BTreeSet, HashMap};

/// Normalized-URN, kind and authority indices.
#[derive(Debug, Default)]
pub(crate) struct GraphIndices {
    by_normalized: HashMap<String, BTreeSet<String>>,
    by_kind: HashMap<NodeKind, BTreeSet<String>>,
    by_authority: HashMap<String, BTreeSet<String>>,
}

impl GraphIndices {
    pub(crate) fn insert(&mut self, node_urn: &str, kind: NodeKind, authority: &str) {
        self.by_normalized
            .entry(urn::normalize(node_urn))
            .or_default()
            .insert(node_urn.to_string());
        self.by_kind
            .entry(kind)
            .or_default()
            .insert(node_urn.to_string());
        self.by_authority
            .entry(authority.to_string())
            .or_default()
            .insert(node_urn.to_string());
    }

    pub(crate) fn remove(&mut self, node_urn: &str, kind: NodeKind, authority: &str) {
        remove_from(&mut self.by_normalized, &urn::normalize(node_urn), node_urn);
        remove_from(&mut self.by_kind, &kind, node_urn);
        remove_from(&mut self.by_authority, &authority.to_string(), node_urn);
    }

    pub(crate) fn change_kind(&mut self, node_urn: &str, old: NodeKind, new: NodeKind) {
        if old == new {
            return;
        }
        remove_from(&mut self.by_kind, &old, node_urn);
        self.by_kind
            .entry(new)
            .or_default()
            .insert(node_urn.to_string());
    }

    pub(crate) fn clear(&mut self) {
        self.by_normalized.clear();
        self.by_kind.clear();
        self.by_authority.clear();
    }

    pub(crate) fn versions_of(&self, normalized: &str) -> impl Iterator<Item = &String> {
        self.by_normalized.get(normalized).into_iter().flatten()
    }

    pub(crate) fn of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &String> {
        self.by_kind.get(&kind).into_iter().flatten()
    }

    pub(crate) fn of_authority(&self, authority: &str) -> impl Iterator<Item = &String> {
        self.by_authority.get(authority).into_iter().flatten()
    }

    pub(crate) fn kind_counts(&self) -> impl Iterator<Item = (NodeKind, usize)> + '_ {
        self.by_kind.iter().map(|(kind, urns)| (*kind, urns.len()))
    }

    pub(crate) fn authority_count(&self) -> usize {
        self.by_authority.len()
    }

    /// Describe every divergence between the indices and `nodes`.
    pub(crate) fn verify<'a>(&self, nodes: impl Iterator<Item = &'a Node>) -> Vec<String> {
        let mut problems = Vec::new();
        let mut expected = GraphIndices::default();
        for node in nodes {
            let authority = urn::authority(&node.urn).unwrap_or_default();
            expected.insert(&node.urn, node.kind, &authority);
        }

        if expected.by_normalized != self.by_normalized {
            problems.push("normalized-URN index does not match node set".to_string());
        }
        if expected.by_kind != self.by_kind {
            problems.push("kind index does not match node set".to_string());
        }
        if expected.by_authority != self.by_authority {
            problems.push("authority index does not match node set".to_string());
        }
        problems
    }
}

fn remove_from<K>(index: &mut HashMap<K, BTreeSet<String>>, key: &K, node_urn: &str)
where
    K: std::hash::Hash + Eq,
{
    if let Some(set) = index.get_mut(key) {
        set.remove(node_urn);
        if set.is_empty() {
            index.remove(key);
        }
    }
}
