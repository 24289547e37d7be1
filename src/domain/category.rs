//! Vendor category tree
//!
//! The category reference file is a flat list of nodes with parent
//! pointers. `CategoryIndex` builds the lookup structures needed for the
//! two tree walks the import performs: ancestor chains up to the root
//! sentinel (for materialization order) and descendant expansion (for
//! widening a category selection to its whole subtree).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Parent id carried by top-level vendor categories. The sentinel itself
/// is never materialized.
pub const ROOT_PARENT_ID: &str = "1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CategoryNode {
    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_PARENT_ID
    }
}

/// Lookup index over the category reference file.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    nodes: HashMap<String, CategoryNode>,
    children: HashMap<String, Vec<String>>,
}

impl CategoryIndex {
    pub fn from_nodes(nodes: Vec<CategoryNode>) -> Self {
        let mut index = Self {
            nodes: HashMap::with_capacity(nodes.len()),
            children: HashMap::new(),
        };
        for node in nodes {
            index
                .children
                .entry(node.parent_id.clone())
                .or_default()
                .push(node.id.clone());
            index.nodes.insert(node.id.clone(), node);
        }
        index
    }

    pub fn get(&self, id: &str) -> Option<&CategoryNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Chain from `id` up to (but excluding) the root sentinel, leaf
    /// first. Unknown ids yield an empty chain; a malformed tree with a
    /// parent cycle terminates at the first repeated node.
    pub fn ancestors_to_root(&self, id: &str) -> Vec<&CategoryNode> {
        let mut chain = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cursor = id;
        while cursor != ROOT_PARENT_ID && seen.insert(cursor) {
            match self.nodes.get(cursor) {
                Some(node) => {
                    chain.push(node);
                    cursor = &node.parent_id;
                }
                None => break,
            }
        }
        chain
    }

    /// `id` plus every transitive child, in breadth-first order. Used to
    /// widen a requested category selection to its full subtree.
    pub fn with_descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue = vec![id];
        while let Some(current) = queue.pop() {
            if !seen.insert(current) {
                continue;
            }
            out.push(current.to_string());
            if let Some(children) = self.children.get(current) {
                queue.extend(children.iter().map(String::as_str));
            }
        }
        out
    }
}
