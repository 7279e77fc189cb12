//! In-memory Node Collections
//!
//! A [`NodeCollection`] is a flat result set of tree nodes that can be assembled
//! into a nested structure without touching the database:
//!
//! - [`link_children`](NodeCollection::link_children) fills every node's
//!   `children` relation from the other members of the set
//! - [`roots`](NodeCollection::roots) keeps nodes without a parent
//! - [`tree`](NodeCollection::tree) links children and keeps the shallowest nodes,
//!   which also works for partial sets that omit the real roots
//! - [`sort_by_depth`](NodeCollection::sort_by_depth) orders nodes by path depth

use crate::models::tree_node::{NodeKey, TreeEntity, TreeNode};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Ordered set of tree nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCollection<T = TreeNode> {
    nodes: Vec<T>,
}

impl<T> Default for NodeCollection<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T: TreeEntity> NodeCollection<T> {
    pub fn new(nodes: Vec<T>) -> Self {
        Self { nodes }
    }

    pub fn into_vec(self) -> Vec<T> {
        self.nodes
    }

    /// Attach each node's children from within this collection.
    ///
    /// Children are linked recursively, so grandchildren reachable through a
    /// linked child are populated too. Nodes without children receive an
    /// empty relation.
    ///
    /// Every member keeps its own copy of its subtree, so each linked subtree
    /// is cloned once into its parent. [`tree`](Self::tree) moves nodes instead.
    pub fn link_children(self) -> Self {
        let mut linked: Vec<Option<T>> = self.nodes.iter().map(|_| None).collect();

        for (index, children) in link_order(&self.nodes) {
            let mut node = self.nodes[index].clone();
            node.set_children(
                children
                    .into_iter()
                    .filter_map(|child| linked[child].clone())
                    .collect(),
            );
            linked[index] = Some(node);
        }

        Self {
            nodes: linked.into_iter().flatten().collect(),
        }
    }

    /// Nodes without a parent reference.
    pub fn roots(&self) -> Self {
        self.filter(|node| node.is_root())
    }

    /// Link children and keep only the nodes at the smallest depth present.
    pub fn tree(self) -> Self {
        let Some(min_depth) = self.nodes.iter().filter_map(TreeEntity::depth).min() else {
            return Self::default();
        };

        let order = link_order(&self.nodes);
        let top: Vec<bool> = self
            .nodes
            .iter()
            .map(|node| node.depth() == Some(min_depth))
            .collect();
        let mut slots: Vec<Option<T>> = self.nodes.into_iter().map(Some).collect();

        for (index, children) in order {
            let children = children
                .into_iter()
                .filter_map(|child| slots[child].take())
                .collect();
            if let Some(node) = slots[index].as_mut() {
                node.set_children(children);
            }
        }

        slots
            .into_iter()
            .zip(top)
            .filter_map(|(node, top)| if top { node } else { None })
            .collect()
    }

    /// Stable sort by path depth.
    pub fn sort_by_depth(mut self, descending: bool) -> Self {
        if descending {
            self.nodes.sort_by(|a, b| b.depth().cmp(&a.depth()));
        } else {
            self.nodes.sort_by_key(|node| node.depth());
        }
        self
    }

    pub fn sort_by_depth_desc(self) -> Self {
        self.sort_by_depth(true)
    }

    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&T) -> bool,
    {
        Self {
            nodes: self
                .nodes
                .iter()
                .filter(|node| predicate(node))
                .cloned()
                .collect(),
        }
    }

    pub fn prepend(mut self, node: T) -> Self {
        self.nodes.insert(0, node);
        self
    }

    pub fn keys(&self) -> Vec<NodeKey> {
        self.nodes
            .iter()
            .filter_map(|node| node.key().cloned())
            .collect()
    }

    pub fn contains_key(&self, key: &NodeKey) -> bool {
        self.nodes.iter().any(|node| node.key() == Some(key))
    }

    pub fn find(&self, key: &NodeKey) -> Option<&T> {
        self.nodes.iter().find(|node| node.key() == Some(key))
    }
}

/// Nodes in post-order, each with the indexes of the children to attach.
///
/// Children always come before their parent. A child reference that leads
/// back to a node still being visited is dropped, so cyclic parent keys end
/// without looping.
fn link_order<T: TreeEntity>(nodes: &[T]) -> Vec<(usize, Vec<usize>)> {
    enum Visit {
        Enter(usize),
        Exit(usize),
    }

    let mut by_parent: HashMap<&NodeKey, Vec<usize>> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        if let Some(parent) = node.parent_key() {
            by_parent.entry(parent).or_default().push(index);
        }
    }
    let children_of: Vec<&[usize]> = nodes
        .iter()
        .map(|node| {
            node.key()
                .and_then(|key| by_parent.get(key))
                .map_or(&[][..], Vec::as_slice)
        })
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    let mut done = vec![false; nodes.len()];
    let mut visiting = vec![false; nodes.len()];

    for start in 0..nodes.len() {
        let mut stack = vec![Visit::Enter(start)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(index) => {
                    if done[index] || visiting[index] {
                        continue;
                    }
                    visiting[index] = true;
                    stack.push(Visit::Exit(index));
                    stack.extend(
                        children_of[index]
                            .iter()
                            .rev()
                            .map(|&child| Visit::Enter(child)),
                    );
                }
                Visit::Exit(index) => {
                    visiting[index] = false;
                    done[index] = true;
                    let children = children_of[index]
                        .iter()
                        .copied()
                        .filter(|&child| done[child] && child != index)
                        .collect();
                    order.push((index, children));
                }
            }
        }
    }

    order
}

impl<T> Deref for NodeCollection<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.nodes
    }
}

impl<T> DerefMut for NodeCollection<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.nodes
    }
}

impl<T> From<Vec<T>> for NodeCollection<T> {
    fn from(nodes: Vec<T>) -> Self {
        Self { nodes }
    }
}

impl<T> FromIterator<T> for NodeCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for NodeCollection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a NodeCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::path::Path;
    use crate::models::tree_node::StoredNode;
    use serde_json::json;

    fn node(key: &str, parent: Option<&str>, path: &str) -> TreeNode {
        TreeNode::from_stored(StoredNode {
            key: NodeKey::from(key),
            parent_key: parent.map(NodeKey::from),
            source: None,
            path: Some(Path::parse(path).unwrap()),
            properties: json!({}),
            created_at: None,
            modified_at: None,
        })
    }

    fn chain_with_unrelated_root() -> NodeCollection {
        NodeCollection::new(vec![
            node("1", None, "1"),
            node("2", Some("1"), "1.2"),
            node("3", Some("2"), "1.2.3"),
            node("9", None, "9"),
        ])
    }

    #[test]
    fn test_link_children_sets_empty_relation_for_leaves() {
        let linked = chain_with_unrelated_root().link_children();

        let leaf = linked.find(&NodeKey::from("3")).unwrap();
        assert_eq!(leaf.children(), Some(&[][..]));

        let root = linked.find(&NodeKey::from("1")).unwrap();
        let children = root.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].key, Some(NodeKey::from("2")));
    }

    #[test]
    fn test_tree_returns_shallowest_nodes_with_nested_children() {
        let tree = chain_with_unrelated_root().tree();

        assert_eq!(tree.keys(), vec![NodeKey::from("1"), NodeKey::from("9")]);

        let root = &tree[0];
        let child = &root.children().unwrap()[0];
        assert_eq!(child.key, Some(NodeKey::from("2")));

        let grandchild = &child.children().unwrap()[0];
        assert_eq!(grandchild.key, Some(NodeKey::from("3")));
        assert!(grandchild.children().unwrap().is_empty());
    }

    #[test]
    fn test_tree_on_partial_set_starts_below_missing_root() {
        let partial = NodeCollection::new(vec![
            node("2", Some("1"), "1.2"),
            node("3", Some("2"), "1.2.3"),
            node("4", Some("2"), "1.2.4"),
        ]);

        let tree = partial.tree();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children().unwrap().len(), 2);
    }

    #[test]
    fn test_roots_filters_parentless_nodes() {
        let roots = chain_with_unrelated_root().roots();
        assert_eq!(roots.keys(), vec![NodeKey::from("1"), NodeKey::from("9")]);
    }

    #[test]
    fn test_sort_by_depth_is_stable() {
        let nodes = NodeCollection::new(vec![
            node("3", Some("2"), "1.2.3"),
            node("1", None, "1"),
            node("9", None, "9"),
            node("2", Some("1"), "1.2"),
        ]);

        let ascending = nodes.clone().sort_by_depth(false);
        assert_eq!(
            ascending.keys(),
            vec![
                NodeKey::from("1"),
                NodeKey::from("9"),
                NodeKey::from("2"),
                NodeKey::from("3")
            ]
        );

        let descending = nodes.sort_by_depth_desc();
        assert_eq!(
            descending.keys(),
            vec![
                NodeKey::from("3"),
                NodeKey::from("2"),
                NodeKey::from("1"),
                NodeKey::from("9")
            ]
        );
    }

    #[test]
    fn test_tree_links_deep_chain() {
        let mut nodes = Vec::new();
        let mut path = String::from("1");
        nodes.push(node("1", None, &path));
        for key in 2..=2000 {
            path = format!("{}.{}", path, key);
            let parent = (key - 1).to_string();
            nodes.push(node(&key.to_string(), Some(&parent), &path));
        }
        nodes.reverse();

        let tree = NodeCollection::new(nodes).tree();
        assert_eq!(tree.keys(), vec![NodeKey::from("1")]);

        let mut depth = 1;
        let mut current = &tree[0];
        while let Some([child]) = current.children() {
            depth += 1;
            current = child;
        }
        assert_eq!(depth, 2000);
        assert_eq!(current.key, Some(NodeKey::from("2000")));
        assert_eq!(current.children(), Some(&[][..]));
    }

    #[test]
    fn test_link_children_stops_on_cyclic_parent_keys() {
        let linked = NodeCollection::new(vec![
            node("1", Some("2"), "2.1"),
            node("2", Some("1"), "1.2"),
        ])
        .link_children();

        assert_eq!(linked.len(), 2);
        let first = &linked[0];
        let second = &first.children().unwrap()[0];
        assert_eq!(second.key, Some(NodeKey::from("2")));
        assert!(second.children().unwrap().is_empty());
    }

    #[test]
    fn test_empty_collection_tree_is_empty() {
        let empty: NodeCollection = NodeCollection::default();
        assert!(empty.tree().is_empty());
    }
}
