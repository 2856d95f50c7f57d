//! Parent-first ordering of scene nodes

use hashbrown::{HashMap, HashSet};

#[derive(Debug, Default)]
struct TreeNode {
    name: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Name hierarchy built from `(name, parent)` pairs
///
/// Parents that are never pushed themselves still get a node, so their
/// children are ordered after them.
#[derive(Debug, Default)]
pub struct HierarchyTree {
    nodes: Vec<TreeNode>,
    index: HashMap<String, usize>,
}

impl HierarchyTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str) -> usize {
        if let Some(&index) = self.index.get(name) {
            return index;
        }
        self.nodes.push(TreeNode {
            name: name.to_string(),
            ..Default::default()
        });
        self.index.insert(name.to_string(), self.nodes.len() - 1);
        self.nodes.len() - 1
    }

    pub fn push(&mut self, name: &str, parent: Option<&str>) {
        let index = self.node(name);
        let Some(parent) = parent.filter(|p| *p != name) else {
            return;
        };
        if self.nodes[index].parent.is_some() {
            return;
        }
        let parent = self.node(parent);
        self.nodes[index].parent = Some(parent);
        self.nodes[parent].children.push(index);
    }

    /// Every name, each parent before its children
    ///
    /// Roots come in insertion order. Nodes caught in a parent cycle are
    /// visited last, starting from the first one inserted.
    pub fn order(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();
        let roots = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| i);
        for root in roots.chain(0..self.nodes.len()) {
            if visited.contains(&root) {
                continue;
            }
            let mut stack = vec![root];
            while let Some(index) = stack.pop() {
                if !visited.insert(index) {
                    continue;
                }
                names.push(self.nodes[index].name.as_str());
                stack.extend(self.nodes[index].children.iter().rev());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_before_child() {
        let mut tree = HierarchyTree::new();
        tree.push("Box", Some("Ball"));
        tree.push("Ball", None);
        tree.push("Cone", Some("Box"));
        tree.push("Lamp", None);
        assert_eq!(tree.order(), vec!["Ball", "Box", "Cone", "Lamp"]);
    }

    #[test]
    fn test_siblings_keep_insertion_order() {
        let mut tree = HierarchyTree::new();
        tree.push("Root", None);
        tree.push("B", Some("Root"));
        tree.push("A", Some("Root"));
        assert_eq!(tree.order(), vec!["Root", "B", "A"]);
    }

    #[test]
    fn test_cycle_is_still_ordered() {
        let mut tree = HierarchyTree::new();
        tree.push("A", Some("B"));
        tree.push("B", Some("A"));
        tree.push("C", None);
        assert_eq!(tree.order(), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_self_parent_is_root() {
        let mut tree = HierarchyTree::new();
        tree.push("A", Some("A"));
        assert_eq!(tree.order(), vec!["A"]);
    }
}
