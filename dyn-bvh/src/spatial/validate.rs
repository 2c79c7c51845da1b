use crate::{Error, Result};

use super::{NodeAdapter, NodeContent, NodeId, VolumeTree};

impl<T, A> VolumeTree<T, A>
where
    T: Clone + PartialEq,
    A: NodeAdapter<T>,
{
    /// Walks the whole tree and checks its structural invariants.
    ///
    /// Checked are the tight bounds, the depths and parent links, that only the root may be an
    /// empty leaf, that the adapter maps every object to its leaf and that no node is unreachable.
    /// Bounds grown through [`VolumeTree::expand_leaf`] are conservative and fail the check until
    /// they get refit.
    pub fn validate(&self) -> Result<()> {
        let root = self
            .node(self.root)
            .ok_or_else(|| violation(format!("root {} does not exist", self.root)))?;
        if root.parent.is_some() {
            return Err(violation(format!("root {} has a parent", self.root)));
        }

        let mut num_visited = 0;
        let mut stack: Vec<(NodeId, Option<NodeId>, usize)> = vec![(self.root, None, 0)];

        while let Some((id, parent, depth)) = stack.pop() {
            num_visited += 1;
            if num_visited > self.count_nodes() {
                return Err(violation("the tree contains a cycle".to_string()));
            }

            let node = self
                .node(id)
                .ok_or_else(|| violation(format!("node {} does not exist", id)))?;

            if node.parent != parent {
                return Err(violation(format!(
                    "node {} links to parent {:?} instead of {:?}",
                    id, node.parent, parent
                )));
            }

            if node.depth != depth {
                return Err(violation(format!(
                    "node {} has depth {} instead of {}",
                    id, node.depth, depth
                )));
            }

            if node.bound != self.tight_bound(id) {
                return Err(violation(format!(
                    "bound {} of node {} is not tight",
                    node.bound, id
                )));
            }

            match &node.content {
                NodeContent::Leaf(objects) => {
                    if objects.is_empty() && id != self.root {
                        return Err(violation(format!("leaf {} is empty", id)));
                    }

                    if objects.iter().any(|o| self.adapter.get_leaf(o) != Some(id)) {
                        return Err(violation(format!(
                            "an object of leaf {} is mapped elsewhere",
                            id
                        )));
                    }
                }
                NodeContent::Internal([left, right]) => {
                    if left == right {
                        return Err(violation(format!("node {} has twice the same child", id)));
                    }

                    stack.push((*left, Some(id), depth + 1));
                    stack.push((*right, Some(id), depth + 1));
                }
            }
        }

        if num_visited != self.count_nodes() {
            return Err(violation(format!(
                "{} of {} nodes are reachable from the root",
                num_visited,
                self.count_nodes()
            )));
        }

        Ok(())
    }
}

fn violation(msg: String) -> Error {
    Error::InvariantViolation(msg)
}
