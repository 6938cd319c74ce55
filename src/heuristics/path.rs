//! Persistent tour paths.
//!
//! A [`TourPath`] is an immutable singly-linked list whose head is the most
//! recently added city. Prolonging a path allocates one node pointing to the
//! old one, so many partial tours can share a common history without
//! copying it.

use std::rc::Rc;

use crate::instance::NodeId;

#[derive(Debug)]
struct PathNode {
    node: NodeId,
    prev: Option<Rc<PathNode>>,
}

/// Immutable, cheaply clonable path of cities
#[derive(Debug, Clone)]
pub struct TourPath {
    head: Rc<PathNode>,
    len: usize,
}

impl TourPath {
    /// Single-city path
    pub fn new(node: NodeId) -> Self {
        TourPath {
            head: Rc::new(PathNode { node, prev: None }),
            len: 1,
        }
    }

    /// Build a path from cities in insertion order (first element is the
    /// oldest, last element becomes the head). Returns `None` when empty.
    pub fn from_sequence(nodes: &[NodeId]) -> Option<Self> {
        let (&first, rest) = nodes.split_first()?;
        Some(rest.iter().fold(TourPath::new(first), |path, &node| path.prolonged(node)))
    }

    /// New path with `node` as head. O(1), `self` is left untouched.
    pub fn prolonged(&self, node: NodeId) -> Self {
        TourPath {
            head: Rc::new(PathNode {
                node,
                prev: Some(Rc::clone(&self.head)),
            }),
            len: self.len + 1,
        }
    }

    /// Most recently added city
    #[inline]
    pub fn head(&self) -> NodeId {
        self.head.node
    }

    /// Number of cities in the path
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false, a path holds at least one city
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate from the head back to the first city
    pub fn iter(&self) -> PathIter<'_> {
        PathIter { next: Some(&self.head) }
    }

    /// Materialize the path.
    ///
    /// With `include_head == false` the head city is skipped. With
    /// `reverse == true` the result is in insertion order (oldest first),
    /// otherwise it starts from the head side.
    pub fn to_vec(&self, include_head: bool, reverse: bool) -> Vec<NodeId> {
        let skip = usize::from(!include_head);
        let mut nodes: Vec<NodeId> = Vec::with_capacity(self.len);
        nodes.extend(self.iter().skip(skip));
        if reverse {
            nodes.reverse();
        }
        nodes
    }
}

/// Iterator over a path from head to tail
pub struct PathIter<'a> {
    next: Option<&'a Rc<PathNode>>,
}

impl<'a> Iterator for PathIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = current.prev.as_ref();
        Some(current.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prolong_and_materialize() {
        let path = TourPath::new(0).prolonged(3).prolonged(1);

        assert_eq!(path.head(), 1);
        assert_eq!(path.len(), 3);
        assert_eq!(path.to_vec(true, true), vec![0, 3, 1]);
        assert_eq!(path.to_vec(true, false), vec![1, 3, 0]);
        assert_eq!(path.to_vec(false, false), vec![3, 0]);
        // restartable
        assert_eq!(path.to_vec(true, true), vec![0, 3, 1]);
    }

    #[test]
    fn test_shared_history() {
        let parent = TourPath::new(0).prolonged(2);
        let left = parent.prolonged(4);
        let right = parent.prolonged(5).prolonged(6);
        drop(parent);

        assert_eq!(left.to_vec(true, true), vec![0, 2, 4]);
        assert_eq!(right.to_vec(true, true), vec![0, 2, 5, 6]);
    }

    #[test]
    fn test_from_sequence() {
        let path = TourPath::from_sequence(&[7, 8, 9]).unwrap();
        assert_eq!(path.head(), 9);
        assert_eq!(path.to_vec(true, true), vec![7, 8, 9]);
        assert!(TourPath::from_sequence(&[]).is_none());
    }
}
