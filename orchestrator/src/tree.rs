/// A node's place in the spanning tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeNode {
    /// `None` for the root.
    pub parent: Option<usize>,
    pub kids: u16,
}

/// Lays `n` nodes out as a binary tree.
///
/// The root of every subtree is the node at `2^floor(log2(len)) - 1` from its
/// start, the nodes before it form the left subtree and the ones after it the
/// right subtree. No node has more than 2 children and the height is `floor(log2(n))`.
pub fn build_tree(n: usize) -> Vec<TreeNode> {
    let mut nodes = vec![TreeNode::default(); n];
    if n > 0 {
        subtree(&mut nodes, 0, n);
    }

    nodes
}

/// Builds the subtree of `len` nodes starting at `offset` and returns its root.
fn subtree(nodes: &mut [TreeNode], offset: usize, len: usize) -> usize {
    if len == 1 {
        return offset;
    }

    let root = (1 << len.ilog2()) - 1;
    let me = offset + root;

    let left_len = root;
    let right_len = len - root - 1;

    for (start, len) in [(offset, left_len), (me + 1, right_len)] {
        if len > 0 {
            let kid = subtree(nodes, start, len);
            nodes[kid].parent = Some(me);
            nodes[me].kids += 1;
        }
    }

    me
}
