//! Arena-allocated arithmetic expression graphs.
//!
//! Operands always precede the node that uses them, so the arena order is a
//! topological order and a graph cannot contain cycles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a node in an [`ExprGraph`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Inv,
    Sqr,
}

/// Elementary field operation, as reported to observers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Neg,
    Inv,
    Sqr,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            OpKind::Add => "+",
            OpKind::Sub => "-",
            OpKind::Mul => "*",
            OpKind::Neg => "neg",
            OpKind::Inv => "inv",
            OpKind::Sqr => "^2",
        };
        f.write_str(symbol)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Node {
    /// Value bound by the caller at evaluation time.
    Input(u16),
    Constant(u64),
    Binary(BinaryOp, NodeId, NodeId),
    Unary(UnaryOp, NodeId),
}

impl Node {
    /// The operation this node performs; inputs and constants perform none.
    pub fn op(&self) -> Option<OpKind> {
        match self {
            Node::Input(_) | Node::Constant(_) => None,
            Node::Binary(BinaryOp::Add, ..) => Some(OpKind::Add),
            Node::Binary(BinaryOp::Sub, ..) => Some(OpKind::Sub),
            Node::Binary(BinaryOp::Mul, ..) => Some(OpKind::Mul),
            Node::Unary(UnaryOp::Neg, _) => Some(OpKind::Neg),
            Node::Unary(UnaryOp::Inv, _) => Some(OpKind::Inv),
            Node::Unary(UnaryOp::Sqr, _) => Some(OpKind::Sqr),
        }
    }

    pub fn operands(&self) -> impl Iterator<Item = NodeId> {
        let (a, b) = match *self {
            Node::Input(_) | Node::Constant(_) => (None, None),
            Node::Binary(_, a, b) => (Some(a), Some(b)),
            Node::Unary(_, a) => (Some(a), None),
        };
        a.into_iter().chain(b)
    }
}

/// Operation counts of a graph.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCounts {
    pub additions: usize,
    pub multiplications: usize,
    pub squarings: usize,
    pub negations: usize,
    pub inversions: usize,
}

impl OpCounts {
    pub fn total(&self) -> usize {
        self.additions + self.multiplications + self.squarings + self.negations + self.inversions
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExprGraph {
    nodes: Vec<Node>,
}

impl ExprGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeId(i as u32), node))
    }

    pub fn input(&mut self, slot: u16) -> NodeId {
        self.push(Node::Input(slot))
    }

    pub fn constant(&mut self, value: u64) -> NodeId {
        self.push(Node::Constant(value))
    }

    pub fn binary(&mut self, op: BinaryOp, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::Binary(op, a, b))
    }

    pub fn unary(&mut self, op: UnaryOp, a: NodeId) -> NodeId {
        self.push(Node::Unary(op, a))
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn neg(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Neg, a)
    }

    pub fn inv(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Inv, a)
    }

    pub fn sqr(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Sqr, a)
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for operand in node.operands() {
            assert!(operand < id, "operand {operand:?} does not precede node {id:?}");
        }
        self.nodes.push(node);
        id
    }

    /// Number of input slots referenced (highest slot + 1).
    pub fn input_count(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Input(slot) => Some(*slot as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// For every node, the bitmask of input *groups* it depends on, where
    /// `group` maps an input slot to a group index below 64.
    pub fn dependency_masks(&self, group: impl Fn(u16) -> Option<u32>) -> Vec<u64> {
        let mut masks: Vec<u64> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let mask = match node {
                Node::Input(slot) => group(*slot).map_or(0, |g| 1u64 << g),
                _ => node.operands().fold(0, |acc, id| acc | masks[id.index()]),
            };
            masks.push(mask);
        }
        masks
    }

    /// Marks the nodes that `roots` depend on.
    pub fn reachable(&self, roots: &[NodeId]) -> Vec<bool> {
        let mut live = vec![false; self.nodes.len()];
        for root in roots {
            live[root.index()] = true;
        }
        for index in (0..self.nodes.len()).rev() {
            if live[index] {
                for operand in self.nodes[index].operands() {
                    live[operand.index()] = true;
                }
            }
        }
        live
    }

    pub fn op_counts(&self) -> OpCounts {
        let mut counts = OpCounts::default();
        for node in &self.nodes {
            match node.op() {
                Some(OpKind::Add | OpKind::Sub) => counts.additions += 1,
                Some(OpKind::Mul) => counts.multiplications += 1,
                Some(OpKind::Sqr) => counts.squarings += 1,
                Some(OpKind::Neg) => counts.negations += 1,
                Some(OpKind::Inv) => counts.inversions += 1,
                None => {}
            }
        }
        counts
    }
}
