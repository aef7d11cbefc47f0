#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingPattern {
    pub prev: usize,
    pub next: usize,
    pub user_ranks: Vec<usize>,
    // rank 0's distance to my rank along the ring send path
    pub index: usize,
}

impl RingPattern {
    /// Ring seen from `rank`, following `order` on the send path.
    /// Returns `None` when `rank` is not part of the ring.
    pub fn from_order(order: &[usize], rank: usize) -> Option<Self> {
        let n = order.len();
        let pos = order.iter().position(|&r| r == rank)?;
        let pos_zero = order.iter().position(|&r| r == 0).unwrap_or(0);
        Some(RingPattern {
            prev: order[(pos + n - 1) % n],
            next: order[(pos + 1) % n],
            user_ranks: order.to_vec(),
            index: (pos + n - pos_zero) % n,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreePattern {
    pub up: Option<usize>,
    pub down: Vec<usize>,
}

impl TreePattern {
    /// Chain inside each node, binary tree over the first rank of every
    /// node. `node_orders` lists each node's ranks in chain order.
    pub fn from_node_orders(node_orders: &[Vec<usize>], rank: usize) -> Option<Self> {
        let (node_idx, pos) = node_orders.iter().enumerate().find_map(|(i, order)| {
            order.iter().position(|&r| r == rank).map(|pos| (i, pos))
        })?;
        let order = &node_orders[node_idx];
        let mut tree = TreePattern::default();
        if pos > 0 {
            tree.up = Some(order[pos - 1]);
        } else if node_idx > 0 {
            tree.up = node_orders[(node_idx - 1) / 2].first().copied();
        }
        if let Some(&next) = order.get(pos + 1) {
            tree.down.push(next);
        }
        if pos == 0 {
            for child in [2 * node_idx + 1, 2 * node_idx + 2] {
                if let Some(&leader) = node_orders.get(child).and_then(|o| o.first()) {
                    tree.down.push(leader);
                }
            }
        }
        Some(tree)
    }
}
