//! Single-source shortest path with early termination.
//!
//! The search is generic over a [`SearchSpace`] so the voxel rules (which
//! cells are walkable, what an edge costs, when a branch may stop) live
//! with the graph builder and the algorithm stays testable on small toy
//! spaces. The traversal itself is `pathfinding`'s Dijkstra iterator, which
//! yields nodes in the order they are settled.
//!
//! Edge costs may be negative. Nodes are settled at most once, so a cheap
//! edge discovered after a node is settled does not reopen it; this keeps
//! the search finite and matches plain Dijkstra on non-negative costs.

use std::fmt::Debug;
use std::hash::Hash;

use hashbrown::{HashMap, HashSet};
use pathfinding::directed::dijkstra::dijkstra_reach;

/// Edge costs are scaled to integers for the search.
const COST_SCALE: f64 = 1000.0;

/// Rules of a search space.
pub trait SearchSpace {
    type Node: Copy + Eq + Hash + Debug;

    /// Whether `node` may be entered at all.
    fn is_valid_node(&self, node: Self::Node) -> bool;

    /// Cost of moving `from` -> `to`. `f64::INFINITY` marks an impassable edge.
    fn edge_cost(&self, from: Self::Node, to: Self::Node) -> f64;

    /// Append the successors of `node` to `out`.
    fn neighbors(&self, node: Self::Node, out: &mut Vec<Self::Node>);

    /// Whether the search may stop once `node` is settled.
    fn is_goal(&self, node: Self::Node) -> bool;
}

/// Result of [`shortest_path`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome<N> {
    /// From the start node to the terminal node, both included.
    pub path: Vec<N>,
    /// Accumulated cost along `path`.
    pub cost: f64,
    /// `false` when the space was exhausted and the path ends at the last
    /// settled node instead of a goal.
    pub reached_goal: bool,
    /// Number of settled nodes.
    pub visited: usize,
}

impl<N: Copy> SearchOutcome<N> {
    pub fn terminal(&self) -> Option<N> {
        self.path.last().copied()
    }
}

/// Walkable successors of `node` with their scaled edge costs.
fn successors<S: SearchSpace>(space: &S, node: S::Node) -> Vec<(S::Node, i64)> {
    let mut candidates = Vec::with_capacity(16);
    space.neighbors(node, &mut candidates);
    candidates
        .into_iter()
        .filter(|&next| space.is_valid_node(next))
        .filter_map(|next| {
            let step = space.edge_cost(node, next);
            if !step.is_finite() {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            let scaled = (step * COST_SCALE).round() as i64;
            Some((next, scaled))
        })
        .collect()
}

/// Search from `start` until a goal node is settled.
///
/// Returns `None` only if `start` itself is not a valid node. When no goal
/// is reachable the path to the last settled node is returned with
/// `reached_goal == false`.
pub fn shortest_path<S: SearchSpace>(space: &S, start: S::Node) -> Option<SearchOutcome<S::Node>> {
    if !space.is_valid_node(start) {
        return None;
    }

    let mut parent: HashMap<S::Node, S::Node> = HashMap::new();
    let mut settled: HashSet<S::Node> = HashSet::new();
    let mut visited = 0;
    let mut last = (start, 0i64);

    for item in dijkstra_reach(&start, |node: &S::Node, _| successors(space, *node)) {
        // The iterator yields a node again if a negative edge lowers its cost
        if !settled.insert(item.node) {
            continue;
        }
        visited += 1;
        if let Some(p) = item.parent {
            parent.insert(item.node, p);
        }
        last = (item.node, item.total_cost);

        if space.is_goal(item.node) {
            return Some(finish(&parent, start, last, true, visited));
        }
    }

    Some(finish(&parent, start, last, false, visited))
}

fn finish<N: Copy + Eq + Hash>(
    parent: &HashMap<N, N>,
    start: N,
    (end, scaled_cost): (N, i64),
    reached_goal: bool,
    visited: usize,
) -> SearchOutcome<N> {
    let mut path = vec![end];
    let mut cur = end;
    while cur != start {
        match parent.get(&cur) {
            Some(&p) => {
                path.push(p);
                cur = p;
            }
            None => break,
        }
    }
    path.reverse();

    #[allow(clippy::cast_precision_loss)]
    let cost = scaled_cost as f64 / COST_SCALE;
    SearchOutcome {
        path,
        cost,
        reached_goal,
        visited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// A column of `height` rows and `width` columns; moves go one row down
    /// and at most one column sideways. Row 0 is the goal.
    struct Column {
        width: i32,
        height: i32,
        walls: Vec<(i32, i32)>,
        cost: fn((i32, i32)) -> f64,
    }

    impl Column {
        fn open(width: i32, height: i32) -> Self {
            Self {
                width,
                height,
                walls: Vec::new(),
                cost: |_| 1.0,
            }
        }
    }

    impl SearchSpace for Column {
        type Node = (i32, i32);

        fn is_valid_node(&self, (x, y): (i32, i32)) -> bool {
            (0..self.width).contains(&x) && (0..self.height).contains(&y)
        }

        fn edge_cost(&self, _from: (i32, i32), to: (i32, i32)) -> f64 {
            if self.walls.contains(&to) {
                f64::INFINITY
            } else {
                (self.cost)(to)
            }
        }

        fn neighbors(&self, (x, y): (i32, i32), out: &mut Vec<(i32, i32)>) {
            for dx in -1..=1 {
                out.push((x + dx, y - 1));
            }
        }

        fn is_goal(&self, (_, y): (i32, i32)) -> bool {
            y == 0
        }
    }

    #[test]
    fn test_straight_down() {
        let space = Column::open(5, 6);
        let out = shortest_path(&space, (2, 5)).unwrap();
        assert!(out.reached_goal);
        assert_eq!(out.path.len(), 6);
        assert_eq!(out.path[0], (2, 5));
        assert_eq!(out.terminal(), Some((2, 0)));
        assert_eq!(out.cost, 5.0);
    }

    #[test]
    fn test_start_is_goal() {
        let space = Column::open(3, 3);
        let out = shortest_path(&space, (1, 0)).unwrap();
        assert_eq!(out.path, vec![(1, 0)]);
        assert_eq!(out.visited, 1);
    }

    #[test]
    fn test_invalid_start() {
        let space = Column::open(3, 3);
        assert!(shortest_path(&space, (7, 1)).is_none());
    }

    #[test]
    fn test_routes_around_wall() {
        let mut space = Column::open(5, 4);
        space.walls = vec![(1, 1), (2, 1), (3, 1)];
        let out = shortest_path(&space, (2, 3)).unwrap();
        assert!(out.reached_goal);
        assert!(out.path.iter().all(|n| !space.walls.contains(n)));
        let x_at_row1 = out.path.iter().find(|n| n.1 == 1).unwrap().0;
        assert!(x_at_row1 == 0 || x_at_row1 == 4);
    }

    #[test]
    fn test_negative_edge_attracts() {
        let mut space = Column::open(7, 5);
        space.cost = |(x, y)| if x == 5 && y == 2 { -100.0 } else { 1.0 };
        let out = shortest_path(&space, (3, 4)).unwrap();
        assert!(out.path.contains(&(5, 2)));
        assert!(out.cost < 0.0);
    }

    #[test]
    fn test_fractional_costs_keep_precision() {
        let mut space = Column::open(3, 5);
        space.cost = |(x, _)| if x == 1 { 0.25 } else { 0.7071 };
        let out = shortest_path(&space, (1, 4)).unwrap();
        assert!(out.path.iter().all(|n| n.0 == 1));
        assert!((out.cost - 1.0).abs() < 1e-9);
        assert!(out.visited >= out.path.len());
    }

    #[test]
    fn test_exhausted_falls_back() {
        let mut space = Column::open(3, 4);
        space.walls = vec![(0, 1), (1, 1), (2, 1)];
        let out = shortest_path(&space, (1, 3)).unwrap();
        assert!(!out.reached_goal);
        let end = out.terminal().unwrap();
        assert_eq!(end.1, 2);
        assert_eq!(out.path[0], (1, 3));
    }

    proptest! {
        #[test]
        fn prop_path_is_connected_and_terminates(
            width in 1i32..8,
            height in 1i32..8,
            start_x in 0i32..8,
            wall_bits in any::<u64>(),
        ) {
            let mut space = Column::open(width, height);
            for y in 1..height {
                for x in 0..width {
                    if wall_bits & (1 << ((y * 8 + x) % 64)) != 0 {
                        space.walls.push((x, y));
                    }
                }
            }
            let start = (start_x.min(width - 1), height - 1);
            let out = shortest_path(&space, start).unwrap();

            prop_assert_eq!(out.path[0], start);
            for pair in out.path.windows(2) {
                prop_assert_eq!(pair[1].1, pair[0].1 - 1);
                prop_assert!((pair[1].0 - pair[0].0).abs() <= 1);
            }
            if out.reached_goal {
                prop_assert_eq!(out.terminal().unwrap().1, 0);
            }
        }
    }
}
