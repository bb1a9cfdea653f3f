use crate::params::GridGraphParams;
use crate::Corner;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};

/// Step along one of the two image-space grid axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    PlusU,
    MinusU,
    PlusV,
    MinusV,
}

impl NeighborDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::PlusU => Self::MinusU,
            Self::MinusU => Self::PlusU,
            Self::PlusV => Self::MinusV,
            Self::MinusV => Self::PlusV,
        }
    }

    fn step(self) -> (i32, i32) {
        match self {
            Self::PlusU => (1, 0),
            Self::MinusU => (-1, 0),
            Self::PlusV => (0, 1),
            Self::MinusV => (0, -1),
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Accept `neighbor` as a grid edge of `corner` when both sit in different
/// diagonal clusters, the distance is inside the spacing window and the edge
/// runs along one of `axes`.
fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
    axes: &[Vector2<f32>; 2],
) -> Option<NodeNeighbor> {
    let (Some(ci), Some(cj)) = (corner.orientation_cluster, neighbor.orientation_cluster) else {
        return None;
    };
    if ci == cj {
        return None;
    }

    let edge = neighbor.position - corner.position;
    let distance = edge.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    let e = edge / distance;
    let along_u = e.dot(&axes[0]);
    let along_v = e.dot(&axes[1]);
    let alignment = along_u.abs().max(along_v.abs());
    if alignment < params.orientation_tolerance_deg.to_radians().cos() {
        return None;
    }

    let direction = match (along_u.abs() >= along_v.abs(), along_u >= 0.0, along_v >= 0.0) {
        (true, true, _) => NeighborDirection::PlusU,
        (true, false, _) => NeighborDirection::MinusU,
        (false, _, true) => NeighborDirection::PlusV,
        (false, _, false) => NeighborDirection::MinusV,
    };

    Some(NodeNeighbor {
        direction,
        index: neighbor_index,
        distance,
        score: 1.0 - alignment,
    })
}

/// Keep at most one neighbor per direction: the nearest, ties broken by alignment.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.distance < current.distance
                    || (candidate.distance == current.distance && candidate.score < current.score)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

pub struct GridGraph {
    /// For each corner, its accepted neighbors (mutual edges only).
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams, axes: [Vector2<f32>; 2]) -> Self {
        let coords: Vec<[f32; 2]> = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect();
        let tree: KdTree<f32, 2> = (&coords).into();

        let mut neighbors: Vec<Vec<NodeNeighbor>> = corners
            .iter()
            .enumerate()
            .map(|(i, corner)| {
                let query = [corner.position.x, corner.position.y];
                let candidates = tree
                    .nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1)
                    .into_iter()
                    .map(|nn| nn.item as usize)
                    .filter(|&j| j != i)
                    .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params, &axes))
                    .collect();
                select_neighbors(candidates)
            })
            .collect();

        // An edge survives only if the other end points back in the opposite direction.
        let snapshot: Vec<Vec<(NeighborDirection, usize)>> = neighbors
            .iter()
            .map(|ns| ns.iter().map(|n| (n.direction, n.index)).collect())
            .collect();
        for (i, ns) in neighbors.iter_mut().enumerate() {
            ns.retain(|n| snapshot[n.index].contains(&(n.direction.opposite(), i)));
        }

        Self { neighbors }
    }

    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.neighbors.len()];
        let mut components = Vec::new();

        for start in 0..self.neighbors.len() {
            if visited[start] {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                if visited[node] {
                    continue;
                }
                visited[node] = true;
                component.push(node);
                stack.extend(
                    self.neighbors[node]
                        .iter()
                        .map(|n| n.index)
                        .filter(|&j| !visited[j]),
                );
            }
            components.push(component);
        }

        components
    }

    /// BFS integer coordinates `(node, u, v)` for one component.
    ///
    /// Returns `None` if a node is reached with two different coordinates or
    /// two nodes land on the same cell.
    pub fn assign_grid_coordinates(&self, component: &[usize]) -> Option<Vec<(usize, i32, i32)>> {
        let start = *component.first()?;
        let mut by_node: HashMap<usize, (i32, i32)> = HashMap::with_capacity(component.len());
        let mut by_cell: HashMap<(i32, i32), usize> = HashMap::with_capacity(component.len());
        let mut queue = VecDeque::from([(start, 0, 0)]);

        while let Some((node, u, v)) = queue.pop_front() {
            if let Some(&seen) = by_node.get(&node) {
                if seen != (u, v) {
                    return None;
                }
                continue;
            }
            if by_cell.insert((u, v), node).is_some() {
                return None;
            }
            by_node.insert(node, (u, v));

            for n in &self.neighbors[node] {
                let (du, dv) = n.direction.step();
                queue.push_back((n.index, u + du, v + dv));
            }
        }

        let mut coords: Vec<_> = by_node.into_iter().map(|(n, (u, v))| (n, u, v)).collect();
        coords.sort_unstable();
        Some(coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    fn axis_aligned() -> [Vector2<f32>; 2] {
        [Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0)]
    }

    fn labelled(x: f32, y: f32, cluster: usize) -> Corner {
        let orientation = if cluster == 0 { FRAC_PI_4 } else { 3.0 * FRAC_PI_4 };
        let mut c = Corner::new(x, y, orientation, 1.0);
        c.orientation_cluster = Some(cluster);
        c
    }

    fn grid(cols: usize, rows: usize, spacing: f32) -> Vec<Corner> {
        (0..rows)
            .flat_map(|j| {
                (0..cols).map(move |i| labelled(i as f32 * spacing, j as f32 * spacing, (i + j) % 2))
            })
            .collect()
    }

    fn params() -> GridGraphParams {
        GridGraphParams {
            min_spacing_pix: 5.0,
            max_spacing_pix: 15.0,
            ..Default::default()
        }
    }

    fn neighbor_of(graph: &GridGraph, node: usize, dir: NeighborDirection) -> Option<usize> {
        graph.neighbors[node]
            .iter()
            .find(|n| n.direction == dir)
            .map(|n| n.index)
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let corners = grid(3, 3, 10.0);
        let graph = GridGraph::new(&corners, &params(), axis_aligned());

        assert_eq!(4, graph.neighbors[4].len());
        assert_eq!(Some(5), neighbor_of(&graph, 4, NeighborDirection::PlusU));
        assert_eq!(Some(3), neighbor_of(&graph, 4, NeighborDirection::MinusU));
        assert_eq!(Some(7), neighbor_of(&graph, 4, NeighborDirection::PlusV));
        assert_eq!(Some(1), neighbor_of(&graph, 4, NeighborDirection::MinusV));
        assert_eq!(2, graph.neighbors[0].len());
        assert_eq!(3, graph.neighbors[1].len());
    }

    #[test]
    fn same_cluster_pairs_are_not_neighbors() {
        let corners = vec![labelled(0.0, 0.0, 0), labelled(10.0, 0.0, 0)];
        let graph = GridGraph::new(&corners, &params(), axis_aligned());
        assert!(graph.neighbors.iter().all(Vec::is_empty));
    }

    #[test]
    fn spacing_window_is_enforced() {
        let corners = vec![labelled(0.0, 0.0, 0), labelled(30.0, 0.0, 1)];
        let graph = GridGraph::new(&corners, &params(), axis_aligned());
        assert!(graph.neighbors.iter().all(Vec::is_empty));
    }

    #[test]
    fn diagonal_edges_are_rejected() {
        let corners = vec![labelled(0.0, 0.0, 0), labelled(8.0, 8.0, 1)];
        let graph = GridGraph::new(&corners, &params(), axis_aligned());
        assert!(graph.neighbors.iter().all(Vec::is_empty));
    }

    #[test]
    fn keeps_nearest_candidate_per_direction() {
        let corners = vec![
            labelled(0.0, 0.0, 0),
            labelled(10.0, 0.0, 1),
            labelled(13.0, 0.5, 1),
            labelled(-10.0, 0.0, 1),
        ];
        let graph = GridGraph::new(&corners, &params(), axis_aligned());
        assert_eq!(Some(1), neighbor_of(&graph, 0, NeighborDirection::PlusU));
        assert_eq!(Some(3), neighbor_of(&graph, 0, NeighborDirection::MinusU));
        // Node 2 is not chosen by node 0, so its own edge back is dropped.
        assert!(graph.neighbors[2].is_empty());
    }

    #[test]
    fn bfs_assigns_consistent_coordinates() {
        let corners = grid(4, 3, 10.0);
        let graph = GridGraph::new(&corners, &params(), axis_aligned());
        let components = graph.connected_components();
        assert_eq!(1, components.len());

        let coords = graph.assign_grid_coordinates(&components[0]).unwrap();
        assert_eq!(12, coords.len());
        let (_, u0, v0) = coords[0];
        for (node, u, v) in coords {
            assert_eq!((node % 4) as i32, u - u0);
            assert_eq!((node / 4) as i32, v - v0);
        }
    }

    #[test]
    fn separated_boards_form_separate_components() {
        let mut corners = grid(2, 2, 10.0);
        corners.extend(
            grid(2, 2, 10.0)
                .into_iter()
                .map(|c| labelled(c.position.x + 100.0, c.position.y, c.orientation_cluster.unwrap())),
        );
        let graph = GridGraph::new(&corners, &params(), axis_aligned());
        let mut sizes: Vec<_> = graph.connected_components().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(vec![4, 4], sizes);
    }
}
