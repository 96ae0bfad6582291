use super::SpatialIndex;
use waterworld_data::{Aabb, Vec2};

#[derive(Debug, Clone)]
struct QuadNode {
    bounds: Aabb,
    depth: usize,
    /// Colliders stored at this node: all of them for a leaf, only the ones
    /// straddling a split line for an inner node.
    items: Vec<usize>,
    children: Option<[usize; 4]>,
}

impl QuadNode {
    fn new(bounds: Aabb, depth: usize) -> Self {
        Self {
            bounds,
            depth,
            items: Vec::new(),
            children: None,
        }
    }
}

/// Bounds quadtree over the arena.
///
/// A leaf splits once it holds more than `max_children` colliders and is
/// shallower than `max_depth`. Colliders that do not fit entirely inside a
/// single child stay at the parent. Colliders outside the root region are
/// kept at the root so nothing is lost.
///
/// Nodes live in a flat arena; `rebuild` clears it and reinserts.
#[derive(Debug, Clone)]
pub struct Quadtree {
    region: Aabb,
    max_children: usize,
    max_depth: usize,
    nodes: Vec<QuadNode>,
    bounds: Vec<Aabb>,
}

impl Quadtree {
    pub fn new(region: Aabb, max_children: usize, max_depth: usize) -> Self {
        Self {
            region,
            max_children: max_children.max(1),
            max_depth,
            nodes: vec![QuadNode::new(region, 0)],
            bounds: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest level reached by the current population.
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    fn insert(&mut self, id: usize) {
        let item = self.bounds[id];
        let mut node_idx = 0;
        loop {
            match self.nodes[node_idx].children {
                Some(children) => {
                    match children
                        .iter()
                        .copied()
                        .find(|&c| self.nodes[c].bounds.contains(&item))
                    {
                        Some(child) => node_idx = child,
                        None => {
                            self.nodes[node_idx].items.push(id);
                            return;
                        }
                    }
                }
                None => {
                    self.nodes[node_idx].items.push(id);
                    let node = &self.nodes[node_idx];
                    if node.items.len() > self.max_children && node.depth < self.max_depth {
                        self.subdivide(node_idx);
                    }
                    return;
                }
            }
        }
    }

    fn subdivide(&mut self, node_idx: usize) {
        let bounds = self.nodes[node_idx].bounds;
        let depth = self.nodes[node_idx].depth + 1;
        let mid = bounds.center();
        let quadrants = [
            Aabb::new(bounds.min, mid),
            Aabb::new(Vec2::new(mid.x, bounds.min.y), Vec2::new(bounds.max.x, mid.y)),
            Aabb::new(Vec2::new(bounds.min.x, mid.y), Vec2::new(mid.x, bounds.max.y)),
            Aabb::new(mid, bounds.max),
        ];
        let first = self.nodes.len();
        for q in quadrants {
            self.nodes.push(QuadNode::new(q, depth));
        }
        self.nodes[node_idx].children = Some([first, first + 1, first + 2, first + 3]);

        let items = std::mem::take(&mut self.nodes[node_idx].items);
        for id in items {
            let item = self.bounds[id];
            match (first..first + 4).find(|&c| self.nodes[c].bounds.contains(&item)) {
                Some(child) => {
                    self.nodes[child].items.push(id);
                    let node = &self.nodes[child];
                    if node.items.len() > self.max_children && node.depth < self.max_depth {
                        self.subdivide(child);
                    }
                }
                None => self.nodes[node_idx].items.push(id),
            }
        }
    }
}

impl SpatialIndex for Quadtree {
    fn name(&self) -> &'static str {
        "quadtree"
    }

    fn rebuild(&mut self, bodies: &[Aabb], walls: &[Aabb]) {
        self.nodes.clear();
        self.nodes.push(QuadNode::new(self.region, 0));
        self.bounds.clear();
        self.bounds.extend_from_slice(bodies);
        self.bounds.extend_from_slice(walls);
        for id in 0..self.bounds.len() {
            self.insert(id);
        }
    }

    fn query(&self, area: &Aabb, out: &mut Vec<usize>) {
        let mut stack = vec![0usize];
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            // The root also holds out-of-region colliders, so it is always visited.
            if node_idx != 0 && !node.bounds.intersects(area) {
                continue;
            }
            out.extend(
                node.items
                    .iter()
                    .copied()
                    .filter(|&id| self.bounds[id].intersects(area)),
            );
            if let Some(children) = node.children {
                stack.extend_from_slice(&children);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Aabb {
        Aabb::new(Vec2::ZERO, Vec2::new(100.0, 100.0))
    }

    #[test]
    fn test_splits_past_threshold() {
        let mut tree = Quadtree::new(region(), 2, 4);
        let bodies: Vec<Aabb> = (0..5)
            .map(|i| Aabb::from_circle(Vec2::new(10.0 + i as f64, 10.0), 0.5))
            .collect();
        tree.rebuild(&bodies, &[]);
        assert!(tree.node_count() > 1);
        assert!(tree.depth() <= 4);

        let mut out = Vec::new();
        tree.query(&Aabb::from_circle(Vec2::new(12.0, 10.0), 0.6), &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_depth_cap_is_respected() {
        let mut tree = Quadtree::new(region(), 1, 2);
        let bodies: Vec<Aabb> = (0..50)
            .map(|_| Aabb::from_circle(Vec2::new(1.0, 1.0), 0.1))
            .collect();
        tree.rebuild(&bodies, &[]);
        assert_eq!(tree.depth(), 2);
        let mut out = Vec::new();
        tree.query(&Aabb::from_circle(Vec2::new(1.0, 1.0), 0.1), &mut out);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn test_straddling_item_stays_in_parent() {
        let mut tree = Quadtree::new(region(), 1, 4);
        let bodies = vec![
            Aabb::from_circle(Vec2::new(10.0, 10.0), 1.0),
            Aabb::from_circle(Vec2::new(50.0, 50.0), 5.0),
            Aabb::from_circle(Vec2::new(90.0, 90.0), 1.0),
        ];
        tree.rebuild(&bodies, &[]);
        let mut out = Vec::new();
        tree.query(&Aabb::from_circle(Vec2::new(54.0, 54.0), 0.5), &mut out);
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn test_out_of_region_item_is_found() {
        let mut tree = Quadtree::new(region(), 1, 4);
        let bodies = vec![
            Aabb::from_circle(Vec2::new(-30.0, -30.0), 1.0),
            Aabb::from_circle(Vec2::new(10.0, 10.0), 1.0),
            Aabb::from_circle(Vec2::new(20.0, 20.0), 1.0),
        ];
        tree.rebuild(&bodies, &[]);
        let mut out = Vec::new();
        tree.query(&Aabb::from_circle(Vec2::new(-30.0, -30.0), 2.0), &mut out);
        assert_eq!(out, vec![0]);
    }
}
