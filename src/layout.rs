use log::debug;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::{CanvasElement, CanvasState, ConnectionStyle, DiagramConnection, DiagramNode};
use crate::normalize::{NormalizedConnection, NormalizedDiagram, NormalizedNode};
use crate::shapes::classify_shape;
use crate::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutOptions {
    /// Width the root level is spread across, margins included.
    pub canvas_width: f64,
    pub node_width: f64,
    pub node_height: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            canvas_width: LAYOUT_CANVAS_WIDTH,
            node_width: NODE_WIDTH,
            node_height: NODE_HEIGHT,
        }
    }
}

impl LayoutOptions {
    fn usable_width(&self) -> f64 {
        (self.canvas_width - LAYOUT_SIDE_MARGIN * 2.0).max(self.node_width)
    }
}

/// Per-node adjacency derived from a connection list.
#[derive(Debug, Clone, Default)]
pub struct Adjacency<'a> {
    outgoing: HashMap<&'a str, Vec<&'a str>>,
    incoming: HashMap<&'a str, Vec<&'a str>>,
    labels: HashMap<&'a str, Vec<(&'a str, &'a str)>>,
}

impl<'a> Adjacency<'a> {
    /// Connections naming unknown nodes are dropped; repeated pairs count once.
    pub fn build(nodes: &'a [NormalizedNode], connections: &'a [NormalizedConnection]) -> Self {
        let known: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
        let mut adjacency = Adjacency::default();

        for connection in connections {
            let from = connection.source.as_str();
            let to = connection.target.as_str();
            if !known.contains(from) || !known.contains(to) {
                debug!(
                    "dropping connection '{}' with unknown endpoint ({from} -> {to})",
                    connection.id
                );
                continue;
            }

            let children = adjacency.outgoing.entry(from).or_default();
            if children.contains(&to) {
                continue;
            }
            children.push(to);
            adjacency.incoming.entry(to).or_default().push(from);
            if let Some(label) = connection.label.as_deref() {
                adjacency.labels.entry(from).or_default().push((to, label));
            }
        }

        adjacency
    }

    pub fn children(&self, id: &str) -> &[&'a str] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parents(&self, id: &str) -> &[&'a str] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn label(&self, from: &str, to: &str) -> Option<&'a str> {
        self.labels
            .get(from)?
            .iter()
            .find(|(target, _)| *target == to)
            .map(|(_, label)| *label)
    }
}

/// Nodes without incoming edges; the first node when every node has one.
pub fn find_roots<'a>(nodes: &'a [NormalizedNode], adjacency: &Adjacency<'_>) -> Vec<&'a str> {
    let roots: Vec<&str> = nodes
        .iter()
        .filter(|node| adjacency.parents(&node.id).is_empty())
        .map(|node| node.id.as_str())
        .collect();

    if roots.is_empty() {
        nodes.first().map(|node| vec![node.id.as_str()]).unwrap_or_default()
    } else {
        roots
    }
}

/// Breadth-first depth from all roots at once. A node keeps the level it was
/// first discovered at; unreached nodes sit one below the deepest level.
pub fn assign_levels<'a>(
    nodes: &'a [NormalizedNode],
    adjacency: &Adjacency<'_>,
    roots: &[&str],
) -> HashMap<&'a str, usize> {
    let by_id: HashMap<&str, &'a str> = nodes
        .iter()
        .map(|node| (node.id.as_str(), node.id.as_str()))
        .collect();

    let mut levels: HashMap<&'a str, usize> = HashMap::new();
    let mut queue: VecDeque<&'a str> = VecDeque::new();

    for root in roots {
        if let Some(&id) = by_id.get(*root) {
            if !levels.contains_key(id) {
                levels.insert(id, 0);
                queue.push_back(id);
            }
        }
    }

    while let Some(current) = queue.pop_front() {
        let level = levels.get(current).copied().unwrap_or(0);
        for child in adjacency.children(current) {
            let Some(&child) = by_id.get(*child) else {
                continue;
            };
            if levels.contains_key(child) {
                continue;
            }
            levels.insert(child, level + 1);
            queue.push_back(child);
        }
    }

    let unreached_level = levels.values().copied().max().map_or(0, |max| max + 1);
    for node in nodes {
        levels.entry(node.id.as_str()).or_insert(unreached_level);
    }

    levels
}

/// Nodes lying on a cycle: members of a strongly connected component with
/// more than one node, plus nodes with a self-loop.
pub fn cyclic_nodes<'a>(nodes: &'a [NormalizedNode], adjacency: &Adjacency<'a>) -> HashSet<&'a str> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut finished: Vec<&'a str> = Vec::with_capacity(nodes.len());

    for node in nodes {
        let start = node.id.as_str();
        if !visited.insert(start) {
            continue;
        }
        let mut stack: Vec<(&'a str, usize)> = vec![(start, 0)];
        while let Some((id, next)) = stack.last_mut() {
            let current = *id;
            let children = adjacency.children(current);
            if let Some(&child) = children.get(*next) {
                *next += 1;
                if visited.insert(child) {
                    stack.push((child, 0));
                }
            } else {
                finished.push(current);
                stack.pop();
            }
        }
    }

    let mut component: HashMap<&'a str, usize> = HashMap::new();
    let mut sizes: Vec<usize> = Vec::new();
    for &start in finished.iter().rev() {
        if component.contains_key(start) {
            continue;
        }
        let index = sizes.len();
        sizes.push(0);
        component.insert(start, index);
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            sizes[index] += 1;
            for &parent in adjacency.parents(id) {
                if !component.contains_key(parent) {
                    component.insert(parent, index);
                    stack.push(parent);
                }
            }
        }
    }

    nodes
        .iter()
        .map(|node| node.id.as_str())
        .filter(|id| {
            let size = component.get(id).map_or(1, |&index| sizes[index]);
            size > 1 || adjacency.children(id).contains(id)
        })
        .collect()
}

/// Counts leaves reachable from a node.
///
/// A node already on the current recursion path contributes 0. Off-cycle
/// nodes cannot reach back onto the path, so their counts are cached; only
/// nodes inside a cycle are recounted per path.
struct LeafCounter<'a, 'b> {
    adjacency: &'b Adjacency<'a>,
    cyclic: &'b HashSet<&'a str>,
    cache: HashMap<&'a str, usize>,
    path: Vec<&'a str>,
}

impl<'a> LeafCounter<'a, '_> {
    fn count(&mut self, id: &'a str) -> usize {
        if self.path.contains(&id) {
            return 0;
        }
        if let Some(&weight) = self.cache.get(id) {
            return weight;
        }

        let adjacency = self.adjacency;
        let children = adjacency.children(id);
        if children.is_empty() {
            return 1;
        }

        self.path.push(id);
        let total = children
            .iter()
            .fold(0_usize, |total, &child| total.saturating_add(self.count(child)));
        self.path.pop();

        let weight = total.max(1);
        if !self.cyclic.contains(id) {
            self.cache.insert(id, weight);
        }
        weight
    }
}

/// Leaf count per node, saturating at `usize::MAX` on very deep lattices.
pub fn leaf_weights<'a>(
    nodes: &'a [NormalizedNode],
    adjacency: &Adjacency<'a>,
) -> HashMap<&'a str, usize> {
    let cyclic = cyclic_nodes(nodes, adjacency);
    let mut counter = LeafCounter {
        adjacency,
        cyclic: &cyclic,
        cache: HashMap::new(),
        path: Vec::new(),
    };
    nodes
        .iter()
        .map(|node| (node.id.as_str(), counter.count(node.id.as_str())))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePlacement {
    pub id: String,
    pub level: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NodePlacement {
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    /// Placements in input node order.
    pub placements: Vec<NodePlacement>,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Layout {
    fn empty() -> Self {
        Self {
            placements: Vec::new(),
            canvas_width: LAYOUT_MIN_CANVAS_SIZE,
            canvas_height: LAYOUT_MIN_CANVAS_SIZE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn placement(&self, id: &str) -> Option<&NodePlacement> {
        self.placements.iter().find(|placement| placement.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchSide {
    Left,
    Right,
}

fn branch_side(label: Option<&str>) -> Option<BranchSide> {
    let label = label?.to_lowercase();
    if label.contains("yes") || label.contains("true") {
        Some(BranchSide::Left)
    } else if label.contains("no") || label.contains("false") {
        Some(BranchSide::Right)
    } else {
        None
    }
}

struct Placer<'a, 'b> {
    adjacency: &'b Adjacency<'a>,
    weights: &'b HashMap<&'a str, usize>,
    centers: HashMap<&'a str, f64>,
}

impl<'a, 'b> Placer<'a, 'b> {
    fn weight(&self, id: &str) -> f64 {
        self.weights.get(id).copied().unwrap_or(1) as f64
    }

    fn place_roots(&mut self, roots: &[&'a str], options: &LayoutOptions) {
        let usable = options.usable_width();
        let total: f64 = roots.iter().map(|id| self.weight(id)).sum();
        let mut cursor = LAYOUT_SIDE_MARGIN;
        for root in roots {
            let span = usable * self.weight(root) / total;
            self.centers.insert(*root, cursor + span / 2.0);
            cursor += span;
        }
    }

    fn place_orphans(&mut self, orphans: &[&'a str], options: &LayoutOptions) {
        let slots = (orphans.len() + 1) as f64;
        for (idx, id) in orphans.iter().enumerate() {
            self.centers
                .insert(*id, options.canvas_width * (idx + 1) as f64 / slots);
        }
    }

    fn place_group(&mut self, parent: &NormalizedNode, children: &[&'a str]) {
        let Some(parent_x) = self.centers.get(parent.id.as_str()).copied() else {
            return;
        };

        if parent.is_decision() && children.len() == 2 {
            self.place_binary_branch(parent, parent_x, children[0], children[1]);
            return;
        }

        let min_width = if parent.is_decision() && children.len() > 2 {
            DECISION_MULTI_BRANCH_WIDTH
        } else if children.len() <= 2 {
            CHILD_MIN_WIDTH_FEW
        } else {
            CHILD_MIN_WIDTH_MANY
        };

        let widths: Vec<f64> = children
            .iter()
            .map(|child| (self.weight(child) * LAYOUT_LEAF_UNIT).max(min_width))
            .collect();
        let total: f64 = widths.iter().sum();

        let mut cursor = parent_x - total / 2.0;
        for (child, width) in children.iter().zip(widths) {
            self.centers.insert(*child, cursor + width / 2.0);
            cursor += width;
        }
    }

    fn place_binary_branch(
        &mut self,
        parent: &NormalizedNode,
        parent_x: f64,
        first: &'a str,
        second: &'a str,
    ) {
        let first_side = branch_side(self.adjacency.label(&parent.id, first));
        let second_side = branch_side(self.adjacency.label(&parent.id, second));

        let (left, right) = match (first_side, second_side) {
            (Some(BranchSide::Left), _) => (first, second),
            (_, Some(BranchSide::Left)) => (second, first),
            (Some(BranchSide::Right), _) => (second, first),
            _ => (first, second),
        };

        let spacing = DECISION_BRANCH_MIN_SPACING.max(
            self.weight(left) * DECISION_BRANCH_WEIGHT_SPACING
                + self.weight(right) * DECISION_BRANCH_WEIGHT_SPACING,
        );

        self.centers.insert(left, parent_x - spacing / 2.0);
        self.centers.insert(right, parent_x + spacing / 2.0);
    }
}

/// Computes a top-to-bottom tree layout for a normalized diagram.
///
/// The result depends only on the input order and `options`.
pub fn compute_layout(diagram: &NormalizedDiagram, options: &LayoutOptions) -> Layout {
    let nodes = diagram.nodes.as_slice();
    if nodes.is_empty() {
        return Layout::empty();
    }

    let adjacency = Adjacency::build(nodes, &diagram.connections);
    let roots = find_roots(nodes, &adjacency);
    let levels = assign_levels(nodes, &adjacency, &roots);
    let weights = leaf_weights(nodes, &adjacency);
    let max_level = levels.values().copied().max().unwrap_or(0);

    let mut by_level: Vec<Vec<&NormalizedNode>> = vec![Vec::new(); max_level + 1];
    for node in nodes {
        by_level[levels[node.id.as_str()]].push(node);
    }

    let mut placer = Placer {
        adjacency: &adjacency,
        weights: &weights,
        centers: HashMap::new(),
    };

    let level_zero: Vec<&str> = by_level[0].iter().map(|node| node.id.as_str()).collect();
    placer.place_roots(&level_zero, options);

    for level in 1..=max_level {
        let mut grouped: HashSet<&str> = HashSet::new();
        let mut groups: Vec<(&NormalizedNode, Vec<&str>)> = Vec::new();

        for parent in nodes.iter().filter(|node| levels[node.id.as_str()] < level) {
            let children: Vec<&str> = adjacency
                .children(&parent.id)
                .iter()
                .copied()
                .filter(|child| levels.get(*child) == Some(&level))
                .collect();
            if children.is_empty() {
                continue;
            }
            grouped.extend(children.iter().copied());
            groups.push((parent, children));
        }

        // A child with several shallower parents is placed once per group; the
        // group of the parent appearing last in input order wins.
        for (parent, children) in &groups {
            placer.place_group(parent, children);
        }

        let orphans: Vec<&str> = by_level[level]
            .iter()
            .map(|node| node.id.as_str())
            .filter(|id| !grouped.contains(id))
            .collect();
        if !orphans.is_empty() {
            placer.place_orphans(&orphans, options);
        }
    }

    let mut placements: Vec<NodePlacement> = nodes
        .iter()
        .map(|node| {
            let id = node.id.as_str();
            let level = levels[id];
            let center_x = placer
                .centers
                .get(id)
                .copied()
                .unwrap_or(options.canvas_width / 2.0);
            NodePlacement {
                id: node.id.clone(),
                level,
                x: center_x - options.node_width / 2.0,
                y: LAYOUT_TOP_OFFSET + level as f64 * LAYOUT_LEVEL_SPACING
                    - options.node_height / 2.0,
                width: options.node_width,
                height: options.node_height,
            }
        })
        .collect();

    let min_x = placements
        .iter()
        .map(|placement| placement.x)
        .fold(f64::INFINITY, f64::min);
    if min_x < LAYOUT_SIDE_MARGIN {
        let shift = LAYOUT_SIDE_MARGIN - min_x;
        for placement in &mut placements {
            placement.x += shift;
        }
    }

    let max_right = placements
        .iter()
        .map(|placement| placement.x + placement.width)
        .fold(0.0, f64::max);
    let max_bottom = placements
        .iter()
        .map(|placement| placement.y + placement.height)
        .fold(0.0, f64::max);

    debug!(
        "laid out {} nodes across {} levels from {} roots",
        placements.len(),
        max_level + 1,
        level_zero.len()
    );

    Layout {
        placements,
        canvas_width: (max_right + LAYOUT_BOUNDS_PADDING).max(LAYOUT_MIN_CANVAS_SIZE),
        canvas_height: (max_bottom + LAYOUT_BOUNDS_PADDING).max(LAYOUT_MIN_CANVAS_SIZE),
    }
}

/// Builds a fresh canvas snapshot from a normalized diagram and its layout.
/// Connections precede nodes so they paint underneath.
pub fn build_canvas_state(diagram: &NormalizedDiagram, layout: &Layout) -> CanvasState {
    let mut elements = Vec::with_capacity(diagram.nodes.len() + diagram.connections.len());

    for connection in &diagram.connections {
        elements.push(CanvasElement::Connection(DiagramConnection {
            id: connection.id.clone(),
            source_id: connection.source.clone(),
            target_id: connection.target.clone(),
            label: connection.label.clone(),
            style: ConnectionStyle::default(),
        }));
    }

    for node in &diagram.nodes {
        let Some(placement) = layout.placement(&node.id) else {
            continue;
        };
        let spec = classify_shape(&node.kind);
        elements.push(CanvasElement::Node(DiagramNode {
            id: node.id.clone(),
            x: placement.x,
            y: placement.y,
            width: placement.width,
            height: placement.height,
            text: node.text.clone(),
            shape: spec.shape,
            style: spec.default_style(),
        }));
    }

    CanvasState {
        elements,
        version: CANVAS_SCHEMA_VERSION,
        canvas_width: Some(layout.canvas_width),
        canvas_height: Some(layout.canvas_height),
    }
}

/// Normalized diagram → laid-out canvas snapshot.
pub fn generate_canvas(diagram: &NormalizedDiagram, options: &LayoutOptions) -> CanvasState {
    let layout = compute_layout(diagram, options);
    build_canvas_state(diagram, &layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::DiagramOrigin;
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    fn node(id: &str, kind: &str) -> NormalizedNode {
        NormalizedNode {
            id: id.to_string(),
            original_id: None,
            text: id.to_uppercase(),
            kind: kind.to_string(),
        }
    }

    fn diagram(nodes: &[(&str, &str)], edges: &[(&str, &str, Option<&str>)]) -> NormalizedDiagram {
        NormalizedDiagram {
            nodes: nodes.iter().map(|(id, kind)| node(id, kind)).collect(),
            connections: edges
                .iter()
                .enumerate()
                .map(|(idx, (from, to, label))| NormalizedConnection {
                    id: format!("conn{}", idx + 1),
                    source: from.to_string(),
                    target: to.to_string(),
                    label: label.map(str::to_string),
                })
                .collect(),
            origin: DiagramOrigin::Parsed,
            synthesized_chain: false,
            defaulted_endpoints: 0,
        }
    }

    fn center(layout: &Layout, id: &str) -> f64 {
        layout.placement(id).map(NodePlacement::center_x).unwrap_or(f64::NAN)
    }

    #[test]
    fn empty_diagram_lays_out_nothing() {
        let layout = compute_layout(&diagram(&[], &[]), &LayoutOptions::default());
        assert!(layout.is_empty());
    }

    #[test]
    fn single_node_is_centered_on_level_zero() {
        let layout = compute_layout(&diagram(&[("a", "process")], &[]), &LayoutOptions::default());
        let placement = layout.placement("a").unwrap();
        assert_eq!(placement.level, 0);
        assert!(approx_eq!(f64, placement.center_x(), LAYOUT_CANVAS_WIDTH / 2.0));
        assert!(approx_eq!(f64, placement.y, LAYOUT_TOP_OFFSET - NODE_HEIGHT / 2.0));
        assert_eq!(layout.canvas_width, LAYOUT_MIN_CANVAS_SIZE);
        assert_eq!(layout.canvas_height, LAYOUT_MIN_CANVAS_SIZE);
    }

    #[test]
    fn levels_use_first_discovery() {
        let d = diagram(
            &[("a", "start"), ("b", "process"), ("c", "process"), ("d", "end")],
            &[("a", "b", None), ("a", "d", None), ("b", "c", None), ("c", "d", None)],
        );
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        let roots = find_roots(&d.nodes, &adjacency);
        let levels = assign_levels(&d.nodes, &adjacency, &roots);
        assert_eq!(roots, vec!["a"]);
        assert_eq!(levels["b"], 1);
        assert_eq!(levels["d"], 1);
        assert_eq!(levels["c"], 2);
    }

    #[test]
    fn unreached_cycle_goes_below_deepest_level() {
        let d = diagram(
            &[("a", "start"), ("b", "process"), ("x", "process"), ("y", "process")],
            &[("a", "b", None), ("x", "y", None), ("y", "x", None)],
        );
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        let roots = find_roots(&d.nodes, &adjacency);
        let levels = assign_levels(&d.nodes, &adjacency, &roots);
        assert_eq!(levels["x"], 2);
        assert_eq!(levels["y"], 2);

        let layout = compute_layout(&d, &LayoutOptions::default());
        let x = center(&layout, "x");
        let y = center(&layout, "y");
        assert!(x < y, "orphans spread left to right in input order");
    }

    #[test]
    fn fully_cyclic_graph_forces_first_node_as_root() {
        let d = diagram(
            &[("a", "process"), ("b", "process"), ("c", "process")],
            &[("a", "b", None), ("b", "c", None), ("c", "a", None)],
        );
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        let roots = find_roots(&d.nodes, &adjacency);
        let levels = assign_levels(&d.nodes, &adjacency, &roots);

        let at_zero: Vec<&str> = d
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| levels[id] == 0)
            .collect();
        assert_eq!(at_zero, vec!["a"]);
        assert_eq!(levels["b"], 1);
        assert_eq!(levels["c"], 2);
    }

    #[test]
    fn leaf_counting_terminates_on_cycles() {
        let d = diagram(
            &[("a", "process"), ("b", "process"), ("c", "process")],
            &[("a", "b", None), ("b", "c", None), ("c", "a", None)],
        );
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        let weights = leaf_weights(&d.nodes, &adjacency);
        for id in ["a", "b", "c"] {
            assert_eq!(weights[id], 1, "weight of {id}");
        }
    }

    #[test]
    fn self_loop_weighs_one() {
        let d = diagram(&[("a", "process")], &[("a", "a", None)]);
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        assert_eq!(leaf_weights(&d.nodes, &adjacency)["a"], 1);
    }

    #[test]
    fn cyclic_nodes_cover_components_and_self_loops() {
        let d = diagram(
            &[("a", "start"), ("b", "process"), ("c", "process"), ("d", "process"), ("e", "end")],
            &[("a", "b", None), ("b", "c", None), ("c", "b", None), ("c", "d", None), ("d", "d", None), ("d", "e", None)],
        );
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        let mut cyclic: Vec<&str> = cyclic_nodes(&d.nodes, &adjacency).into_iter().collect();
        cyclic.sort_unstable();
        assert_eq!(cyclic, vec!["b", "c", "d"]);

        let weights = leaf_weights(&d.nodes, &adjacency);
        assert_eq!(weights["a"], 1);
        assert_eq!(weights["b"], 1);
        assert_eq!(weights["e"], 1);
    }

    fn ladder(levels: usize) -> NormalizedDiagram {
        let names: Vec<(String, String)> = (0..levels)
            .map(|level| (format!("l{level}a"), format!("l{level}b")))
            .collect();
        let nodes: Vec<(&str, &str)> = names
            .iter()
            .flat_map(|(a, b)| [(a.as_str(), "process"), (b.as_str(), "process")])
            .collect();
        let edges: Vec<(&str, &str, Option<&str>)> = names
            .windows(2)
            .flat_map(|pair| {
                let ((a, b), (next_a, next_b)) = (&pair[0], &pair[1]);
                [
                    (a.as_str(), next_a.as_str(), None),
                    (a.as_str(), next_b.as_str(), None),
                    (b.as_str(), next_a.as_str(), None),
                    (b.as_str(), next_b.as_str(), None),
                ]
            })
            .collect();
        diagram(&nodes, &edges)
    }

    #[test]
    fn rejoining_ladder_weights_count_paths() {
        let d = ladder(40);
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        let weights = leaf_weights(&d.nodes, &adjacency);
        assert_eq!(weights["l39a"], 1);
        assert_eq!(weights["l38b"], 2);
        assert_eq!(weights["l0a"], 2_usize.saturating_pow(39));

        let layout = compute_layout(&d, &LayoutOptions::default());
        assert_eq!(layout.placements.len(), 80);
        assert_eq!(layout.placement("l39b").map(|p| p.level), Some(39));
    }

    #[test]
    fn very_deep_ladder_saturates_instead_of_overflowing() {
        let d = ladder(130);
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        let weights = leaf_weights(&d.nodes, &adjacency);
        assert_eq!(weights["l0a"], usize::MAX);
        assert_eq!(weights["l129b"], 1);
    }

    #[test]
    fn shared_descendants_count_once_per_path() {
        let d = diagram(
            &[("a", "start"), ("b", "process"), ("c", "process"), ("d", "end")],
            &[("a", "b", None), ("a", "c", None), ("b", "d", None), ("c", "d", None)],
        );
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        let weights = leaf_weights(&d.nodes, &adjacency);
        assert_eq!(weights["a"], 2);
        assert_eq!(weights["b"], 1);
        assert_eq!(weights["d"], 1);
    }

    #[test]
    fn duplicate_and_dangling_connections_are_ignored() {
        let d = diagram(
            &[("a", "start"), ("b", "end")],
            &[("a", "b", None), ("a", "b", None), ("a", "ghost", None)],
        );
        let adjacency = Adjacency::build(&d.nodes, &d.connections);
        assert_eq!(adjacency.children("a"), &["b"]);
        assert_eq!(adjacency.parents("b"), &["a"]);
    }

    #[test]
    fn roots_share_width_by_leaf_weight() {
        let d = diagram(
            &[("r1", "start"), ("r2", "start"), ("a", "end"), ("b", "end"), ("c", "end")],
            &[("r1", "a", None), ("r1", "b", None), ("r2", "c", None)],
        );
        let layout = compute_layout(&d, &LayoutOptions::default());
        let usable = LAYOUT_CANVAS_WIDTH - 2.0 * LAYOUT_SIDE_MARGIN;
        assert!(approx_eq!(f64, center(&layout, "r1"), LAYOUT_SIDE_MARGIN + usable / 3.0));
        assert!(approx_eq!(
            f64,
            center(&layout, "r2"),
            LAYOUT_SIDE_MARGIN + usable * 2.0 / 3.0 + usable / 6.0
        ));
    }

    #[test]
    fn decision_branches_follow_yes_no_labels() {
        let d = diagram(
            &[("d", "decision"), ("n", "process"), ("y", "process")],
            &[("d", "n", Some("No")), ("d", "y", Some("Yes"))],
        );
        let layout = compute_layout(&d, &LayoutOptions::default());
        let parent = center(&layout, "d");
        assert!(approx_eq!(f64, center(&layout, "y"), parent - DECISION_BRANCH_MIN_SPACING / 2.0));
        assert!(approx_eq!(f64, center(&layout, "n"), parent + DECISION_BRANCH_MIN_SPACING / 2.0));
    }

    #[test]
    fn decision_false_label_goes_right() {
        let d = diagram(
            &[("d", "decision"), ("f", "process"), ("other", "process")],
            &[("d", "f", Some("false")), ("d", "other", Some("retry"))],
        );
        let layout = compute_layout(&d, &LayoutOptions::default());
        assert!(center(&layout, "other") < center(&layout, "f"));
    }

    #[test]
    fn decision_without_labels_keeps_input_order() {
        let d = diagram(
            &[("d", "decision"), ("first", "process"), ("second", "process")],
            &[("d", "first", None), ("d", "second", Some("maybe"))],
        );
        let layout = compute_layout(&d, &LayoutOptions::default());
        assert!(center(&layout, "first") < center(&layout, "d"));
        assert!(center(&layout, "second") > center(&layout, "d"));
    }

    #[test]
    fn heavy_decision_branches_spread_wider() {
        let d = diagram(
            &[
                ("d", "decision"),
                ("y", "process"),
                ("n", "process"),
                ("y1", "end"),
                ("y2", "end"),
                ("n1", "end"),
            ],
            &[
                ("d", "y", Some("yes")),
                ("d", "n", Some("no")),
                ("y", "y1", None),
                ("y", "y2", None),
                ("n", "n1", None),
            ],
        );
        let layout = compute_layout(&d, &LayoutOptions::default());
        let spacing = center(&layout, "n") - center(&layout, "y");
        assert!(approx_eq!(f64, spacing, 300.0));
    }

    #[test]
    fn non_decision_children_use_minimum_widths() {
        let d = diagram(
            &[("p", "process"), ("a", "end"), ("b", "end"), ("c", "end")],
            &[("p", "a", None), ("p", "b", None), ("p", "c", None)],
        );
        let layout = compute_layout(&d, &LayoutOptions::default());
        let parent = center(&layout, "p");
        assert!(approx_eq!(f64, center(&layout, "a"), parent - CHILD_MIN_WIDTH_MANY));
        assert!(approx_eq!(f64, center(&layout, "b"), parent));
        assert!(approx_eq!(f64, center(&layout, "c"), parent + CHILD_MIN_WIDTH_MANY));
    }

    #[test]
    fn multi_branch_decision_reserves_wide_slots() {
        let d = diagram(
            &[("d", "decision"), ("a", "end"), ("b", "end"), ("c", "end")],
            &[("d", "a", None), ("d", "b", None), ("d", "c", None)],
        );
        let layout = compute_layout(&d, &LayoutOptions::default());
        let gap = center(&layout, "b") - center(&layout, "a");
        assert!(approx_eq!(f64, gap, DECISION_MULTI_BRANCH_WIDTH));
    }

    #[test]
    fn multi_parent_child_takes_last_parent_group() {
        let d = diagram(
            &[("r1", "start"), ("r2", "start"), ("shared", "end")],
            &[("r1", "shared", None), ("r2", "shared", None)],
        );
        let layout = compute_layout(&d, &LayoutOptions::default());
        assert!(approx_eq!(f64, center(&layout, "shared"), center(&layout, "r2")));
    }

    #[test]
    fn content_never_starts_left_of_the_margin() {
        let d = diagram(
            &[("p", "process"), ("a", "end"), ("b", "end"), ("c", "end"), ("e", "end"), ("f", "end"), ("g", "end"), ("h", "end")],
            &[("p", "a", None), ("p", "b", None), ("p", "c", None), ("p", "e", None), ("p", "f", None), ("p", "g", None), ("p", "h", None)],
        );
        let layout = compute_layout(&d, &LayoutOptions::default());
        let min_x = layout.placements.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        assert!(approx_eq!(f64, min_x, LAYOUT_SIDE_MARGIN));
        let max_right = layout.placements.iter().map(|p| p.x + p.width).fold(0.0, f64::max);
        assert!(layout.canvas_width >= max_right + LAYOUT_BOUNDS_PADDING);
    }

    #[test]
    fn layout_is_deterministic() {
        let d = diagram(
            &[("a", "start"), ("b", "decision"), ("c", "process"), ("d", "process"), ("e", "end")],
            &[
                ("a", "b", None),
                ("b", "c", Some("yes")),
                ("b", "d", Some("no")),
                ("c", "e", None),
                ("d", "e", None),
                ("e", "a", None),
            ],
        );
        let first = compute_layout(&d, &LayoutOptions::default());
        for _ in 0..5 {
            let again = compute_layout(&d, &LayoutOptions::default());
            assert_eq!(first, again);
            assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&again).unwrap()
            );
        }
    }

    #[test]
    fn canvas_state_carries_shapes_and_bounds() {
        let d = diagram(
            &[("s", "start"), ("q", "decision")],
            &[("s", "q", None)],
        );
        let state = generate_canvas(&d, &LayoutOptions::default());
        state.validate().unwrap();
        assert_eq!(state.node("q").unwrap().shape, crate::NodeShape::Diamond);
        assert!(matches!(state.elements[0], CanvasElement::Connection(_)));
        assert_eq!(state.canvas_width, Some(LAYOUT_MIN_CANVAS_SIZE));
    }
}
