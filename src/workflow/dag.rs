//! Step dependency graph.
//!
//! Edges point from a step to the steps it needs (`dependent → dependency`)
//! and are collected from every reference mechanism: `dependsOn`,
//! `loadFiles`, input interpolation (including `previousStep`), and
//! `when` / `condition.if` expressions.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::template::Reference;
use super::types::Workflow;

/// Where an edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    DependsOn,
    LoadFiles,
    Input,
    Condition,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::DependsOn => write!(f, "dependsOn"),
            EdgeKind::LoadFiles => write!(f, "loadFiles"),
            EdgeKind::Input => write!(f, "input"),
            EdgeKind::Condition => write!(f, "when"),
        }
    }
}

/// A single dependency edge between declared steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Index of the dependent step
    pub from: usize,
    /// Index of the step it depends on
    pub to: usize,
    pub kind: EdgeKind,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    InProgress,
    Done,
}

/// Dependency graph over the steps of one workflow.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    /// Per node: distinct dependencies in order of first appearance
    adjacency: Vec<Vec<(usize, EdgeKind)>>,
}

impl DependencyGraph {
    /// Build the graph. References to unknown steps produce no edge; they
    /// are reported by the interpolation validator instead.
    pub fn build(workflow: &Workflow) -> Self {
        let names: Vec<String> = workflow.steps.iter().map(|s| s.name.clone()).collect();
        let mut index = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }

        let mut adjacency = vec![Vec::new(); names.len()];
        for (i, step) in workflow.steps.iter().enumerate() {
            let mut seen = HashSet::new();
            let mut add = |target: &str, kind: EdgeKind, adj: &mut Vec<(usize, EdgeKind)>| {
                if let Some(&to) = index.get(target) {
                    if seen.insert(to) {
                        adj.push((to, kind));
                    }
                }
            };

            let adj = &mut adjacency[i];
            for dep in &step.depends_on {
                add(dep, EdgeKind::DependsOn, adj);
            }
            for dep in &step.load_files {
                add(dep, EdgeKind::LoadFiles, adj);
            }
            for r in step.input_references() {
                add(reference_step(workflow, r), EdgeKind::Input, adj);
            }
            if let Some(input) = &step.input {
                for name in input.step_refs() {
                    add(name, EdgeKind::Input, adj);
                }
            }
            for r in step.condition_references() {
                add(reference_step(workflow, r), EdgeKind::Condition, adj);
            }
        }

        Self { names, adjacency }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, node: usize) -> &str {
        &self.names[node]
    }

    /// Dependencies of `node` (steps it needs).
    pub fn dependencies(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[node].iter().map(|(to, _)| *to)
    }

    /// All edges, grouped by dependent in declared order.
    pub fn edges(&self) -> Vec<Edge> {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(from, deps)| {
                deps.iter().map(move |&(to, kind)| Edge { from, to, kind })
            })
            .collect()
    }

    /// True when either step depends on the other directly.
    pub fn connected(&self, a: usize, b: usize) -> bool {
        self.dependencies(a).any(|d| d == b) || self.dependencies(b).any(|d| d == a)
    }

    /// Find cycles with an iterative three-color depth-first search.
    ///
    /// Each cycle is the DFS stack from the repeated node onwards, closed by
    /// repeating that node: `[a, b, a]`. Rotations of an already reported
    /// cycle are not reported again.
    pub fn find_cycles(&self) -> Vec<Vec<usize>> {
        let mut color = vec![Color::Unvisited; self.len()];
        let mut cycles = Vec::new();
        let mut seen: HashSet<Vec<usize>> = HashSet::new();

        for start in 0..self.len() {
            if color[start] != Color::Unvisited {
                continue;
            }
            color[start] = Color::InProgress;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

            while let Some(&(node, next)) = stack.last() {
                if next >= self.adjacency[node].len() {
                    color[node] = Color::Done;
                    stack.pop();
                    continue;
                }
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                let dep = self.adjacency[node][next].0;
                match color[dep] {
                    Color::Unvisited => {
                        color[dep] = Color::InProgress;
                        stack.push((dep, 0));
                    }
                    Color::InProgress => {
                        let pos = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                        let mut cycle: Vec<usize> = stack[pos..].iter().map(|(n, _)| *n).collect();
                        if seen.insert(canonical_rotation(&cycle)) {
                            cycle.push(dep);
                            cycles.push(cycle);
                        }
                    }
                    Color::Done => {}
                }
            }
        }

        cycles
    }

    /// Render a closed cycle path as `a → b → a`.
    pub fn render_path(&self, path: &[usize]) -> String {
        path.iter()
            .map(|&n| self.name(n))
            .collect::<Vec<_>>()
            .join(" → ")
    }

    /// Edges whose dependency is not declared strictly before the dependent
    /// and which do not lie on any of `cycles`.
    pub fn forward_edges(&self, cycles: &[Vec<usize>]) -> Vec<Edge> {
        let on_cycle: HashSet<(usize, usize)> = cycles
            .iter()
            .flat_map(|c| c.windows(2).map(|w| (w[0], w[1])))
            .collect();

        self.edges()
            .into_iter()
            .filter(|e| e.to >= e.from && !on_cycle.contains(&(e.from, e.to)))
            .collect()
    }

    /// A dependency-respecting order; `None` if the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        let mut remaining: Vec<usize> = self.adjacency.iter().map(|deps| deps.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.len()];
        for edge in self.edges() {
            dependents[edge.to].push(edge.from);
        }

        let mut ready: BTreeSet<usize> = (0..self.len()).filter(|&n| remaining[n] == 0).collect();
        let mut order = Vec::with_capacity(self.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &d in &dependents[node] {
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        (order.len() == self.len()).then_some(order)
    }
}

/// The step a reference needs: the left segment of a dotted reference, the
/// step declaring an undotted reference as its `output.variable`, or else
/// the whole undotted reference.
pub fn reference_step<'a>(workflow: &'a Workflow, reference: &'a Reference) -> &'a str {
    if reference.field.is_none() && workflow.step_index(&reference.head).is_none() {
        if let Some(owner) = workflow.output_variable_owner(&reference.head) {
            return &workflow.steps[owner].name;
        }
    }
    &reference.head
}

fn canonical_rotation(cycle: &[usize]) -> Vec<usize> {
    let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    cycle[min_pos..]
        .iter()
        .chain(cycle[..min_pos].iter())
        .copied()
        .collect()
}
