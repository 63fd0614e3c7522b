use crate::error::OrderingError;
use crate::query::CompiledOutput;
use ahash::AHashMap;
use itertools::Itertools;
use std::collections::BTreeSet;
use tracing::debug;

/// Sorts compiled outputs so every output comes after the outputs it references.
///
/// The sort is Kahn's algorithm over output-to-output edges. Among outputs
/// that are ready at the same time the earliest in insertion order wins, so
/// ordering an already ordered list returns it unchanged. Invalid outputs
/// keep their place in the order but their dependencies are ignored, and
/// references to names that are not in the list are ignored too.
pub struct ExecutionOrderResolver;

impl ExecutionOrderResolver {
    /// Returns the outputs in execution order with dense `execution_order`
    /// ranks starting at zero.
    pub fn order(outputs: Vec<CompiledOutput>) -> Result<Vec<CompiledOutput>, OrderingError> {
        let plan = Self::plan(&outputs)?;
        Ok(Self::apply(outputs, &plan))
    }

    /// Computes the execution sequence as indices into `outputs`.
    pub(crate) fn plan(outputs: &[CompiledOutput]) -> Result<Vec<usize>, OrderingError> {
        let edges = dependency_edges(outputs);

        let mut in_degree: Vec<usize> = edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); outputs.len()];
        for (index, deps) in edges.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(index);
            }
        }

        let mut ready: BTreeSet<usize> = (0..outputs.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut sequence = Vec::with_capacity(outputs.len());
        while let Some(index) = ready.pop_first() {
            sequence.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if sequence.len() == outputs.len() {
            return Ok(sequence);
        }

        let remaining: Vec<usize> = (0..outputs.len()).filter(|&i| in_degree[i] > 0).collect();
        let cycles = strongly_connected_cycles(&edges, &remaining);
        let on_cycle: Vec<usize> = cycles.iter().flatten().copied().collect();
        let blocked = remaining
            .iter()
            .filter(|i| !on_cycle.contains(i))
            .map(|&i| outputs[i].name.clone())
            .collect();
        let cycles = cycles
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|i| outputs[i].name.clone()).collect())
            .collect();

        Err(OrderingError::CircularOutputs { cycles, blocked })
    }

    /// Reorders `outputs` by `plan` and assigns dense ranks.
    pub(crate) fn apply(outputs: Vec<CompiledOutput>, plan: &[usize]) -> Vec<CompiledOutput> {
        let mut slots: Vec<Option<CompiledOutput>> = outputs.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(plan.len());
        for &index in plan {
            if let Some(mut output) = slots.get_mut(index).and_then(Option::take) {
                output.execution_order = ordered.len();
                ordered.push(output);
            }
        }
        debug!(
            order = %ordered.iter().map(|o| o.name.as_str()).join(", "),
            "resolved execution order"
        );
        ordered
    }
}

/// For each output, the indices of the outputs it depends on.
fn dependency_edges(outputs: &[CompiledOutput]) -> Vec<Vec<usize>> {
    // With duplicate names, the first valid output claims the name.
    let mut by_name: AHashMap<&str, usize> = AHashMap::new();
    for (index, output) in outputs.iter().enumerate() {
        let slot = by_name.entry(output.name.as_str()).or_insert(index);
        if !outputs[*slot].is_valid() && output.is_valid() {
            *slot = index;
        }
    }

    outputs
        .iter()
        .map(|output| {
            if !output.is_valid() {
                return Vec::new();
            }
            output
                .dependencies
                .outputs
                .iter()
                .filter_map(|name| by_name.get(name.as_str()).copied())
                .unique()
                .collect()
        })
        .collect()
}

/// Tarjan's algorithm restricted to `nodes`. Returns only the components that
/// form a cycle (more than one member, or a self reference), each sorted by
/// index and the list sorted by each component's first member.
fn strongly_connected_cycles(edges: &[Vec<usize>], nodes: &[usize]) -> Vec<Vec<usize>> {
    struct Tarjan<'a> {
        edges: &'a [Vec<usize>],
        member: Vec<bool>,
        index: Vec<Option<usize>>,
        low_link: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        counter: usize,
        components: Vec<Vec<usize>>,
    }

    impl Tarjan<'_> {
        fn connect(&mut self, node: usize) {
            self.index[node] = Some(self.counter);
            self.low_link[node] = self.counter;
            self.counter += 1;
            self.stack.push(node);
            self.on_stack[node] = true;

            let edges = self.edges;
            for &next in &edges[node] {
                if !self.member[next] {
                    continue;
                }
                match self.index[next] {
                    None => {
                        self.connect(next);
                        self.low_link[node] = self.low_link[node].min(self.low_link[next]);
                    }
                    Some(next_index) if self.on_stack[next] => {
                        self.low_link[node] = self.low_link[node].min(next_index);
                    }
                    Some(_) => {}
                }
            }

            if Some(self.low_link[node]) == self.index[node] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    let size = edges.len();
    let mut member = vec![false; size];
    for &node in nodes {
        member[node] = true;
    }
    let mut tarjan = Tarjan {
        edges,
        member,
        index: vec![None; size],
        low_link: vec![0; size],
        on_stack: vec![false; size],
        stack: Vec::new(),
        counter: 0,
        components: Vec::new(),
    };
    for &node in nodes {
        if tarjan.index[node].is_none() {
            tarjan.connect(node);
        }
    }

    tarjan
        .components
        .into_iter()
        .filter(|component| component.len() > 1 || edges[component[0]].contains(&component[0]))
        .map(|mut component| {
            component.sort_unstable();
            component
        })
        .sorted_by_key(|component| component[0])
        .collect()
}
