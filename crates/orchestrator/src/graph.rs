use anchor_proofs_types::{DependencyCondition, NewDependency, NewLeg};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Why a leg dependency set was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("intent has no legs")]
    NoLegs,

    #[error("leg key {0} is used twice")]
    DuplicateLeg(String),

    #[error("dependency {leg} -> {depends_on} crosses into intent {foreign_intent}")]
    CrossIntent {
        leg: String,
        depends_on: String,
        foreign_intent: String,
    },

    #[error("dependency references unknown leg {0}")]
    UnknownLeg(String),

    #[error("dependency cycle through legs {0:?}")]
    Cycle(Vec<String>),
}

/// One validated edge: `leg` waits on `depends_on` under `condition`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub leg: usize,
    pub depends_on: usize,
    pub condition: DependencyCondition,
}

/// Dependency DAG over the legs of one intent
///
/// Legs live in an arena indexed by their position in the discovery input;
/// edges are adjacency lists of arena indices, so nothing points at anything.
#[derive(Debug, Clone)]
pub struct LegGraph {
    keys: Vec<String>,
    edges: Vec<Edge>,
    /// upstream index -> downstream indices
    downstream: Vec<Vec<usize>>,
    /// downstream index -> edge indices it waits on
    upstream: Vec<Vec<usize>>,
}

impl LegGraph {
    /// Resolve keys to arena indices and reject foreign or unknown legs
    pub fn build(
        intent_id: &str,
        legs: &[NewLeg],
        dependencies: &[NewDependency],
    ) -> Result<Self, GraphError> {
        if legs.is_empty() {
            return Err(GraphError::NoLegs);
        }

        let mut index = HashMap::with_capacity(legs.len());
        for (i, leg) in legs.iter().enumerate() {
            if index.insert(leg.key.as_str(), i).is_some() {
                return Err(GraphError::DuplicateLeg(leg.key.clone()));
            }
        }

        let mut graph = Self {
            keys: legs.iter().map(|l| l.key.clone()).collect(),
            edges: Vec::with_capacity(dependencies.len()),
            downstream: vec![Vec::new(); legs.len()],
            upstream: vec![Vec::new(); legs.len()],
        };

        for dep in dependencies {
            for foreign in [&dep.intent_id, &dep.depends_on_intent_id] {
                if foreign != intent_id {
                    return Err(GraphError::CrossIntent {
                        leg: dep.leg.clone(),
                        depends_on: dep.depends_on.clone(),
                        foreign_intent: foreign.clone(),
                    });
                }
            }
            let leg = *index
                .get(dep.leg.as_str())
                .ok_or_else(|| GraphError::UnknownLeg(dep.leg.clone()))?;
            let depends_on = *index
                .get(dep.depends_on.as_str())
                .ok_or_else(|| GraphError::UnknownLeg(dep.depends_on.clone()))?;

            graph.upstream[leg].push(graph.edges.len());
            graph.downstream[depends_on].push(leg);
            graph.edges.push(Edge {
                leg,
                depends_on,
                condition: dep.condition,
            });
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, index: usize) -> &str {
        &self.keys[index]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges the leg at `index` waits on
    pub fn upstream(&self, index: usize) -> impl Iterator<Item = &Edge> + '_ {
        self.upstream[index].iter().map(move |&e| &self.edges[e])
    }

    /// Kahn's algorithm; ties resolve to the lowest arena index.
    ///
    /// Legs left with unresolved in-edges form or feed a cycle, self-loops included.
    pub fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let mut in_degree: Vec<usize> = self.upstream.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &down in &self.downstream[next] {
                in_degree[down] -= 1;
                if in_degree[down] == 0 {
                    ready.insert(down);
                }
            }
        }

        if order.len() < self.len() {
            let stuck = (0..self.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.keys[i].clone())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }
        Ok(order)
    }
}
