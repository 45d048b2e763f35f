//! Filter kind rules and the `depends_on` graph.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use super::{FilterError, FilterOperator, FilterResult, FilterSpec, KindClass};

/// What the registry knows about one filter kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindRule {
    pub class: KindClass,
    pub operators: Vec<FilterOperator>,
    /// Only one value may be in effect; the last applied wins.
    pub exclusive: bool,
    pub depends_on: Option<KindClass>,
}

impl KindRule {
    pub fn new(class: KindClass, operators: &[FilterOperator]) -> Self {
        Self {
            class,
            operators: operators.to_vec(),
            exclusive: false,
            depends_on: None,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn depends_on(mut self, prerequisite: KindClass) -> Self {
        self.depends_on = Some(prerequisite);
        self
    }
}

/// A selectable value of a dependent filter, tagged with its parent value
/// (e.g. a topic and the cluster that hosts it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterOption {
    pub value: String,
    pub parent: Option<String>,
}

impl FilterOption {
    pub fn new(value: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            value: value.into(),
            parent: parent.map(str::to_string),
        }
    }
}

/// Filter kind rules.
///
/// Edges of the dependency graph run prerequisite → dependent.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    rules: BTreeMap<KindClass, KindRule>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dashboard's filter kinds.
    pub fn standard() -> Self {
        use FilterOperator::*;

        let rules = [
            KindRule::new(KindClass::Provider, &[Equals]).exclusive(),
            KindRule::new(KindClass::Account, &[Equals]).exclusive(),
            KindRule::new(KindClass::Status, &[Equals]).exclusive(),
            KindRule::new(KindClass::Cluster, &[In, NotIn, Equals]),
            KindRule::new(KindClass::Topic, &[In, NotIn, Equals, Contains])
                .depends_on(KindClass::Cluster),
            KindRule::new(KindClass::Search, &[Contains, Matches]).exclusive(),
            KindRule::new(KindClass::Custom, &[In, NotIn, Equals, Contains, Matches]),
        ];

        let mut registry = Self::new();
        for rule in rules {
            registry.rules.insert(rule.class, rule);
        }
        registry
    }

    /// Add or replace a rule. A rule that would close a `depends_on` cycle
    /// is rejected and the registry is left unchanged.
    pub fn register(&mut self, rule: KindRule) -> FilterResult<()> {
        let mut candidate = self.rules.clone();
        candidate.insert(rule.class, rule);
        let (graph, _) = dependency_graph(&candidate);

        if let Some(cycle) = find_cycle(&graph) {
            return Err(FilterError::CyclicDependency { cycle });
        }
        self.rules = candidate;
        Ok(())
    }

    pub fn rule(&self, class: KindClass) -> Option<&KindRule> {
        self.rules.get(&class)
    }

    /// Whether `operator` may be used with filters of `class`.
    pub fn allows(&self, class: KindClass, operator: FilterOperator) -> bool {
        self.rule(class)
            .is_some_and(|rule| rule.operators.contains(&operator))
    }

    pub fn is_exclusive(&self, class: KindClass) -> bool {
        self.rule(class).is_some_and(|rule| rule.exclusive)
    }

    pub fn prerequisite(&self, class: KindClass) -> Option<KindClass> {
        self.rule(class).and_then(|rule| rule.depends_on)
    }

    /// Registered kinds, prerequisites before their dependents.
    pub fn dependency_order(&self) -> Vec<KindClass> {
        let (graph, _) = dependency_graph(&self.rules);
        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|idx| graph[idx]).collect(),
            // Unreachable while `register` rejects cycles.
            Err(_) => self.rules.keys().copied().collect(),
        }
    }

    /// Options of a dependent kind that remain selectable under `specs`.
    ///
    /// Empty when the prerequisite has no values: a cleared parent never
    /// widens its children to "all".
    pub fn dependent_options(
        &self,
        class: KindClass,
        options: &[FilterOption],
        specs: &[FilterSpec],
    ) -> Vec<FilterOption> {
        let Some(prerequisite) = self.prerequisite(class) else {
            return options.to_vec();
        };

        let parents: Vec<&FilterSpec> = specs
            .iter()
            .filter(|spec| spec.kind.class() == prerequisite && !spec.values.is_empty())
            .collect();
        if parents.is_empty() {
            return Vec::new();
        }

        options
            .iter()
            .filter(|option| {
                let Some(parent) = option.parent.as_deref() else {
                    return false;
                };
                parents.iter().all(|spec| parent_matches(spec, parent))
            })
            .cloned()
            .collect()
    }
}

fn parent_matches(spec: &FilterSpec, parent: &str) -> bool {
    let listed = spec.values.iter().any(|v| v == parent);
    match spec.operator {
        FilterOperator::NotIn => !listed,
        FilterOperator::Contains => spec.values.iter().any(|v| parent.contains(v.as_str())),
        FilterOperator::Matches => spec
            .values
            .iter()
            .filter_map(|v| regex::Regex::new(v).ok())
            .any(|re| re.is_match(parent)),
        FilterOperator::In | FilterOperator::Equals => listed,
    }
}

fn dependency_graph(
    rules: &BTreeMap<KindClass, KindRule>,
) -> (DiGraph<KindClass, ()>, HashMap<KindClass, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<KindClass, NodeIndex> = HashMap::new();

    let mut node = |graph: &mut DiGraph<KindClass, ()>, class: KindClass| {
        *nodes.entry(class).or_insert_with(|| graph.add_node(class))
    };

    for rule in rules.values() {
        let dependent = node(&mut graph, rule.class);
        if let Some(prerequisite) = rule.depends_on {
            let prerequisite = node(&mut graph, prerequisite);
            graph.add_edge(prerequisite, dependent, ());
        }
    }
    (graph, nodes)
}

/// The members of the first cycle, if any. A kind depending on itself is a
/// cycle of one.
fn find_cycle(graph: &DiGraph<KindClass, ()>) -> Option<Vec<KindClass>> {
    for scc in tarjan_scc(graph) {
        let is_cycle = scc.len() > 1 || graph.contains_edge(scc[0], scc[0]);
        if is_cycle {
            let mut cycle: Vec<KindClass> = scc.iter().map(|idx| graph[*idx]).collect();
            cycle.sort();
            return Some(cycle);
        }
    }
    None
}
