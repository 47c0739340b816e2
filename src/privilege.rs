//! Cycle and equivalence detection over aggregate privilege definitions
//! (spec §4.7): the validation core of a much larger, out-of-scope access
//! control subsystem (ACL evaluation itself is not part of this crate -
//! see §1's Out of scope list). An aggregate privilege's declared
//! aggregates must form a DAG over built-ins and other definitions, and no
//! two privileges may carry the same effective (non-aggregate) leaf set.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::instrument;

use crate::error::PrivilegeError;

/// A privilege definition as loaded into or registered against a
/// [`PrivilegeRegistry`] (spec §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeDefinition {
    pub name: String,
    pub is_abstract: bool,
    /// Names of other privileges (built-in or custom) this one aggregates.
    /// Empty for a non-aggregate (leaf) privilege.
    pub declared_aggregate_names: Vec<String>,
}

impl PrivilegeDefinition {
    pub fn non_aggregate(name: impl Into<String>) -> Self {
        PrivilegeDefinition {
            name: name.into(),
            is_abstract: false,
            declared_aggregate_names: Vec::new(),
        }
    }

    pub fn aggregate(
        name: impl Into<String>,
        is_abstract: bool,
        declared_aggregate_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        PrivilegeDefinition {
            name: name.into(),
            is_abstract,
            declared_aggregate_names: declared_aggregate_names.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validates and stores aggregate privilege definitions (spec §4.7).
///
/// Built-in names are reserved at construction: they may be referenced by
/// `declared_aggregate_names` but can never be redefined or overwritten.
/// Every mutating call re-validates the whole graph (built-ins + existing
/// definitions + the candidate change) against an uncommitted copy and only
/// swaps it in on success, so a rejected registration leaves the registry
/// exactly as it was (spec §4.7's "partial state on failure must be rolled
/// back").
pub struct PrivilegeRegistry {
    built_ins: HashSet<String>,
    definitions: HashMap<String, PrivilegeDefinition>,
}

impl PrivilegeRegistry {
    pub fn new(built_ins: impl IntoIterator<Item = impl Into<String>>) -> Self {
        PrivilegeRegistry {
            built_ins: built_ins.into_iter().map(Into::into).collect(),
            definitions: HashMap::new(),
        }
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.built_ins.contains(name) || self.definitions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&PrivilegeDefinition> {
        self.definitions.get(name)
    }

    /// Loads an initial batch of definitions, validating the combined set
    /// (built-ins + `definitions`) as a whole. On failure, none of
    /// `definitions` is retained.
    #[instrument(skip(self, definitions))]
    pub fn load(&mut self, definitions: Vec<PrivilegeDefinition>) -> Result<(), PrivilegeError> {
        let mut candidate = self.definitions.clone();
        for def in definitions {
            if self.built_ins.contains(&def.name) {
                return Err(PrivilegeError::DuplicateName(def.name));
            }
            candidate.insert(def.name.clone(), def);
        }
        validate_all(&self.built_ins, &candidate)?;
        self.definitions = candidate;
        Ok(())
    }

    /// Registers one additional definition, re-validating the full graph.
    #[instrument(skip(self))]
    pub fn register_definition(&mut self, def: PrivilegeDefinition) -> Result<(), PrivilegeError> {
        if self.built_ins.contains(&def.name) || self.definitions.contains_key(&def.name) {
            return Err(PrivilegeError::DuplicateName(def.name));
        }
        let mut candidate = self.definitions.clone();
        candidate.insert(def.name.clone(), def);
        validate_all(&self.built_ins, &candidate)?;
        self.definitions = candidate;
        Ok(())
    }
}

/// Builds the (built-ins + `definitions`) graph, checks it is acyclic, then
/// checks every definition's non-aggregate leaf set is unique and free of
/// built-ins. Pure function of its inputs so `load`/`register_definition`
/// can run it against a throwaway candidate map before committing.
fn validate_all(
    built_ins: &HashSet<String>,
    definitions: &HashMap<String, PrivilegeDefinition>,
) -> Result<(), PrivilegeError> {
    let mut graph = DiGraph::<String, ()>::new();
    let mut index_of: HashMap<String, NodeIndex> = HashMap::new();
    for name in built_ins.iter().chain(definitions.keys()) {
        index_of.entry(name.clone()).or_insert_with(|| graph.add_node(name.clone()));
    }
    for def in definitions.values() {
        let from = index_of[&def.name];
        for aggregate_name in &def.declared_aggregate_names {
            let Some(&to) = index_of.get(aggregate_name) else {
                return Err(PrivilegeError::InvalidName(aggregate_name.clone()));
            };
            graph.add_edge(from, to, ());
        }
    }

    let mut color: HashMap<NodeIndex, Color> = HashMap::new();
    for name in definitions.keys() {
        let start = index_of[name];
        if !matches!(color.get(&start), Some(Color::Black)) {
            dfs_check_cycle(&graph, start, &mut color)?;
        }
    }

    let mut leaves_memo: HashMap<NodeIndex, HashSet<NodeIndex>> = HashMap::new();
    let mut seen_leaf_sets: HashMap<Vec<NodeIndex>, String> = HashMap::new();
    for name in definitions.keys() {
        let ix = index_of[name];
        let leaves = compute_leaves(&graph, ix, built_ins, &mut leaves_memo);

        // A non-aggregate's leaf set is just itself, which is never a
        // built-in (names are disjoint), so reaching one here always means
        // `name` is an aggregate whose closure pulled in a built-in.
        if let Some(&builtin_leaf) = leaves.iter().find(|&&l| built_ins.contains(&graph[l])) {
            return Err(PrivilegeError::AggregationNotSupported(
                name.clone(),
                graph[builtin_leaf].clone(),
            ));
        }

        let mut key: Vec<NodeIndex> = leaves.into_iter().collect();
        key.sort();
        if !key.is_empty() {
            if let Some(existing) = seen_leaf_sets.get(&key) {
                if existing != name {
                    return Err(PrivilegeError::EquivalentDefinitions(existing.clone(), name.clone()));
                }
            } else {
                seen_leaf_sets.insert(key, name.clone());
            }
        }
    }
    Ok(())
}

/// Three-color DFS cycle check (spec §4.7): a gray-to-gray edge is a back
/// edge, i.e. a cycle through the node currently on the DFS stack.
fn dfs_check_cycle(
    graph: &DiGraph<String, ()>,
    start: NodeIndex,
    color: &mut HashMap<NodeIndex, Color>,
) -> Result<(), PrivilegeError> {
    color.insert(start, Color::Gray);
    for neighbor in graph.neighbors_directed(start, Direction::Outgoing) {
        match color.get(&neighbor).copied().unwrap_or(Color::White) {
            Color::White => dfs_check_cycle(graph, neighbor, color)?,
            Color::Gray => {
                return Err(PrivilegeError::CyclicDefinitions(format!(
                    "{} -> {}",
                    graph[start], graph[neighbor]
                )));
            }
            Color::Black => {}
        }
    }
    color.insert(start, Color::Black);
    Ok(())
}

/// Memoized DFS computing the non-aggregate leaf set reachable from `ix`: a
/// built-in neighbor counts as a leaf in its own right (built-ins carry no
/// declared aggregates here - see DESIGN.md), and a definition with no
/// outgoing edges is its own sole leaf.
fn compute_leaves(
    graph: &DiGraph<String, ()>,
    ix: NodeIndex,
    built_ins: &HashSet<String>,
    memo: &mut HashMap<NodeIndex, HashSet<NodeIndex>>,
) -> HashSet<NodeIndex> {
    if let Some(cached) = memo.get(&ix) {
        return cached.clone();
    }
    let mut out = HashSet::new();
    let mut has_outgoing = false;
    for neighbor in graph.neighbors_directed(ix, Direction::Outgoing) {
        has_outgoing = true;
        if built_ins.contains(&graph[neighbor]) {
            out.insert(neighbor);
        } else {
            out.extend(compute_leaves(graph, neighbor, built_ins, memo));
        }
    }
    if !has_outgoing {
        out.insert(ix);
    }
    memo.insert(ix, out.clone());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_definitions_are_rejected() {
        let mut registry = PrivilegeRegistry::new(Vec::<String>::new());
        let result = registry.load(vec![
            PrivilegeDefinition::aggregate("test", false, ["test2"]),
            PrivilegeDefinition::aggregate("test2", false, ["test4"]),
            PrivilegeDefinition::aggregate("test4", false, ["test5"]),
            PrivilegeDefinition::aggregate("test5", false, ["test3"]),
            PrivilegeDefinition::aggregate("test3", false, ["test"]),
        ]);
        assert!(matches!(result, Err(PrivilegeError::CyclicDefinitions(_))));
        assert!(!registry.is_known("test"));
    }

    #[test]
    fn acyclic_aggregates_load_successfully() {
        let mut registry = PrivilegeRegistry::new(Vec::<String>::new());
        registry
            .load(vec![
                PrivilegeDefinition::non_aggregate("read"),
                PrivilegeDefinition::non_aggregate("write"),
                PrivilegeDefinition::aggregate("read_write", false, ["read", "write"]),
            ])
            .unwrap();
        assert!(registry.is_known("read_write"));
    }

    #[test]
    fn equivalent_transitive_leaf_sets_are_rejected() {
        let mut registry = PrivilegeRegistry::new(Vec::<String>::new());
        let result = registry.load(vec![
            PrivilegeDefinition::non_aggregate("read"),
            PrivilegeDefinition::non_aggregate("write"),
            PrivilegeDefinition::non_aggregate("other"),
            PrivilegeDefinition::aggregate("test", false, ["read", "write"]),
            PrivilegeDefinition::aggregate("test6", false, ["read", "write"]),
        ]);
        assert!(matches!(result, Err(PrivilegeError::EquivalentDefinitions(_, _))));
    }

    #[test]
    fn aggregates_cannot_transitively_include_a_built_in() {
        let mut registry = PrivilegeRegistry::new(["jcr:read"]);
        let result = registry.load(vec![PrivilegeDefinition::aggregate(
            "custom_read",
            false,
            ["jcr:read"],
        )]);
        assert!(matches!(
            result,
            Err(PrivilegeError::AggregationNotSupported(_, _))
        ));
    }

    #[test]
    fn unknown_aggregate_name_is_invalid() {
        let mut registry = PrivilegeRegistry::new(Vec::<String>::new());
        let result = registry.load(vec![PrivilegeDefinition::aggregate(
            "test",
            false,
            ["does_not_exist"],
        )]);
        assert!(matches!(result, Err(PrivilegeError::InvalidName(_))));
    }

    #[test]
    fn registering_builtin_name_is_a_duplicate() {
        let mut registry = PrivilegeRegistry::new(["jcr:read"]);
        let result = registry.register_definition(PrivilegeDefinition::non_aggregate("jcr:read"));
        assert!(matches!(result, Err(PrivilegeError::DuplicateName(_))));
    }

    #[test]
    fn failed_registration_rolls_back_to_the_prior_state() {
        let mut registry = PrivilegeRegistry::new(Vec::<String>::new());
        registry
            .register_definition(PrivilegeDefinition::non_aggregate("read"))
            .unwrap();
        let result = registry.register_definition(PrivilegeDefinition::aggregate(
            "broken",
            false,
            ["does_not_exist"],
        ));
        assert!(result.is_err());
        assert!(registry.is_known("read"));
        assert!(!registry.is_known("broken"));
    }

    #[test]
    fn one_hundred_non_aggregate_privileges_register_and_resolve() {
        let mut registry = PrivilegeRegistry::new(Vec::<String>::new());
        for i in 0..100 {
            let name = format!("custom:priv{i}");
            registry
                .register_definition(PrivilegeDefinition::non_aggregate(&name))
                .unwrap();
        }
        for i in 0..100 {
            let name = format!("custom:priv{i}");
            assert_eq!(registry.get(&name).map(|d| d.name.as_str()), Some(name.as_str()));
        }
    }
}
