//! Resource dependency graph.
//!
//! The graph is built from the explicit `depends_on` declarations of a
//! manifest. Attribute references are then checked against those edges: every
//! resource a declaration reads from must be one of its transitive
//! dependencies, so a reference can never be resolved before the referenced
//! resource has been reconciled. All checks happen before any provider call.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::manifest::Manifest;
use crate::placeholder::{self, AttrRef, PlaceholderError};
use crate::resource::{ResourceKind, ResourceSpec, validate_name};

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("invalid resource name: {0}")]
  InvalidName(String),

  #[error("resource '{resource}' is keyed as '{key}'")]
  NameMismatch { key: String, resource: String },

  #[error("resource '{resource}' depends on unknown resource '{dependency}'")]
  UnknownDependency { resource: String, dependency: String },

  #[error("dependency cycle between: {}", .members.join(", "))]
  Cycle { members: Vec<String> },

  #[error("{owner} has an invalid reference: {source}")]
  InvalidReference {
    owner: String,
    #[source]
    source: PlaceholderError,
  },

  #[error("{owner} references undeclared resource '{}'", .reference.resource)]
  DanglingReference { owner: String, reference: AttrRef },

  #[error("{owner} references '{reference}', but {kind} resources have no attribute '{}'", .reference.attr)]
  UnknownAttribute {
    owner: String,
    reference: AttrRef,
    kind: ResourceKind,
  },

  #[error("resource '{resource}' references '{reference}' without depending on '{}'", .reference.resource)]
  UnorderedReference { resource: String, reference: AttrRef },

  #[error("resource '{resource}' has invalid {kind} props: {message}")]
  InvalidProps {
    resource: String,
    kind: ResourceKind,
    message: String,
  },

  #[error("stage '{0}' does not depend on any route")]
  StageWithoutRoute(String),
}

/// A validated, acyclic resource graph.
///
/// Edges point from a dependency to its dependent.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
  graph: DiGraph<String, ()>,
  nodes: BTreeMap<String, NodeIndex>,
  kinds: HashMap<String, ResourceKind>,
}

impl ResourceGraph {
  /// Build and fully validate the graph of a manifest.
  ///
  /// Returns the first problem found.
  pub fn from_manifest(manifest: &Manifest) -> Result<Self, GraphError> {
    for (key, def) in &manifest.resources {
      validate_name(&def.name).map_err(GraphError::InvalidName)?;
      if key != &def.name {
        return Err(GraphError::NameMismatch {
          key: key.clone(),
          resource: def.name.clone(),
        });
      }
      for dep in &def.depends_on {
        if dep == &def.name {
          return Err(GraphError::Cycle {
            members: vec![dep.clone()],
          });
        }
        if !manifest.resources.contains_key(dep) {
          return Err(GraphError::UnknownDependency {
            resource: def.name.clone(),
            dependency: dep.clone(),
          });
        }
      }
    }

    let graph = Self::ordering(manifest)?;
    graph.validate_references(manifest)?;
    graph.validate_props(manifest)?;
    graph.validate_stages(manifest)?;
    graph.validate_outputs(manifest)?;
    Ok(graph)
  }

  /// Build only the ordering of a manifest, without reference or prop checks.
  ///
  /// Used for manifests recorded in earlier snapshots, whose assets or props
  /// may no longer validate but whose order still governs teardown. Unknown
  /// dependencies are ignored.
  pub fn ordering(manifest: &Manifest) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = BTreeMap::new();
    let mut kinds = HashMap::new();

    for (name, def) in &manifest.resources {
      nodes.insert(name.clone(), graph.add_node(name.clone()));
      kinds.insert(name.clone(), def.kind);
    }

    for (name, def) in &manifest.resources {
      let dependent = nodes[name];
      for dep in &def.depends_on {
        if let Some(&dependency) = nodes.get(dep) {
          graph.add_edge(dependency, dependent, ());
        }
      }
    }

    let rg = Self { graph, nodes, kinds };
    rg.verify_acyclic()?;
    Ok(rg)
  }

  fn verify_acyclic(&self) -> Result<(), GraphError> {
    if toposort(&self.graph, None).is_ok() {
      return Ok(());
    }

    let mut members: Vec<String> = tarjan_scc(&self.graph)
      .into_iter()
      .find(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
      .unwrap_or_default()
      .into_iter()
      .map(|idx| self.graph[idx].clone())
      .collect();
    members.sort();
    Err(GraphError::Cycle { members })
  }

  fn validate_references(&self, manifest: &Manifest) -> Result<(), GraphError> {
    for (name, def) in &manifest.resources {
      let owner = format!("resource '{}'", name);
      let refs = def.references().map_err(|source| GraphError::InvalidReference {
        owner: owner.clone(),
        source,
      })?;

      let ancestors = self.ancestors(name);
      for reference in refs {
        self.check_reference(&owner, &reference)?;
        if !ancestors.contains(&reference.resource) {
          return Err(GraphError::UnorderedReference {
            resource: name.clone(),
            reference,
          });
        }
      }
    }
    Ok(())
  }

  fn check_reference(&self, owner: &str, reference: &AttrRef) -> Result<(), GraphError> {
    let Some(kind) = self.kinds.get(&reference.resource) else {
      return Err(GraphError::DanglingReference {
        owner: owner.to_string(),
        reference: reference.clone(),
      });
    };
    if !kind.has_attribute(&reference.attr) {
      return Err(GraphError::UnknownAttribute {
        owner: owner.to_string(),
        reference: reference.clone(),
        kind: *kind,
      });
    }
    Ok(())
  }

  fn validate_props(&self, manifest: &Manifest) -> Result<(), GraphError> {
    // References are strings, so unresolved props still type-check.
    for (name, def) in &manifest.resources {
      ResourceSpec::from_props(def.kind, &def.props).map_err(|e| GraphError::InvalidProps {
        resource: name.clone(),
        kind: def.kind,
        message: e.to_string(),
      })?;
    }
    Ok(())
  }

  fn validate_stages(&self, manifest: &Manifest) -> Result<(), GraphError> {
    for (name, def) in &manifest.resources {
      if def.kind != ResourceKind::Stage {
        continue;
      }
      let has_route = self
        .ancestors(name)
        .iter()
        .any(|a| self.kinds.get(a) == Some(&ResourceKind::Route));
      if !has_route {
        return Err(GraphError::StageWithoutRoute(name.clone()));
      }
    }
    Ok(())
  }

  fn validate_outputs(&self, manifest: &Manifest) -> Result<(), GraphError> {
    for (name, template) in &manifest.outputs {
      let owner = format!("output '{}'", name);
      let refs = placeholder::references(template).map_err(|source| GraphError::InvalidReference {
        owner: owner.clone(),
        source,
      })?;
      for reference in refs {
        self.check_reference(&owner, &reference)?;
      }
    }
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.nodes.contains_key(name)
  }

  pub fn kind(&self, name: &str) -> Option<ResourceKind> {
    self.kinds.get(name).copied()
  }

  /// All resource names, sorted.
  pub fn names(&self) -> impl Iterator<Item = &String> {
    self.nodes.keys()
  }

  /// Names in an order where dependencies come before dependents.
  pub fn topological_order(&self) -> Vec<String> {
    // Acyclic by construction.
    toposort(&self.graph, None)
      .unwrap_or_default()
      .into_iter()
      .map(|idx| self.graph[idx].clone())
      .collect()
  }

  /// Names in teardown order: dependents before their dependencies.
  pub fn reverse_topological_order(&self) -> Vec<String> {
    let mut order = self.topological_order();
    order.reverse();
    order
  }

  /// Group resources into waves whose members only depend on earlier waves.
  pub fn waves(&self) -> Vec<Vec<String>> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[idx] == 0).copied().collect();
      if ready.is_empty() {
        break;
      }

      for idx in &ready {
        remaining.remove(idx);
        for neighbor in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<String> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
    }

    waves
  }

  fn neighbors(&self, name: &str, direction: Direction) -> BTreeSet<String> {
    let Some(&idx) = self.nodes.get(name) else {
      return BTreeSet::new();
    };
    self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect()
  }

  fn reachable(&self, name: &str, direction: Direction) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<String> = self.neighbors(name, direction).into_iter().collect();
    while let Some(next) = stack.pop() {
      if seen.insert(next.clone()) {
        stack.extend(self.neighbors(&next, direction));
      }
    }
    seen
  }

  /// Direct dependencies.
  pub fn dependencies(&self, name: &str) -> BTreeSet<String> {
    self.neighbors(name, Direction::Incoming)
  }

  /// Direct dependents.
  pub fn dependents(&self, name: &str) -> BTreeSet<String> {
    self.neighbors(name, Direction::Outgoing)
  }

  /// Transitive dependencies.
  pub fn ancestors(&self, name: &str) -> BTreeSet<String> {
    self.reachable(name, Direction::Incoming)
  }

  /// Transitive dependents.
  pub fn descendants(&self, name: &str) -> BTreeSet<String> {
    self.reachable(name, Direction::Outgoing)
  }

  /// Render as Graphviz DOT.
  pub fn to_dot(&self) -> String {
    let mut out = String::from("digraph stack {\n  rankdir=LR;\n");
    for (name, idx) in &self.nodes {
      let _ = writeln!(out, "  \"{}\" [label=\"{}\\n({})\"];", name, name, self.kinds[name]);
      let mut dependents: Vec<&String> = self
        .graph
        .neighbors_directed(*idx, Direction::Outgoing)
        .map(|n| &self.graph[n])
        .collect();
      dependents.sort();
      for dependent in dependents {
        let _ = writeln!(out, "  \"{}\" -> \"{}\";", name, dependent);
      }
    }
    out.push_str("}\n");
    out
  }
}
