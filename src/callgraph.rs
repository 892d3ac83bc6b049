//! Static caller/callee call-graph index
//!
//! The graph exclusively owns its nodes in an arena; caller and callee
//! adjacency are non-owning [`NodeId`] cross-references maintained in both
//! directions for O(1) bidirectional traversal. A graph is built once from a
//! static-analysis dump and then queried read-only; switching to another
//! historical version means loading a fresh instance.
//!
//! Two dump formats are supported:
//! - the per-test block format (`Function: `-delimited blocks with an
//!   optional `Origin File:` line followed by caller names), and
//! - the whole-library edge-list format (`callee : caller`, one edge per
//!   line).
//!
//! All queries tolerate cycles; the caller-direction closure visits each
//! node at most once. Unknown roots yield empty results, never errors:
//! "no reachability data" means "zero estimated operations touched."

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use fnv::FnvHashMap;
use tracing::warn;

pub type NodeId = usize;

/// A single function in the graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub name: String,
    /// Origin file, used to disambiguate same-named functions.
    pub file: Option<String>,
    pub line: i64,
    pub callers: Vec<NodeId>,
    pub callees: Vec<NodeId>,
}

/// Caller/callee graph keyed by function name.
#[derive(Debug, Default)]
pub struct CallGraph {
    nodes: Vec<GraphNode>,
    index: FnvHashMap<String, NodeId>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, name: &str) -> Option<&GraphNode> {
        self.index.get(name).map(|&id| &self.nodes[id])
    }

    fn get_or_create(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            name: name.to_string(),
            file: None,
            line: -1,
            callers: Vec::new(),
            callees: Vec::new(),
        });
        self.index.insert(name.to_string(), id);
        id
    }

    /// Record `caller` as calling `callee`. Duplicate edges are not inserted,
    /// which makes dump loading idempotent.
    fn add_edge(&mut self, callee: NodeId, caller: NodeId) {
        if !self.nodes[callee].callers.contains(&caller) {
            self.nodes[callee].callers.push(caller);
            self.nodes[caller].callees.push(callee);
        }
    }

    /// Load (or extend) the graph from a per-test block-format dump.
    ///
    /// Blocks are delimited by `Function: `; the first line names the
    /// function, an optional `Origin File: <path>: <line>` line follows, the
    /// remaining lines are caller names. Malformed blocks are skipped with a
    /// warning.
    pub fn load_from_source(&mut self, dump_path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(dump_path)
            .with_context(|| format!("reading call-graph dump {}", dump_path.display()))?;
        for block in text.split("Function: ") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            let lines: Vec<&str> = block.lines().map(|l| l.trim()).collect();
            let func_name = lines[0];
            if func_name.is_empty() {
                continue;
            }
            let node = self.get_or_create(func_name);
            let caller_lines: &[&str] = if lines.len() > 1 && lines[1].starts_with("Origin File: ")
            {
                let meta = lines[1].trim_start_matches("Origin File: ");
                match meta.rsplit_once(": ") {
                    Some((file, line)) => {
                        let file = file.trim_start_matches("./").to_string();
                        let line: i64 = match line.trim().parse() {
                            Ok(n) => n,
                            Err(_) => {
                                warn!(function = func_name, "skipping block with malformed origin line");
                                continue;
                            }
                        };
                        self.nodes[node].file = Some(file);
                        self.nodes[node].line = line;
                    }
                    None => {
                        warn!(function = func_name, "skipping block with malformed origin line");
                        continue;
                    }
                }
                lines.get(3..).unwrap_or(&[])
            } else {
                lines.get(2..).unwrap_or(&[])
            };
            for caller_name in caller_lines {
                if caller_name.is_empty() {
                    continue;
                }
                let caller = self.get_or_create(caller_name);
                self.add_edge(node, caller);
            }
        }
        Ok(())
    }

    /// Load (or extend) the graph from a whole-library edge list.
    ///
    /// One record per line, `callee : caller`; a line without a caller still
    /// creates the node.
    pub fn load_edge_list(&mut self, dump_path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(dump_path)
            .with_context(|| format!("reading edge-list dump {}", dump_path.display()))?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, " : ");
            let callee_name = match parts.next().map(str::trim) {
                Some(n) if !n.is_empty() => n,
                _ => continue,
            };
            let callee = self.get_or_create(callee_name);
            if let Some(caller_name) = parts.next().map(str::trim) {
                if !caller_name.is_empty() {
                    let caller = self.get_or_create(caller_name);
                    self.add_edge(callee, caller);
                }
            }
        }
        Ok(())
    }

    /// Caller-direction reachability closure from `root`.
    ///
    /// Returns the names of every function reachable over caller edges,
    /// including the root itself. Cycle-tolerant; an unknown root yields an
    /// empty set.
    pub fn get_all_call(&self, root: &str) -> HashSet<String> {
        let root_id = match self.index.get(root) {
            Some(&id) => id,
            None => return HashSet::new(),
        };
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![root_id];
        while let Some(cur) = stack.pop() {
            if visited.insert(cur) {
                stack.extend(self.nodes[cur].callers.iter().copied());
            }
        }
        visited.into_iter().map(|id| self.nodes[id].name.clone()).collect()
    }

    /// Caller-reachable functions that have no callers themselves.
    pub fn get_ground_funcs(&self, root: &str) -> HashSet<String> {
        let root_id = match self.index.get(root) {
            Some(&id) => id,
            None => return HashSet::new(),
        };
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut ground = HashSet::new();
        let mut stack = vec![root_id];
        while let Some(cur) = stack.pop() {
            if visited.insert(cur) {
                if self.nodes[cur].callers.is_empty() {
                    ground.insert(self.nodes[cur].name.clone());
                } else {
                    stack.extend(self.nodes[cur].callers.iter().copied());
                }
            }
        }
        ground
    }

    /// Caller-reachable functions belonging to the interesting leaf set.
    ///
    /// Used to map a library entry point onto candidate system calls.
    pub fn interesting_leaves(
        &self,
        interesting: &HashSet<String>,
        root: &str,
    ) -> HashSet<String> {
        let root_id = match self.index.get(root) {
            Some(&id) => id,
            None => return HashSet::new(),
        };
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut leaves = HashSet::new();
        let mut stack = vec![root_id];
        while let Some(cur) = stack.pop() {
            if visited.insert(cur) {
                if interesting.contains(&self.nodes[cur].name) {
                    leaves.insert(self.nodes[cur].name.clone());
                }
                stack.extend(self.nodes[cur].callers.iter().copied());
            }
        }
        leaves
    }

    /// Functions whose origin file contains `origin_file` and that call
    /// nothing else in the dump, i.e. the entry points of a per-test graph.
    pub fn get_top_funcs(&self, origin_file: &str) -> HashSet<String> {
        self.nodes
            .iter()
            .filter(|n| {
                n.file
                    .as_deref()
                    .map(|f| f.contains(origin_file))
                    .unwrap_or(false)
                    && n.callees.is_empty()
            })
            .map(|n| n.name.clone())
            .collect()
    }

    /// All simple caller-direction paths of exactly `depth` steps from
    /// `root`. The same node may appear in multiple returned paths but never
    /// twice within one path.
    pub fn forward_step(&self, root: &str, depth: usize) -> Vec<Vec<String>> {
        self.bounded_paths(root, depth, Direction::Caller)
    }

    /// All simple callee-direction paths of exactly `depth` steps from `root`.
    pub fn backward_step(&self, root: &str, depth: usize) -> Vec<Vec<String>> {
        self.bounded_paths(root, depth, Direction::Callee)
    }

    /// Caller and callee context of a function at the given depth.
    pub fn context(&self, root: &str, depth: usize) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
        (self.forward_step(root, depth), self.backward_step(root, depth))
    }

    fn bounded_paths(&self, root: &str, depth: usize, dir: Direction) -> Vec<Vec<String>> {
        let root_id = match self.index.get(root) {
            Some(&id) => id,
            None => return Vec::new(),
        };
        if depth == 0 {
            return Vec::new();
        }
        let mut results = Vec::new();
        let mut path: Vec<NodeId> = Vec::new();
        self.paths_dfs(root_id, depth, dir, &mut path, &mut results);
        results
            .into_iter()
            .map(|p| p.into_iter().map(|id| self.nodes[id].name.clone()).collect())
            .collect()
    }

    fn paths_dfs(
        &self,
        node: NodeId,
        target_depth: usize,
        dir: Direction,
        path: &mut Vec<NodeId>,
        results: &mut Vec<Vec<NodeId>>,
    ) {
        if path.len() == target_depth {
            results.push(path.clone());
            return;
        }
        let next = match dir {
            Direction::Caller => &self.nodes[node].callers,
            Direction::Callee => &self.nodes[node].callees,
        };
        for &n in next {
            if path.contains(&n) {
                continue;
            }
            path.push(n);
            self.paths_dfs(n, target_depth, dir, path, results);
            path.pop();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Caller,
    Callee,
}
