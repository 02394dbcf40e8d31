//! Graphviz export.

use std::fmt::Write;

use rustc_hash::FxHashMap;

use super::ModuleDependencyGraph;
use crate::key::{DeclKey, NodeKey};

impl ModuleDependencyGraph {
    /// Render the graph in DOT format.
    ///
    /// Nodes and edges are sorted so equal graphs render identically. Edges
    /// point from a definition to its users; keys used but defined nowhere
    /// are drawn as dashed boxes.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut nodes: Vec<&NodeKey> = self.nodes.keys().collect();
        nodes.sort();
        let mut keys: Vec<&DeclKey> = self.uses.keys().collect();
        keys.sort();

        let mut ids: FxHashMap<&NodeKey, usize> = FxHashMap::default();
        let mut definers: FxHashMap<&DeclKey, Vec<usize>> = FxHashMap::default();
        for (id, &node) in nodes.iter().enumerate() {
            ids.insert(node, id);
            definers.entry(&node.key).or_default().push(id);
        }

        let mut out = String::from("digraph \"dependencies\" {\n");
        for (id, node) in nodes.iter().enumerate() {
            let style = if node.source.is_some() { "ellipse" } else { "box" };
            let _ = writeln!(out, "  n{id} [label=\"{}\", shape={style}];", escape(&node.to_string()));
        }

        for (index, &key) in keys.iter().enumerate() {
            let mut users: Vec<usize> = self
                .users_of(key)
                .filter_map(|user| ids.get(user).copied())
                .collect();
            users.sort_unstable();

            let from: Vec<String> = match definers.get(key) {
                Some(defs) => defs.iter().map(|id| format!("n{id}")).collect(),
                None => {
                    let _ = writeln!(
                        out,
                        "  u{index} [label=\"{}\", shape=box, style=dashed];",
                        escape(&key.to_string())
                    );
                    vec![format!("u{index}")]
                }
            };
            for def in &from {
                for user in &users {
                    let _ = writeln!(out, "  {def} -> n{user};");
                }
            }
        }
        out.push_str("}\n");
        out
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
