// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record flattening.
//!
//! Collapses a nested record into a single-level mapping keyed by the
//! dot-joined path of each leaf:
//!
//! ```text
//! {"ping": {"jitter": 0.7}, "isp": "ExampleNet"}
//!     --> {"isp": "ExampleNet", "ping.jitter": 0.7}
//! ```

use crate::record::{Node, Scalar};
use std::collections::BTreeMap;

/// Single-level record: key path to leaf value.
pub type FlatRecord = BTreeMap<String, Scalar>;

/// Separator between path segments.
pub const SEPARATOR: &str = ".";

/// Flatten a raw record using [`SEPARATOR`].
///
/// An absent or empty record yields an empty result and a warning; callers
/// decide what an empty measurement means.
pub fn flatten(record: Option<&Node>) -> FlatRecord {
    match record {
        Some(node) if !node.is_empty() => flatten_with(node, "", SEPARATOR),
        _ => {
            tracing::warn!("Empty measurement record, nothing to flatten");
            FlatRecord::new()
        }
    }
}

/// Flatten `node` under `parent_key` with a custom separator.
///
/// A scalar at the root is stored under `parent_key` itself.
pub fn flatten_with(node: &Node, parent_key: &str, sep: &str) -> FlatRecord {
    let mut out = FlatRecord::new();
    flatten_into(node, parent_key, sep, &mut out);
    out
}

fn flatten_into(node: &Node, parent_key: &str, sep: &str, out: &mut FlatRecord) {
    match node {
        Node::Scalar(value) => {
            out.insert(parent_key.to_string(), value.clone());
        }
        Node::Mapping(children) => {
            for (key, child) in children {
                let new_key = if parent_key.is_empty() {
                    key.clone()
                } else {
                    format!("{parent_key}{sep}{key}")
                };
                flatten_into(child, &new_key, sep, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::from_json(value)
    }

    /// Collect root-to-leaf paths of a JSON object independently of the
    /// flattener.
    fn leaf_paths(value: &serde_json::Value, prefix: &str, out: &mut Vec<String>) {
        if let serde_json::Value::Object(map) = value {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                leaf_paths(v, &path, out);
            }
        } else {
            out.push(prefix.to_string());
        }
    }

    #[test]
    fn test_flatten_nominal() {
        let raw = node(json!({
            "ping": {"jitter": 0.7, "latency": 10.8},
            "isp": "ExampleNet"
        }));

        let flat = flatten(Some(&raw));

        let expected: FlatRecord = [
            ("ping.jitter".to_string(), Scalar::Float(0.7)),
            ("ping.latency".to_string(), Scalar::Float(10.8)),
            ("isp".to_string(), Scalar::from("ExampleNet")),
        ]
        .into_iter()
        .collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn test_flatten_empty_and_absent() {
        assert!(flatten(None).is_empty());
        assert!(flatten(Some(&node(json!({})))).is_empty());
    }

    #[test]
    fn test_flatten_keys_match_leaf_paths() {
        let value = json!({
            "type": "result",
            "download": {
                "bandwidth": 50609814,
                "latency": {"iqm": 10.635, "low": 9.907, "jitter": 0.476}
            },
            "interface": {"isVpn": false, "name": "enp34s0"},
            "server": {"id": 48322, "ip": "198.98.15.250"},
            "packetLoss": 0
        });

        let flat = flatten(Some(&node(value.clone())));

        let mut paths = Vec::new();
        leaf_paths(&value, "", &mut paths);
        paths.sort();
        let keys: Vec<String> = flat.keys().cloned().collect();
        assert_eq!(keys, paths);

        assert_eq!(flat["download.latency.iqm"], Scalar::Float(10.635));
        assert_eq!(flat["interface.isVpn"], Scalar::Boolean(false));
        assert_eq!(flat["server.id"], Scalar::Integer(48322));
        assert_eq!(flat["packetLoss"], Scalar::Integer(0));
    }

    #[test]
    fn test_flatten_list_not_recursed() {
        let flat = flatten(Some(&node(json!({"a": {"b": [{"c": 1}]}}))));
        assert_eq!(flat.len(), 1);
        assert_eq!(flat["a.b"], Scalar::Opaque(json!([{"c": 1}])));
    }

    #[test]
    fn test_flatten_nested_empty_mapping_has_no_leaf() {
        let flat = flatten(Some(&node(json!({"a": {}, "b": 1}))));
        assert_eq!(flat.len(), 1);
        assert!(flat.contains_key("b"));
    }

    #[test]
    fn test_flatten_with_custom_separator() {
        let flat = flatten_with(&node(json!({"a": {"b": 1}})), "root", "/");
        assert_eq!(flat["root/a/b"], Scalar::Integer(1));
    }
}
