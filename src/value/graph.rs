// Copyright (c) "bolt-core" contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Graph value types received from the server.
//!
//! Graph values only ever travel server → client; they cannot be used as
//! query parameters.

use std::collections::HashMap;

use super::value_receive::ValueReceive;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, ValueReceive>,
    /// On Bolt < 5.0 this is synthesised from [`Node::id`].
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub type_: String,
    pub properties: HashMap<String, ValueReceive>,
    pub element_id: String,
    pub start_node_element_id: String,
    pub end_node_element_id: String,
}

/// A relationship inside a [`Path`]; start and end are given by the path's
/// index sequence rather than by the relationship itself.
#[derive(Debug, Clone, PartialEq)]
pub struct UnboundRelationship {
    pub id: i64,
    pub type_: String,
    pub properties: HashMap<String, ValueReceive>,
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub relationships: Vec<UnboundRelationship>,
    /// Flat list of pairs `(relationship index, next node index)`.
    /// A positive relationship index `i` binds `relationships[i - 1]`
    /// traversed forwards, a negative index `-i` binds it backwards.
    pub indices: Vec<isize>,
}

/// One hop of a [`Path`], with the relationship bound to its two nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSegment<'a> {
    pub start: &'a Node,
    pub relationship: &'a UnboundRelationship,
    pub end: &'a Node,
    /// `true` when the relationship is traversed end → start.
    pub reversed: bool,
}

impl Path {
    pub(crate) fn new(
        nodes: Vec<Node>,
        relationships: Vec<UnboundRelationship>,
        indices: Vec<isize>,
    ) -> Result<Self, String> {
        if nodes.is_empty() {
            return Err(String::from("path must contain at least one node"));
        }
        if indices.len() % 2 != 0 {
            return Err(String::from("path indices must come in pairs"));
        }
        for pair in indices.chunks_exact(2) {
            let (rel_index, node_index) = (pair[0], pair[1]);
            if rel_index == 0 || rel_index.unsigned_abs() > relationships.len() {
                return Err(format!("path relationship index {rel_index} out of bounds"));
            }
            if node_index < 0 || node_index.unsigned_abs() >= nodes.len() {
                return Err(format!("path node index {node_index} out of bounds"));
            }
        }
        Ok(Self {
            nodes,
            relationships,
            indices,
        })
    }

    /// The node the path starts at.
    pub fn start_node(&self) -> &Node {
        &self.nodes[0]
    }

    /// The node the path ends at.
    pub fn end_node(&self) -> &Node {
        self.segments()
            .last()
            .map(|segment| segment.end)
            .unwrap_or(&self.nodes[0])
    }

    /// Bind the index sequence into traversable segments.
    ///
    /// Each pair of indices produces one segment; the previous segment's end
    /// node is the next segment's start node.
    pub fn segments(&self) -> Vec<PathSegment> {
        let mut segments = Vec::with_capacity(self.indices.len() / 2);
        let mut prev = &self.nodes[0];
        for pair in self.indices.chunks_exact(2) {
            let (rel_index, node_index) = (pair[0], pair[1]);
            let next = &self.nodes[node_index.unsigned_abs()];
            let reversed = rel_index < 0;
            let relationship = &self.relationships[rel_index.unsigned_abs() - 1];
            segments.push(PathSegment {
                start: prev,
                relationship,
                end: next,
                reversed,
            });
            prev = next;
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64) -> Node {
        Node {
            id,
            labels: vec![String::from("L")],
            properties: HashMap::new(),
            element_id: id.to_string(),
        }
    }

    fn rel(id: i64) -> UnboundRelationship {
        UnboundRelationship {
            id,
            type_: String::from("KNOWS"),
            properties: HashMap::new(),
            element_id: id.to_string(),
        }
    }

    #[test]
    fn test_segments_bind_forwards_and_backwards() {
        // (n0)-[r0]->(n1)<-[r1]-(n2)
        let path = Path::new(
            vec![node(0), node(1), node(2)],
            vec![rel(10), rel(11)],
            vec![1, 1, -2, 2],
        )
        .unwrap();

        let segments = path.segments();
        assert_eq!(segments.len(), 2);

        assert_eq!(segments[0].start.id, 0);
        assert_eq!(segments[0].relationship.id, 10);
        assert_eq!(segments[0].end.id, 1);
        assert!(!segments[0].reversed);

        assert_eq!(segments[1].start.id, 1);
        assert_eq!(segments[1].relationship.id, 11);
        assert_eq!(segments[1].end.id, 2);
        assert!(segments[1].reversed);

        assert_eq!(path.start_node().id, 0);
        assert_eq!(path.end_node().id, 2);
    }

    #[test]
    fn test_single_node_path() {
        let path = Path::new(vec![node(0)], vec![], vec![]).unwrap();
        assert!(path.segments().is_empty());
        assert_eq!(path.start_node().id, 0);
        assert_eq!(path.end_node().id, 0);
    }

    #[test]
    fn test_invalid_indices_rejected() {
        assert!(Path::new(vec![node(0)], vec![], vec![1]).is_err());
        assert!(Path::new(vec![node(0), node(1)], vec![rel(1)], vec![2, 1]).is_err());
        assert!(Path::new(vec![node(0), node(1)], vec![rel(1)], vec![1, 2]).is_err());
        assert!(Path::new(vec![], vec![], vec![]).is_err());
    }
}
