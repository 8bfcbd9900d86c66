// HaulSim: Open-Pit Haulage Simulator written in Rust
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Route enumeration over the undirected road graph.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use super::{NodeRef, RoadParams, Route};
use crate::types::{CrusherId, RoadDir, RoadId, ShovelId};

/// Enumerate all crusher-to-shovel routes by depth-first search.
///
/// Starting from every crusher, the search walks the undirected road graph
/// and records the traversal direction of each road. A path terminates as
/// soon as it reaches any shovel. Paths revisiting a node or passing through
/// another crusher are pruned. Routes are returned crusher-major, with edges
/// explored in ascending road order, so the enumeration is deterministic.
pub fn enumerate_routes(
    num_crushers: usize,
    num_shovels: usize,
    roads: &[RoadParams],
    num_junctions: usize,
) -> Vec<Route> {
    // node layout: crushers, then shovels, then junctions
    let node_id = |node: NodeRef| -> usize {
        match node {
            NodeRef::Crusher(c) => c.index(),
            NodeRef::Shovel(s) => num_crushers + s.index(),
            NodeRef::Junction(j) => num_crushers + num_shovels + j,
        }
    };

    let mut graph: UnGraph<NodeRef, RoadId> = UnGraph::new_undirected();
    let mut nodes: Vec<NodeIndex> = Vec::with_capacity(num_crushers + num_shovels + num_junctions);
    for c in 0..num_crushers {
        nodes.push(graph.add_node(NodeRef::Crusher(CrusherId(c))));
    }
    for s in 0..num_shovels {
        nodes.push(graph.add_node(NodeRef::Shovel(ShovelId(s))));
    }
    for j in 0..num_junctions {
        nodes.push(graph.add_node(NodeRef::Junction(j)));
    }
    for (r, road) in roads.iter().enumerate() {
        graph.add_edge(
            nodes[node_id(road.ends[0])],
            nodes[node_id(road.ends[1])],
            RoadId(r),
        );
    }

    let mut routes = Vec::new();
    for c in 0..num_crushers {
        let start = nodes[c];
        let mut visited = vec![false; graph.node_count()];
        visited[start.index()] = true;
        let mut path: Vec<(RoadId, RoadDir)> = Vec::new();
        walk(
            &graph,
            roads,
            start,
            CrusherId(c),
            &mut visited,
            &mut path,
            &mut routes,
        );
    }
    routes
}

fn walk(
    graph: &UnGraph<NodeRef, RoadId>,
    roads: &[RoadParams],
    at: NodeIndex,
    crusher: CrusherId,
    visited: &mut Vec<bool>,
    path: &mut Vec<(RoadId, RoadDir)>,
    routes: &mut Vec<Route>,
) {
    // explore in ascending road order to make the enumeration deterministic
    let mut edges: Vec<(RoadId, NodeIndex)> = graph
        .edges(at)
        .map(|e| {
            let other = if e.source() == at {
                e.target()
            } else {
                e.source()
            };
            (*e.weight(), other)
        })
        .collect();
    edges.sort_unstable_by_key(|(r, _)| *r);

    for (road, next) in edges {
        let dir = if roads[road.index()].end(RoadDir::Fwd) == graph[next] {
            RoadDir::Fwd
        } else {
            RoadDir::Rev
        };
        match graph[next] {
            NodeRef::Shovel(shovel) => {
                path.push((road, dir));
                routes.push(Route {
                    crusher,
                    shovel,
                    roads: path.iter().map(|(r, _)| *r).collect(),
                    dirs: path.iter().map(|(_, d)| *d).collect(),
                });
                path.pop();
            }
            // cycles through other crushers are pruned
            NodeRef::Crusher(_) => continue,
            NodeRef::Junction(_) => {
                if visited[next.index()] {
                    continue;
                }
                visited[next.index()] = true;
                path.push((road, dir));
                walk(graph, roads, next, crusher, visited, path, routes);
                path.pop();
                visited[next.index()] = false;
            }
        }
    }
}
