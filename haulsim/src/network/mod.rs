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

//! # Mine network model
//!
//! The immutable, structural description of a mine: crushers (dump points),
//! shovels (load points), the road graph connecting them, and the precomputed
//! routes trucks can be dispatched on. All runtime state (queues, truck
//! positions, traffic lights) lives in [`crate::mine::Mine`]; this module only
//! describes what never changes during a shift.

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use crate::types::{ConfigError, CrusherId, Leg, RoadDir, RoadId, RouteId, ShovelId, SimError};

mod routes;
pub use routes::enumerate_routes;

/// Travel-time multiplier for loaded trucks when the input format does not
/// carry one (the single-crusher format).
pub const DEFAULT_FULL_SLOWDOWN: f64 = 1.24;

/// Mean and standard deviation of a service or travel duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceParams {
    /// Mean duration.
    pub mean: f64,
    /// Standard deviation of the duration.
    pub sd: f64,
}

impl ServiceParams {
    /// Create a new parameter pair.
    pub fn new(mean: f64, sd: f64) -> Self {
        Self { mean, sd }
    }
}

/// Arbitration kind of a road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneKind {
    /// Both directions can be used concurrently.
    TwoLane,
    /// Only one direction at a time; guarded by a two-sided traffic light.
    OneLane,
}

/// An endpoint of a road.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    /// The road ends at a crusher.
    Crusher(CrusherId),
    /// The road ends at a shovel.
    Shovel(ShovelId),
    /// The road ends at an intermediate junction.
    Junction(usize),
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crusher(c) => write!(f, "{c}"),
            Self::Shovel(s) => write!(f, "{s}"),
            Self::Junction(n) => write!(f, "Junction{n}"),
        }
    }
}

/// Structural description of one road segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadParams {
    /// The two endpoints. [`RoadDir::Fwd`] runs from `ends[0]` to `ends[1]`.
    pub ends: [NodeRef; 2],
    /// Mean one-way travel duration (empty truck).
    pub mean: f64,
    /// Standard deviation of the travel duration.
    pub sd: f64,
    /// Two-lane or one-lane.
    pub kind: LaneKind,
}

impl RoadParams {
    /// The endpoint a truck arrives at when traversing in direction `dir`.
    #[inline]
    pub fn end(&self, dir: RoadDir) -> NodeRef {
        match dir {
            RoadDir::Fwd => self.ends[1],
            RoadDir::Rev => self.ends[0],
        }
    }

    /// The endpoint a truck departs from when traversing in direction `dir`.
    #[inline]
    pub fn start(&self, dir: RoadDir) -> NodeRef {
        self.end(dir.flip())
    }
}

/// A precomputed path from one crusher to one shovel.
///
/// The stored order is the [`Leg::Empty`] traversal (crusher towards shovel);
/// the loaded return leg traverses the same roads in reverse order and
/// flipped direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// The crusher this route leaves.
    pub crusher: CrusherId,
    /// The shovel this route reaches.
    pub shovel: ShovelId,
    /// Roads in crusher-to-shovel order.
    pub roads: Vec<RoadId>,
    /// Traversal direction of each road in `roads`.
    pub dirs: Vec<RoadDir>,
}

impl Route {
    /// Number of road segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.roads.len()
    }

    /// Whether the route has no roads (never true for enumerated routes).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.roads.is_empty()
    }

    /// The `point`-th road (and its traversal direction) along the given leg.
    /// `point` counts in travel order, starting at 0 for each leg.
    #[inline]
    pub fn leg_road(&self, leg: Leg, point: usize) -> (RoadId, RoadDir) {
        match leg {
            Leg::Empty => (self.roads[point], self.dirs[point]),
            Leg::Loaded => {
                let i = self.len() - 1 - point;
                (self.roads[i], self.dirs[i].flip())
            }
        }
    }
}

/// Immutable description of the entire mine.
///
/// Create one with [`MineNetwork::simple`] (single crusher, one two-lane road
/// per shovel) or [`MineNetwork::routed`] (arbitrary graph with junctions and
/// one-lane roads), or parse an input file via [`crate::parse::parse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineNetwork {
    num_trucks: usize,
    full_slowdown: f64,
    crushers: Vec<ServiceParams>,
    shovels: Vec<ServiceParams>,
    roads: Vec<RoadParams>,
    num_junctions: usize,
    routes: Vec<Route>,
    routes_from: Vec<Vec<RouteId>>,
    routes_to: Vec<Vec<RouteId>>,
    simple: bool,
}

impl MineNetwork {
    /// Build a single-crusher network: one two-lane road per shovel, one
    /// route per shovel. `shovels` lists `(travel, fill)` parameters.
    pub fn simple(
        num_trucks: usize,
        crusher: ServiceParams,
        shovels: Vec<(ServiceParams, ServiceParams)>,
    ) -> Result<Self, SimError> {
        let roads = shovels
            .iter()
            .enumerate()
            .map(|(s, (travel, _))| RoadParams {
                ends: [NodeRef::Crusher(CrusherId(0)), NodeRef::Shovel(ShovelId(s))],
                mean: travel.mean,
                sd: travel.sd,
                kind: LaneKind::TwoLane,
            })
            .collect();
        let fills = shovels.into_iter().map(|(_, fill)| fill).collect();
        let mut net = Self::build(
            num_trucks,
            DEFAULT_FULL_SLOWDOWN,
            vec![crusher],
            fills,
            roads,
            0,
        )?;
        net.simple = true;
        Ok(net)
    }

    /// Build a routed network from its raw description. Routes are
    /// enumerated by depth-first search over the road graph.
    pub fn routed(
        num_trucks: usize,
        full_slowdown: f64,
        crushers: Vec<ServiceParams>,
        shovels: Vec<ServiceParams>,
        roads: Vec<RoadParams>,
        num_junctions: usize,
    ) -> Result<Self, SimError> {
        Self::build(
            num_trucks,
            full_slowdown,
            crushers,
            shovels,
            roads,
            num_junctions,
        )
    }

    fn build(
        num_trucks: usize,
        full_slowdown: f64,
        crushers: Vec<ServiceParams>,
        shovels: Vec<ServiceParams>,
        roads: Vec<RoadParams>,
        num_junctions: usize,
    ) -> Result<Self, SimError> {
        if num_trucks == 0 {
            return Err(ConfigError::NoTrucks.into());
        }
        if full_slowdown < 1.0 {
            return Err(ConfigError::InvalidParameter {
                name: "full_slowdown",
                value: full_slowdown,
            }
            .into());
        }
        let routes = enumerate_routes(crushers.len(), shovels.len(), &roads, num_junctions);

        let mut routes_from = vec![Vec::new(); crushers.len()];
        let mut routes_to = vec![Vec::new(); shovels.len()];
        for (k, route) in routes.iter().enumerate() {
            routes_from[route.crusher.index()].push(RouteId(k));
            routes_to[route.shovel.index()].push(RouteId(k));
        }
        if let Some(c) = routes_from.iter().position(Vec::is_empty) {
            return Err(ConfigError::IsolatedCrusher(CrusherId(c)).into());
        }
        if let Some(s) = routes_to.iter().position(Vec::is_empty) {
            return Err(ConfigError::UnreachableShovel(ShovelId(s)).into());
        }

        Ok(Self {
            num_trucks,
            full_slowdown,
            crushers,
            shovels,
            roads,
            num_junctions,
            routes,
            routes_from,
            routes_to,
            simple: false,
        })
    }

    /// Number of trucks in the mine.
    #[inline]
    pub fn num_trucks(&self) -> usize {
        self.num_trucks
    }

    /// Number of crushers.
    #[inline]
    pub fn num_crushers(&self) -> usize {
        self.crushers.len()
    }

    /// Number of shovels.
    #[inline]
    pub fn num_shovels(&self) -> usize {
        self.shovels.len()
    }

    /// Number of road segments.
    #[inline]
    pub fn num_roads(&self) -> usize {
        self.roads.len()
    }

    /// Number of intermediate junctions.
    #[inline]
    pub fn num_junctions(&self) -> usize {
        self.num_junctions
    }

    /// Number of enumerated routes.
    #[inline]
    pub fn num_routes(&self) -> usize {
        self.routes.len()
    }

    /// Travel-time multiplier applied on the loaded leg.
    #[inline]
    pub fn full_slowdown(&self) -> f64 {
        self.full_slowdown
    }

    /// Whether this network was built by [`MineNetwork::simple`].
    #[inline]
    pub fn is_simple(&self) -> bool {
        self.simple
    }

    /// Emptying parameters of a crusher.
    #[inline]
    pub fn crusher(&self, c: CrusherId) -> &ServiceParams {
        &self.crushers[c.index()]
    }

    /// Filling parameters of a shovel.
    #[inline]
    pub fn shovel(&self, s: ShovelId) -> &ServiceParams {
        &self.shovels[s.index()]
    }

    /// Structural parameters of a road.
    #[inline]
    pub fn road(&self, r: RoadId) -> &RoadParams {
        &self.roads[r.index()]
    }

    /// A route by id.
    #[inline]
    pub fn route(&self, k: RouteId) -> &Route {
        &self.routes[k.index()]
    }

    /// All routes, indexable by [`RouteId`].
    #[inline]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// All roads, indexable by [`RoadId`].
    #[inline]
    pub fn roads(&self) -> &[RoadParams] {
        &self.roads
    }

    /// All crusher parameters.
    #[inline]
    pub fn crushers(&self) -> &[ServiceParams] {
        &self.crushers
    }

    /// All shovel parameters.
    #[inline]
    pub fn shovels(&self) -> &[ServiceParams] {
        &self.shovels
    }

    /// Routes leaving the given crusher.
    #[inline]
    pub fn routes_from_crusher(&self, c: CrusherId) -> &[RouteId] {
        &self.routes_from[c.index()]
    }

    /// Routes reaching the given shovel.
    #[inline]
    pub fn routes_to_shovel(&self, s: ShovelId) -> &[RouteId] {
        &self.routes_to[s.index()]
    }

    /// Ids of all one-lane roads.
    pub fn one_lane_roads(&self) -> impl Iterator<Item = RoadId> + '_ {
        self.roads
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind == LaneKind::OneLane)
            .map(|(r, _)| RoadId(r))
    }

    /// Mean free-flow travel time of a route leg. The loaded leg includes the
    /// full slowdown.
    pub fn route_time(&self, k: RouteId, leg: Leg) -> f64 {
        let raw: f64 = self.routes[k.index()]
            .roads
            .iter()
            .map(|r| self.roads[r.index()].mean)
            .sum();
        match leg {
            Leg::Empty => raw,
            Leg::Loaded => raw * self.full_slowdown,
        }
    }

    /// The fastest empty-leg route time out of the given crusher.
    pub fn min_route_time_from(&self, c: CrusherId) -> f64 {
        self.routes_from[c.index()]
            .iter()
            .map(|k| self.route_time(*k, Leg::Empty))
            .fold(f64::INFINITY, f64::min)
    }

    /// Shovels reachable over routes that traverse the given road.
    pub fn shovels_via_road(&self, r: RoadId) -> Vec<ShovelId> {
        let mut shovels: Vec<ShovelId> = self
            .routes
            .iter()
            .filter(|route| route.roads.contains(&r))
            .map(|route| route.shovel)
            .collect();
        shovels.sort_unstable();
        shovels.dedup();
        shovels
    }

    /// The undirected road graph: one node per crusher, shovel, and junction,
    /// one edge per road (weighted with its [`RoadId`]).
    pub fn graph(&self) -> UnGraph<NodeRef, RoadId> {
        let mut graph = UnGraph::new_undirected();
        let index_of = |node: NodeRef, g: &mut UnGraph<NodeRef, RoadId>| -> NodeIndex {
            g.node_indices()
                .find(|i| g[*i] == node)
                .unwrap_or_else(|| g.add_node(node))
        };
        for (r, road) in self.roads.iter().enumerate() {
            let a = index_of(road.ends[0], &mut graph);
            let b = index_of(road.ends[1], &mut graph);
            graph.add_edge(a, b, RoadId(r));
        }
        graph
    }
}
