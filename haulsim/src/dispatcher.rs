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

//! The routing capability plugged into the kernel.
//!
//! Whenever a truck finishes emptying (or is placed at a crusher at shift
//! start), the kernel asks the [`Dispatcher`] for an outbound route; whenever
//! a truck finishes filling, it asks for a return route. The two `record_*`
//! hooks let stateful controllers mirror the live mine without re-simulation.

use crate::event::StateChange;
use crate::light::LightState;
use crate::mine::Mine;
use crate::types::{CrusherId, RoadId, RouteId, ShovelId, TruckId};

/// Answer of a [`Dispatcher`] to a routing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChoice {
    /// Send the truck along this route.
    Route(RouteId),
    /// Park the truck for the rest of the shift.
    Park,
    /// Terminate the running simulation.
    StopSimulation,
}

/// Where a routing request originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPoint {
    /// An empty truck at this crusher needs an outbound route.
    Crusher(CrusherId),
    /// A loaded truck at this shovel needs a return route.
    Shovel(ShovelId),
}

/// A truck dispatching policy.
///
/// Implementations must be idempotent under replay of their own `record_*`
/// callbacks from the last checkpoint, and must only return routes that
/// originate at the requesting truck's current service point.
pub trait Dispatcher {
    /// Choose the next route for `truck`, which currently sits at `at`.
    fn next_route(&mut self, mine: &Mine, truck: TruckId, at: DispatchPoint) -> RouteChoice;

    /// Observe a transition of the live mine.
    fn record_event(&mut self, mine: &Mine, change: &StateChange) {
        let _ = (mine, change);
    }

    /// Observe a traffic-light change of the live mine.
    fn record_light(&mut self, mine: &Mine, road: RoadId, state: LightState) {
        let _ = (mine, road, state);
    }
}

/// Parks every truck that asks for a route. Used to let a forward simulation
/// run out its in-flight work without creating new work.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParkAll;

impl Dispatcher for ParkAll {
    fn next_route(&mut self, _: &Mine, _: TruckId, _: DispatchPoint) -> RouteChoice {
        RouteChoice::Park
    }
}

/// Keeps every truck cycling on its currently assigned route. Trucks without
/// a route are parked. This is the "everyone continues as planned" baseline
/// the greedy heuristics simulate against.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundTrip;

impl Dispatcher for RoundTrip {
    fn next_route(&mut self, mine: &Mine, truck: TruckId, _: DispatchPoint) -> RouteChoice {
        match mine.truck(truck).route {
            Some(route) => RouteChoice::Route(route),
            None => RouteChoice::Park,
        }
    }
}
