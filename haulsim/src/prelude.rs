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

//! Convenience re-export of common members.

pub use crate::dispatcher::{DispatchPoint, Dispatcher, ParkAll, RoundTrip, RouteChoice};
pub use crate::dist::{DeterministicTimes, NoisyTimes, TimeDistribution, UniformTimes};
pub use crate::event::{StateChange, Transition, TruckState};
pub use crate::light::{LightState, Signal};
pub use crate::mine::{round_robin_assignment, Mine, SimOutcome};
pub use crate::network::{LaneKind, MineNetwork, NodeRef, RoadParams, Route, ServiceParams};
pub use crate::snapshot::{Ready, StoredState};
pub use crate::types::{
    sim_time, ConfigError, CrusherId, Leg, RoadDir, RoadId, RouteId, ShovelId, SimError, SimTime,
    TruckId,
};
