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

//! Truck states, transitions, and the two event queues of the kernel.
//!
//! The kernel maintains a **timed** queue for transitions scheduled in the
//! future and an **instant** queue for zero-duration logical steps (queue
//! handoffs, light releases, dispatch decisions). The instant queue always
//! drains fully before the next timed event is examined. Within each queue,
//! events fire in `(time, priority)` order; the monotone schedule sequence
//! number breaks the remaining ties, which keeps release chains FIFO.

use std::cmp::Reverse;
use std::collections::VecDeque;

use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};

use crate::types::{RouteId, SimTime, TruckId};

/// All states a truck can be in.
///
/// The two `Light` pairs only occur on networks with one-lane roads;
/// `Unused` only occurs when a controller parks a truck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TruckState {
    /// At a crusher, empty, awaiting dispatch.
    Waiting,
    /// Traversing a road towards a shovel.
    TravelToShovel,
    /// Arriving at a one-lane road on the way to a shovel.
    ApproachLightToShovel,
    /// Held at a red light on the way to a shovel.
    StopAtLightToShovel,
    /// Arriving at the target shovel.
    ApproachShovel,
    /// Queued at the shovel.
    WaitAtShovel,
    /// Being loaded.
    Filling,
    /// Loaded, awaiting the return dispatch.
    LeavingShovel,
    /// Traversing a road towards a crusher, loaded.
    TravelToCrusher,
    /// Arriving at a one-lane road on the way to a crusher.
    ApproachLightToCrusher,
    /// Held at a red light on the way to a crusher.
    StopAtLightToCrusher,
    /// Arriving at the target crusher.
    ApproachCrusher,
    /// Queued at the crusher.
    WaitAtCrusher,
    /// Dumping the load.
    Emptying,
    /// Parked for the rest of the shift.
    Unused,
}

impl TruckState {
    /// The tie-breaking band of events targeting this state. Lower bands
    /// fire first among events with identical times: held trucks clear
    /// before travelers, finishing services drain before departures, and
    /// arrivals at services come last.
    pub fn band(self) -> u64 {
        match self {
            Self::StopAtLightToShovel | Self::StopAtLightToCrusher => 0,
            Self::TravelToShovel | Self::TravelToCrusher => 1,
            Self::WaitAtShovel | Self::WaitAtCrusher | Self::Filling | Self::Emptying => 2,
            Self::ApproachLightToShovel | Self::ApproachLightToCrusher => 3,
            Self::Waiting | Self::LeavingShovel => 4,
            Self::ApproachShovel | Self::ApproachCrusher => 5,
            Self::Unused => 6,
        }
    }

    /// Whether a truck in this state is working through a sampled duration
    /// (and therefore has a meaningful progress fraction).
    pub fn is_timed(self) -> bool {
        matches!(
            self,
            Self::TravelToShovel | Self::TravelToCrusher | Self::Filling | Self::Emptying
        )
    }

    /// Whether the state machine permits a transition from `self` to `to`.
    /// Re-entering the same transient state is permitted (dispatch seeds and
    /// restarted snapshots schedule such renames).
    pub fn can_reach(self, to: TruckState) -> bool {
        use TruckState::*;
        matches!(
            (self, to),
            (Waiting, Waiting | TravelToShovel | ApproachLightToShovel | Unused)
                | (TravelToShovel, TravelToShovel | ApproachLightToShovel | ApproachShovel)
                | (
                    ApproachLightToShovel,
                    ApproachLightToShovel | TravelToShovel | StopAtLightToShovel
                )
                | (StopAtLightToShovel, TravelToShovel)
                | (ApproachShovel, ApproachShovel | Filling | WaitAtShovel)
                | (WaitAtShovel, Filling)
                | (Filling, LeavingShovel)
                | (
                    LeavingShovel,
                    LeavingShovel | TravelToCrusher | ApproachLightToCrusher | Unused
                )
                | (
                    TravelToCrusher,
                    TravelToCrusher | ApproachLightToCrusher | ApproachCrusher
                )
                | (
                    ApproachLightToCrusher,
                    ApproachLightToCrusher | TravelToCrusher | StopAtLightToCrusher
                )
                | (StopAtLightToCrusher, TravelToCrusher)
                | (ApproachCrusher, ApproachCrusher | Emptying | WaitAtCrusher)
                | (WaitAtCrusher, Emptying)
                | (Emptying, Waiting)
        )
    }
}

/// Width of one priority band. Sub-priorities (truck ids and per-road
/// arrival counters) stay far below this for any realistic shift.
pub(crate) const BAND_STRIDE: u64 = 1 << 32;

/// Compute the priority of an event targeting `to`, with the given
/// sub-priority (the truck index, or a per-road arrival counter for road
/// completions).
#[inline]
pub(crate) fn priority(to: TruckState, sub: u64) -> u64 {
    to.band() * BAND_STRIDE + sub
}

/// A scheduled state change of one truck.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    /// Monotone schedule sequence number (unique per simulation run).
    pub seq: u64,
    /// The transitioning truck.
    pub truck: TruckId,
    /// When the transition fires.
    pub time: SimTime,
    /// State the truck must be in when the transition fires.
    pub from: TruckState,
    /// State the truck moves to.
    pub to: TruckState,
    /// Tie-breaking priority (smaller fires first).
    pub priority: u64,
}

/// Snapshot handed to the controller after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// The transition that just fired.
    pub transition: Transition,
    /// Route of the transitioning truck after the transition.
    pub route: Option<RouteId>,
    /// Leg progress (road index in travel order) of the transitioning truck.
    pub route_point: usize,
    /// Completion fraction in `[0, 1]` of every truck's current task,
    /// indexed by truck.
    pub progress: Vec<f64>,
}

type EventKey = (SimTime, u64, u64);

/// Priority queue of future (timed) transitions, ordered by
/// `(time, priority, seq)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQueue {
    q: PriorityQueue<Transition, Reverse<EventKey>>,
}

impl EventQueue {
    /// Create a new empty event queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a transition.
    pub fn push(&mut self, t: Transition) {
        let key = (t.time, t.priority, t.seq);
        self.q.push(t, Reverse(key));
    }

    /// Pop the next transition.
    pub fn pop(&mut self) -> Option<Transition> {
        self.q.pop().map(|(t, _)| t)
    }

    /// Peek at the next transition.
    pub fn peek(&self) -> Option<&Transition> {
        self.q.peek().map(|(t, _)| t)
    }

    /// Number of enqueued transitions.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    /// Whether no transition is enqueued.
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    /// Remove all transitions.
    pub fn clear(&mut self) {
        self.q.clear()
    }
}

/// Insertion-ordered queue of transitions at the current simulation time.
///
/// At most O(num_trucks) transitions are resident at any instant, so simple
/// ordered insertion beats a heap here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstantQueue {
    q: VecDeque<Transition>,
}

impl InstantQueue {
    /// Create a new empty instant queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a transition, keeping `(priority, seq)` order. Sequence
    /// numbers are monotone, so equal priorities stay FIFO.
    pub fn push(&mut self, t: Transition) {
        let at = self
            .q
            .iter()
            .position(|other| (other.priority, other.seq) > (t.priority, t.seq))
            .unwrap_or(self.q.len());
        self.q.insert(at, t);
    }

    /// Pop the most urgent transition.
    pub fn pop(&mut self) -> Option<Transition> {
        self.q.pop_front()
    }

    /// Number of pending instants.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    /// Whether no instant is pending.
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    /// Remove all pending instants.
    pub fn clear(&mut self) {
        self.q.clear()
    }
}
