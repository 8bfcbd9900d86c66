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

//! Two-sided traffic lights guarding one-lane roads.
//!
//! A light shows one of green (passage allowed), yellow (no new entry, the
//! road is still clearing), or red (stopped) towards each side. The protocol
//! lives in the kernel ([`crate::mine::Mine`]); this module only captures the
//! legal state pairs and their transitions.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{RoadDir, TruckId};

/// What one side of a traffic light shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Passage allowed.
    Green,
    /// No new entry; trucks already on the road are clearing.
    Yellow,
    /// Stopped.
    Red,
}

/// Joint state of both sides of a light. The first letter is the signal
/// towards [`RoadDir::Fwd`], the second towards [`RoadDir::Rev`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightState {
    /// Green towards `Fwd`, red towards `Rev`. The initial state.
    GR,
    /// Yellow towards `Fwd` (flip prepared), red towards `Rev`.
    YR,
    /// Red towards `Fwd`, yellow towards `Rev`.
    RY,
    /// Red towards `Fwd`, green towards `Rev`.
    RG,
    /// Both sides red. Unused by the protocol.
    RR,
}

impl Default for LightState {
    fn default() -> Self {
        Self::GR
    }
}

impl LightState {
    /// The signal shown towards the given side.
    pub fn signal(self, side: RoadDir) -> Signal {
        match (self, side) {
            (Self::GR, RoadDir::Fwd) | (Self::RG, RoadDir::Rev) => Signal::Green,
            (Self::YR, RoadDir::Fwd) | (Self::RY, RoadDir::Rev) => Signal::Yellow,
            _ => Signal::Red,
        }
    }

    /// The side currently shown green, if any.
    pub fn green_side(self) -> Option<RoadDir> {
        match self {
            Self::GR => Some(RoadDir::Fwd),
            Self::RG => Some(RoadDir::Rev),
            _ => None,
        }
    }

    /// The side currently shown yellow, if any.
    pub fn yellow_side(self) -> Option<RoadDir> {
        match self {
            Self::YR => Some(RoadDir::Fwd),
            Self::RY => Some(RoadDir::Rev),
            _ => None,
        }
    }

    /// Turn the green side yellow (demand appeared on the opposite side).
    /// No-op unless a side is green.
    pub fn prepare_flip(self) -> Self {
        match self {
            Self::GR => Self::YR,
            Self::RG => Self::RY,
            other => other,
        }
    }

    /// Complete a prepared flip: the yellow side goes red, the opposite side
    /// green. No-op unless a side is yellow.
    pub fn flip(self) -> Self {
        match self {
            Self::YR => Self::RG,
            Self::RY => Self::GR,
            other => other,
        }
    }
}

impl std::fmt::Display for LightState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::GR => "GR",
            Self::YR => "YR",
            Self::RY => "RY",
            Self::RG => "RG",
            Self::RR => "RR",
        };
        write!(f, "{s}")
    }
}

/// Runtime state of the light guarding one one-lane road: the joint signal
/// plus a FIFO of held trucks per side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficLight {
    /// Current joint signal.
    pub state: LightState,
    /// Trucks held on each side, in arrival order.
    pub queues: [VecDeque<TruckId>; 2],
}

impl TrafficLight {
    /// A light in the initial [`LightState::GR`] state with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any truck is held on the given side.
    pub fn has_demand(&self, side: RoadDir) -> bool {
        !self.queues[side.idx()].is_empty()
    }
}
