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

//! Module containing all type definitions

use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::TruckState;

/// Simulation time. `NotNan` so that times can live in ordered collections.
pub type SimTime = NotNan<f64>;

/// Construct a [`SimTime`] from a finite float.
///
/// # Panics
/// Panics if `t` is NaN. All times handed to the simulator originate from
/// sampled (finite) durations, so this is a programming error.
#[inline]
pub fn sim_time(t: f64) -> SimTime {
    NotNan::new(t).expect("simulation time must not be NaN")
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize,
        )]
        pub struct $name(pub usize);

        impl $name {
            /// Return the raw index of this entity.
            #[inline]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(x: usize) -> Self {
                Self(x)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", stringify!($name).trim_end_matches("Id"), self.0)
            }
        }
    };
}

entity_id! {
    /// Identifier of a crusher (dump point).
    CrusherId
}
entity_id! {
    /// Identifier of a shovel (load point).
    ShovelId
}
entity_id! {
    /// Identifier of a road segment.
    RoadId
}
entity_id! {
    /// Identifier of a precomputed crusher-to-shovel route.
    RouteId
}
entity_id! {
    /// Identifier of a haul truck.
    TruckId
}

/// Traversal direction of a road, relative to its stored endpoint order.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RoadDir {
    /// From the first stored endpoint towards the second.
    Fwd = 0,
    /// From the second stored endpoint towards the first.
    Rev = 1,
}

impl RoadDir {
    /// The opposite direction.
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Self::Fwd => Self::Rev,
            Self::Rev => Self::Fwd,
        }
    }

    /// Index into direction-indexed arrays (`[T; 2]`).
    #[inline]
    pub fn idx(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for RoadDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fwd => write!(f, "fwd"),
            Self::Rev => write!(f, "rev"),
        }
    }
}

/// The leg of a haul cycle a truck is currently on. Also indexes the two
/// columns of a route-flow matrix.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Leg {
    /// Crusher to shovel, truck runs empty (the direction a route is listed in).
    Empty = 0,
    /// Shovel back to crusher, truck runs loaded (full slowdown applies).
    Loaded = 1,
}

impl Leg {
    /// The opposite leg.
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Self::Empty => Self::Loaded,
            Self::Loaded => Self::Empty,
        }
    }

    /// Index into leg-indexed arrays (`[T; 2]`).
    #[inline]
    pub fn idx(self) -> usize {
        self as usize
    }
}

/// Configuration Error
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ConfigError {
    /// The simple-network DISPATCH controller requires exactly one crusher.
    #[error("Controller requires a single-crusher network, but the network has {0} crushers")]
    SingleCrusherRequired(usize),
    /// The requested solution index does not exist.
    #[error("Unknown solution index: {0}")]
    UnknownSolution(usize),
    /// A service has no route connecting it to the rest of the mine.
    #[error("No route reaches {0}")]
    UnreachableShovel(ShovelId),
    /// A crusher has no outgoing route.
    #[error("No route leaves {0}")]
    IsolatedCrusher(CrusherId),
    /// The network has no truck.
    #[error("The mine has no trucks")]
    NoTrucks,
    /// A numeric parameter is outside its domain.
    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// Main error type of the simulator.
///
/// Parse and configuration errors are recoverable in the sense that nothing
/// was mutated yet. Every `Invalid*` / `*Mismatch` variant signals a violated
/// simulation invariant: a bug in either the kernel or a controller. The
/// kernel never attempts to recover from those.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum SimError {
    /// The input file could not be parsed.
    #[error("Parse error on line {line}: expected {expected}")]
    Parse {
        /// 1-based line number of the offending line.
        line: usize,
        /// Description of what the parser expected there.
        expected: String,
    },
    /// Configuration error
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    /// A transition fired for a truck whose recorded state disagrees with the
    /// event's source state.
    #[error("{truck} is in state {found:?}, but the transition expects {expected:?}")]
    StateMismatch {
        /// The transitioning truck.
        truck: TruckId,
        /// Source state recorded in the transition.
        expected: TruckState,
        /// State the truck is actually in.
        found: TruckState,
    },
    /// A road traversal completed for a truck that is not the head of its
    /// road queue (anti-overtaking violated).
    #[error("{truck} completed {road} ({dir}) but the queue head is {head:?}")]
    RoadQueueMismatch {
        /// The completing truck.
        truck: TruckId,
        /// The road being left.
        road: RoadId,
        /// Traversal direction.
        dir: RoadDir,
        /// Current head of the road queue, if any.
        head: Option<TruckId>,
    },
    /// A service queue released a truck that is not its head.
    #[error("{truck} left a service queue whose head is {head:?}")]
    ServiceQueueMismatch {
        /// The released truck.
        truck: TruckId,
        /// Current head of the service queue, if any.
        head: Option<TruckId>,
    },
    /// A traffic-light operation was attempted on a two-lane road, or the
    /// light reached a configuration the protocol forbids.
    #[error("Illegal traffic light configuration on {0}")]
    IllegalLight(RoadId),
    /// The state machine was asked to perform an undefined transition.
    #[error("Illegal transition {from:?} -> {to:?} for {truck}")]
    IllegalTransition {
        /// The transitioning truck.
        truck: TruckId,
        /// Source state.
        from: TruckState,
        /// Target state.
        to: TruckState,
    },
    /// The routing callback returned a route that does not originate at the
    /// truck's current service point.
    #[error("Dispatched {truck} onto {route}, which does not serve its current location")]
    ForeignRoute {
        /// The dispatched truck.
        truck: TruckId,
        /// The offending route.
        route: RouteId,
    },
    /// The routing callback returned a route index that does not exist.
    #[error("Dispatched {truck} onto unknown route index {index}")]
    BadDispatch {
        /// The dispatched truck.
        truck: TruckId,
        /// The out-of-range index.
        index: usize,
    },
    /// A time distribution was queried outside its domain.
    #[error("Distribution cannot produce nonnegative times for mean {mean}, sd {sd}")]
    DistributionDomain {
        /// Mean of the rejected query.
        mean: f64,
        /// Standard deviation of the rejected query.
        sd: f64,
    },
}
