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

#![deny(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # HaulSim
//!
//! This is a library for simulating truck haulage in open-pit mines as a
//! stochastic discrete-event system.
//!
//! ## Main Concepts
//!
//! The [`network::MineNetwork`] is the immutable description of a mine:
//! crushers (dump points), shovels (load points), the road graph connecting
//! them, and the enumerated crusher-to-shovel routes. Networks are built
//! programmatically ([`network::MineNetwork::simple`] /
//! [`network::MineNetwork::routed`]) or parsed from the textual format in
//! [`parse`].
//!
//! The [`mine::Mine`] owns all runtime state of one shift and advances it
//! event by event in [`mine::Mine::simulate`]. Trucks cycle through the
//! states of [`event::TruckState`]: dispatched at a crusher, traveling,
//! queueing at shovels, filling, returning loaded, and emptying, which is the
//! quantity a dispatching policy wants to maximize. One-lane roads are
//! arbitrated by two-sided traffic lights ([`light`]); two-lane roads only
//! enforce the anti-overtaking discipline (trucks leave a road in the order
//! they entered it).
//!
//! Dispatching decisions are delegated to the [`dispatcher::Dispatcher`]
//! capability: after every transition the kernel reports a
//! [`event::StateChange`] to the dispatcher, and whenever a truck needs a
//! route the dispatcher answers with a [`dispatcher::RouteChoice`].
//!
//! Controllers that need to look into the future keep a
//! [`snapshot::StoredState`] mirror of the live mine (fed from the
//! `record_*` hooks) and replay it forward with fresh random draws via
//! [`snapshot::StoredState::ready`] / [`snapshot::Ready::re_ready`]. Travel
//! and service durations are drawn from a [`dist::TimeDistribution`].

pub mod dispatcher;
pub mod dist;
pub mod event;
pub mod light;
pub mod mine;
pub mod network;
pub mod parse;
pub mod prelude;
pub mod snapshot;
pub mod types;

#[cfg(test)]
mod test;
