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

//! End-to-end scenarios for the simulation kernel.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dispatcher::{DispatchPoint, Dispatcher, RouteChoice};
use crate::dist::{DeterministicTimes, SequenceTimes, TimeDistribution};
use crate::event::{StateChange, TruckState};
use crate::light::LightState;
use crate::mine::{Mine, SimOutcome};
use crate::network::{LaneKind, MineNetwork, NodeRef, RoadParams, ServiceParams};
use crate::types::{CrusherId, RoadId, RouteId, ShovelId, TruckId};

mod routed;

/// A dispatcher that sends every truck onto route 0 and verifies the
/// universal kernel invariants after every transition.
#[derive(Debug, Default)]
struct Probe {
    /// Observed transitions, in firing order.
    transitions: Vec<(f64, TruckId, TruckState, TruckState)>,
    /// Observed light changes, in order.
    lights: Vec<(RoadId, LightState)>,
    /// Last observed completion time per (road, direction).
    last_completion: HashMap<(RoadId, usize), f64>,
    /// Last observed empties count.
    last_empties: usize,
}

impl Probe {
    /// Times at which the given truck entered the given state.
    fn entries(&self, truck: TruckId, state: TruckState) -> Vec<f64> {
        self.transitions
            .iter()
            .filter(|(_, t, _, to)| *t == truck && *to == state)
            .map(|(time, _, _, _)| *time)
            .collect()
    }

    /// Order in which trucks first entered the given state.
    fn first_entry_order(&self, state: TruckState) -> Vec<TruckId> {
        let mut seen = Vec::new();
        for (_, t, _, to) in &self.transitions {
            if *to == state && !seen.contains(t) {
                seen.push(*t);
            }
        }
        seen
    }
}

impl Dispatcher for Probe {
    fn next_route(&mut self, _: &Mine, _: TruckId, _: DispatchPoint) -> RouteChoice {
        RouteChoice::Route(RouteId(0))
    }

    fn record_event(&mut self, mine: &Mine, change: &StateChange) {
        let tr = &change.transition;
        self.transitions.push((
            tr.time.into_inner(),
            tr.truck,
            tr.from,
            tr.to,
        ));

        // invariant: every truck is in exactly one state, and the multiset
        // of trucks is constant
        assert_eq!(mine.trucks().len(), mine.network().num_trucks());

        // invariant: empties are monotone
        assert!(mine.num_empties() >= self.last_empties);
        self.last_empties = mine.num_empties();

        // invariant: road completions are non-decreasing per direction
        if matches!(
            tr.from,
            TruckState::TravelToShovel | TruckState::TravelToCrusher
        ) {
            // the truck already moved one point further; its previous road
            // is the one it just completed
            if let Some(route) = change.route {
                let leg = match tr.from {
                    TruckState::TravelToShovel => crate::types::Leg::Empty,
                    _ => crate::types::Leg::Loaded,
                };
                let (road, dir) = mine
                    .network()
                    .route(route)
                    .leg_road(leg, change.route_point - 1);
                let key = (road, dir.idx());
                let last = self.last_completion.get(&key).copied().unwrap_or(0.0);
                assert!(tr.time.into_inner() >= last);
                self.last_completion.insert(key, tr.time.into_inner());
            }
        }

        // invariant: a one-lane road never carries both directions at once
        for road in mine.network().one_lane_roads() {
            let state = mine.road_state(road);
            assert!(
                state.queues[0].is_empty() || state.queues[1].is_empty(),
                "one-lane road {road} carries both directions"
            );
        }
    }

    fn record_light(&mut self, _: &Mine, road: RoadId, state: LightState) {
        self.lights.push((road, state));
    }
}

/// A deterministic single-crusher network:
/// two trucks, emptying 1, travel 5, filling 2.
fn scenario_net() -> Arc<MineNetwork> {
    Arc::new(
        MineNetwork::simple(
            2,
            ServiceParams::new(1.0, 0.0),
            vec![(ServiceParams::new(5.0, 0.0), ServiceParams::new(2.0, 0.0))],
        )
        .unwrap(),
    )
}

#[test]
fn deterministic_cycle_counts() {
    // The deterministic cycle of one truck is
    //   travel + fill + slowdown * travel + empty = 5 + 2 + 6.2 + 1 = 14.2,
    // so the first truck empties at 14.2 and 28.4. The second truck queues
    // for 2 behind the first fill: it empties at 16.2 and 30.4, the last
    // one just after the 30-long shift.
    let net = scenario_net();
    let dist: Arc<dyn TimeDistribution> = Arc::new(DeterministicTimes);
    let mut mine = Mine::with_rng(net.clone(), dist.clone(), StdRng::seed_from_u64(0));
    let mut probe = Probe::default();
    assert_eq!(mine.simulate(30.0, &mut probe), Ok(SimOutcome::Horizon));
    assert_eq!(mine.num_empties(), 3);

    // one tick further, the fourth cycle completes
    let mut mine = Mine::with_rng(net, dist, StdRng::seed_from_u64(0));
    let mut probe = Probe::default();
    assert_eq!(mine.simulate(31.0, &mut probe), Ok(SimOutcome::Horizon));
    assert_eq!(mine.num_empties(), 4);

    // Waiting is entered at t=0 (shift start) and after each emptying
    assert_times(
        &probe.entries(TruckId(0), TruckState::Waiting),
        &[0.0, 14.2, 28.4],
    );
    assert_times(
        &probe.entries(TruckId(1), TruckState::Waiting),
        &[0.0, 16.2, 30.4],
    );
}

/// Compare event times against expectations, tolerating float rounding.
fn assert_times(actual: &[f64], expect: &[f64]) {
    assert_eq!(actual.len(), expect.len(), "{actual:?} vs {expect:?}");
    for (a, e) in actual.iter().zip(expect) {
        assert!((a - e).abs() < 1e-9, "{actual:?} vs {expect:?}");
    }
}

#[test]
fn service_queue_is_fifo() {
    let net = scenario_net();
    let dist: Arc<dyn TimeDistribution> = Arc::new(DeterministicTimes);
    let mut mine = Mine::with_rng(net, dist, StdRng::seed_from_u64(0));
    let mut probe = Probe::default();
    mine.simulate(30.0, &mut probe).unwrap();

    // both trucks arrive at the shovel at t=5; truck 0 entered the road
    // first and must fill first
    assert_eq!(
        probe.first_entry_order(TruckState::Filling),
        vec![TruckId(0), TruckId(1)]
    );
    assert_times(&probe.entries(TruckId(0), TruckState::Filling), &[5.0, 19.2]);
    assert_times(&probe.entries(TruckId(1), TruckState::Filling), &[7.0, 21.2]);
}

#[test]
fn park_drains_the_mine() {
    #[derive(Debug)]
    struct ParkSecond;
    impl Dispatcher for ParkSecond {
        fn next_route(&mut self, _: &Mine, truck: TruckId, at: DispatchPoint) -> RouteChoice {
            match at {
                DispatchPoint::Crusher(_) if truck == TruckId(1) => RouteChoice::Park,
                _ => RouteChoice::Route(RouteId(0)),
            }
        }
    }

    let net = scenario_net();
    let dist: Arc<dyn TimeDistribution> = Arc::new(DeterministicTimes);
    let mut mine = Mine::with_rng(net, dist, StdRng::seed_from_u64(0));
    let mut d = ParkSecond;
    assert_eq!(mine.simulate(30.0, &mut d), Ok(SimOutcome::Horizon));
    assert_eq!(mine.truck(TruckId(1)).state, TruckState::Unused);
    // the remaining truck runs an undisturbed 14.2 cycle: empties at 13.2+1
    // and 27.4+1
    assert_eq!(mine.num_empties(), 2);
}

#[test]
fn stop_simulation_terminates() {
    #[derive(Debug, Default)]
    struct StopAfterOne {
        dispatched: bool,
    }
    impl Dispatcher for StopAfterOne {
        fn next_route(&mut self, _: &Mine, _: TruckId, _: DispatchPoint) -> RouteChoice {
            if self.dispatched {
                RouteChoice::StopSimulation
            } else {
                self.dispatched = true;
                RouteChoice::Route(RouteId(0))
            }
        }
    }

    let net = scenario_net();
    let dist: Arc<dyn TimeDistribution> = Arc::new(DeterministicTimes);
    let mut mine = Mine::with_rng(net, dist, StdRng::seed_from_u64(0));
    let mut d = StopAfterOne::default();
    assert_eq!(mine.simulate(30.0, &mut d), Ok(SimOutcome::Stopped));
    assert_eq!(mine.time(), 0.0);
}

#[test]
fn foreign_route_is_fatal() {
    #[derive(Debug)]
    struct WrongShovel;
    impl Dispatcher for WrongShovel {
        fn next_route(&mut self, _: &Mine, _: TruckId, at: DispatchPoint) -> RouteChoice {
            match at {
                DispatchPoint::Crusher(_) => RouteChoice::Route(RouteId(0)),
                // route 1 serves shovel 1, not the shovel the truck is at
                DispatchPoint::Shovel(_) => RouteChoice::Route(RouteId(1)),
            }
        }
    }

    let net = Arc::new(
        MineNetwork::simple(
            1,
            ServiceParams::new(1.0, 0.0),
            vec![
                (ServiceParams::new(5.0, 0.0), ServiceParams::new(2.0, 0.0)),
                (ServiceParams::new(5.0, 0.0), ServiceParams::new(2.0, 0.0)),
            ],
        )
        .unwrap(),
    );
    let dist: Arc<dyn TimeDistribution> = Arc::new(DeterministicTimes);
    let mut mine = Mine::with_rng(net, dist, StdRng::seed_from_u64(0));
    let mut d = WrongShovel;
    assert!(matches!(
        mine.simulate(30.0, &mut d),
        Err(crate::types::SimError::ForeignRoute { .. })
    ));
}

#[test]
fn out_of_range_route_is_fatal() {
    #[derive(Debug)]
    struct Bad;
    impl Dispatcher for Bad {
        fn next_route(&mut self, _: &Mine, _: TruckId, _: DispatchPoint) -> RouteChoice {
            RouteChoice::Route(RouteId(7))
        }
    }

    let net = scenario_net();
    let dist: Arc<dyn TimeDistribution> = Arc::new(DeterministicTimes);
    let mut mine = Mine::with_rng(net, dist, StdRng::seed_from_u64(0));
    assert!(matches!(
        mine.simulate(30.0, &mut Bad),
        Err(crate::types::SimError::BadDispatch { .. })
    ));
}

/// Build the one-lane scenario: one crusher, one shovel, a single one-lane
/// road of the given mean, `nt` trucks.
fn one_lane_net(nt: usize, travel: f64) -> Arc<MineNetwork> {
    Arc::new(
        MineNetwork::routed(
            nt,
            1.0,
            vec![ServiceParams::new(1.0, 0.0)],
            vec![ServiceParams::new(2.0, 0.0)],
            vec![RoadParams {
                ends: [NodeRef::Crusher(CrusherId(0)), NodeRef::Shovel(ShovelId(0))],
                mean: travel,
                sd: 0.0,
                kind: LaneKind::OneLane,
            }],
            0,
        )
        .unwrap(),
    )
}

/// Three trucks with hand-picked travel draws on a two-lane road.
fn sequence_mine(draws: Vec<f64>) -> Mine {
    let net = Arc::new(
        MineNetwork::simple(
            3,
            ServiceParams::new(1.0, 0.0),
            vec![(ServiceParams::new(5.0, 1.0), ServiceParams::new(2.0, 0.0))],
        )
        .unwrap(),
    );
    let dist: Arc<dyn TimeDistribution> = Arc::new(SequenceTimes::new(draws));
    Mine::with_rng(net, dist, StdRng::seed_from_u64(0))
}
