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

//! Routed multi-crusher networks: junctions, mixed lane kinds, and parking.

use super::*;
use crate::parse;

/// Two crushers and two shovels around a junction, with a one-lane shortcut.
const ROUTED: &str = "\
T 6 1.3
C 2
1 0
1.5 0
S 2
2 0
3 0
R 5 N 1
c 0 n 0 4 0 t
c 1 n 0 5 0 t
n 0 s 0 6 0 o
n 0 s 1 7 0 t
c 0 s 1 10 0 o
";

/// Cycle each crusher through its outgoing routes round-robin; return on the
/// route the truck arrived on.
#[derive(Debug, Default)]
struct RoundRobinRoutes {
    next: std::collections::HashMap<CrusherId, usize>,
}

impl Dispatcher for RoundRobinRoutes {
    fn next_route(&mut self, mine: &Mine, truck: TruckId, at: DispatchPoint) -> RouteChoice {
        match at {
            DispatchPoint::Crusher(c) => {
                let routes = mine.network().routes_from_crusher(c);
                let cursor = self.next.entry(c).or_insert(0);
                let route = routes[*cursor % routes.len()];
                *cursor += 1;
                RouteChoice::Route(route)
            }
            DispatchPoint::Shovel(_) => match mine.truck(truck).route {
                Some(route) => RouteChoice::Route(route),
                None => RouteChoice::Park,
            },
        }
    }
}

#[test]
fn routed_shift_honors_all_invariants() {
    let net = Arc::new(parse::parse(ROUTED).unwrap());
    assert_eq!(net.num_routes(), 5);

    // Probe validates the one-lane exclusivity, FIFO road queues, and
    // monotone empties on every transition.
    let mut outer = Probe::default();
    let mut inner = RoundRobinRoutes::default();

    #[derive(Debug)]
    struct Both<'a>(&'a mut Probe, &'a mut RoundRobinRoutes);
    impl Dispatcher for Both<'_> {
        fn next_route(&mut self, mine: &Mine, truck: TruckId, at: DispatchPoint) -> RouteChoice {
            self.1.next_route(mine, truck, at)
        }
        fn record_event(&mut self, mine: &Mine, change: &StateChange) {
            self.0.record_event(mine, change);
        }
        fn record_light(&mut self, mine: &Mine, road: RoadId, state: LightState) {
            self.0.record_light(mine, road, state);
        }
    }

    let mut mine = Mine::with_rng(
        net.clone(),
        Arc::new(DeterministicTimes),
        StdRng::seed_from_u64(9),
    );
    let mut dispatcher = Both(&mut outer, &mut inner);
    mine.simulate(300.0, &mut dispatcher).unwrap();

    assert!(mine.num_empties() > 10, "only {}", mine.num_empties());
    // both crushers processed trucks
    let c0: usize = outer
        .transitions
        .iter()
        .filter(|(_, _, from, to)| *from == TruckState::Emptying && *to == TruckState::Waiting)
        .count();
    assert_eq!(c0, mine.num_empties());
    // one-lane roads saw both directions over the shift, so lights flipped
    assert!(!outer.lights.is_empty());
}

#[test]
fn parked_trucks_leave_the_fleet_running() {
    #[derive(Debug, Default)]
    struct ParkAfterOneCycle {
        cycles: std::collections::HashMap<TruckId, usize>,
    }
    impl Dispatcher for ParkAfterOneCycle {
        fn next_route(&mut self, mine: &Mine, truck: TruckId, at: DispatchPoint) -> RouteChoice {
            match at {
                DispatchPoint::Crusher(c) => {
                    let done = self.cycles.entry(truck).or_insert(0);
                    if *done >= 1 {
                        return RouteChoice::Park;
                    }
                    *done += 1;
                    RouteChoice::Route(mine.network().routes_from_crusher(c)[0])
                }
                DispatchPoint::Shovel(_) => match mine.truck(truck).route {
                    Some(route) => RouteChoice::Route(route),
                    None => RouteChoice::Park,
                },
            }
        }
    }

    let net = Arc::new(parse::parse(ROUTED).unwrap());
    let mut mine = Mine::with_rng(
        net,
        Arc::new(DeterministicTimes),
        StdRng::seed_from_u64(1),
    );
    let mut dispatcher = ParkAfterOneCycle::default();
    // every truck runs exactly one cycle, then parks: the mine drains
    assert_eq!(
        mine.simulate(1_000.0, &mut dispatcher),
        Ok(SimOutcome::Drained)
    );
    assert_eq!(mine.num_empties(), 6);
    for t in 0..6 {
        assert_eq!(mine.truck(TruckId(t)).state, TruckState::Unused);
    }
}
