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

//! # State-restartable simulation
//!
//! Controllers that estimate the future (the greedy heuristics and the
//! DISPATCH controller) keep a [`StoredState`] mirror of the live mine,
//! updated through the [`Dispatcher`](crate::dispatcher::Dispatcher)
//! `record_event` / `record_light` hooks, with no re-simulation needed. From the
//! mirror, [`StoredState::ready`] derives all auxiliary queues, and
//! [`Ready::re_ready`] builds a fresh, runnable [`Mine`] whose
//! partially-completed tasks get fresh random draws scaled by the remaining
//! fraction of work. Running the copy never mutates the stored state.
//!
//! With identical stored state and identical RNG draws, two
//! `re_ready` + `simulate` invocations produce identical traces.

use std::collections::VecDeque;
use std::sync::Arc;

use itertools::Itertools;
use rand::rngs::StdRng;

use crate::dist::TimeDistribution;
use crate::event::{priority, EventQueue, InstantQueue, StateChange, Transition, TruckState};
use crate::light::{LightState, TrafficLight};
use crate::mine::{state_after_road, Mine, RoadState, Service, Truck};
use crate::network::{LaneKind, MineNetwork};
use crate::types::{sim_time, CrusherId, Leg, RoadId, RouteId, SimError, SimTime, TruckId};

/// Which leg of the cycle a state belongs to.
fn leg_of(state: TruckState) -> Leg {
    match state {
        TruckState::LeavingShovel
        | TruckState::TravelToCrusher
        | TruckState::ApproachLightToCrusher
        | TruckState::StopAtLightToCrusher
        | TruckState::ApproachCrusher
        | TruckState::WaitAtCrusher
        | TruckState::Emptying => Leg::Loaded,
        _ => Leg::Empty,
    }
}

/// The stored record of one truck.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTruck {
    /// State at the snapshot instant.
    pub state: TruckState,
    /// Assigned route, if any.
    pub route: Option<RouteId>,
    /// Road index along the current leg.
    pub route_point: usize,
    /// The crusher the truck is at or last departed from.
    pub crusher: CrusherId,
    /// Completion fraction of the current timed task.
    pub progress: f64,
    /// Sequence number of the last observed transition. Orders all derived
    /// queues, so two observers of the same trace reconstruct identically.
    pub rank: u64,
}

/// A snapshot of a live mine that can be replayed forward repeatedly.
#[derive(Debug, Clone)]
pub struct StoredState {
    net: Arc<MineNetwork>,
    time: f64,
    trucks: Vec<StoredTruck>,
    lights: Vec<Option<LightState>>,
}

impl StoredState {
    /// Snapshot the complete state of a live mine.
    pub fn capture(mine: &Mine) -> Self {
        let net = mine.network().clone();
        let trucks = mine
            .trucks()
            .iter()
            .map(|t| StoredTruck {
                state: t.state,
                route: t.route,
                route_point: t.route_point,
                crusher: t.crusher,
                progress: t.progress(sim_time(mine.time())),
                rank: t.last_seq,
            })
            .collect();
        let lights = (0..net.num_roads())
            .map(|r| mine.light_state(RoadId(r)))
            .collect();
        Self {
            net,
            time: mine.time(),
            trucks,
            lights,
        }
    }

    /// A stored state matching a freshly reset mine (all trucks `Waiting` at
    /// the given crushers).
    pub fn initial(net: Arc<MineNetwork>, assignment: &[CrusherId]) -> Self {
        let trucks = assignment
            .iter()
            .map(|c| StoredTruck {
                state: TruckState::Waiting,
                route: None,
                route_point: 0,
                crusher: *c,
                progress: 0.0,
                rank: 0,
            })
            .collect();
        let lights = net
            .roads()
            .iter()
            .map(|r| (r.kind == LaneKind::OneLane).then(LightState::default))
            .collect();
        Self {
            net,
            time: 0.0,
            trucks,
            lights,
        }
    }

    /// The network this state belongs to.
    pub fn network(&self) -> &Arc<MineNetwork> {
        &self.net
    }

    /// The snapshot time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Stored record of one truck.
    pub fn truck(&self, t: TruckId) -> &StoredTruck {
        &self.trucks[t.index()]
    }

    /// Update the snapshot from an emitted transition. Replaying the same
    /// change twice is idempotent.
    pub fn record_event(&mut self, change: &StateChange) {
        let tr = &change.transition;
        self.time = self.time.max(tr.time.into_inner());
        for (truck, progress) in self.trucks.iter_mut().zip(&change.progress) {
            truck.progress = *progress;
        }
        let truck = &mut self.trucks[tr.truck.index()];
        truck.state = tr.to;
        truck.route = change.route;
        truck.route_point = change.route_point;
        truck.rank = tr.seq;
        truck.progress = 0.0;
        if let Some(route) = change.route {
            if leg_of(tr.to) == Leg::Loaded || tr.to == TruckState::Waiting {
                truck.crusher = self.net.route(route).crusher;
            }
        }
    }

    /// Update the stored state of one traffic light.
    pub fn record_light(&mut self, road: RoadId, state: LightState) {
        self.lights[road.index()] = Some(state);
    }

    /// Reconstruct all auxiliary queues from the per-truck records: service
    /// queues, road queues, light queues, pending instants, and the set of
    /// partially-completed timed tasks.
    pub fn ready(&self) -> Ready {
        let net = &self.net;
        let mut ready = Ready {
            state: self.clone(),
            road_queues: vec![[VecDeque::new(), VecDeque::new()]; net.num_roads()],
            crushers: vec![Service::default(); net.num_crushers()],
            shovels: vec![Service::default(); net.num_shovels()],
            lights: self
                .lights
                .iter()
                .map(|l| {
                    l.map(|state| TrafficLight {
                        state,
                        queues: Default::default(),
                    })
                })
                .collect(),
            instants: Vec::new(),
            timed: Vec::new(),
        };

        // derived queues are ordered by each truck's last transition
        let order = (0..self.trucks.len())
            .map(TruckId)
            .sorted_by_key(|t| (self.trucks[t.index()].rank, *t));

        for tid in order {
            let truck = &self.trucks[tid.index()];
            match truck.state {
                TruckState::Waiting
                | TruckState::ApproachLightToShovel
                | TruckState::ApproachLightToCrusher
                | TruckState::ApproachShovel
                | TruckState::ApproachCrusher
                | TruckState::LeavingShovel => {
                    // transient states re-run their entry action on restart
                    ready.instants.push((tid, truck.state, truck.state));
                }
                TruckState::TravelToShovel | TruckState::TravelToCrusher => {
                    let route = self.net.route(truck.route.expect("traveling truck has a route"));
                    let (road, dir) = route.leg_road(leg_of(truck.state), truck.route_point);
                    ready.road_queues[road.index()][dir.idx()].push_back(tid);
                    ready.timed.push(tid);
                }
                TruckState::StopAtLightToShovel | TruckState::StopAtLightToCrusher => {
                    let route = self.net.route(truck.route.expect("held truck has a route"));
                    let (road, dir) = route.leg_road(leg_of(truck.state), truck.route_point);
                    if let Some(light) = ready.lights[road.index()].as_mut() {
                        light.queues[dir.idx()].push_back(tid);
                    }
                }
                TruckState::WaitAtShovel => {
                    let route = self.net.route(truck.route.expect("waiting truck has a route"));
                    ready.shovels[route.shovel.index()].queue.push_back(tid);
                }
                TruckState::WaitAtCrusher => {
                    ready.crushers[truck.crusher.index()].queue.push_back(tid);
                }
                TruckState::Filling => {
                    let route = self.net.route(truck.route.expect("filling truck has a route"));
                    ready.shovels[route.shovel.index()].busy = Some(tid);
                    ready.timed.push(tid);
                }
                TruckState::Emptying => {
                    ready.crushers[truck.crusher.index()].busy = Some(tid);
                    ready.timed.push(tid);
                }
                TruckState::Unused => {}
            }
        }

        // idle services with a waiting head hand over immediately
        for svc in &mut ready.crushers {
            if svc.busy.is_none() {
                if let Some(&head) = svc.queue.front() {
                    svc.busy = Some(head);
                    ready
                        .instants
                        .push((head, TruckState::WaitAtCrusher, TruckState::Emptying));
                }
            }
        }
        for svc in &mut ready.shovels {
            if svc.busy.is_none() {
                if let Some(&head) = svc.queue.front() {
                    svc.busy = Some(head);
                    ready
                        .instants
                        .push((head, TruckState::WaitAtShovel, TruckState::Filling));
                }
            }
        }

        // trucks held at a light that already shows green are released
        for light in ready.lights.iter().flatten() {
            if let Some(green) = light.state.green_side() {
                for &tid in &light.queues[green.idx()] {
                    let (from, to) = match self.trucks[tid.index()].state {
                        TruckState::StopAtLightToShovel => {
                            (TruckState::StopAtLightToShovel, TruckState::TravelToShovel)
                        }
                        _ => (TruckState::StopAtLightToCrusher, TruckState::TravelToCrusher),
                    };
                    ready.instants.push((tid, from, to));
                }
            }
        }

        ready
    }
}

/// The derived (ready) form of a [`StoredState`]: every auxiliary queue
/// reconstructed, waiting only for fresh random draws.
#[derive(Debug, Clone)]
pub struct Ready {
    state: StoredState,
    road_queues: Vec<[VecDeque<TruckId>; 2]>,
    crushers: Vec<Service>,
    shovels: Vec<Service>,
    lights: Vec<Option<TrafficLight>>,
    /// Pending instant transitions `(truck, from, to)`, in firing order.
    instants: Vec<(TruckId, TruckState, TruckState)>,
    /// Trucks with a partially-completed timed task, in rank order.
    timed: Vec<TruckId>,
}

impl Ready {
    /// Copy the ready state into a runnable [`Mine`], re-drawing a fresh
    /// duration for every partially-completed task, scaled by the remaining
    /// work `1 - progress`. The stored state is not mutated; calling this
    /// again yields an independent replica.
    pub fn re_ready(
        &self,
        dist: Arc<dyn TimeDistribution>,
        mut rng: StdRng,
    ) -> Result<Mine, SimError> {
        let net = self.state.net.clone();
        let now = sim_time(self.state.time);

        let mut trucks: Vec<Truck> = self
            .state
            .trucks
            .iter()
            .map(|t| Truck {
                state: t.state,
                route: t.route,
                leg: leg_of(t.state),
                route_point: t.route_point,
                crusher: t.crusher,
                shovel: t.route.map(|r| net.route(r).shovel),
                last_change: now,
                intended: now,
                last_seq: 0,
            })
            .collect();

        let mut events = EventQueue::new();
        let mut instants = InstantQueue::new();
        let mut seq = 0u64;
        let push = |q: &mut EventQueue,
                    truck: TruckId,
                    time: SimTime,
                    from: TruckState,
                    to: TruckState,
                    prio: u64,
                    seq: &mut u64| {
            q.push(Transition {
                seq: *seq,
                truck,
                time,
                from,
                to,
                priority: prio,
            });
            *seq += 1;
        };

        let mut roads: Vec<RoadState> = self
            .road_queues
            .iter()
            .zip(&self.lights)
            .map(|(queues, light)| RoadState {
                queues: queues.clone(),
                available: [now, now],
                counter: [0, 0],
                light: light.clone(),
            })
            .collect();

        // anti-overtaking chains: walk each road queue in order, re-drawing
        // the remaining travel of each truck
        for (r, road) in roads.iter_mut().enumerate() {
            let params = net.road(RoadId(r));
            for d in 0..2 {
                for i in 0..road.queues[d].len() {
                    let tid = road.queues[d][i];
                    let truck = &mut trucks[tid.index()];
                    let stored = &self.state.trucks[tid.index()];
                    let mut tau = dist.sample(params.mean, params.sd, &mut rng)?;
                    if truck.leg == Leg::Loaded {
                        tau *= net.full_slowdown();
                    }
                    tau *= 1.0 - stored.progress;
                    let intended = now + tau;
                    let actual = intended.max(road.available[d]);
                    road.available[d] = actual;
                    truck.intended = intended;
                    let sub = road.counter[d];
                    road.counter[d] += 1;
                    let route = net.route(truck.route.expect("traveling truck has a route"));
                    let to = state_after_road(&net, route, truck.leg, truck.route_point);
                    push(
                        &mut events,
                        tid,
                        actual,
                        truck.state,
                        to,
                        priority(truck.state, sub),
                        &mut seq,
                    );
                }
            }
        }

        // services: re-draw the remaining fill / empty durations
        for &tid in &self.timed {
            let truck = &trucks[tid.index()];
            let stored = &self.state.trucks[tid.index()];
            let (params, to) = match truck.state {
                TruckState::Filling => (
                    *net.shovel(truck.shovel.expect("filling truck has a shovel")),
                    TruckState::LeavingShovel,
                ),
                TruckState::Emptying => (*net.crusher(truck.crusher), TruckState::Waiting),
                _ => continue, // travel tasks were handled with the road queues
            };
            let tau = dist.sample(params.mean, params.sd, &mut rng)? * (1.0 - stored.progress);
            let end = now + tau;
            let state = truck.state;
            trucks[tid.index()].intended = end;
            push(
                &mut events,
                tid,
                end,
                state,
                to,
                priority(to, tid.index() as u64),
                &mut seq,
            );
        }

        // pending instants re-enter through the instant queue
        for (i, (tid, from, to)) in self.instants.iter().enumerate() {
            instants.push(Transition {
                seq,
                truck: *tid,
                time: now,
                from: *from,
                to: *to,
                priority: priority(*to, i as u64),
            });
            seq += 1;
        }

        Ok(Mine {
            net,
            dist,
            rng,
            time: now,
            seq,
            trucks,
            crushers: self.crushers.clone(),
            shovels: self.shovels.clone(),
            roads,
            events,
            instants,
            num_empties: 0,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dispatcher::RoundTrip;
    use crate::dist::DeterministicTimes;
    use crate::network::ServiceParams;
    use rand::SeedableRng;

    fn simple_net() -> Arc<MineNetwork> {
        Arc::new(
            MineNetwork::simple(
                2,
                ServiceParams::new(1.0, 0.0),
                vec![(ServiceParams::new(5.0, 0.0), ServiceParams::new(2.0, 0.0))],
            )
            .unwrap(),
        )
    }

    /// Observing dispatcher mirroring the live mine into a StoredState.
    #[derive(Debug)]
    struct Mirror {
        inner: RoundTrip,
        state: StoredState,
    }

    impl crate::dispatcher::Dispatcher for Mirror {
        fn next_route(
            &mut self,
            mine: &Mine,
            truck: TruckId,
            at: crate::dispatcher::DispatchPoint,
        ) -> crate::dispatcher::RouteChoice {
            use crate::dispatcher::{DispatchPoint, RouteChoice};
            if let (DispatchPoint::Crusher(_), None) = (at, mine.truck(truck).route) {
                return RouteChoice::Route(RouteId(0));
            }
            self.inner.next_route(mine, truck, at)
        }

        fn record_event(&mut self, _: &Mine, change: &StateChange) {
            self.state.record_event(change);
        }

        fn record_light(&mut self, _: &Mine, road: RoadId, state: LightState) {
            self.state.record_light(road, state);
        }
    }

    #[test]
    fn recorded_state_matches_capture() {
        let net = simple_net();
        let dist: Arc<dyn TimeDistribution> = Arc::new(DeterministicTimes);
        let mut mine = Mine::with_rng(net.clone(), dist.clone(), StdRng::seed_from_u64(7));
        let mut mirror = Mirror {
            inner: RoundTrip,
            state: StoredState::initial(net, &[CrusherId(0), CrusherId(0)]),
        };
        // stop exactly on an event so the recorded mirror is as fresh as a
        // direct capture
        mine.simulate(9.0, &mut mirror).unwrap();

        let captured = StoredState::capture(&mine);
        assert_eq!(captured.time, mirror.state.time);
        for t in 0..2 {
            let a = captured.truck(TruckId(t));
            let b = mirror.state.truck(TruckId(t));
            assert_eq!(a.state, b.state);
            assert_eq!(a.route, b.route);
            assert_eq!(a.route_point, b.route_point);
            approx::assert_abs_diff_eq!(a.progress, b.progress, epsilon = 1e-9);
        }
    }

    #[test]
    fn restart_continues_deterministically() {
        let net = simple_net();
        let dist: Arc<dyn TimeDistribution> = Arc::new(DeterministicTimes);

        // reference: run the full horizon in one go
        let mut reference = Mine::with_rng(net.clone(), dist.clone(), StdRng::seed_from_u64(1));
        let mut d0 = Mirror {
            inner: RoundTrip,
            state: StoredState::initial(net.clone(), &[CrusherId(0), CrusherId(0)]),
        };
        reference.simulate(40.0, &mut d0).unwrap();

        // restarted: stop at t=13, snapshot, replay the rest twice
        let mut mine = Mine::with_rng(net, dist.clone(), StdRng::seed_from_u64(1));
        let mut d1 = Mirror {
            inner: RoundTrip,
            state: StoredState::initial(d0.state.network().clone(), &[CrusherId(0), CrusherId(0)]),
        };
        mine.simulate(13.0, &mut d1).unwrap();
        let ready = StoredState::capture(&mine).ready();

        let empties: Vec<usize> = (0..2)
            .map(|_| {
                let mut replica = ready
                    .re_ready(dist.clone(), StdRng::seed_from_u64(99))
                    .unwrap();
                replica.simulate(40.0, &mut RoundTrip).unwrap();
                replica.num_empties()
            })
            .collect();

        // identical stored state + identical draws => identical traces
        assert_eq!(empties[0], empties[1]);
        // with a deterministic distribution the restart matches the
        // uninterrupted run (empties counted after the snapshot)
        assert_eq!(
            empties[0],
            reference.num_empties() - mine.num_empties()
        );
    }
}
