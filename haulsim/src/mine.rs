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

//! # The discrete-event simulation kernel
//!
//! A [`Mine`] owns the complete runtime state of one simulated shift: the
//! clock, every truck, every service queue, every road queue, and the traffic
//! lights of one-lane roads. Time advances only inside [`Mine::simulate`],
//! which pops transitions from the instant and timed queues, verifies the
//! source state of each (any disagreement is a fatal invariant violation),
//! applies it, and lets the [`Dispatcher`] observe the change.
//!
//! The same kernel serves both network kinds. A single-crusher network built
//! with [`MineNetwork::simple`] never reaches the traffic-light states, since
//! all of its roads are two-lane.

use std::collections::VecDeque;
use std::sync::Arc;

use log::trace;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dispatcher::{DispatchPoint, Dispatcher, RouteChoice};
use crate::dist::TimeDistribution;
use crate::event::{priority, EventQueue, InstantQueue, StateChange, Transition, TruckState};
use crate::light::{LightState, Signal, TrafficLight};
use crate::network::{LaneKind, MineNetwork};
use crate::types::{
    sim_time, CrusherId, Leg, RoadDir, RoadId, RouteId, ShovelId, SimError, SimTime, TruckId,
};

/// Runtime record of one truck.
#[derive(Debug, Clone, PartialEq)]
pub struct Truck {
    /// Current state.
    pub state: TruckState,
    /// Route the truck is assigned to, if any.
    pub route: Option<RouteId>,
    /// Which leg of the cycle the truck is on.
    pub leg: Leg,
    /// Road index along the current leg, in travel order.
    pub route_point: usize,
    /// The crusher the truck is at or last departed from.
    pub crusher: CrusherId,
    /// The shovel of the current cycle, if a route is assigned.
    pub shovel: Option<ShovelId>,
    /// Time of the last state change.
    pub last_change: SimTime,
    /// Free-flow completion time of the current timed task.
    pub intended: SimTime,
    /// Sequence number of the last transition that touched this truck.
    pub last_seq: u64,
}

impl Truck {
    fn at_crusher(crusher: CrusherId) -> Self {
        Self {
            state: TruckState::Waiting,
            route: None,
            leg: Leg::Empty,
            route_point: 0,
            crusher,
            shovel: None,
            last_change: SimTime::default(),
            intended: SimTime::default(),
            last_seq: 0,
        }
    }

    /// Completion fraction of the current timed task at time `now`.
    pub fn progress(&self, now: SimTime) -> f64 {
        if !self.state.is_timed() || self.intended <= self.last_change {
            return 0.0;
        }
        ((now - self.last_change) / (self.intended - self.last_change))
            .into_inner()
            .clamp(0.0, 1.0)
    }
}

/// A crusher or shovel with its FIFO queue. `busy` is reserved as soon as a
/// service transition is scheduled, so two arrivals at the same instant
/// cannot both claim an idle service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Service {
    /// Trucks waiting for this service, in arrival order.
    pub queue: VecDeque<TruckId>,
    /// The truck being served (or scheduled to be served).
    pub busy: Option<TruckId>,
}

/// Runtime state of one road segment.
#[derive(Debug, Clone, Default)]
pub struct RoadState {
    /// Trucks on the road per direction, in entry (and thus arrival) order.
    pub queues: [VecDeque<TruckId>; 2],
    /// Earliest possible arrival of the next truck per direction.
    pub available: [SimTime; 2],
    /// Monotone arrival counter per direction (event sub-priorities).
    pub counter: [u64; 2],
    /// The traffic light, present on one-lane roads only.
    pub light: Option<TrafficLight>,
}

/// Why [`Mine::simulate`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOutcome {
    /// The next event lies beyond the requested horizon.
    Horizon,
    /// The dispatcher requested termination.
    Stopped,
    /// No event is left (every truck is parked).
    Drained,
}

/// The live simulator. See the [module documentation](self).
#[derive(Debug, Clone)]
pub struct Mine {
    pub(crate) net: Arc<MineNetwork>,
    pub(crate) dist: Arc<dyn TimeDistribution>,
    pub(crate) rng: StdRng,
    pub(crate) time: SimTime,
    pub(crate) seq: u64,
    pub(crate) trucks: Vec<Truck>,
    pub(crate) crushers: Vec<Service>,
    pub(crate) shovels: Vec<Service>,
    pub(crate) roads: Vec<RoadState>,
    pub(crate) events: EventQueue,
    pub(crate) instants: InstantQueue,
    pub(crate) num_empties: usize,
}

impl Mine {
    /// Create a mine with all trucks distributed round-robin over the
    /// crushers, seeded from entropy.
    pub fn new(net: Arc<MineNetwork>, dist: Arc<dyn TimeDistribution>) -> Self {
        Self::with_rng(net, dist, StdRng::from_entropy())
    }

    /// Create a mine with an explicit RNG (reproducible runs).
    pub fn with_rng(net: Arc<MineNetwork>, dist: Arc<dyn TimeDistribution>, rng: StdRng) -> Self {
        let mut mine = Self {
            trucks: Vec::new(),
            crushers: vec![Service::default(); net.num_crushers()],
            shovels: vec![Service::default(); net.num_shovels()],
            roads: net
                .roads()
                .iter()
                .map(|r| RoadState {
                    light: (r.kind == LaneKind::OneLane).then(TrafficLight::new),
                    ..Default::default()
                })
                .collect(),
            events: EventQueue::new(),
            instants: InstantQueue::new(),
            time: SimTime::default(),
            seq: 0,
            num_empties: 0,
            net,
            dist,
            rng,
        };
        mine.reset(None);
        mine
    }

    /// Reset to the start of a shift: clear all queues, zero the clock, and
    /// place every truck `Waiting` at its initial crusher. `assignment` maps
    /// each truck to a crusher; `None` distributes them round-robin.
    pub fn reset(&mut self, assignment: Option<&[CrusherId]>) {
        let nt = self.net.num_trucks();
        let nc = self.net.num_crushers();
        self.trucks = (0..nt)
            .map(|t| {
                let crusher = assignment
                    .map(|a| a[t])
                    .unwrap_or_else(|| CrusherId(t % nc));
                Truck::at_crusher(crusher)
            })
            .collect();
        for svc in self.crushers.iter_mut().chain(self.shovels.iter_mut()) {
            *svc = Service::default();
        }
        for road in self.roads.iter_mut() {
            let one_lane = road.light.is_some();
            *road = RoadState {
                light: one_lane.then(TrafficLight::new),
                ..Default::default()
            };
        }
        self.events.clear();
        self.instants.clear();
        self.time = SimTime::default();
        self.seq = 0;
        self.num_empties = 0;
        // seed one dispatch request per truck
        for t in 0..nt {
            let tr = self.transition(
                TruckId(t),
                self.time,
                TruckState::Waiting,
                TruckState::Waiting,
                priority(TruckState::Waiting, t as u64),
            );
            self.instants.push(tr);
        }
    }

    /// The static description this mine runs on.
    #[inline]
    pub fn network(&self) -> &Arc<MineNetwork> {
        &self.net
    }

    /// The configured time distribution.
    #[inline]
    pub fn distribution(&self) -> &Arc<dyn TimeDistribution> {
        &self.dist
    }

    /// Current simulation time.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time.into_inner()
    }

    /// Completed dump cycles so far. Monotone within a shift.
    #[inline]
    pub fn num_empties(&self) -> usize {
        self.num_empties
    }

    /// Runtime record of one truck.
    #[inline]
    pub fn truck(&self, t: TruckId) -> &Truck {
        &self.trucks[t.index()]
    }

    /// All truck records, indexable by [`TruckId`].
    #[inline]
    pub fn trucks(&self) -> &[Truck] {
        &self.trucks
    }

    /// A crusher's service queue.
    #[inline]
    pub fn crusher_service(&self, c: CrusherId) -> &Service {
        &self.crushers[c.index()]
    }

    /// A shovel's service queue.
    #[inline]
    pub fn shovel_service(&self, s: ShovelId) -> &Service {
        &self.shovels[s.index()]
    }

    /// Runtime state of a road.
    #[inline]
    pub fn road_state(&self, r: RoadId) -> &RoadState {
        &self.roads[r.index()]
    }

    /// State of the traffic light on a one-lane road.
    #[inline]
    pub fn light_state(&self, r: RoadId) -> Option<LightState> {
        self.roads[r.index()].light.as_ref().map(|l| l.state)
    }

    /// Completion fraction of every truck's current task.
    pub fn progress(&self) -> Vec<f64> {
        self.trucks.iter().map(|t| t.progress(self.time)).collect()
    }

    /// Run the simulation until the next event would fire after `until`, the
    /// dispatcher requests a stop, or no event is left. The instant queue
    /// always drains fully before the next timed event fires.
    pub fn simulate<D: Dispatcher + ?Sized>(
        &mut self,
        until: f64,
        dispatcher: &mut D,
    ) -> Result<SimOutcome, SimError> {
        let until = sim_time(until);
        loop {
            let tr = if let Some(tr) = self.instants.pop() {
                tr
            } else {
                match self.events.peek() {
                    Some(next) if next.time <= until => {
                        let tr = self.events.pop().unwrap();
                        self.time = tr.time;
                        tr
                    }
                    Some(_) => {
                        self.time = self.time.max(until);
                        return Ok(SimOutcome::Horizon);
                    }
                    None => return Ok(SimOutcome::Drained),
                }
            };
            if self.process(tr, dispatcher)? {
                return Ok(SimOutcome::Stopped);
            }
        }
    }

    fn transition(
        &mut self,
        truck: TruckId,
        time: SimTime,
        from: TruckState,
        to: TruckState,
        priority: u64,
    ) -> Transition {
        let seq = self.seq;
        self.seq += 1;
        Transition {
            seq,
            truck,
            time,
            from,
            to,
            priority,
        }
    }

    fn push_instant(&mut self, truck: TruckId, from: TruckState, to: TruckState, sub: u64) {
        let tr = self.transition(truck, self.time, from, to, priority(to, sub));
        self.instants.push(tr);
    }

    /// Process one transition. Returns `true` if the dispatcher requested a
    /// stop.
    fn process<D: Dispatcher + ?Sized>(
        &mut self,
        tr: Transition,
        dispatcher: &mut D,
    ) -> Result<bool, SimError> {
        let tid = tr.truck;
        let t = tid.index();
        trace!(
            "t={:.3} {}: {:?} -> {:?}",
            tr.time.into_inner(),
            tid,
            tr.from,
            tr.to
        );

        if self.trucks[t].state != tr.from {
            return Err(SimError::StateMismatch {
                truck: tid,
                expected: tr.from,
                found: self.trucks[t].state,
            });
        }
        if !tr.from.can_reach(tr.to) {
            return Err(SimError::IllegalTransition {
                truck: tid,
                from: tr.from,
                to: tr.to,
            });
        }

        self.leave_state(&tr, dispatcher)?;

        let truck = &mut self.trucks[t];
        truck.state = tr.to;
        truck.last_change = tr.time;
        truck.intended = tr.time;
        truck.last_seq = tr.seq;

        let change = StateChange {
            transition: tr.clone(),
            route: self.trucks[t].route,
            route_point: self.trucks[t].route_point,
            progress: self.progress(),
        };
        dispatcher.record_event(&*self, &change);

        self.enter_state(&tr, dispatcher)
    }

    /// Bookkeeping for the state the truck leaves.
    fn leave_state<D: Dispatcher + ?Sized>(
        &mut self,
        tr: &Transition,
        dispatcher: &mut D,
    ) -> Result<(), SimError> {
        let tid = tr.truck;
        let t = tid.index();
        match tr.from {
            // a travel state only ends when the road is traversed
            TruckState::TravelToShovel | TruckState::TravelToCrusher => {
                let (road, dir) = self.current_leg_road(tid)?;
                let head = self.roads[road.index()].queues[dir.idx()].pop_front();
                if head != Some(tid) {
                    return Err(SimError::RoadQueueMismatch {
                        truck: tid,
                        road,
                        dir,
                        head,
                    });
                }
                self.trucks[t].route_point += 1;
                if self.roads[road.index()].light.is_some() {
                    self.try_flip(road, dispatcher)?;
                }
            }
            TruckState::Filling => {
                let s = self.trucks[t].shovel.expect("filling truck has a shovel");
                self.release_service(tid, s.index(), false)?;
            }
            TruckState::Emptying => {
                let c = self.trucks[t].crusher;
                self.num_empties += 1;
                self.release_service(tid, c.index(), true)?;
            }
            TruckState::WaitAtShovel => {
                let s = self.trucks[t].shovel.expect("waiting truck has a shovel");
                let head = self.shovels[s.index()].queue.pop_front();
                if head != Some(tid) {
                    return Err(SimError::ServiceQueueMismatch { truck: tid, head });
                }
            }
            TruckState::WaitAtCrusher => {
                let c = self.trucks[t].crusher;
                let head = self.crushers[c.index()].queue.pop_front();
                if head != Some(tid) {
                    return Err(SimError::ServiceQueueMismatch { truck: tid, head });
                }
            }
            TruckState::StopAtLightToShovel | TruckState::StopAtLightToCrusher => {
                let (road, dir) = self.current_leg_road(tid)?;
                let light = self.roads[road.index()]
                    .light
                    .as_mut()
                    .ok_or(SimError::IllegalLight(road))?;
                let head = light.queues[dir.idx()].pop_front();
                if head != Some(tid) {
                    return Err(SimError::ServiceQueueMismatch { truck: tid, head });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Actions triggered by the state the truck enters. Returns `true` if the
    /// dispatcher requested a stop.
    fn enter_state<D: Dispatcher + ?Sized>(
        &mut self,
        tr: &Transition,
        dispatcher: &mut D,
    ) -> Result<bool, SimError> {
        let tid = tr.truck;
        let t = tid.index();
        match tr.to {
            TruckState::Waiting => {
                let at = DispatchPoint::Crusher(self.trucks[t].crusher);
                return self.dispatch(tid, at, dispatcher);
            }
            TruckState::LeavingShovel => {
                let shovel = self.trucks[t].shovel.expect("leaving truck has a shovel");
                let at = DispatchPoint::Shovel(shovel);
                return self.dispatch(tid, at, dispatcher);
            }
            TruckState::TravelToShovel | TruckState::TravelToCrusher => {
                self.enter_road(tr)?;
            }
            TruckState::ApproachLightToShovel | TruckState::ApproachLightToCrusher => {
                self.approach_light(tr, dispatcher)?;
            }
            TruckState::ApproachShovel => {
                let s = self.trucks[t].shovel.expect("approaching truck has a shovel");
                let svc = &mut self.shovels[s.index()];
                if svc.busy.is_none() && svc.queue.is_empty() {
                    svc.busy = Some(tid);
                    self.push_instant(tid, TruckState::ApproachShovel, TruckState::Filling, t as u64);
                } else {
                    svc.queue.push_back(tid);
                    self.push_instant(
                        tid,
                        TruckState::ApproachShovel,
                        TruckState::WaitAtShovel,
                        t as u64,
                    );
                }
            }
            TruckState::ApproachCrusher => {
                let route = self.trucks[t].route.expect("approaching truck has a route");
                let c = self.net.route(route).crusher;
                self.trucks[t].crusher = c;
                let svc = &mut self.crushers[c.index()];
                if svc.busy.is_none() && svc.queue.is_empty() {
                    svc.busy = Some(tid);
                    self.push_instant(
                        tid,
                        TruckState::ApproachCrusher,
                        TruckState::Emptying,
                        t as u64,
                    );
                } else {
                    svc.queue.push_back(tid);
                    self.push_instant(
                        tid,
                        TruckState::ApproachCrusher,
                        TruckState::WaitAtCrusher,
                        t as u64,
                    );
                }
            }
            TruckState::Filling => {
                let s = self.trucks[t].shovel.expect("filling truck has a shovel");
                debug_assert_eq!(self.shovels[s.index()].busy, Some(tid));
                let params = *self.net.shovel(s);
                let tau = self.dist.sample(params.mean, params.sd, &mut self.rng)?;
                let end = self.time + tau;
                self.trucks[t].intended = end;
                let ev = self.transition(
                    tid,
                    end,
                    TruckState::Filling,
                    TruckState::LeavingShovel,
                    priority(TruckState::LeavingShovel, t as u64),
                );
                self.events.push(ev);
            }
            TruckState::Emptying => {
                let c = self.trucks[t].crusher;
                debug_assert_eq!(self.crushers[c.index()].busy, Some(tid));
                let params = *self.net.crusher(c);
                let tau = self.dist.sample(params.mean, params.sd, &mut self.rng)?;
                let end = self.time + tau;
                self.trucks[t].intended = end;
                let ev = self.transition(
                    tid,
                    end,
                    TruckState::Emptying,
                    TruckState::Waiting,
                    priority(TruckState::Waiting, t as u64),
                );
                self.events.push(ev);
            }
            // queued in the approach handler; nothing to do here
            TruckState::WaitAtShovel
            | TruckState::WaitAtCrusher
            | TruckState::StopAtLightToShovel
            | TruckState::StopAtLightToCrusher
            | TruckState::Unused => {}
        }
        Ok(false)
    }

    /// Ask the dispatcher for a route and move the truck onto it.
    fn dispatch<D: Dispatcher + ?Sized>(
        &mut self,
        tid: TruckId,
        at: DispatchPoint,
        dispatcher: &mut D,
    ) -> Result<bool, SimError> {
        let t = tid.index();
        let from = self.trucks[t].state;
        match dispatcher.next_route(&*self, tid, at) {
            RouteChoice::StopSimulation => return Ok(true),
            RouteChoice::Park => {
                self.push_instant(tid, from, TruckState::Unused, t as u64);
            }
            RouteChoice::Route(route) => {
                if route.index() >= self.net.num_routes() {
                    return Err(SimError::BadDispatch {
                        truck: tid,
                        index: route.index(),
                    });
                }
                let leg = match at {
                    DispatchPoint::Crusher(c) => {
                        if self.net.route(route).crusher != c {
                            return Err(SimError::ForeignRoute { truck: tid, route });
                        }
                        Leg::Empty
                    }
                    DispatchPoint::Shovel(s) => {
                        if self.net.route(route).shovel != s {
                            return Err(SimError::ForeignRoute { truck: tid, route });
                        }
                        Leg::Loaded
                    }
                };
                let truck = &mut self.trucks[t];
                truck.route = Some(route);
                truck.leg = leg;
                truck.route_point = 0;
                truck.shovel = Some(self.net.route(route).shovel);
                let (first_road, _) = self.net.route(route).leg_road(leg, 0);
                let to = match (self.net.road(first_road).kind, leg) {
                    (LaneKind::OneLane, Leg::Empty) => TruckState::ApproachLightToShovel,
                    (LaneKind::OneLane, Leg::Loaded) => TruckState::ApproachLightToCrusher,
                    (LaneKind::TwoLane, Leg::Empty) => TruckState::TravelToShovel,
                    (LaneKind::TwoLane, Leg::Loaded) => TruckState::TravelToCrusher,
                };
                self.push_instant(tid, from, to, t as u64);
            }
        }
        Ok(false)
    }

    /// The road (and traversal direction) of the truck's current route
    /// point.
    fn current_leg_road(&self, tid: TruckId) -> Result<(RoadId, RoadDir), SimError> {
        let truck = &self.trucks[tid.index()];
        let route = truck.route.ok_or(SimError::BadDispatch {
            truck: tid,
            index: usize::MAX,
        })?;
        Ok(self.net.route(route).leg_road(truck.leg, truck.route_point))
    }

    /// Put the truck onto its current road: sample the travel time, respect
    /// the anti-overtaking timestamp, and schedule the completion.
    fn enter_road(&mut self, tr: &Transition) -> Result<(), SimError> {
        let tid = tr.truck;
        let t = tid.index();
        let (road, dir) = self.current_leg_road(tid)?;
        let params = self.net.road(road);
        let mut tau = self.dist.sample(params.mean, params.sd, &mut self.rng)?;
        if self.trucks[t].leg == Leg::Loaded {
            tau *= self.net.full_slowdown();
        }
        let intended = self.time + tau;
        let state = &mut self.roads[road.index()];
        let actual = intended.max(state.available[dir.idx()]);
        state.available[dir.idx()] = actual;
        state.queues[dir.idx()].push_back(tid);
        let sub = state.counter[dir.idx()];
        state.counter[dir.idx()] += 1;
        self.trucks[t].intended = intended;

        let to = self.state_after_road(tid)?;
        // completions share the travel band; the per-(road, direction)
        // arrival counter keeps same-time completions in entry order
        let ev = self.transition(tid, actual, tr.to, to, priority(tr.to, sub));
        self.events.push(ev);
        Ok(())
    }

    /// The state a truck reaches when it finishes its current road.
    fn state_after_road(&self, tid: TruckId) -> Result<TruckState, SimError> {
        let truck = &self.trucks[tid.index()];
        let route = self.net.route(truck.route.expect("traveling truck has a route"));
        Ok(state_after_road(
            &self.net,
            route,
            truck.leg,
            truck.route_point,
        ))
    }

    /// Handle a truck arriving at the traffic light of a one-lane road.
    fn approach_light<D: Dispatcher + ?Sized>(
        &mut self,
        tr: &Transition,
        dispatcher: &mut D,
    ) -> Result<(), SimError> {
        let tid = tr.truck;
        let t = tid.index();
        let (road, dir) = self.current_leg_road(tid)?;
        let (travel, stop) = match tr.to {
            TruckState::ApproachLightToShovel => {
                (TruckState::TravelToShovel, TruckState::StopAtLightToShovel)
            }
            _ => (TruckState::TravelToCrusher, TruckState::StopAtLightToCrusher),
        };
        let light = self.roads[road.index()]
            .light
            .as_mut()
            .ok_or(SimError::IllegalLight(road))?;
        match light.state.signal(dir) {
            Signal::Green => {
                self.push_instant(tid, tr.to, travel, t as u64);
            }
            Signal::Yellow | Signal::Red => {
                light.queues[dir.idx()].push_back(tid);
                // demand on a red side turns the opposite green yellow
                let prepared = (light.state.green_side() == Some(dir.flip())).then(|| {
                    light.state = light.state.prepare_flip();
                    light.state
                });
                self.push_instant(tid, tr.to, stop, t as u64);
                if let Some(state) = prepared {
                    dispatcher.record_light(&*self, road, state);
                }
                self.try_flip(road, dispatcher)?;
            }
        }
        Ok(())
    }

    /// Flip a prepared (yellow) light once the road is empty in both
    /// directions, release the newly green queue, and prepare the next flip
    /// if the new red side already has demand.
    fn try_flip<D: Dispatcher + ?Sized>(
        &mut self,
        road: RoadId,
        dispatcher: &mut D,
    ) -> Result<(), SimError> {
        let state = &self.roads[road.index()];
        let light = state.light.as_ref().ok_or(SimError::IllegalLight(road))?;
        let yellow = match light.state.yellow_side() {
            Some(side) => side,
            None => return Ok(()),
        };
        if !state.queues[0].is_empty() || !state.queues[1].is_empty() {
            return Ok(());
        }

        let green = yellow.flip();
        let flipped = light.state.flip();
        self.roads[road.index()].light.as_mut().unwrap().state = flipped;
        dispatcher.record_light(&*self, road, flipped);

        // release every truck held on the newly green side, in FIFO order
        let held: Vec<TruckId> = self.roads[road.index()].light.as_ref().unwrap().queues
            [green.idx()]
        .iter()
        .copied()
        .collect();
        for truck in held {
            let (stop, travel) = match self.trucks[truck.index()].state {
                TruckState::StopAtLightToShovel => {
                    (TruckState::StopAtLightToShovel, TruckState::TravelToShovel)
                }
                TruckState::StopAtLightToCrusher => {
                    (TruckState::StopAtLightToCrusher, TruckState::TravelToCrusher)
                }
                found => {
                    return Err(SimError::StateMismatch {
                        truck,
                        expected: TruckState::StopAtLightToShovel,
                        found,
                    })
                }
            };
            let sub = self.roads[road.index()].counter[green.idx()];
            self.roads[road.index()].counter[green.idx()] += 1;
            self.push_instant(truck, stop, travel, sub);
        }

        // demand on the new red side prepares the next flip right away
        let light = self.roads[road.index()].light.as_mut().unwrap();
        if light.has_demand(green.flip()) {
            let prepared = light.state.prepare_flip();
            light.state = prepared;
            dispatcher.record_light(&*self, road, prepared);
        }
        Ok(())
    }

    /// Release a service after its truck finished, and hand it to the queue
    /// head if one is waiting. `crusher` selects which service array.
    fn release_service(
        &mut self,
        tid: TruckId,
        index: usize,
        crusher: bool,
    ) -> Result<(), SimError> {
        let svc = if crusher {
            &mut self.crushers[index]
        } else {
            &mut self.shovels[index]
        };
        if svc.busy != Some(tid) {
            return Err(SimError::ServiceQueueMismatch {
                truck: tid,
                head: svc.busy,
            });
        }
        svc.busy = None;
        if let Some(&head) = svc.queue.front() {
            svc.busy = Some(head);
            let (from, to) = if crusher {
                (TruckState::WaitAtCrusher, TruckState::Emptying)
            } else {
                (TruckState::WaitAtShovel, TruckState::Filling)
            };
            self.push_instant(head, from, to, head.index() as u64);
        }
        Ok(())
    }
}

/// The state a truck reaches after traversing the road at `point` on the
/// given leg of `route`.
pub(crate) fn state_after_road(
    net: &MineNetwork,
    route: &crate::network::Route,
    leg: Leg,
    point: usize,
) -> TruckState {
    let next = point + 1;
    if next == route.len() {
        match leg {
            Leg::Empty => TruckState::ApproachShovel,
            Leg::Loaded => TruckState::ApproachCrusher,
        }
    } else {
        let (next_road, _) = route.leg_road(leg, next);
        match (net.road(next_road).kind, leg) {
            (LaneKind::OneLane, Leg::Empty) => TruckState::ApproachLightToShovel,
            (LaneKind::OneLane, Leg::Loaded) => TruckState::ApproachLightToCrusher,
            (LaneKind::TwoLane, Leg::Empty) => TruckState::TravelToShovel,
            (LaneKind::TwoLane, Leg::Loaded) => TruckState::TravelToCrusher,
        }
    }
}

/// Distribute trucks over crushers round-robin (the default initial
/// placement).
pub fn round_robin_assignment(num_trucks: usize, num_crushers: usize) -> Vec<CrusherId> {
    (0..num_trucks).map(|t| CrusherId(t % num_crushers)).collect()
}

/// Reproducibly derive a fresh RNG for an evaluation run.
pub fn derived_rng(seed: Option<u64>, index: u64) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s.wrapping_mul(0x9e37_79b9_7f4a_7c15).wrapping_add(index)),
        None => StdRng::from_entropy(),
    }
}
