//! The forwarding table: the per-destination state machine.
//!
//! Each destination is tracked as a tagged [`RouteState`] rather than a pair
//! of optional timestamps, so "exactly one of timeout/garbage is set" holds
//! by construction instead of by convention.

use std::collections::HashMap;
use std::time::Instant;

use crate::config::Neighbor;

/// Reserved metric value meaning "unreachable".
pub const INFINITY: u32 = 16;

/// Whether a destination is actively refreshed or counting down to removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Live { since: Instant },
    Garbage { since: Instant },
}

/// A single destination's routing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub next_hop: u16,
    pub metric: u32,
    pub state: RouteState,
}

impl RouteEntry {
    pub fn is_live(&self) -> bool {
        matches!(self.state, RouteState::Live { .. })
    }
}

/// The effect an `apply_advertisement` call had on a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No table state changed.
    Unchanged,
    /// A previously-unknown destination became reachable.
    Inserted,
    /// The current next hop re-advertised the same cost; only the timer moved.
    Refreshed,
    /// A cheaper path was adopted (new next hop, or same next hop with a lower cost).
    Improved,
    /// The current next hop re-advertised a higher (but still finite) cost.
    Worsened,
    /// The current next hop declared the destination unreachable; the route entered garbage.
    Poisoned,
}

impl ApplyOutcome {
    /// Whether this outcome should set the scheduler's `triggered_pending` flag.
    pub fn triggers_update(self) -> bool {
        !matches!(self, ApplyOutcome::Unchanged | ApplyOutcome::Refreshed)
    }
}

/// The router's view of reachability: `RouterId -> RouteEntry`.
#[derive(Debug)]
pub struct ForwardingTable {
    router_id: u16,
    neighbors: HashMap<u16, Neighbor>,
    entries: HashMap<u16, RouteEntry>,
}

impl ForwardingTable {
    pub fn new(router_id: u16, neighbors: &[Neighbor]) -> ForwardingTable {
        ForwardingTable {
            router_id,
            neighbors: neighbors.iter().map(|n| (n.id, *n)).collect(),
            entries: HashMap::new(),
        }
    }

    pub fn lookup(&self, dest: u16) -> Option<&RouteEntry> {
        self.entries.get(&dest)
    }

    pub fn is_known_neighbor(&self, id: u16) -> bool {
        self.neighbors.contains_key(&id)
    }

    /// Apply one advertised `(dest_id, metric)` pair received from `sender_id`.
    ///
    /// Silently ignores advertisements naming the local router as the
    /// destination; the caller is responsible for having already verified
    /// `sender_id` is a configured neighbor.
    pub fn apply_advertisement(
        &mut self,
        sender_id: u16,
        dest_id: u16,
        advertised_metric: u32,
        now: Instant,
    ) -> ApplyOutcome {
        if dest_id == self.router_id {
            return ApplyOutcome::Unchanged;
        }
        let Some(&link) = self.neighbors.get(&sender_id) else {
            return ApplyOutcome::Unchanged;
        };
        let cost = (link.link_cost as u32 + advertised_metric).min(INFINITY);

        match self.entries.get(&dest_id).copied() {
            None => {
                if cost >= INFINITY {
                    ApplyOutcome::Unchanged
                } else {
                    self.entries.insert(
                        dest_id,
                        RouteEntry {
                            next_hop: sender_id,
                            metric: cost,
                            state: RouteState::Live { since: now },
                        },
                    );
                    ApplyOutcome::Inserted
                }
            }
            Some(entry) if entry.is_live() && entry.next_hop == sender_id => {
                if cost >= INFINITY {
                    self.entries.insert(
                        dest_id,
                        RouteEntry {
                            next_hop: sender_id,
                            metric: INFINITY,
                            state: RouteState::Garbage { since: now },
                        },
                    );
                    ApplyOutcome::Poisoned
                } else if cost == entry.metric {
                    self.entries.insert(
                        dest_id,
                        RouteEntry {
                            next_hop: sender_id,
                            metric: cost,
                            state: RouteState::Live { since: now },
                        },
                    );
                    ApplyOutcome::Refreshed
                } else {
                    let outcome = if cost < entry.metric {
                        ApplyOutcome::Improved
                    } else {
                        ApplyOutcome::Worsened
                    };
                    self.entries.insert(
                        dest_id,
                        RouteEntry {
                            next_hop: sender_id,
                            metric: cost,
                            state: RouteState::Live { since: now },
                        },
                    );
                    outcome
                }
            }
            Some(entry) if entry.is_live() => {
                // live via a different neighbor: only a strictly lower cost wins
                if cost < entry.metric {
                    self.entries.insert(
                        dest_id,
                        RouteEntry {
                            next_hop: sender_id,
                            metric: cost,
                            state: RouteState::Live { since: now },
                        },
                    );
                    ApplyOutcome::Improved
                } else {
                    ApplyOutcome::Unchanged
                }
            }
            Some(entry) if entry.next_hop == sender_id => {
                // garbage, refreshed by its former next hop
                if cost < INFINITY {
                    self.entries.insert(
                        dest_id,
                        RouteEntry {
                            next_hop: sender_id,
                            metric: cost,
                            state: RouteState::Live { since: now },
                        },
                    );
                    ApplyOutcome::Inserted
                } else {
                    ApplyOutcome::Unchanged
                }
            }
            Some(_) => ApplyOutcome::Unchanged,
        }
    }

    /// Expire live routes past `route_timeout` into garbage, and drop
    /// garbage routes past `garbage_timeout`. Returns whether anything
    /// changed.
    pub fn sweep(&mut self, now: Instant, route_timeout: f64, garbage_timeout: f64) -> bool {
        let mut changed = false;
        let mut to_remove = Vec::new();

        for (&dest, entry) in self.entries.iter_mut() {
            match entry.state {
                RouteState::Live { since } if now.duration_since(since).as_secs_f64() >= route_timeout => {
                    entry.metric = INFINITY;
                    entry.state = RouteState::Garbage { since: now };
                    changed = true;
                }
                RouteState::Garbage { since } if now.duration_since(since).as_secs_f64() >= garbage_timeout => {
                    to_remove.push(dest);
                }
                _ => {}
            }
        }
        for dest in to_remove {
            self.entries.remove(&dest);
            changed = true;
        }
        changed
    }

    /// Build the entry list to advertise to `neighbor_id`: the
    /// self-advertisement first, then every known destination with
    /// split-horizon poisoned reverse applied.
    pub fn snapshot_for(&self, neighbor_id: u16) -> Vec<(u16, u32)> {
        let mut out = Vec::with_capacity(self.entries.len() + 1);
        out.push((self.router_id, 0));
        for (&dest, entry) in &self.entries {
            let metric = if entry.next_hop == neighbor_id {
                INFINITY
            } else {
                entry.metric
            };
            out.push((dest, metric));
        }
        out
    }

    /// Iterate all current destinations, for diagnostics and invariant checks.
    pub fn entries(&self) -> impl Iterator<Item = (u16, &RouteEntry)> {
        self.entries.iter().map(|(&d, e)| (d, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn table() -> ForwardingTable {
        ForwardingTable::new(
            1,
            &[
                Neighbor { id: 2, dest_port: 6002, link_cost: 3 },
                Neighbor { id: 3, dest_port: 7003, link_cost: 5 },
            ],
        )
    }

    #[test]
    fn inserts_a_new_destination() {
        let mut t = table();
        let now = Instant::now();
        let outcome = t.apply_advertisement(2, 9, 0, now);
        assert_eq!(outcome, ApplyOutcome::Inserted);
        let e = t.lookup(9).unwrap();
        assert_eq!(e.next_hop, 2);
        assert_eq!(e.metric, 3);
        assert!(e.is_live());
    }

    #[test]
    fn ignores_advertisement_naming_self() {
        let mut t = table();
        let outcome = t.apply_advertisement(2, 1, 0, Instant::now());
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert!(t.lookup(1).is_none());
    }

    #[test]
    fn saturates_metric_at_infinity() {
        let mut t = table();
        let outcome = t.apply_advertisement(3, 9, 15, Instant::now());
        // cost_to_S (5) + m (15) = 20, saturates to 16 => unreachable, ignored
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert!(t.lookup(9).is_none());
    }

    #[test]
    fn adopts_a_strictly_cheaper_alternate_next_hop() {
        let mut t = table();
        let now = Instant::now();
        t.apply_advertisement(3, 9, 0, now); // via 3: cost 5
        let outcome = t.apply_advertisement(2, 9, 0, now); // via 2: cost 3, cheaper
        assert_eq!(outcome, ApplyOutcome::Improved);
        assert_eq!(t.lookup(9).unwrap().next_hop, 2);
        assert_eq!(t.lookup(9).unwrap().metric, 3);
    }

    #[test]
    fn ignores_equal_or_worse_alternate_next_hop() {
        let mut t = table();
        let now = Instant::now();
        t.apply_advertisement(2, 9, 0, now); // via 2: cost 3
        let outcome = t.apply_advertisement(3, 9, 0, now); // via 3: cost 5, worse
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(t.lookup(9).unwrap().next_hop, 2);
    }

    #[test]
    fn current_next_hop_can_worsen_or_improve_in_place() {
        let mut t = table();
        let now = Instant::now();
        t.apply_advertisement(2, 9, 0, now); // cost 3
        let outcome = t.apply_advertisement(2, 9, 2, now); // cost 5, same next hop
        assert_eq!(outcome, ApplyOutcome::Worsened);
        assert_eq!(t.lookup(9).unwrap().metric, 5);

        let outcome = t.apply_advertisement(2, 9, 0, now); // back down to 3
        assert_eq!(outcome, ApplyOutcome::Improved);
        assert_eq!(t.lookup(9).unwrap().metric, 3);
    }

    #[test]
    fn current_next_hop_poisoning_transitions_to_garbage() {
        let mut t = table();
        let now = Instant::now();
        t.apply_advertisement(2, 9, 0, now);
        let outcome = t.apply_advertisement(2, 9, 16, now);
        assert_eq!(outcome, ApplyOutcome::Poisoned);
        let e = t.lookup(9).unwrap();
        assert_eq!(e.metric, INFINITY);
        assert!(matches!(e.state, RouteState::Garbage { .. }));
    }

    #[test]
    fn garbage_entry_revived_only_by_its_former_next_hop() {
        let mut t = table();
        let now = Instant::now();
        t.apply_advertisement(2, 9, 0, now);
        t.apply_advertisement(2, 9, 16, now); // -> garbage via 2

        // a different neighbor cannot revive it
        let outcome = t.apply_advertisement(3, 9, 0, now);
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert!(!t.lookup(9).unwrap().is_live());

        // the former next hop can
        let outcome = t.apply_advertisement(2, 9, 0, now);
        assert_eq!(outcome, ApplyOutcome::Inserted);
        assert!(t.lookup(9).unwrap().is_live());
    }

    #[test]
    fn sweep_expires_live_routes_into_garbage_then_removes_them() {
        let mut t = table();
        let t0 = Instant::now();
        t.apply_advertisement(2, 9, 0, t0);

        let changed = t.sweep(t0, 20.0, 40.0);
        assert!(!changed);

        let t1 = t0 + Duration::from_secs_f64(21.0);
        let changed = t.sweep(t1, 20.0, 40.0);
        assert!(changed);
        assert!(matches!(t.lookup(9).unwrap().state, RouteState::Garbage { .. }));
        assert_eq!(t.lookup(9).unwrap().metric, INFINITY);

        let t2 = t1 + Duration::from_secs_f64(41.0);
        let changed = t.sweep(t2, 20.0, 40.0);
        assert!(changed);
        assert!(t.lookup(9).is_none());
    }

    #[test]
    fn snapshot_begins_with_self_advertisement_and_poisons_reverse() {
        let mut t = table();
        let now = Instant::now();
        t.apply_advertisement(2, 9, 0, now); // reachable via 2, cost 3

        let to_2 = t.snapshot_for(2);
        assert_eq!(to_2[0], (1, 0));
        assert_eq!(to_2.iter().find(|(d, _)| *d == 9), Some(&(9, INFINITY)));

        let to_3 = t.snapshot_for(3);
        assert_eq!(to_3[0], (1, 0));
        assert_eq!(to_3.iter().find(|(d, _)| *d == 9), Some(&(9, 3)));
    }
}
