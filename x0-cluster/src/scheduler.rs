use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// A snapshot of a member's scheduling-relevant state, cheap to copy out of
/// the member table under the cluster worker's exclusive access (spec §5
/// "Cluster controller state ... is owned by the cluster and mutated only
/// on the worker selected as its owner").
#[derive(Debug, Clone, Copy)]
pub struct MemberSnapshot {
    pub index: usize,
    pub capacity: u32,
    pub in_flight: u32,
    pub enabled: bool,
    pub online: bool,
}

impl MemberSnapshot {
    fn has_spare_capacity(&self) -> bool {
        self.enabled && self.online && self.in_flight < self.capacity
    }

    fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.in_flight)
    }
}

/// Result of a scheduling attempt (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Success(usize),
    Overloaded,
    Unavailable,
}

fn outcome_without_spare_capacity(members: &[MemberSnapshot]) -> ScheduleOutcome {
    if members.iter().any(|m| m.enabled && m.online) {
        ScheduleOutcome::Overloaded
    } else {
        ScheduleOutcome::Unavailable
    }
}

/// A cluster's member-selection strategy (spec component L / §4.8).
pub trait Scheduler: Send + Sync {
    fn schedule(&self, members: &[MemberSnapshot]) -> ScheduleOutcome;
}

/// Rotates a cursor over enabled members in order (spec §4.8).
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for RoundRobin {
    fn schedule(&self, members: &[MemberSnapshot]) -> ScheduleOutcome {
        if members.is_empty() {
            return ScheduleOutcome::Unavailable;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % members.len();
        for offset in 0..members.len() {
            let member = &members[(start + offset) % members.len()];
            if member.has_spare_capacity() {
                return ScheduleOutcome::Success(member.index);
            }
        }
        outcome_without_spare_capacity(members)
    }
}

/// Weights members by remaining capacity and draws uniformly (spec §4.8).
#[derive(Debug, Default)]
pub struct Chance;

impl Chance {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for Chance {
    fn schedule(&self, members: &[MemberSnapshot]) -> ScheduleOutcome {
        let candidates: Vec<&MemberSnapshot> = members.iter().filter(|m| m.has_spare_capacity()).collect();
        if candidates.is_empty() {
            return outcome_without_spare_capacity(members);
        }
        let total_weight: u32 = candidates.iter().map(|m| m.remaining()).sum();
        if total_weight == 0 {
            return ScheduleOutcome::Overloaded;
        }
        let mut draw = rand::thread_rng().gen_range(0..total_weight);
        for member in &candidates {
            let weight = member.remaining();
            if draw < weight {
                return ScheduleOutcome::Success(member.index);
            }
            draw -= weight;
        }
        ScheduleOutcome::Success(candidates[candidates.len() - 1].index)
    }
}

/// Builds a [`Scheduler`] by its configured name (spec §4.11 "scheduler
/// name" in `[director]`).
pub fn by_name(name: &str) -> Option<Box<dyn Scheduler>> {
    match name {
        "round-robin" | "round_robin" => Some(Box::new(RoundRobin::new())),
        "chance" => Some(Box::new(Chance::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(index: usize, capacity: u32, in_flight: u32, enabled: bool, online: bool) -> MemberSnapshot {
        MemberSnapshot { index, capacity, in_flight, enabled, online }
    }

    #[test]
    fn round_robin_picks_the_first_member_with_spare_capacity() {
        let scheduler = RoundRobin::new();
        let members = vec![member(0, 1, 1, true, true), member(1, 1, 0, true, true)];
        assert_eq!(scheduler.schedule(&members), ScheduleOutcome::Success(1));
    }

    #[test]
    fn round_robin_is_overloaded_when_all_online_members_are_full() {
        let scheduler = RoundRobin::new();
        let members = vec![member(0, 1, 1, true, true), member(1, 1, 1, true, true)];
        assert_eq!(scheduler.schedule(&members), ScheduleOutcome::Overloaded);
    }

    #[test]
    fn round_robin_is_unavailable_when_no_member_is_online() {
        let scheduler = RoundRobin::new();
        let members = vec![member(0, 1, 0, true, false)];
        assert_eq!(scheduler.schedule(&members), ScheduleOutcome::Unavailable);
    }

    #[test]
    fn chance_never_picks_a_full_or_disabled_member() {
        let scheduler = Chance::new();
        let members = vec![member(0, 1, 1, true, true), member(1, 5, 1, true, true), member(2, 5, 0, false, true)];
        for _ in 0..50 {
            assert_eq!(scheduler.schedule(&members), ScheduleOutcome::Success(1));
        }
    }

    #[test]
    fn unknown_scheduler_name_is_rejected() {
        assert!(by_name("least-connections").is_none());
    }
}
