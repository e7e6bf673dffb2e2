// Live client snapshots, one slot per client container. Written by each client's
// stdout parser, read (and in accumulate mode zeroed) by the dumper.

use crate::error::BenchError;
use crate::models::{AggregateSnapshot, ClientReport, ClientSnapshot, MergePolicy};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

#[derive(Debug, Default)]
struct Slot {
    /// None until the client's first valid report.
    snapshot: Option<ClientSnapshot>,
    active: bool,
}

pub struct SnapshotBoard {
    policy: MergePolicy,
    slots: Mutex<Vec<Slot>>,
}

impl SnapshotBoard {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Adds an empty slot for a client about to start.
    pub fn register(&self) -> SlotId {
        let mut slots = self.lock();
        slots.push(Slot {
            snapshot: None,
            active: true,
        });
        SlotId(slots.len() - 1)
    }

    /// Registers a slot whose lifetime is tied to the returned lease.
    pub fn lease(self: &Arc<Self>) -> SlotLease {
        SlotLease {
            slot: self.register(),
            board: self.clone(),
        }
    }

    /// Parses one stdout line and folds it into the slot. On error the slot is untouched.
    pub fn apply_line(&self, slot: SlotId, line: &str) -> Result<ClientSnapshot, BenchError> {
        let report = ClientReport::parse(line)?;
        let mut slots = self.lock();
        let entry = slots
            .get_mut(slot.0)
            .ok_or_else(|| BenchError::Runtime(format!("unknown snapshot slot {}", slot.0)))?;
        let snapshot = entry.snapshot.get_or_insert_with(ClientSnapshot::default);
        self.policy.merge(snapshot, report);
        Ok(*snapshot)
    }

    /// Drops a client from the active set; rows already written are unaffected.
    pub fn release(&self, slot: SlotId) {
        if let Some(entry) = self.lock().get_mut(slot.0) {
            entry.active = false;
        }
    }

    pub fn snapshot(&self, slot: SlotId) -> Option<ClientSnapshot> {
        self.lock().get(slot.0).and_then(|s| s.snapshot)
    }

    /// Number of active client slots, reporting or not.
    pub fn tracked(&self) -> usize {
        self.lock().iter().filter(|s| s.active).count()
    }

    /// Sums every active slot that has reported. Zeroes loop accumulators afterwards
    /// when the merge policy is rate-style.
    pub fn collect(&self, server_memory_bytes: u64) -> AggregateSnapshot {
        let reset = self.policy.resets_after_dump();
        let mut agg = AggregateSnapshot {
            server_memory_bytes,
            ..Default::default()
        };
        for slot in self.lock().iter_mut().filter(|s| s.active) {
            if let Some(snapshot) = slot.snapshot.as_mut() {
                agg.add(snapshot);
                if reset {
                    snapshot.reset_loop();
                }
            }
        }
        agg
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A registered slot that leaves the active set when dropped. Held by the client's
/// stdout sink, so it goes away together with the log subscription.
pub struct SlotLease {
    board: Arc<SnapshotBoard>,
    slot: SlotId,
}

impl SlotLease {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn apply_line(&self, line: &str) -> Result<ClientSnapshot, BenchError> {
        self.board.apply_line(self.slot, line)
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.board.release(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeanLoopDelay;

    const LINE_A: &str =
        r#"{"roomsCreated":1,"clientsConnected":16,"loopAvgSum":20,"loopAvgCount":2}"#;
    const LINE_B: &str =
        r#"{"roomsCreated":2,"clientsConnected":24,"loopAvgSum":30,"loopAvgCount":3}"#;

    #[test]
    fn malformed_line_leaves_snapshot_and_later_lines_still_apply() {
        let board = SnapshotBoard::new(MergePolicy::Accumulate);
        let slot = board.register();
        board.apply_line(slot, LINE_A).unwrap();
        let before = board.snapshot(slot);

        assert!(board.apply_line(slot, "not json at all").is_err());
        assert!(board.apply_line(slot, r#"{"roomsCreated":9}"#).is_err());
        assert_eq!(board.snapshot(slot), before);

        let after = board.apply_line(slot, LINE_B).unwrap();
        assert_eq!(after.rooms_created, 2);
        assert_eq!(after.loop_avg_count, 5);
    }

    #[test]
    fn silent_slot_is_tracked_but_excluded_from_sums() {
        let board = SnapshotBoard::new(MergePolicy::Replace);
        let a = board.register();
        let _silent = board.register();
        board.apply_line(a, LINE_A).unwrap();

        assert_eq!(board.tracked(), 2);
        let agg = board.collect(1024);
        assert_eq!(agg.clients_connected, 16);
        assert_eq!(agg.server_memory_bytes, 1024);
        assert_eq!(agg.mean_loop_delay(), MeanLoopDelay::Mean(10.0));
    }

    #[test]
    fn accumulate_collect_zeroes_loop_sums() {
        let board = SnapshotBoard::new(MergePolicy::Accumulate);
        let slot = board.register();
        board.apply_line(slot, LINE_A).unwrap();

        let first = board.collect(0);
        assert_eq!(first.loop_avg_count, 2);
        let second = board.collect(0);
        assert_eq!(second.clients_connected, 16);
        assert_eq!(second.loop_avg_count, 0);
        assert_eq!(second.mean_loop_delay(), MeanLoopDelay::NoSamples);
    }

    #[test]
    fn replace_collect_keeps_point_in_time_values() {
        let board = SnapshotBoard::new(MergePolicy::Replace);
        let slot = board.register();
        board.apply_line(slot, LINE_B).unwrap();

        assert_eq!(board.collect(0).loop_avg_count, 3);
        assert_eq!(board.collect(0).loop_avg_count, 3);
    }

    #[test]
    fn released_slot_drops_out_of_aggregate() {
        let board = SnapshotBoard::new(MergePolicy::Replace);
        let a = board.register();
        let b = board.register();
        board.apply_line(a, LINE_A).unwrap();
        board.apply_line(b, LINE_B).unwrap();
        board.release(a);

        assert_eq!(board.tracked(), 1);
        assert_eq!(board.collect(0).clients_connected, 24);
    }

    #[test]
    fn dropping_lease_releases_slot() {
        let board = Arc::new(SnapshotBoard::new(MergePolicy::Accumulate));
        let lease = board.lease();
        lease.apply_line(LINE_A).unwrap();
        assert_eq!(board.tracked(), 1);
        assert_eq!(board.snapshot(lease.slot()).unwrap().clients_connected, 16);

        drop(lease);
        assert_eq!(board.tracked(), 0);
        assert_eq!(board.collect(0).clients_connected, 0);
    }
}
