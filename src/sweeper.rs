//! Background task that ends exams whose deadline has passed.
//!
//! Works in two phases so the registry lock is never held across store I/O:
//! a read-locked scan collects expired rooms, then each room is re-checked
//! and moved to ENDED under a short write lock, and the auto-submits happen
//! after the lock is released.

use crate::metrics::Metrics;
use crate::protocol::Event;
use crate::state::AppState;
use crate::types::*;
use std::sync::Arc;

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rooms_ended: usize,
    pub results_inserted: usize,
    pub failures: usize,
}

/// Spawn the deadline sweeper. It runs every `sweep_interval` whether or not
/// anyone is connected.
pub fn spawn_deadline_sweeper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let period = state.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!("Deadline sweeper running every {:?}", period);

        loop {
            ticker.tick().await;
            let report = sweep_once(&state, state.now()).await;
            if report.rooms_ended > 0 || report.failures > 0 {
                tracing::info!(
                    "Sweep ended {} room(s), {} auto-submit(s), {} failure(s)",
                    report.rooms_ended,
                    report.results_inserted,
                    report.failures
                );
            }
        }
    })
}

/// End every STARTED room whose deadline is at or before `now`
pub async fn sweep_once(state: &AppState, now: Timestamp) -> SweepReport {
    Metrics::incr(&state.metrics.sweeps);
    let mut report = SweepReport::default();

    // Phase 1: snapshot
    let expired: Vec<RoomId> = {
        let registry = state.registry.read().await;
        registry
            .rooms
            .values()
            .filter(|room| room.record.status == RoomStatus::Started && room.record.is_expired(now))
            .map(|room| room.record.id.clone())
            .collect()
    };

    // Phase 2: per room, transition under a short lock then act outside it
    for room_id in expired {
        let claimed = {
            let mut registry = state.registry.write().await;
            match registry.rooms.get_mut(&room_id) {
                // A host close or delete may have beaten us here
                Some(room)
                    if room.record.status == RoomStatus::Started
                        && room.record.is_expired(now) =>
                {
                    room.record.status = RoomStatus::Ended;
                    room.waiting.clear();
                    let pending: Vec<Participant> = room
                        .participants
                        .values()
                        .filter(|p| !p.has_taken_exam)
                        .cloned()
                        .collect();
                    Some((room.record.clone(), pending, room.participant_ids()))
                }
                _ => None,
            }
        };
        let Some((record, pending, participants)) = claimed else {
            tracing::debug!("Room {} no longer needs sweeping", room_id);
            continue;
        };

        report.rooms_ended += 1;
        Metrics::incr(&state.metrics.rooms_expired);
        tracing::info!(
            "Room {} reached its deadline, auto-submitting {} participant(s)",
            room_id,
            pending.len()
        );

        if let Err(e) = state.store.upsert_room(&record).await {
            report.failures += 1;
            Metrics::incr(&state.metrics.sweeper_failures);
            tracing::error!("Failed to persist end of room {}: {}", room_id, e);
        }

        let submitted = state.auto_submit_pending(&record, &pending, now).await;
        report.results_inserted += submitted.inserted;
        report.failures += submitted.failed;

        state
            .broadcaster
            .push(
                &participants,
                &Event::RoomEnded {
                    room_id: room_id.clone(),
                },
            )
            .await;
    }

    report
}
