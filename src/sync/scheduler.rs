use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::Config;
use crate::network::discovery::PeerTable;
use crate::protocol::codec::encode_sync_beacon;
use crate::protocol::{LocalNodeState, NodeContext};
use crate::time::util;
use super::stats::StatsSnapshot;

/// How this node currently relates to cluster timing
///
/// There is no anchor election: a node is `Anchor` while its own sync beacon
/// is the most recent one it knows of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncRole {
    AwaitingSync,
    Anchor,
}

/// What one scheduler tick did
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub sent_sync: bool,
    pub report: Option<StatsSnapshot>,
    /// Delay before the next tick
    pub delay: Duration,
}

/// Periodic driver for sync beacons and statistics
#[derive(Debug)]
pub struct SyncScheduler {
    sync_interval_tu: u16,
    sync_guard: Duration,
    tick_interval: Duration,
    min_delay: Duration,
    drift_fallback: Duration,
    stats_interval: Duration,
    started_at: Duration,
    last_report: Duration,
    role: SyncRole,
}

impl SyncScheduler {
    pub fn new(config: &Config, started_at: Duration) -> Self {
        SyncScheduler {
            sync_interval_tu: config.sync_interval_tu,
            sync_guard: config.sync_guard,
            tick_interval: config.tick_interval,
            min_delay: config.min_delay,
            drift_fallback: config.drift_fallback,
            stats_interval: config.stats_interval,
            started_at,
            last_report: started_at,
            role: SyncRole::AwaitingSync,
        }
    }

    pub fn role(&self) -> SyncRole {
        self.role
    }

    /// Runs one tick
    ///
    /// A failed sync transmit leaves `last_sent_sync` untouched, so the next
    /// tick tries again.
    pub fn tick(&mut self, ctx: &mut NodeContext<'_>) -> TickOutcome {
        let now = ctx.now();

        let mut sent_sync = false;
        if util::elapsed(now, ctx.node.last_sent_sync) > self.sync_guard {
            sent_sync = self.send_sync_beacon(ctx, now);
        }
        self.update_role(ctx.node);

        let mut report = None;
        if util::elapsed(now, self.last_report) >= self.stats_interval {
            let snapshot = self.snapshot(ctx.node, ctx.peers, now);
            log_report(&snapshot, util::elapsed(now, self.last_report));
            ctx.node.counters.captured_bytes = 0;
            self.last_report = now;
            report = Some(snapshot);
        }

        let next_wakeup = now + self.tick_interval;
        let delay = self.next_delay(next_wakeup, ctx.now());

        TickOutcome {
            sent_sync,
            report,
            delay,
        }
    }

    /// Delay until `next_wakeup`, or the drift fallback if that is too close
    pub fn next_delay(&self, next_wakeup: Duration, scheduled_at: Duration) -> Duration {
        let delay = next_wakeup.saturating_sub(scheduled_at);
        if delay < self.min_delay {
            debug!(
                late_us = util::as_micros(scheduled_at.saturating_sub(next_wakeup)),
                "Tick ran late, falling back to drift delay"
            );
            self.drift_fallback
        } else {
            delay
        }
    }

    pub fn snapshot(
        &self,
        node: &LocalNodeState,
        peers: &PeerTable,
        now: Duration,
    ) -> StatsSnapshot {
        StatsSnapshot {
            reported_at: Utc::now(),
            uptime: util::elapsed(now, self.started_at),
            mac: node.mac,
            network_id: node.network_id,
            role: self.role,
            counters: node.counters.clone(),
            peer_count: peers.len(),
            peer_evictions: peers.evictions(),
            tx_latency: node.tx_latency,
            max_post_sync: node.max_post_sync,
        }
    }

    fn send_sync_beacon(&self, ctx: &mut NodeContext<'_>, now: Duration) -> bool {
        let frame = match encode_sync_beacon(ctx.node, self.sync_interval_tu) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Sync beacon not built: {}", e);
                return false;
            }
        };
        if ctx.transmit(&frame, "sync beacon").is_err() {
            return false;
        }
        ctx.node.last_sent_sync = now;
        ctx.node.counters.sync_beacons_sent += 1;
        debug!(network = %ctx.node.network_id, "Sync beacon sent");
        true
    }

    fn update_role(&mut self, node: &LocalNodeState) {
        let role = if node.counters.sync_beacons_sent > 0
            && node.last_sent_sync >= node.last_received_sync
        {
            SyncRole::Anchor
        } else {
            SyncRole::AwaitingSync
        };
        if role != self.role {
            info!(from = ?self.role, to = ?role, "Sync role changed");
            self.role = role;
        }
    }
}

fn log_report(snapshot: &StatsSnapshot, window: Duration) {
    let c = &snapshot.counters;
    info!(
        mac = %snapshot.mac,
        network = %snapshot.network_id,
        role = ?snapshot.role,
        peers = snapshot.peer_count,
        sync_sent = c.sync_beacons_sent,
        sync_rx = c.sync_beacons_received,
        discovery_rx = c.discovery_beacons_received,
        nan = c.nan_packets,
        msg_in = c.messages_in,
        msg_out = c.messages_out,
        foreign = c.foreign_packets,
        malformed = c.malformed_frames,
        tx_fail = c.transmit_failures,
        packets = c.captured_packets,
        bytes_per_sec = snapshot.capture_rate(window) as u64,
        tx_mean_us = util::as_micros(snapshot.tx_latency.mean()),
        tx_max_us = util::as_micros(snapshot.tx_latency.max),
        "Statistics"
    );
}
