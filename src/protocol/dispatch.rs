//! Receive path state machine
//!
//! Every captured frame goes through [`Dispatcher::handle_frame`]: it is
//! filtered on the rendezvous BSSID, classified by type byte, and then drives
//! the peer table, the local cluster id and any replies. Nothing in here
//! fails outward; decode problems end up in counters and logs.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::core::{Config, Error, InstanceId, MacAddr};
use crate::network::radio::{Delivery, RxMetadata};
use crate::time::util;
use crate::util::hex_dump;
use super::attribute::AttributeId;
use super::codec::{encode_discovery_action, encode_service_message, ServiceType};
use super::frame::{FrameHeader, FrameKind};
use super::message::{
    parse_action, parse_beacon, BeaconKind, ServiceControl, ServiceDescriptor,
};
use super::state::NodeContext;
use super::{PING_MARKER, PONG_MARKER, PUBLISH_PROBE, SERVICE_ID};

/// Why a frame was not processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    /// BSSID is not the rendezvous one
    ForeignBssid,
    /// Frame we transmitted ourselves
    OwnFrame,
    UnknownType(u8),
    UnrecognizedProtocol,
}

/// What the dispatcher did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Beacon(BeaconKind),
    Action {
        /// Service descriptors acted upon
        descriptors: usize,
        /// Attribute decoding stopped at a malformed entry
        truncated: bool,
    },
    Dropped(DropReason),
}

/// Handles received frames against a [`NodeContext`]
#[derive(Debug, Clone)]
pub struct Dispatcher {
    strict_service_id: bool,
    subscribe_holdoff: Duration,
    service_info: Bytes,
    interface_id: u32,
}

impl Dispatcher {
    pub fn from_config(config: &Config) -> Self {
        Dispatcher {
            strict_service_id: config.strict_service_id,
            subscribe_holdoff: config.subscribe_holdoff,
            service_info: Bytes::from(config.service_info.clone()),
            interface_id: config.interface_id,
        }
    }

    pub fn handle_frame(
        &self,
        ctx: &mut NodeContext<'_>,
        raw: &[u8],
        meta: &RxMetadata,
    ) -> Disposition {
        ctx.node.counters.captured_packets += 1;
        ctx.node.counters.captured_bytes += raw.len() as u64;

        let frame = &raw[..raw.len().saturating_sub(meta.fcs_len as usize)];
        let header = match FrameHeader::parse(frame) {
            Ok(header) => header,
            Err(e) => return self.reject(ctx, frame, e),
        };
        if !header.has_rendezvous_bssid() {
            return Disposition::Dropped(DropReason::ForeignBssid);
        }
        if header.source() == ctx.node.mac {
            return Disposition::Dropped(DropReason::OwnFrame);
        }
        if ctx.node.dump {
            debug!(
                "IN from={} rssi={} ch={} len={}\n{}",
                header.source(),
                meta.rssi,
                meta.channel,
                frame.len(),
                hex_dump(frame)
            );
        }

        match header.kind() {
            FrameKind::Beacon => self.handle_beacon(ctx, frame),
            FrameKind::Action => self.handle_action(ctx, frame),
            FrameKind::Other(byte) => {
                debug!(kind = byte, from = %header.source(), "Ignoring management frame");
                Disposition::Dropped(DropReason::UnknownType(byte))
            }
        }
    }

    fn handle_beacon(&self, ctx: &mut NodeContext<'_>, frame: &[u8]) -> Disposition {
        let beacon = match parse_beacon(frame) {
            Ok(beacon) => beacon,
            Err(e) => return self.reject(ctx, frame, e),
        };
        let now = ctx.now();
        if beacon.attributes_truncated {
            ctx.node.counters.malformed_frames += 1;
            debug!(from = %beacon.source, "Beacon attributes truncated");
        }

        ctx.node.adopt_network_id(beacon.network_id);
        let peer = ctx.peers.lookup_or_create(beacon.source, now);
        peer.record_beacon(beacon.kind, beacon.network_id, now);
        if beacon.cluster.is_some() {
            peer.announced_anchor = beacon.cluster;
        }

        match beacon.kind {
            BeaconKind::Sync => {
                let remote = peer.instance_id;
                let queued = peer.dequeue_next();
                ctx.node.counters.sync_beacons_received += 1;
                ctx.node.last_received_sync = now;

                // A sync beacon opens the peer's transmit opportunity.
                self.send_discovery(ctx, ServiceType::Publish, remote);
                if let Some(message) = queued {
                    let waited = now.saturating_sub(message.queued_at);
                    let source = beacon.source;
                    if self.send_message(ctx, source, remote, &message.payload, "queued message") {
                        debug!(
                            peer = %source,
                            waited_ms = waited.as_millis() as u64,
                            "Queued message sent"
                        );
                    } else {
                        warn!(peer = %source, len = message.payload.len(), "Queued message lost");
                    }
                }
            }
            BeaconKind::Discovery => {
                ctx.node.counters.discovery_beacons_received += 1;
                ctx.node.last_received_discovery = now;
            }
        }
        Disposition::Beacon(beacon.kind)
    }

    fn handle_action(&self, ctx: &mut NodeContext<'_>, frame: &[u8]) -> Disposition {
        let action = match parse_action(frame) {
            Ok(action) => action,
            Err(e) => return self.reject(ctx, frame, e),
        };
        let now = ctx.now();
        let source = action.header.source();
        let destination = action.header.destination();
        let network_id = action.header.network_id();

        ctx.node.counters.nan_packets += 1;
        ctx.node.adopt_network_id(network_id);
        ctx.peers.lookup_or_create(source, now).record_action(network_id, now);

        let mut descriptors = 0;
        let mut truncated = false;
        for item in action.attributes() {
            let tlv = match item {
                Ok(tlv) => tlv,
                Err(e) => {
                    truncated = true;
                    self.count_malformed(ctx, frame, &e);
                    break;
                }
            };
            if tlv.id() != AttributeId::ServiceDescriptor {
                debug!(tag = tlv.tag, len = tlv.value.len(), "Skipping attribute");
                continue;
            }
            match ServiceDescriptor::parse(tlv.value) {
                Ok(descriptor) => {
                    if self.handle_descriptor(ctx, source, destination, &descriptor, now) {
                        descriptors += 1;
                    }
                }
                Err(e) => {
                    truncated = true;
                    self.count_malformed(ctx, frame, &e);
                    break;
                }
            }
        }
        Disposition::Action {
            descriptors,
            truncated,
        }
    }

    /// Returns false if the descriptor was ignored
    fn handle_descriptor(
        &self,
        ctx: &mut NodeContext<'_>,
        source: MacAddr,
        destination: MacAddr,
        descriptor: &ServiceDescriptor<'_>,
        now: Duration,
    ) -> bool {
        if self.strict_service_id && descriptor.service_id != SERVICE_ID {
            ctx.node.counters.unrecognized_frames += 1;
            debug!(from = %source, "Service descriptor for a foreign service");
            return false;
        }
        let remote = descriptor.instance_id;
        ctx.peers
            .lookup_or_create(source, now)
            .record_service_descriptor(remote, now);

        match descriptor.control {
            ServiceControl::Subscribe => {
                ctx.node.counters.subscribes_received += 1;
                self.send_discovery(ctx, ServiceType::Publish, remote);
            }
            ServiceControl::Publish => {
                ctx.node.counters.publishes_received += 1;
                self.send_message(ctx, source, remote, PUBLISH_PROBE, "publish probe");
                // Every subscribe draws another publish from the peer.
                let due = ctx
                    .peers
                    .get(&source)
                    .map_or(true, |peer| peer.subscribe_due(now, self.subscribe_holdoff));
                if !due {
                    debug!(peer = %source, "Subscribe held off");
                } else if self.send_discovery(ctx, ServiceType::Subscribe, remote) {
                    if let Some(peer) = ctx.peers.get_mut(&source) {
                        peer.record_subscribe(now);
                    }
                }
            }
            ServiceControl::FollowUp | ServiceControl::Other(_) => {
                self.handle_follow_up(ctx, source, destination, descriptor);
            }
        }
        true
    }

    fn handle_follow_up(
        &self,
        ctx: &mut NodeContext<'_>,
        source: MacAddr,
        destination: MacAddr,
        descriptor: &ServiceDescriptor<'_>,
    ) {
        let info = descriptor.service_info;
        ctx.node.counters.messages_in += 1;
        if let Some(peer) = ctx.peers.get_mut(&source) {
            peer.messages_in += 1;
        }
        // Promiscuous capture: traffic between other nodes is still handled.
        if destination != ctx.node.mac {
            ctx.node.counters.foreign_packets += 1;
        }
        debug!(
            from = %source,
            to = %destination,
            len = info.len(),
            since_sync_us = util::as_micros(util::elapsed(ctx.now(), ctx.node.last_received_sync)),
            "Message in"
        );

        if let Some(rest) = info.strip_prefix(PING_MARKER.as_slice()) {
            let mut reply = Vec::with_capacity(info.len());
            reply.extend_from_slice(PONG_MARKER);
            reply.extend_from_slice(rest);
            self.send_message(ctx, source, descriptor.instance_id, &reply, "pong");
            return;
        }

        ctx.sink.deliver(Delivery {
            from: source,
            to: destination,
            interface_id: self.interface_id,
            payload: Bytes::copy_from_slice(info),
        });
    }

    fn send_discovery(
        &self,
        ctx: &mut NodeContext<'_>,
        service_type: ServiceType,
        remote: InstanceId,
    ) -> bool {
        let label = match service_type {
            ServiceType::Publish => "publish",
            ServiceType::Subscribe => "subscribe",
        };
        match encode_discovery_action(ctx.node, service_type, remote, &self.service_info) {
            Ok(frame) => ctx.transmit(&frame, label).is_ok(),
            Err(e) => {
                warn!("Failed to build {}: {}", label, e);
                false
            }
        }
    }

    fn send_message(
        &self,
        ctx: &mut NodeContext<'_>,
        destination: MacAddr,
        remote: InstanceId,
        payload: &[u8],
        label: &'static str,
    ) -> bool {
        let frame = match encode_service_message(ctx.node, destination, remote, payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to build {}: {}", label, e);
                return false;
            }
        };
        if ctx.transmit(&frame, label).is_err() {
            return false;
        }
        ctx.node.counters.messages_out += 1;
        if let Some(peer) = ctx.peers.get_mut(&destination) {
            peer.messages_out += 1;
        }
        true
    }

    fn reject(&self, ctx: &mut NodeContext<'_>, frame: &[u8], error: Error) -> Disposition {
        if let Error::UnrecognizedProtocol(ref msg) = error {
            ctx.node.counters.unrecognized_frames += 1;
            debug!("Ignoring frame: {}", msg);
            return Disposition::Dropped(DropReason::UnrecognizedProtocol);
        }
        self.count_malformed(ctx, frame, &error);
        Disposition::Dropped(DropReason::Malformed)
    }

    fn count_malformed(&self, ctx: &mut NodeContext<'_>, frame: &[u8], error: &Error) {
        ctx.node.counters.malformed_frames += 1;
        warn!(len = frame.len(), "Dropping frame: {}", error);
        if ctx.node.dump {
            debug!("MALFORMED\n{}", hex_dump(frame));
        }
    }
}
