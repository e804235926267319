//! The router core: binds the input sockets, runs the single cooperative
//! event loop, and performs the split-horizon/poisoned-reverse broadcasts.
//!
//! The loop itself is a `tokio::select!` over three branches: the next
//! scheduled wake-up, an inbound datagram forwarded by one of the
//! per-socket reader tasks, and `Ctrl+C`. There is no worker pool and no
//! shared mutable state across tasks other than the one `mpsc` channel the
//! reader tasks feed — the table and scheduler live exclusively in the task
//! that owns this loop.

use std::net::SocketAddr;
use std::time::Instant;

use log::{debug, info, trace, warn};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::codec::{self, Command, OutEntry};
use crate::config::Config;
use crate::error::RouterError;
use crate::scheduler::Scheduler;
use crate::table::ForwardingTable;

const RECV_BUF_LEN: usize = 2048;
const MAX_ENTRIES_PER_PACKET: usize = 25;
const RIP_VERSION: u8 = 2;

/// One datagram handed from a reader task to the main loop.
struct Inbound {
    from: SocketAddr,
    data: Vec<u8>,
}

/// Bind one non-blocking UDP socket per configured input port.
async fn bind_inputs(ports: &[u16]) -> Result<Vec<UdpSocket>, RouterError> {
    let mut sockets = Vec::with_capacity(ports.len());
    for &port in ports {
        let socket = UdpSocket::bind(("127.0.0.1", port))
            .await
            .map_err(|source| RouterError::PortInUse { port, source })?;
        sockets.push(socket);
    }
    Ok(sockets)
}

/// Spawn one reader task per input socket, forwarding every datagram it
/// receives to `tx`. Tasks run for the lifetime of the daemon.
fn spawn_readers(sockets: Vec<UdpSocket>, tx: mpsc::UnboundedSender<Inbound>) {
    for socket in sockets {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUF_LEN];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => {
                        if tx.send(Inbound { from, data: buf[..len].to_vec() }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("read error on {:?}: {e}", socket.local_addr());
                    }
                }
            }
        });
    }
}

/// Run the daemon until interrupted. Binds all input sockets up front
/// (fatal on failure), then loops forever: fire any due broadcast, compute
/// how long it's safe to wait, and block on the next datagram/deadline/
/// interrupt.
pub async fn run(config: Config) -> Result<(), RouterError> {
    let sockets = bind_inputs(&config.input_ports).await?;
    info!(
        "router {} listening on {:?}, {} neighbor(s)",
        config.router_id,
        config.input_ports,
        config.outputs.len()
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_readers(sockets, tx);

    let mut table = ForwardingTable::new(config.router_id, &config.outputs);
    let mut rng = rand::thread_rng();
    let mut scheduler = Scheduler::new(Instant::now(), &config.timers, &mut rng);

    loop {
        let now = Instant::now();
        if scheduler.should_fire_periodic(now) {
            table.sweep(now, config.timers.route_timeout, config.timers.garbage_timeout);
            broadcast_all(&config, &table).await;
            scheduler.reschedule_periodic(now, &config.timers, &mut rng);
        } else if scheduler.should_fire_triggered(now) {
            table.sweep(now, config.timers.route_timeout, config.timers.garbage_timeout);
            broadcast_all(&config, &table).await;
            scheduler.reschedule_trigger(now, &config.timers, &mut rng);
        }

        let wait = scheduler.wait_duration(Instant::now());
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            Some(datagram) = rx.recv() => {
                if handle_datagram(&mut table, datagram, Instant::now()) {
                    scheduler.mark_triggered();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Decode and validate one inbound datagram, applying every entry to the
/// table. Returns whether any entry changed the table (and so a triggered
/// update is owed). Malformed or unauthenticated packets are logged and
/// dropped without touching the table.
fn handle_datagram(table: &mut ForwardingTable, datagram: Inbound, now: Instant) -> bool {
    let (command, version, sender_id, entries) = match codec::decode(&datagram.data) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("dropping packet from {}: {e}", datagram.from);
            return false;
        }
    };

    if version != RIP_VERSION {
        warn!("dropping packet from {} ({sender_id}): version mismatch ({version})", datagram.from);
        return false;
    }
    if Command::parse(command).is_none() {
        warn!("dropping packet from {} ({sender_id}): unknown command {command}", datagram.from);
        return false;
    }
    if !table.is_known_neighbor(sender_id) {
        warn!("dropping packet from {} : unknown neighbor id {sender_id}", datagram.from);
        return false;
    }
    if !entries_reserved_are_zero(&datagram.data) {
        warn!("dropping packet from {sender_id}: non-zero reserved bytes");
        return false;
    }

    let mut changed = false;
    for (family_id, dest_id, metric) in entries {
        if family_id != codec::ADDRESS_FAMILY_ID {
            trace!("entry for dest {dest_id} carries unrecognized address family {family_id}");
        }
        let Ok(dest_id) = u16::try_from(dest_id) else {
            trace!("dropping entry with out-of-range destination id {dest_id}");
            continue;
        };
        let outcome = table.apply_advertisement(sender_id, dest_id, metric, now);
        debug!("{sender_id} -> {dest_id}: {outcome:?}");
        changed |= outcome.triggers_update();
    }
    changed
}

fn entries_reserved_are_zero(packet: &[u8]) -> bool {
    const HEADER_LEN: usize = 4;
    const ENTRY_LEN: usize = 20;
    let mut pos = HEADER_LEN;
    while pos + ENTRY_LEN <= packet.len() {
        if !codec::entry_reserved_is_zero(&packet[pos..pos + ENTRY_LEN]) {
            return false;
        }
        pos += ENTRY_LEN;
    }
    true
}

/// Send the current table, with split-horizon poisoned reverse, to every
/// configured neighbor. A send failure to one neighbor is logged and does
/// not stop the remaining neighbors from being served.
async fn broadcast_all(config: &Config, table: &ForwardingTable) {
    for neighbor in &config.outputs {
        let entries = table.snapshot_for(neighbor.id);
        for chunk in entries.chunks(MAX_ENTRIES_PER_PACKET) {
            let out: Vec<OutEntry> = chunk
                .iter()
                .map(|&(dest_id, metric)| OutEntry { dest_id: dest_id as u32, metric })
                .collect();
            let packet = match codec::encode(Command::Response, RIP_VERSION, config.router_id, &out) {
                Ok(p) => p,
                Err(e) => {
                    warn!("bug: failed to encode update for {}: {e}", neighbor.id);
                    continue;
                }
            };
            if let Err(e) = send_once(&packet, neighbor.dest_port).await {
                warn!("send to neighbor {} (port {}) failed: {e}", neighbor.id, neighbor.dest_port);
            }
        }
    }
}

/// Acquire a transient UDP socket, send one datagram, and let it drop.
/// Avoids holding one bound socket per neighbor for the lifetime of the
/// daemon just to send occasional broadcasts.
async fn send_once(packet: &[u8], dest_port: u16) -> std::io::Result<()> {
    let socket = UdpSocket::bind(("127.0.0.1", 0)).await?;
    socket.send_to(packet, ("127.0.0.1", dest_port)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Neighbor;

    fn config() -> Config {
        Config {
            router_id: 1,
            input_ports: vec![5001],
            outputs: vec![Neighbor { id: 2, dest_port: 6002, link_cost: 3 }],
            timers: crate::config::TimerConfig {
                periodic_base: 5.0,
                periodic_jitter: 1.0,
                route_timeout: 20.0,
                garbage_timeout: 40.0,
                trigger_min: 1.0,
                trigger_max: 5.0,
            },
            log_level: None,
        }
    }

    #[test]
    fn drops_truncated_datagram_without_touching_table() {
        let cfg = config();
        let mut table = ForwardingTable::new(cfg.router_id, &cfg.outputs);
        let datagram = Inbound { from: "127.0.0.1:1".parse().unwrap(), data: vec![1, 2, 0] };
        let changed = handle_datagram(&mut table, datagram, Instant::now());
        assert!(!changed);
        assert_eq!(table.entries().count(), 0);
    }

    #[test]
    fn drops_version_mismatch() {
        let cfg = config();
        let mut table = ForwardingTable::new(cfg.router_id, &cfg.outputs);
        let packet = codec::encode(Command::Response, 9, 2, &[OutEntry { dest_id: 9, metric: 0 }]).unwrap();
        let datagram = Inbound { from: "127.0.0.1:1".parse().unwrap(), data: packet };
        let changed = handle_datagram(&mut table, datagram, Instant::now());
        assert!(!changed);
        assert_eq!(table.entries().count(), 0);
    }

    #[test]
    fn drops_unknown_sender() {
        let cfg = config();
        let mut table = ForwardingTable::new(cfg.router_id, &cfg.outputs);
        let packet = codec::encode(Command::Response, 2, 99, &[OutEntry { dest_id: 9, metric: 0 }]).unwrap();
        let datagram = Inbound { from: "127.0.0.1:1".parse().unwrap(), data: packet };
        let changed = handle_datagram(&mut table, datagram, Instant::now());
        assert!(!changed);
        assert_eq!(table.entries().count(), 0);
    }

    #[test]
    fn accepts_a_known_neighbors_advertisement() {
        let cfg = config();
        let mut table = ForwardingTable::new(cfg.router_id, &cfg.outputs);
        let packet = codec::encode(Command::Response, 2, 2, &[OutEntry { dest_id: 9, metric: 0 }]).unwrap();
        let datagram = Inbound { from: "127.0.0.1:1".parse().unwrap(), data: packet };
        let changed = handle_datagram(&mut table, datagram, Instant::now());
        assert!(changed);
        assert_eq!(table.lookup(9).unwrap().metric, 3);
    }
}
