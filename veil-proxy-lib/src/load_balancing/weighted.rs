use std::sync::Arc;

use rand::Rng;

use crate::upstream::ServerHandle;

/// Weighted-random pick over the configured servers, honoring a QoS floor.
///
/// Draws a target in `[0, total_weight)` and hands it to the selection walk.
pub fn pick(
    servers: &[Arc<ServerHandle>],
    total_weight: u64,
    min_qos: u32,
) -> Option<&Arc<ServerHandle>> {
    if servers.is_empty() {
        return None;
    }
    let t = rand::thread_rng().gen_range(0..total_weight.max(1));
    pick_at(servers, min_qos, t)
}

/// Deterministic selection walk for a fixed target `t`.
///
/// Walks the servers in configured order, accumulating weight. A server
/// below `min_qos` is skipped by shifting the target past its weight slice,
/// which performs a single-pass weighted choice over the qualifying subset.
/// The last server is returned unconditionally so the walk always makes a
/// pick, even when nothing satisfies the floor.
pub fn pick_at(
    servers: &[Arc<ServerHandle>],
    min_qos: u32,
    mut t: u64,
) -> Option<&Arc<ServerHandle>> {
    let n = servers.len();
    if n == 0 {
        return None;
    }
    let mut accumulated: u64 = 0;
    for (i, server) in servers.iter().enumerate() {
        if i == n - 1 {
            return Some(server);
        }
        accumulated += u64::from(server.weight());
        if server.qos() < min_qos {
            // Disqualified: shift the target past this server's slice.
            t += u64::from(server.weight());
            continue;
        }
        if accumulated > t {
            return Some(server);
        }
    }
    unreachable!("selection walk terminates at the last server");
}
