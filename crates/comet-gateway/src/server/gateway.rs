//! Gateway core
//!
//! Owns the buckets, the round and the authority client, and implements the
//! push operations invoked from the RPC surface.

use crate::authority::{Authority, AuthorityError, ConnectReply, ConnectRequest};
use crate::connection::Bucket;
use crate::error::GatewayError;
use crate::hash::{fnv1a64, shard_index};
use crate::protocol::{Frame, FrameCodec};
use crate::round::Round;
use comet_common::AppConfig;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Shared state of one gateway process
pub struct Gateway {
    config: AppConfig,
    server_id: String,
    buckets: Vec<Arc<Bucket>>,
    round: Round,
    authority: Arc<dyn Authority>,
    codec: FrameCodec,
    next_slot: AtomicUsize,
}

impl Gateway {
    /// Build a gateway; must be called from within a tokio runtime
    pub fn new(config: AppConfig, authority: Arc<dyn Authority>) -> Arc<Self> {
        let server_id = derive_server_id(&config.rpc.bind);
        let buckets = (0..config.bucket.size.max(1))
            .map(|_| Arc::new(Bucket::new(&config.bucket)))
            .collect();
        let round = Round::new(&config.round);
        let codec = FrameCodec::new(config.protocol.max_body);

        tracing::info!(
            server_id = %server_id,
            buckets = config.bucket.size,
            "gateway created"
        );

        Arc::new(Self {
            config,
            server_id,
            buckets,
            round,
            authority,
            codec,
            next_slot: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    pub fn authority(&self) -> &dyn Authority {
        self.authority.as_ref()
    }

    pub fn buckets(&self) -> &[Arc<Bucket>] {
        &self.buckets
    }

    /// Bucket owning `key`
    pub fn bucket(&self, key: &str) -> &Arc<Bucket> {
        &self.buckets[shard_index(key, self.buckets.len())]
    }

    /// Round slot for the next accepted connection
    pub fn next_slot(&self) -> usize {
        self.next_slot.fetch_add(1, Ordering::Relaxed)
    }

    /// Fresh server key, `{server_id}-{unix_nanos}`
    pub fn next_key(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        format!("{}-{nanos}", self.server_id)
    }

    /// Per-connection liveness renewal interval, uniform in `[min, max)`
    pub fn rand_server_heartbeat(&self) -> Duration {
        let bounds = &self.config.heartbeat;
        let secs = if bounds.min_secs < bounds.max_secs {
            rand::thread_rng().gen_range(bounds.min_secs..bounds.max_secs)
        } else {
            bounds.min_secs
        };
        Duration::from_secs(secs)
    }

    /// Authenticate a handshake token
    pub async fn connect(&self, token: &[u8], cookie: &str) -> Result<ConnectReply, AuthorityError> {
        let request = ConnectRequest {
            server_id: self.server_id.clone(),
            server_key: self.next_key(),
            cookie: cookie.to_string(),
            token: String::from_utf8_lossy(token).into_owned(),
        };
        self.authority.connect(request).await
    }

    pub async fn disconnect(&self, user_id: i64, key: &str) -> Result<(), AuthorityError> {
        self.authority.disconnect(user_id, key, &self.server_id).await
    }

    pub async fn heartbeat(&self, user_id: i64, key: &str) -> Result<(), AuthorityError> {
        self.authority.heartbeat(user_id, key, &self.server_id).await
    }

    /// Local occupant count of every room, summed over buckets
    pub fn rooms_occupancy(&self) -> HashMap<String, i32> {
        let mut counts: HashMap<String, i32> = HashMap::new();
        for bucket in &self.buckets {
            for (room_id, count) in bucket.rooms_occupancy() {
                *counts.entry(room_id).or_default() += count;
            }
        }
        counts
    }

    /// Run one occupancy aggregation round
    ///
    /// Returns the number of rooms the authority reported on.
    pub async fn renew_online(&self) -> Result<usize, AuthorityError> {
        let local = self.rooms_occupancy();
        let global = self.authority.renew_online(&self.server_id, local).await?;
        for bucket in &self.buckets {
            bucket.merge_occupancy(&global);
        }
        Ok(global.len())
    }

    /// Spawn the periodic occupancy loop
    ///
    /// The task holds a weak reference and stops once the gateway is dropped.
    pub fn spawn_online_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let gateway: Weak<Self> = Arc::downgrade(self);
        let period = self.config.online.tick();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(gateway) = gateway.upgrade() else {
                    break;
                };
                match gateway.renew_online().await {
                    Ok(rooms) => tracing::debug!(rooms, "room occupancy renewed"),
                    Err(e) => tracing::warn!(error = %e, "room occupancy renewal failed"),
                }
            }
        })
    }

    /// Push a frame to specific keys, skipping those that do not watch `op`
    ///
    /// Unknown keys are ignored. Returns the number of channels reached.
    pub fn push_keys(&self, keys: &[String], frame: &Frame, op: u32) -> Result<usize, GatewayError> {
        if keys.is_empty() {
            return Err(GatewayError::InvalidArgument("no keys given".to_string()));
        }

        let mut delivered = 0;
        for key in keys {
            let Some(channel) = self.bucket(key).channel(key) else {
                continue;
            };
            if !channel.need_push(op, "") {
                continue;
            }
            match channel.push(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(key = %key, op, error = %e, "push dropped"),
            }
        }
        Ok(delivered)
    }

    /// Push to every connection on this server in the background
    ///
    /// With a non-zero `speed` the walk sleeps `channel_count / speed` seconds
    /// after each bucket. The task resolves to the number of channels reached.
    pub fn broadcast(
        self: &Arc<Self>,
        frame: Frame,
        op: u32,
        platform: String,
        speed: u32,
    ) -> JoinHandle<usize> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut delivered = 0;
            for bucket in &gateway.buckets {
                delivered += bucket.broadcast(&frame, op, &platform);
                if speed > 0 {
                    let pause = bucket.channel_count() as u64 / u64::from(speed);
                    if pause > 0 {
                        tokio::time::sleep(Duration::from_secs(pause)).await;
                    }
                }
            }
            tracing::info!(op, platform = %platform, delivered, "broadcast finished");
            delivered
        })
    }

    /// Push to one room across all buckets
    pub fn broadcast_room(&self, room_id: &str, frame: &Frame) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.broadcast_room(room_id, frame))
            .sum()
    }

    /// Ids of every room with a local member
    pub fn room_ids(&self) -> BTreeSet<String> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.room_ids())
            .collect()
    }

    /// Registered channels across all buckets
    pub fn channel_count(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.channel_count()).sum()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("server_id", &self.server_id)
            .field("buckets", &self.buckets.len())
            .field("round", &self.round)
            .finish()
    }
}

/// Hex FNV-1a of the advertised `host:port`
///
/// A wildcard host is replaced by `HOSTNAME` so that servers sharing a port
/// still get distinct ids.
fn derive_server_id(bind: &str) -> String {
    let (host, port) = bind.rsplit_once(':').unwrap_or((bind, ""));
    let host = match host.trim_matches(['[', ']']) {
        "" | "0.0.0.0" | "::" => std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
        other => other.to_string(),
    };
    format!("{:016x}", fnv1a64(&format!("{host}:{port}")))
}
