//! Per-connection lifecycle
//!
//! Each accepted connection runs a reader (this task) and a dispatcher
//! (a spawned task owning the write half):
//!
//! 1. Wait for an auth frame, ignoring anything else, under the handshake
//!    deadline.
//! 2. Authenticate with the authority and register the channel in its bucket.
//! 3. Read frames, rewrite them into replies and hand them to the dispatcher
//!    through the channel ring. Heartbeats rearm the deadline.
//! 4. On any exit: unregister, cancel the deadline, stop the dispatcher and
//!    tell the authority exactly once.

use crate::authority::ConnectReply;
use crate::connection::{Bucket, Channel, ChannelState, SessionInfo, Signal, StateCell};
use crate::error::GatewayError;
use crate::handlers::{HeartbeatHandler, LivenessRenewal, OperationRouter};
use crate::protocol::{Frame, OpCode};
use crate::round::{TimerKey, TimerWheel};
use crate::server::Gateway;
use crate::transport::{FrameRead, FrameWrite, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Peer details known before the handshake
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub remote: SocketAddr,
    /// Cookie header of a WebSocket upgrade, empty for raw TCP
    pub cookie: String,
    /// Round slot of this connection
    pub slot: usize,
}

/// Serve one connection until it closes
pub async fn serve_connection<R, W>(gateway: Arc<Gateway>, mut reader: R, mut writer: W, peer: PeerInfo)
where
    R: FrameRead + 'static,
    W: FrameWrite + 'static,
{
    let protocol = gateway.config().protocol.clone();
    let timer = Arc::clone(gateway.round().timer(peer.slot));
    let state = Arc::new(StateCell::new(ChannelState::Handshaking));
    let (close_tx, mut close_rx) = watch::channel(false);
    let close_tx = Arc::new(close_tx);

    let deadline = {
        let state = Arc::clone(&state);
        let close_tx = Arc::clone(&close_tx);
        let remote = peer.remote;
        timer.add(protocol.handshake_timeout(), move || {
            tracing::debug!(remote = %remote, state = %state.get(), "connection deadline expired");
            close_tx.send_replace(true);
        })
    };

    let handshake = tokio::select! {
        biased;
        () = closed(&mut close_rx) => Err(GatewayError::HandshakeTimeout),
        result = authenticate(&gateway, &mut reader, &state, &peer.cookie) => result,
    };
    let (reply, auth_frame) = match handshake {
        Ok(session) => session,
        Err(e) => {
            if e.is_disconnect() {
                tracing::debug!(remote = %peer.remote, "peer left during handshake");
            } else {
                tracing::warn!(remote = %peer.remote, error = %e, "handshake failed");
            }
            timer.del(deadline);
            state.set(ChannelState::Closed);
            writer.shutdown().await;
            return;
        }
    };

    let bucket = Arc::clone(gateway.bucket(&reply.key));
    let (channel, signals) = Channel::new(
        SessionInfo {
            key: reply.key.clone(),
            user_id: reply.user_id,
            platform: reply.platform.clone(),
            ip: peer.remote.ip().to_string(),
        },
        Arc::clone(&state),
        protocol.cli_proto,
        protocol.svr_proto,
    );
    channel.watch(&reply.accepts);

    let room = Some(reply.room_id.as_str()).filter(|room| !room.is_empty());
    if let Err(e) = bucket.put(room, Arc::clone(&channel)) {
        tracing::warn!(key = %reply.key, remote = %peer.remote, error = %e, "registration refused");
        timer.del(deadline);
        state.set(ChannelState::Closed);
        writer.shutdown().await;
        return;
    }

    // queue the auth reply before the dispatcher starts so it goes out first
    if let Err(e) = store(&channel, auth_frame) {
        tracing::warn!(key = %reply.key, error = %e, "auth reply dropped");
    }
    channel.signal().await;

    timer.set(deadline, protocol.heartbeat_timeout());
    state.set(ChannelState::Active);
    tracing::info!(
        key = %reply.key,
        user_id = reply.user_id,
        room_id = %reply.room_id,
        platform = %reply.platform,
        remote = %peer.remote,
        "connection registered"
    );

    let dispatcher = tokio::spawn(dispatch_loop(
        Arc::clone(&bucket),
        Arc::clone(&channel),
        writer,
        signals,
        Arc::clone(&close_tx),
        protocol.write_timeout(),
    ));

    let error = read_loop(
        &gateway,
        &bucket,
        &channel,
        &timer,
        deadline,
        &mut reader,
        &mut close_rx,
    )
    .await;

    state.set(ChannelState::Closing);
    if error.is_disconnect() {
        tracing::debug!(key = %channel.key(), "peer disconnected");
    } else {
        tracing::info!(key = %channel.key(), reason = %error, "closing connection");
    }

    bucket.delete(&channel);
    timer.del(deadline);
    drop(reader);
    channel.close().await;
    if let Err(e) = dispatcher.await {
        tracing::error!(key = %channel.key(), error = %e, "dispatcher task failed");
    }

    if let Err(e) = gateway.disconnect(channel.user_id(), channel.key()).await {
        tracing::warn!(key = %channel.key(), error = %e, "authority disconnect failed");
    }
    state.set(ChannelState::Closed);
}

/// Resolves once the close signal is raised
async fn closed(close_rx: &mut watch::Receiver<bool>) {
    let _ = close_rx.wait_for(|closed| *closed).await;
}

async fn authenticate<R: FrameRead>(
    gateway: &Gateway,
    reader: &mut R,
    state: &StateCell,
    cookie: &str,
) -> Result<(ConnectReply, Frame), GatewayError> {
    loop {
        let mut frame = reader.read_frame().await?;
        if frame.op != OpCode::Auth.as_u32() {
            tracing::debug!(op = frame.op, "frame before auth ignored");
            continue;
        }

        state.set(ChannelState::Authenticating);
        let reply = gateway.connect(&frame.body, cookie).await?;
        frame.reply(OpCode::AuthReply);
        return Ok((reply, frame));
    }
}

fn store(channel: &Channel, frame: Frame) -> Result<(), GatewayError> {
    {
        let mut slot = channel.ring().reserve_write()?;
        *slot = frame;
    }
    channel.ring().commit_write();
    Ok(())
}

async fn read_loop<R: FrameRead>(
    gateway: &Arc<Gateway>,
    bucket: &Bucket,
    channel: &Arc<Channel>,
    timer: &TimerWheel,
    deadline: TimerKey,
    reader: &mut R,
    close_rx: &mut watch::Receiver<bool>,
) -> GatewayError {
    let heartbeat_timeout = gateway.config().protocol.heartbeat_timeout();
    let mut renewal = LivenessRenewal::new(gateway.rand_server_heartbeat());

    loop {
        let result = tokio::select! {
            biased;
            () = closed(close_rx) => return GatewayError::Closed,
            result = reader.read_frame() => result,
        };
        let mut frame = match result {
            Ok(frame) => frame,
            Err(e) => return e.into(),
        };

        if frame.op == OpCode::Heartbeat.as_u32() {
            timer.set(deadline, heartbeat_timeout);
            HeartbeatHandler::handle(gateway, channel, &mut frame, &mut renewal);
        } else if let Err(e) = OperationRouter::dispatch(gateway, bucket, channel, &mut frame).await {
            if e.is_fatal() {
                return e.into();
            }
            tracing::warn!(key = %channel.key(), op = frame.op, error = %e, "frame dropped");
            continue;
        }

        if let Err(e) = store(channel, frame) {
            return e;
        }
        channel.signal().await;
    }
}

/// Write side of a connection
///
/// After a write failure the writer is shut down and the close signal raised;
/// the loop keeps draining signals until the reader sends `Finish`.
async fn dispatch_loop<W: FrameWrite>(
    bucket: Arc<Bucket>,
    channel: Arc<Channel>,
    writer: W,
    mut signals: mpsc::Receiver<Signal>,
    close_tx: Arc<watch::Sender<bool>>,
    write_timeout: Duration,
) {
    let mut writer = Some(writer);

    while let Some(signal) = signals.recv().await {
        let result = match (&signal, writer.as_mut()) {
            (Signal::Finish, _) => break,
            (Signal::Ready, Some(w)) => write_ready(&bucket, &channel, w),
            (Signal::Push(frame), Some(w)) => w.write_frame(frame),
            (Signal::Ready, None) => {
                discard_ready(&channel);
                continue;
            }
            (Signal::Push(_), None) => continue,
        };

        let Some(w) = writer.as_mut() else {
            continue;
        };
        let result = match result {
            Ok(()) => flush(w, write_timeout).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if e.is_disconnect() {
                tracing::debug!(key = %channel.key(), "peer gone while writing");
            } else {
                tracing::warn!(key = %channel.key(), error = %e, "write failed");
            }
            close_tx.send_replace(true);
            if let Some(mut w) = writer.take() {
                w.shutdown().await;
            }
        }
    }

    if let Some(mut w) = writer {
        w.shutdown().await;
    }
    tracing::trace!(key = %channel.key(), "dispatcher finished");
}

/// Write every frame waiting in the ring
fn write_ready<W: FrameWrite>(
    bucket: &Bucket,
    channel: &Channel,
    writer: &mut W,
) -> Result<(), TransportError> {
    while let Some(frame) = take_ready(channel) {
        if frame.op == OpCode::HeartbeatReply.as_u32() {
            let online = channel
                .room_id()
                .map_or(0, |room_id| bucket.room_online(&room_id));
            writer.write_heartbeat_reply(&frame, online)?;
        } else {
            writer.write_frame(&frame)?;
        }
    }
    Ok(())
}

/// Move the oldest frame out of the ring, leaving an empty slot behind
fn take_ready(channel: &Channel) -> Option<Frame> {
    let frame = match channel.ring().reserve_read() {
        Ok(mut slot) => std::mem::take(&mut *slot),
        Err(_) => return None,
    };
    channel.ring().commit_read();
    Some(frame)
}

fn discard_ready(channel: &Channel) {
    while take_ready(channel).is_some() {}
}

async fn flush<W: FrameWrite>(writer: &mut W, write_timeout: Duration) -> Result<(), TransportError> {
    tokio::time::timeout(write_timeout, writer.flush())
        .await
        .map_err(|_| TransportError::WriteTimeout)?
}
