//! TCP line-protocol server
//!
//! One task per connection. The task is the only writer on its socket: it
//! selects between the next command line and the user's push channel, so a
//! reply and an event can never interleave on the wire.

mod handlers;
mod host;
mod lines;
mod participant;
mod practice;

pub use handlers::{handle_command, handle_line, Session};

use crate::metrics::Metrics;
use crate::protocol::{Reply, MAX_LINE_LEN};
use crate::state::AppState;
use lines::{Line, LineReader};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Accept connections until the listener fails
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    tracing::info!("Line protocol listening on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        Metrics::incr(&state.metrics.connections_accepted);
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, state).await {
                tracing::warn!("Connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Serve one client until it quits or disconnects
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<AppState>,
) -> std::io::Result<()> {
    let conn_id = state.broadcaster.next_connection_id();
    Metrics::incr(&state.metrics.connections_active);
    tracing::info!("Connection {} from {}", conn_id, peer);

    let (reader, mut writer) = stream.into_split();
    let mut lines = LineReader::new(BufReader::new(reader), MAX_LINE_LEN);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(conn_id, events_tx);

    let outcome = async {
        loop {
            tokio::select! {
                // Pushed events for the logged-in user
                Some(event) = events_rx.recv() => {
                    write_line(&mut writer, &event.frame()).await?;
                }

                // Next command
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    let line = match line {
                        Line::Text(line) => line,
                        Line::TooLong => {
                            let reply = Reply::error("PARSE_ERROR", "line too long");
                            write_line(&mut writer, &reply.frame()).await?;
                            continue;
                        }
                        Line::NotUtf8 => {
                            let reply = Reply::error("PARSE_ERROR", "line is not valid UTF-8");
                            write_line(&mut writer, &reply.frame()).await?;
                            continue;
                        }
                    };

                    tracing::debug!("Connection {} <- {}", conn_id, line);
                    let reply = handle_line(&line, &mut session, &state).await;
                    write_line(&mut writer, &reply.frame()).await?;
                    if reply == Reply::Bye {
                        break;
                    }
                }
            }
        }
        Ok::<_, std::io::Error>(())
    }
    .await;

    // Answers are written through on save, so there is nothing to flush here
    if let Some(user_id) = session.user_id() {
        state.broadcaster.unregister(user_id, conn_id).await;
        let dropped = state.drop_waits(user_id).await;
        tracing::info!(
            "User {} disconnected (connection {}, left {} waiting room(s))",
            user_id,
            conn_id,
            dropped
        );
    }
    Metrics::decr(&state.metrics.connections_active);
    tracing::info!("Connection {} closed", conn_id);
    outcome
}
