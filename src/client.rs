//! Client side of the line protocol.
//!
//! A reader task splits incoming lines by frame header: replies go to the
//! caller waiting in [`ExamClient::call`], events queue up for
//! [`ExamClient::next_event`]. Waiting for a host to start is an ordinary
//! await on the event queue, and giving up sends `CANCEL_WAIT`.

use crate::protocol::{Command, Event, Frame};
use crate::types::RoomId;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("server closed the connection")]
    Closed,

    #[error("server error {code}: {msg}")]
    Server { code: String, msg: String },

    #[error("unexpected reply: {0}")]
    Unexpected(String),

    #[error("room {0} went away while waiting")]
    RoomGone(RoomId),

    #[error("timed out")]
    TimedOut,
}

/// Fail on `ERROR|CODE|msg` replies
fn check(reply: String) -> Result<String, ClientError> {
    if let Some(rest) = reply.strip_prefix("ERROR|") {
        let (code, msg) = rest.split_once('|').unwrap_or((rest, ""));
        return Err(ClientError::Server {
            code: code.to_string(),
            msg: msg.to_string(),
        });
    }
    Ok(reply)
}

pub struct ExamClient {
    writer: OwnedWriteHalf,
    replies: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedReceiver<Event>,
    /// Events read while waiting for something else
    backlog: VecDeque<Event>,
    reader: JoinHandle<()>,
}

impl ExamClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, writer) = stream.into_split();
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!("Client read failed: {}", e);
                        break;
                    }
                };
                match Frame::decode(&line) {
                    Some(Frame::Reply(body)) => {
                        if reply_tx.send(body).is_err() {
                            break;
                        }
                    }
                    Some(Frame::Event(event)) => {
                        let _ = event_tx.send(event);
                    }
                    None => tracing::warn!("Ignoring unframed line: {}", line),
                }
            }
        });

        Ok(Self {
            writer,
            replies,
            events,
            backlog: VecDeque::new(),
            reader,
        })
    }

    /// Send a command and return the reply body, `ERROR|…` included
    pub async fn call(&mut self, cmd: &Command) -> Result<String, ClientError> {
        self.writer.write_all(cmd.encode().as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        self.replies.recv().await.ok_or(ClientError::Closed)
    }

    /// Like [`call`](Self::call) but turns error replies into `Err`
    pub async fn call_ok(&mut self, cmd: &Command) -> Result<String, ClientError> {
        check(self.call(cmd).await?)
    }

    /// Next pushed event, in arrival order
    pub async fn next_event(&mut self) -> Option<Event> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        self.events.recv().await
    }

    /// A pushed event if one has already arrived
    pub fn try_event(&mut self) -> Option<Event> {
        self.backlog
            .pop_front()
            .or_else(|| self.events.try_recv().ok())
    }

    /// `BEGIN_EXAM`, waiting for the host if needed, and return the
    /// `BEGIN_EXAM_OK` reply. Gives up after `timeout` and stops listening.
    pub async fn begin_exam(
        &mut self,
        room_id: &str,
        timeout: Duration,
    ) -> Result<String, ClientError> {
        let cmd = Command::BeginExam {
            room_id: room_id.to_string(),
        };
        let reply = self.call_ok(&cmd).await?;
        if reply.starts_with("BEGIN_EXAM_OK|") {
            return Ok(reply);
        }
        if !reply.starts_with("EXAM_WAITING") {
            return Err(ClientError::Unexpected(reply));
        }

        match tokio::time::timeout(timeout, self.wait_for_room(room_id)).await {
            Ok(Ok(())) => {
                let reply = self.call_ok(&cmd).await?;
                if reply.starts_with("BEGIN_EXAM_OK|") {
                    Ok(reply)
                } else {
                    Err(ClientError::Unexpected(reply))
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.call(&Command::CancelWait {
                    room_id: room_id.to_string(),
                })
                .await?;
                Err(ClientError::TimedOut)
            }
        }
    }

    /// Wait for ROOM_STARTED for `room_id`; other events are kept for later
    async fn wait_for_room(&mut self, room_id: &str) -> Result<(), ClientError> {
        loop {
            let event = self.events.recv().await.ok_or(ClientError::Closed)?;
            if event.target() != room_id {
                self.backlog.push_back(event);
                continue;
            }
            match event {
                Event::RoomStarted { .. } => return Ok(()),
                Event::RoomDeleted { .. } | Event::RoomEnded { .. } => {
                    return Err(ClientError::RoomGone(room_id.to_string()));
                }
                other => self.backlog.push_back(other),
            }
        }
    }

    /// Say goodbye and close the connection
    pub async fn quit(mut self) -> Result<(), ClientError> {
        let reply = self.call(&Command::Quit).await?;
        if reply != "BYE" {
            return Err(ClientError::Unexpected(reply));
        }
        Ok(())
    }
}

impl Drop for ExamClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_replies_become_errors() {
        let err = check("ERROR|INVALID_STATE|room has ended".to_string()).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Server { ref code, ref msg } if code == "INVALID_STATE" && msg == "room has ended"
        ));
        assert_eq!(check("PONG".to_string()).unwrap(), "PONG");
    }
}
