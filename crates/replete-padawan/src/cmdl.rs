// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CMDL: the command-line padawan transport
//!
//! The coordinator opens a TCP server on an ephemeral loopback port,
//! spawns a runtime child process configured to connect back to that
//! port, and treats the first accepted socket as the channel. Framing is
//! one JSON object per line in both directions. If the child dies, every
//! pending evaluation settles with `{exception: "CMDL died."}` and a new
//! child is spawned against the same TCP server, unless shutdown was
//! requested.

use crate::error::{PadawanError, Result};
use crate::protocol::{Command, Report};
use crate::runtime::Platform;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::process::{Child, Command as Spawn};
use tokio::sync::{oneshot, watch};

/// Receiver of a padawan's side-band output (stdout or stderr bytes).
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Starting,
    Connected,
    Dead,
}

struct Shared {
    platform: Platform,
    port: u16,
    pending: Mutex<FxHashMap<u64, oneshot::Sender<Report>>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    child: tokio::sync::Mutex<Option<Child>>,
    next_id: AtomicU64,
    stopping: AtomicBool,
    channel: watch::Sender<Channel>,
    out: OutputSink,
    err: OutputSink,
}

impl Shared {
    /// Fail every in-flight evaluation and clear the table.
    fn settle_pending(&self) {
        let drained: Vec<(u64, oneshot::Sender<Report>)> =
            self.pending.lock().drain().collect();
        for (id, sender) in drained {
            let _ = sender.send(Report::died(id));
        }
    }
}

/// A command-line padawan: one child process, one socket, one pending
/// table, restarted transparently for as long as the transport lives.
pub struct Cmdl {
    shared: Arc<Shared>,
    supervisor: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    channel: watch::Receiver<Channel>,
}

impl Cmdl {
    /// Bind the loopback listener, spawn the runtime, and wait for it to
    /// connect back.
    pub async fn start(platform: Platform, out: OutputSink, err: OutputSink) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let (channel_tx, channel_rx) = watch::channel(Channel::Starting);
        let shared = Arc::new(Shared {
            platform,
            port,
            pending: Mutex::new(FxHashMap::default()),
            writer: tokio::sync::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(0),
            stopping: AtomicBool::new(false),
            channel: channel_tx,
            out,
            err,
        });
        let first = spawn_child(platform, port)?;
        let supervisor = tokio::spawn(supervise(Arc::clone(&shared), listener, first));
        let cmdl = Self {
            shared,
            supervisor: tokio::sync::Mutex::new(Some(supervisor)),
            channel: channel_rx,
        };
        cmdl.wait_connected().await?;
        tracing::info!(%platform, port, "padawan ready");
        Ok(cmdl)
    }

    /// The platform this padawan runs in.
    pub fn platform(&self) -> Platform {
        self.shared.platform
    }

    /// Send one evaluation and await its report.
    ///
    /// Transport death settles the evaluation with a synthetic
    /// `CMDL died.` report rather than an error: the caller treats it like
    /// any other exception outcome.
    pub async fn eval(&self, script: String, imports: Vec<String>, wait: bool) -> Result<Report> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.shared.pending.lock().insert(id, sender);
        let command = Command {
            script,
            imports,
            wait,
            id,
        };
        let mut line = serde_json::to_string(&command)?;
        line.push('\n');
        {
            let mut writer = self.shared.writer.lock().await;
            match writer.as_mut() {
                Some(stream) => {
                    if stream.write_all(line.as_bytes()).await.is_err() {
                        // The reader side notices the death and settles
                        // the table, this evaluation included.
                        *writer = None;
                    }
                }
                None => {
                    self.shared.pending.lock().remove(&id);
                    return Ok(Report::died(id));
                }
            }
        }
        Ok(receiver.await.unwrap_or_else(|_| Report::died(id)))
    }

    /// Stop the padawan: kill the child, settle what's left, and wait for
    /// the supervisor to finish. Safe to call more than once.
    pub async fn stop(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.shared.child.lock().await.take() {
            let _ = child.kill().await;
        }
        if let Some(handle) = self.supervisor.lock().await.take() {
            let _ = handle.await;
        }
        self.shared.settle_pending();
    }

    async fn wait_connected(&self) -> Result<()> {
        let mut channel = self.channel.clone();
        loop {
            match *channel.borrow() {
                Channel::Connected => return Ok(()),
                Channel::Dead => return Err(PadawanError::Died("CMDL died.")),
                Channel::Starting => {}
            }
            if channel.changed().await.is_err() {
                return Err(PadawanError::Died("CMDL died."));
            }
        }
    }
}

fn spawn_child(platform: Platform, port: u16) -> Result<Child> {
    Spawn::new(platform.program())
        .args(platform.command_line(port))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| PadawanError::Spawn {
            program: platform.program().to_string(),
            reason: error.to_string(),
        })
}

async fn supervise(shared: Arc<Shared>, listener: TcpListener, first: Child) {
    let mut next_child = Some(first);
    while !shared.stopping.load(Ordering::SeqCst) {
        let mut child = match next_child.take() {
            Some(child) => child,
            None => match spawn_child(shared.platform, shared.port) {
                Ok(child) => child,
                Err(error) => {
                    tracing::error!(%error, "padawan respawn failed");
                    break;
                }
            },
        };
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, Arc::clone(&shared.out)));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, Arc::clone(&shared.err)));
        }

        let stream = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => Some(stream),
                Err(error) => {
                    tracing::error!(%error, "accept failed");
                    None
                }
            },
            _ = child.wait() => None,
        };

        match stream {
            Some(stream) => {
                let (read_half, write_half) = stream.into_split();
                *shared.writer.lock().await = Some(write_half);
                *shared.child.lock().await = Some(child);
                let _ = shared.channel.send(Channel::Connected);

                let mut lines = BufReader::new(read_half).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => dispatch(&shared, &line),
                        Ok(None) | Err(_) => break,
                    }
                }

                *shared.writer.lock().await = None;
                shared.settle_pending();
                if let Some(mut child) = shared.child.lock().await.take() {
                    let _ = child.kill().await;
                }
            }
            None => {
                shared.settle_pending();
            }
        }

        if !shared.stopping.load(Ordering::SeqCst) {
            let _ = shared.channel.send(Channel::Starting);
            tracing::warn!(platform = %shared.platform, "padawan died; restarting");
            // A runtime that exits immediately must not respawn hot.
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
    let _ = shared.channel.send(Channel::Dead);
}

fn dispatch(shared: &Shared, line: &str) {
    match serde_json::from_str::<Report>(line) {
        Ok(report) => {
            let sender = shared.pending.lock().remove(&report.id);
            match sender {
                Some(sender) => {
                    let _ = sender.send(report);
                }
                None => tracing::warn!(id = report.id, "unmatched report"),
            }
        }
        Err(error) => tracing::warn!(%error, "malformed report line"),
    }
}

async fn pump(stream: impl AsyncRead + Unpin, sink: OutputSink) {
    let mut reader = BufReader::new(stream);
    let mut buffer = vec![0u8; 4096];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(count) => sink(&String::from_utf8_lossy(&buffer[..count])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> OutputSink {
        Arc::new(|_: &str| {})
    }

    /// A padawan whose "runtime" is a shell one-liner that connects back
    /// and reports a fixed evaluation for every command it receives.
    /// Exercises the listener and framing without needing a JS runtime.
    #[tokio::test]
    async fn test_eval_round_trip_with_fake_runtime() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Fake padawan: echo a report for the single command id 0.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let command: Command = serde_json::from_str(&line).unwrap();
                let report = Report {
                    id: command.id,
                    evaluation: Some("42".to_string()),
                    exception: None,
                };
                let mut reply = serde_json::to_string(&report).unwrap();
                reply.push('\n');
                write_half.write_all(reply.as_bytes()).await.unwrap();
            }
        });

        let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        let (read_half, write_half) = stream.into_split();
        let (channel_tx, channel_rx) = watch::channel(Channel::Connected);
        let shared = Arc::new(Shared {
            platform: Platform::Node,
            port,
            pending: Mutex::new(FxHashMap::default()),
            writer: tokio::sync::Mutex::new(Some(write_half)),
            child: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(0),
            stopping: AtomicBool::new(false),
            channel: channel_tx,
            out: sink(),
            err: sink(),
        });
        let reader_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                dispatch(&reader_shared, &line);
            }
        });

        let cmdl = Cmdl {
            shared,
            supervisor: tokio::sync::Mutex::new(None),
            channel: channel_rx,
        };
        let report = cmdl
            .eval("1 + 1".to_string(), Vec::new(), false)
            .await
            .unwrap();
        assert_eq!(report.evaluation.as_deref(), Some("42"));
        assert_eq!(report.exception, None);
    }

    #[tokio::test]
    async fn test_eval_without_connection_reports_death() {
        let (channel_tx, channel_rx) = watch::channel(Channel::Starting);
        let shared = Arc::new(Shared {
            platform: Platform::Node,
            port: 0,
            pending: Mutex::new(FxHashMap::default()),
            writer: tokio::sync::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(0),
            stopping: AtomicBool::new(false),
            channel: channel_tx,
            out: sink(),
            err: sink(),
        });
        let cmdl = Cmdl {
            shared,
            supervisor: tokio::sync::Mutex::new(None),
            channel: channel_rx,
        };
        let report = cmdl
            .eval("1".to_string(), Vec::new(), false)
            .await
            .unwrap();
        assert_eq!(report.exception.as_deref(), Some("CMDL died."));
        assert!(cmdl.shared.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_settle_pending_reports_death() {
        let (channel_tx, _) = watch::channel(Channel::Starting);
        let shared = Shared {
            platform: Platform::Node,
            port: 0,
            pending: Mutex::new(FxHashMap::default()),
            writer: tokio::sync::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(0),
            stopping: AtomicBool::new(false),
            channel: channel_tx,
            out: sink(),
            err: sink(),
        };
        let (sender, receiver) = oneshot::channel();
        shared.pending.lock().insert(9, sender);
        shared.settle_pending();
        let report = receiver.await.unwrap();
        assert_eq!(report.id, 9);
        assert_eq!(report.exception.as_deref(), Some("CMDL died."));
    }
}
