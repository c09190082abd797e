// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! WEBL: the browser padawan transport
//!
//! The browser counterpart of CMDL: the coordinator's HTTP server carries
//! a WebSocket endpoint; a visiting tab runs the padawan creation script
//! and evaluates commands with the same `{script, imports, wait, id}` /
//! `{id, evaluation|exception}` semantics. This module ships the
//! top-window variant; richer pages (iframes, popups, workers) can speak
//! the same socket.

use crate::protocol::{Command, Report};
use crate::error::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Replete</title></head>
<body>
<script type="module">
    const socket = new WebSocket(
        "ws://" + location.host + "/webl/socket?secret=__SECRET__"
    );
    function inspect(value) {
        try {
            const text = JSON.stringify(value);
            if (text !== undefined) {
                return text;
            }
        } catch (_) {}
        return String(value);
    }
    function send(report) {
        socket.send(JSON.stringify(report));
    }
    socket.onmessage = function (event) {
        const command = JSON.parse(event.data);
        Promise.all(command.imports.map(
            (specifier) => import(specifier)
        )).then(function (modules) {
            globalThis.$imports = modules;
            const value = globalThis.eval(command.script);
            return (
                command.wait
                ? Promise.resolve(value).then(inspect)
                : inspect(value)
            );
        }).then(function (evaluation) {
            send({id: command.id, evaluation});
        }).catch(function (exception) {
            send({
                id: command.id,
                exception: (
                    (exception && exception.stack) !== undefined
                    ? exception.stack
                    : String(exception)
                )
            });
        });
    };
</script>
</body>
</html>
"#;

struct WeblInner {
    secret: String,
    pending: Mutex<FxHashMap<u64, oneshot::Sender<Report>>>,
    outgoing: tokio::sync::Mutex<Option<mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

impl WeblInner {
    fn settle_pending(&self) {
        let drained: Vec<(u64, oneshot::Sender<Report>)> =
            self.pending.lock().drain().collect();
        for (id, sender) in drained {
            let _ = sender.send(Report {
                id,
                evaluation: None,
                exception: Some("WEBL died.".to_string()),
            });
        }
    }
}

/// A browser padawan endpoint.
///
/// Unlike CMDL there is nothing to spawn: the padawan appears when a
/// browser opens the page and connects its socket, and dies when the tab
/// goes away. In-flight evaluations settle exactly as on child death.
pub struct Webl {
    inner: Arc<WeblInner>,
}

impl Webl {
    /// Create an endpoint guarded by a shared secret (typically the
    /// REPL's unguessable token).
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(WeblInner {
                secret: secret.into(),
                pending: Mutex::new(FxHashMap::default()),
                outgoing: tokio::sync::Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// The routes to merge into the coordinator's HTTP server:
    /// `/webl` (the padawan page) and `/webl/socket` (the channel).
    pub fn router(&self) -> Router {
        Router::new()
            .route("/webl", get(page))
            .route("/webl/socket", get(socket))
            .with_state(Arc::clone(&self.inner))
    }

    /// Send one evaluation to the connected tab and await its report.
    pub async fn eval(&self, script: String, imports: Vec<String>, wait: bool) -> Result<Report> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.inner.pending.lock().insert(id, sender);
        let command = Command {
            script,
            imports,
            wait,
            id,
        };
        let line = serde_json::to_string(&command)?;
        {
            let outgoing = self.inner.outgoing.lock().await;
            match outgoing.as_ref() {
                Some(channel) if channel.send(line).is_ok() => {}
                _ => {
                    self.inner.pending.lock().remove(&id);
                    return Ok(Report {
                        id,
                        evaluation: None,
                        exception: Some("WEBL died.".to_string()),
                    });
                }
            }
        }
        Ok(receiver.await.unwrap_or_else(|_| Report {
            id,
            evaluation: None,
            exception: Some("WEBL died.".to_string()),
        }))
    }
}

async fn page(State(inner): State<Arc<WeblInner>>) -> Html<String> {
    Html(PAGE.replace("__SECRET__", &inner.secret))
}

async fn socket(
    State(inner): State<Arc<WeblInner>>,
    Query(params): Query<HashMap<String, String>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    if params.get("secret") != Some(&inner.secret) {
        return StatusCode::FORBIDDEN.into_response();
    }
    upgrade
        .on_upgrade(move |socket| serve_socket(inner, socket))
        .into_response()
}

async fn serve_socket(inner: Arc<WeblInner>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
    *inner.outgoing.lock().await = Some(sender);
    tracing::info!("browser padawan connected");
    loop {
        tokio::select! {
            outgoing = receiver.recv() => match outgoing {
                Some(line) => {
                    if sink.send(Message::Text(line)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => dispatch(&inner, &text),
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    *inner.outgoing.lock().await = None;
    inner.settle_pending();
    tracing::info!("browser padawan disconnected");
}

fn dispatch(inner: &WeblInner, line: &str) {
    match serde_json::from_str::<Report>(line) {
        Ok(report) => {
            let sender = inner.pending.lock().remove(&report.id);
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
