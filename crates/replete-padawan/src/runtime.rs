// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Padawan runtimes and their bootstrap programs
//!
//! Every command-line padawan runs the same evaluator core behind a small
//! per-runtime shim that connects back to the coordinator's loopback port
//! and provides the platform's value inspector.

use std::fmt;
use std::str::FromStr;

/// The JavaScript runtimes a padawan can be spawned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Node.js (`node`)
    Node,
    /// Deno (`deno`)
    Deno,
    /// Bun (`bun`)
    Bun,
    /// Txiki (`tjs`)
    Tjs,
    /// A browser tab speaking the WEBL transport
    Browser,
}

impl Platform {
    /// The executable to spawn, for command-line platforms.
    pub fn program(&self) -> &'static str {
        match self {
            Platform::Node => "node",
            Platform::Deno => "deno",
            Platform::Bun => "bun",
            Platform::Tjs => "tjs",
            Platform::Browser => "browser",
        }
    }

    /// Whether this platform is driven over the CMDL transport.
    pub fn is_command_line(&self) -> bool {
        !matches!(self, Platform::Browser)
    }

    /// The argv used to spawn the padawan, bootstrap included.
    pub fn command_line(&self, port: u16) -> Vec<String> {
        let bootstrap = bootstrap(*self, port);
        match self {
            Platform::Node => vec![
                // Network imports let node fetch modules from the source
                // server like every other padawan.
                "--experimental-network-imports".to_string(),
                "-e".to_string(),
                bootstrap,
            ],
            Platform::Deno => vec!["eval".to_string(), bootstrap],
            Platform::Bun => vec!["-e".to_string(), bootstrap],
            Platform::Tjs => vec!["eval".to_string(), bootstrap],
            Platform::Browser => Vec::new(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        match text {
            "node" => Ok(Platform::Node),
            "deno" => Ok(Platform::Deno),
            "bun" => Ok(Platform::Bun),
            "tjs" | "txiki" => Ok(Platform::Tjs),
            "browser" => Ok(Platform::Browser),
            other => Err(format!("Unknown platform '{other}'")),
        }
    }
}

/// The evaluator core shared by every command-line padawan.
///
/// The shim running before it defines `$inspect` and calls `$replete` with
/// a connection exposing `write`. Commands arrive as lines of JSON; each
/// one has its imports resolved in parallel, bound as `$imports` on the
/// global object, and its script evaluated by indirect `eval` so that the
/// script sees the global scope (and, through it, the `$scopes` registry).
const CORE: &str = r#"
function $replete(connection) {
    let buffered = "";
    function send(report) {
        connection.write(JSON.stringify(report) + "\n");
    }
    function perform(command) {
        Promise.all(command.imports.map(
            function (specifier) {
                return import(specifier);
            }
        )).then(function (modules) {
            globalThis.$imports = modules;
            const value = globalThis.eval(command.script);
            return (
                command.wait
                ? Promise.resolve(value).then($inspect)
                : $inspect(value)
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
    }
    return function receive(chunk) {
        buffered += chunk;
        const lines = buffered.split("\n");
        buffered = lines.pop();
        lines.forEach(function (line) {
            if (line !== "") {
                perform(JSON.parse(line));
            }
        });
    };
}
"#;

const NODE_SHIM: &str = r#"
const net = require("node:net");
const util = require("node:util");
globalThis.$inspect = function (value) {
    return util.inspect(value);
};
const socket = net.connect(__PORT__, "127.0.0.1");
socket.setEncoding("utf8");
const receive = $replete({
    write: function (line) {
        socket.write(line);
    }
});
socket.on("data", receive);
socket.on("close", function () {
    process.exit(0);
});
"#;

const DENO_SHIM: &str = r#"
globalThis.$inspect = function (value) {
    return Deno.inspect(value);
};
const connection = await Deno.connect({hostname: "127.0.0.1", port: __PORT__});
const encoder = new TextEncoder();
const decoder = new TextDecoder();
const receive = $replete({
    write: async function (line) {
        const bytes = encoder.encode(line);
        let written = 0;
        while (written < bytes.length) {
            written += await connection.write(bytes.subarray(written));
        }
    }
});
const buffer = new Uint8Array(65536);
while (true) {
    const count = await connection.read(buffer);
    if (count === null) {
        break;
    }
    receive(decoder.decode(buffer.subarray(0, count), {stream: true}));
}
"#;

const TJS_SHIM: &str = r#"
globalThis.$inspect = function (value) {
    try {
        return JSON.stringify(value);
    } catch (_) {
        return String(value);
    }
};
const connection = await tjs.connect("tcp", "127.0.0.1", __PORT__);
const encoder = new TextEncoder();
const decoder = new TextDecoder();
const receive = $replete({
    write: function (line) {
        connection.write(encoder.encode(line));
    }
});
const buffer = new Uint8Array(65536);
while (true) {
    const count = await connection.read(buffer);
    if (count === null) {
        break;
    }
    receive(decoder.decode(buffer.subarray(0, count), {stream: true}));
}
"#;

/// Assemble the bootstrap program for a platform, pointing it back at the
/// coordinator's loopback `port`.
pub fn bootstrap(platform: Platform, port: u16) -> String {
    let shim = match platform {
        Platform::Node | Platform::Bun => NODE_SHIM,
        Platform::Deno => DENO_SHIM,
        Platform::Tjs => TJS_SHIM,
        Platform::Browser => "",
    };
    format!("{CORE}{}", shim.replace("__PORT__", &port.to_string()))
}
