// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! replete CLI - an evaluator for JavaScript modules

use clap::Parser;
use owo_colors::OwoColorize;
use replete::protocol::{HostCommand, HostResult};
use replete::{Capabilities, Platform, Repl, VERSION};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use url::Url;

#[derive(Parser)]
#[command(
    name = "replete",
    about = "An evaluator for JavaScript modules",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Project root; reads outside it are refused
    #[arg(long)]
    root: Option<PathBuf>,

    /// Address for the source server
    #[arg(long, default_value = "127.0.0.1:0")]
    listen: SocketAddr,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Stdout belongs to the host protocol, so logs go to stderr.
    let filter = if cli.verbose {
        "replete=debug,replete_modules=debug,replete_padawan=debug"
    } else {
        "replete=warn,replete_modules=warn,replete_padawan=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let root = match cli.root {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let root = std::fs::canonicalize(&root)?;
    let root_url = Url::from_file_path(&root)
        .map_err(|_| anyhow::anyhow!("Not a usable root: {}", root.display()))?;

    // Results (evaluations, exceptions, side-band output) funnel through
    // one channel to keep stdout lines whole.
    let (result_sender, mut result_receiver) = mpsc::unbounded_channel::<HostResult>();

    let mut capabilities = Capabilities::new(root_url);
    let out_sender = result_sender.clone();
    capabilities.out = Arc::new(move |text| {
        let _ = out_sender.send(HostResult::out(text));
    });
    let err_sender = result_sender.clone();
    capabilities.err = Arc::new(move |text| {
        let _ = err_sender.send(HostResult::err(text));
    });

    let repl = match Repl::start(capabilities, cli.listen).await {
        Ok(repl) => Arc::new(repl),
        Err(error) => {
            eprintln!("{}: {}", "Error".red().bold(), error);
            std::process::exit(1);
        }
    };
    eprintln!(
        "{} {} serving {}",
        "replete".cyan().bold(),
        VERSION.yellow(),
        repl.base()
    );

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(result) = result_receiver.recv().await {
            let Ok(mut line) = serde_json::to_string(&result) else {
                continue;
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let command: HostCommand = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(error) => {
                let _ = result_sender
                    .send(HostResult::err(&format!("Malformed command: {error}\n")));
                continue;
            }
        };
        let repl = Arc::clone(&repl);
        let sender = result_sender.clone();
        tokio::spawn(async move {
            let result = perform(&repl, command).await;
            let _ = sender.send(result);
        });
    }

    repl.stop().await;
    drop(result_sender);
    let _ = writer.await;
    Ok(())
}

/// Run one host command to completion, mapping every failure mode into a
/// result the host can display.
async fn perform(repl: &Repl, command: HostCommand) -> HostResult {
    let platform = match command
        .platform
        .as_deref()
        .unwrap_or("node")
        .parse::<Platform>()
    {
        Ok(platform) => platform,
        Err(reason) => return HostResult::exception(reason, command.id),
    };
    match repl
        .evaluate(
            &command.source,
            command.locator.as_deref(),
            platform,
            &command.scope,
        )
        .await
    {
        Ok(outcome) => match (outcome.evaluation, outcome.exception) {
            (_, Some(exception)) => HostResult::exception(exception, command.id),
            (Some(evaluation), None) => HostResult::evaluation(evaluation, command.id),
            (None, None) => HostResult::evaluation(String::from("undefined"), command.id),
        },
        Err(error) => HostResult::exception(error.to_string(), command.id),
    }
}
