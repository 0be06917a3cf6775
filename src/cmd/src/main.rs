// Copyright 2026 The Feature Platform Coordinator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `fpcoord` binary: process wiring around `fpcoord_meta`. `serve` runs
//! a long-lived coordinator; `worker` is the one-shot entry point a
//! Kubernetes `Job`/`CronJob` pod runs, driven entirely by environment
//! variables (§6).

mod serve;
mod worker;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "The feature-platform coordinator")]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the long-lived coordinator: watch loops, locking, dispatch.
    Serve(serve::ServeOpts),
    /// Run a single runner named by `NAME`/`CONFIG`, as a cluster `Job` pod
    /// does (§6 worker environment variables).
    Worker,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let opts = Opts::parse();

    let result = match opts.command {
        Command::Serve(opts) => serve::run(opts).await,
        Command::Worker => worker::run().await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fpcoord exited with an error");
            ExitCode::FAILURE
        }
    }
}
