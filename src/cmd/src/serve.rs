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

//! `fpcoord serve`: build a `Coordinator` from CLI/env configuration and run
//! it until a shutdown signal is observed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use fpcoord_meta::coordinator::routines::Providers;
use fpcoord_meta::manager::etcd::EtcdClients;
use fpcoord_meta::manager::memory::InMemoryStore;
use fpcoord_meta::manager::{CoordinationClient, MetadataClient};
use fpcoord_meta::provider::memory::{MemoryOfflineStore, MemoryOnlineStore};
use fpcoord_meta::provider::{OfflineStoreRef, OnlineStoreRef};
use fpcoord_meta::runner::registry::RunnerRegistry;
use fpcoord_meta::runner::CloudTag;
use fpcoord_meta::spawner::cluster::ClusterJobSpawner;
use fpcoord_meta::spawner::local::LocalJobSpawner;
use fpcoord_meta::spawner::JobSpawner;
use fpcoord_meta::{Coordinator, CoordinatorConfig};
use tracing::info;

#[derive(Args, Debug)]
pub struct ServeOpts {
    /// Comma-separated etcd endpoints. Omit to run against the in-memory
    /// metadata/coordination store (single-process development mode).
    #[clap(long, env = "FP_ETCD_ENDPOINTS", value_delimiter = ',')]
    etcd_endpoints: Vec<String>,

    /// Dispatch materialization and cron work to Kubernetes `Job`/`CronJob`
    /// objects instead of running runners in this process.
    #[clap(long, env = "FP_CLUSTER", default_value_t = false)]
    cluster: bool,

    /// Kubernetes namespace cluster jobs are submitted into. Only used with
    /// `--cluster`.
    #[clap(long, env = "FP_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Container image cluster-mode worker pods run. Required with
    /// `--cluster`.
    #[clap(long, env = "FP_WORKER_IMAGE")]
    worker_image: Option<String>,

    /// Comma-separated names of in-memory offline-warehouse providers to
    /// stand up (§1: real warehouse drivers are out of scope).
    #[clap(long, env = "FP_OFFLINE_PROVIDERS", value_delimiter = ',', default_value = "wh")]
    offline_providers: Vec<String>,

    /// Comma-separated names of in-memory online-store providers to stand
    /// up (§1: real online-store drivers are out of scope).
    #[clap(long, env = "FP_ONLINE_PROVIDERS", value_delimiter = ',', default_value = "kv")]
    online_providers: Vec<String>,

    #[clap(long, env = "FP_LEASE_TTL_SECS", default_value_t = 10)]
    lease_ttl_secs: u64,

    #[clap(long, env = "FP_DEPENDENCY_BACKOFF_SECS", default_value_t = 2)]
    dependency_backoff_secs: u64,
}

pub async fn run(opts: ServeOpts) -> anyhow::Result<()> {
    let (metadata, coordination): (Arc<dyn MetadataClient>, Arc<dyn CoordinationClient>) =
        if opts.etcd_endpoints.is_empty() {
            info!("no etcd endpoints configured, using the in-memory metadata/coordination store");
            let store = InMemoryStore::new();
            (store.clone(), store)
        } else {
            let clients = Arc::new(EtcdClients::connect(&opts.etcd_endpoints, None).await?);
            (clients.clone(), clients)
        };

    let mut offline = HashMap::new();
    for name in &opts.offline_providers {
        offline.insert(name.clone(), MemoryOfflineStore::new(name.clone()) as OfflineStoreRef);
    }
    let mut online = HashMap::new();
    for name in &opts.online_providers {
        online.insert(name.clone(), MemoryOnlineStore::new(name.clone()) as OnlineStoreRef);
    }
    let providers = Providers { offline, online };

    let registry = RunnerRegistry::new();
    fpcoord_meta::runner::copy_to_online::register(&registry)?;
    fpcoord_meta::runner::materialize::register(&registry)?;
    fpcoord_meta::runner::create_transformation::register(&registry)?;
    fpcoord_meta::runner::create_training_set::register(&registry)?;

    let spawner: Arc<dyn JobSpawner> = if opts.cluster {
        let worker_image = opts
            .worker_image
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--worker-image is required with --cluster"))?;
        let client = kube::Client::try_default().await?;
        Arc::new(ClusterJobSpawner::new(
            client,
            opts.namespace.clone(),
            worker_image,
            opts.etcd_endpoints.join(","),
        ))
    } else {
        Arc::new(LocalJobSpawner::new(registry))
    };

    let config = CoordinatorConfig {
        cloud: if opts.cluster { CloudTag::Cluster } else { CloudTag::Local },
        lease_ttl: Duration::from_secs(opts.lease_ttl_secs),
        dependency_backoff: Duration::from_secs(opts.dependency_backoff_secs),
    };

    let coordinator = Arc::new(Coordinator::new(metadata, coordination, providers, spawner, config));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining watch loops");
        let _ = shutdown_tx.send(true);
    });

    coordinator.run(shutdown_rx).await?;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
