// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes backend: runs each rulebook worker as a Job.
//!
//! # Architecture
//!
//! One `start` creates a Job (backoff limit 0, short TTL after finish)
//! whose single Pod runs the worker, an image-pull Secret when the
//! decision environment needs registry auth, and optionally a Service
//! exposing the rulebook's source ports. The Job name is the engine
//! handle; every satellite resource carries a `job-name` label so
//! cleanup works from the handle alone.

use crate::error::EngineError;
use crate::logparse::{self, SINCE_MARGIN_SECS};
use crate::messages;
use crate::request::{ContainerRequest, EngineExtra};
use crate::{ContainerEngine, ContainerStatus, LogHandler};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, LocalObjectReference, Pod, PodSpec, PodTemplateSpec,
    Secret, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::Client;
use rr_core::ProcessStatus;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Finished Jobs stick around briefly for post-mortem log reads.
const KEEP_JOBS_FOR_SECONDS: i32 = 300;

const INVALID_IMAGE_NAME: &str = "InvalidImageName";
const IMAGE_PULL_BACK_OFF: &str = "ImagePullBackOff";
const IMAGE_PULL_ERROR: &str = "ErrImagePull";

const POD_FAILED_REASONS: [&str; 3] =
    [INVALID_IMAGE_NAME, IMAGE_PULL_BACK_OFF, IMAGE_PULL_ERROR];

const POD_START_POLL_MS: u64 = 500;
const POD_START_ATTEMPTS: usize = 120; // 120 * 500ms = 60s

/// In-cluster namespace file mounted by the service account.
pub const DEFAULT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Container engine backed by the Kubernetes Jobs API.
pub struct KubernetesEngine {
    client: Client,
    namespace: String,
    resource_prefix: String,
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

impl KubernetesEngine {
    /// Connect using in-cluster configuration. The namespace comes from
    /// the service-account mount; a missing file is an init error.
    pub async fn connect(
        resource_prefix: &str,
        namespace_file: &Path,
    ) -> Result<Self, EngineError> {
        let namespace = std::fs::read_to_string(namespace_file)
            .map_err(|_| {
                EngineError::Init(format!(
                    "Namespace file {} does not exist.",
                    namespace_file.display()
                ))
            })?
            .trim()
            .to_string();
        tracing::info!(%namespace, "kubernetes namespace resolved");

        let client = Client::try_default()
            .await
            .map_err(|e| EngineError::Init(format!("failed to create kube client: {e}")))?;

        Ok(Self {
            client,
            namespace,
            resource_prefix: resource_prefix.replace('_', "-"),
        })
    }

    pub fn job_name(&self, request: &ContainerRequest) -> String {
        job_name(&self.resource_prefix, request)
    }

    fn pod_name(&self, request: &ContainerRequest) -> String {
        pod_name(&self.resource_prefix, request)
    }

    fn secret_name(&self, request: &ContainerRequest) -> String {
        secret_name(&self.resource_prefix, request)
    }

    fn labels(job_name: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), "rulerunner".to_string()),
            ("job-name".to_string(), job_name.to_string()),
        ])
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn secrets(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// The single pod a Job owns, found through the `job-name` label.
    async fn get_job_pod(&self, job_name: &str) -> Result<Pod, EngineError> {
        let lp = ListParams::default().labels(&format!("job-name={job_name}"));
        let pods = self
            .pods()
            .list(&lp)
            .await
            .map_err(|e| EngineError::NotFound(format!("pod lookup for {job_name}: {e}")))?;
        pods.items.into_iter().next().ok_or_else(|| {
            EngineError::NotFound(format!("Pod with label job-name={job_name} not found"))
        })
    }

    fn build_container(&self, request: &ContainerRequest) -> Container {
        let ports: Vec<ContainerPort> = request
            .ports
            .iter()
            .map(|(_, port)| ContainerPort {
                container_port: i32::from(*port),
                ..Default::default()
            })
            .collect();

        let mut env = vec![EnvVar {
            name: "ANSIBLE_LOCAL_TEMP".to_string(),
            value: Some("/tmp".to_string()),
            ..Default::default()
        }];
        env.extend(request.env_vars.iter().map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        }));

        Container {
            name: request.name.clone(),
            image: Some(request.image_url.clone()),
            image_pull_policy: Some(request.pull_policy.to_string()),
            command: Some(vec![request.cmdline.command().to_string()]),
            args: Some(request.cmdline.to_args()),
            env: Some(env),
            ports: if ports.is_empty() { None } else { Some(ports) },
            ..Default::default()
        }
    }

    fn build_job(&self, request: &ContainerRequest, job_name: &str, with_secret: bool) -> Job {
        let pod_spec = PodSpec {
            restart_policy: Some("Never".to_string()),
            containers: vec![self.build_container(request)],
            image_pull_secrets: with_secret.then(|| {
                vec![LocalObjectReference { name: self.secret_name(request) }]
            }),
            ..Default::default()
        };

        let template = PodTemplateSpec {
            metadata: Some(ObjectMeta {
                name: Some(self.pod_name(request)),
                labels: Some(Self::labels(job_name)),
                ..Default::default()
            }),
            spec: Some(pod_spec),
        };

        Job {
            metadata: ObjectMeta {
                name: Some(job_name.to_string()),
                labels: Some(Self::labels(job_name)),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(0),
                ttl_seconds_after_finished: Some(KEEP_JOBS_FOR_SECONDS),
                template,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn create_secret(
        &self,
        request: &ContainerRequest,
        job_name: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        let Some(credential) = &request.credential else { return Ok(()) };

        // Replace any secret left over from a previous run.
        self.delete_secrets(job_name, request, log_handler).await?;

        let payload = serde_json::json!({
            "auths": {
                request.registry(): {
                    "username": credential.username,
                    "password": credential.secret,
                }
            }
        });

        let secret_name = self.secret_name(request);
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(Self::labels(job_name)),
                ..Default::default()
            },
            type_: Some("kubernetes.io/dockerconfigjson".to_string()),
            string_data: Some(BTreeMap::from([(
                ".dockerconfigjson".to_string(),
                payload.to_string(),
            )])),
            ..Default::default()
        };

        self.secrets()
            .create(&PostParams::default(), &secret)
            .await
            .map_err(|e| EngineError::Start(format!("secret creation failed: {e}")))?;
        tracing::info!(%secret_name, "created image pull secret");
        Ok(())
    }

    async fn delete_secrets(
        &self,
        job_name: &str,
        request: &ContainerRequest,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        let secret_name = self.secret_name(request);
        match self.secrets().delete(&secret_name, &DeleteParams::default()).await {
            Ok(_) => {
                log_handler.write_message(&format!("Secret {secret_name} is deleted."), true)?;
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => {
                return Err(EngineError::Cleanup(format!(
                    "failed to delete secret for {job_name}: {e}"
                )))
            }
        }
        Ok(())
    }

    async fn create_service(
        &self,
        request: &ContainerRequest,
        job_name: &str,
        service_name: &str,
    ) -> Result<(), EngineError> {
        let request_ports: Vec<u16> = request.ports.iter().map(|(_, p)| *p).collect();
        let services = self.services();

        match services.get_opt(service_name).await {
            Ok(Some(existing)) => {
                // Service already exists: every requested port must be open.
                let open: Vec<u16> = existing
                    .spec
                    .and_then(|s| s.ports)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|p| u16::try_from(p.port).ok())
                    .collect();
                let missing: Vec<u16> =
                    request_ports.iter().copied().filter(|p| !open.contains(p)).collect();
                if !missing.is_empty() {
                    return Err(EngineError::Start(format!(
                        "Request ports {missing:?} are not opened in the service \
                         {service_name} with ports: {open:?}"
                    )));
                }
                tracing::warn!(%service_name, "service already exists");
                Ok(())
            }
            Ok(None) => {
                let service = Service {
                    metadata: ObjectMeta {
                        name: Some(service_name.to_string()),
                        namespace: Some(self.namespace.clone()),
                        labels: Some(Self::labels(job_name)),
                        ..Default::default()
                    },
                    spec: Some(ServiceSpec {
                        selector: Some(Self::labels(job_name)),
                        ports: Some(
                            request_ports
                                .iter()
                                .map(|port| ServicePort {
                                    name: Some(format!("{service_name}-{port}")),
                                    protocol: Some("TCP".to_string()),
                                    port: i32::from(*port),
                                    target_port: Some(IntOrString::Int(i32::from(*port))),
                                    ..Default::default()
                                })
                                .collect(),
                        ),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                services
                    .create(&PostParams::default(), &service)
                    .await
                    .map_err(|e| EngineError::Start(format!("service creation failed: {e}")))?;
                tracing::info!(%service_name, "created service");
                Ok(())
            }
            Err(e) => Err(EngineError::Start(format!("service lookup failed: {e}"))),
        }
    }

    async fn delete_services(
        &self,
        job_name: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        let lp = ListParams::default().labels(&format!("job-name={job_name}"));
        let services = self
            .services()
            .list(&lp)
            .await
            .map_err(|e| EngineError::Cleanup(format!("service list failed: {e}")))?;

        for service in services {
            let Some(name) = service.metadata.name else { continue };
            match self.services().delete(&name, &DeleteParams::default()).await {
                Ok(_) => {
                    log_handler.write_message(&format!("Service {name} is deleted."), true)?;
                    tracing::info!(service = %name, "service deleted");
                }
                Err(e) if is_not_found(&e) => {}
                Err(e) => {
                    return Err(EngineError::Cleanup(format!(
                        "failed to delete service {name}: {e}"
                    )))
                }
            }
        }
        Ok(())
    }

    async fn delete_job(
        &self,
        job_name: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        match self.jobs().delete(job_name, &DeleteParams::background()).await {
            Ok(_) => {
                log_handler.write_message(&format!("Job {job_name} is cleaned up."), true)?;
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                log_handler.write_message(
                    &format!("Job {job_name} not found, assuming it's already deleted."),
                    true,
                )?;
                Ok(())
            }
            Err(e) => Err(EngineError::Cleanup(format!("Stop of {job_name} Failed: {e}"))),
        }
    }

    /// Poll until the Job's pod leaves Pending. Image-related waiting
    /// reasons surface as the distinct image-pull error kind so the
    /// manager can apply the failure policy instead of retrying forever.
    async fn wait_for_pod_start(&self, job_name: &str) -> Result<(), EngineError> {
        for attempt in 0..POD_START_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(POD_START_POLL_MS)).await;
            }
            let Ok(pod) = self.get_job_pod(job_name).await else { continue };
            let Some(status) = pod.status.as_ref() else { continue };
            let phase = status.phase.as_deref().unwrap_or("");

            if phase == "Pending" {
                let waiting = status
                    .container_statuses
                    .as_ref()
                    .and_then(|cs| cs.first())
                    .and_then(|c| c.state.as_ref())
                    .and_then(|s| s.waiting.as_ref());
                if let Some(waiting) = waiting {
                    if waiting.reason.as_deref().is_some_and(|r| POD_FAILED_REASONS.contains(&r))
                    {
                        return Err(EngineError::ImagePull(
                            waiting.message.clone().unwrap_or_default(),
                        ));
                    }
                }
            }

            match phase {
                "Running" | "Succeeded" | "Failed" => return Ok(()),
                "Unknown" => {
                    return Err(EngineError::Start(format!(
                        "Pod for {job_name} has Unknown status."
                    )))
                }
                _ => {}
            }
        }
        Err(EngineError::Start(format!(
            "pod for {} did not start within {}s",
            job_name,
            POD_START_ATTEMPTS as u64 * POD_START_POLL_MS / 1000
        )))
    }
}

/// Job name for a request: the engine handle. Deterministic so a failed
/// start can still clean up.
fn job_name(resource_prefix: &str, request: &ContainerRequest) -> String {
    format!(
        "{resource_prefix}-job-{}-{}",
        request.parent_id.short(12),
        request.process_id.short(12)
    )
}

fn pod_name(resource_prefix: &str, request: &ContainerRequest) -> String {
    format!(
        "{resource_prefix}-pod-{}-{}",
        request.parent_id.short(12),
        request.process_id.short(12)
    )
}

/// One secret per activation: restarts reuse it.
fn secret_name(resource_prefix: &str, request: &ContainerRequest) -> String {
    format!("{resource_prefix}-secret-{}", request.parent_id.short(12))
}

/// Map a pod's first container state onto the orchestrator statuses.
fn map_pod_status(job_name: &str, pod: &Pod) -> Result<ContainerStatus, EngineError> {
    let container_state = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|cs| cs.first())
        .and_then(|c| c.state.as_ref());

    if let Some(state) = container_state {
        if state.running.is_some() {
            return Ok(ContainerStatus::new(
                ProcessStatus::Running,
                messages::pod_running(job_name),
            ));
        }
        if let Some(terminated) = &state.terminated {
            if terminated.exit_code == 0 {
                return Ok(ContainerStatus::new(
                    ProcessStatus::Completed,
                    messages::pod_completed(job_name),
                ));
            }
            let message = match terminated.message.as_deref() {
                Some(m) if !m.is_empty() => m.to_string(),
                _ => messages::pod_generic_fail(job_name, i64::from(terminated.exit_code)),
            };
            return Ok(ContainerStatus::new(ProcessStatus::Failed, message));
        }
        if let Some(waiting) = &state.waiting {
            let reason = waiting.reason.as_deref().unwrap_or("");
            if POD_FAILED_REASONS.contains(&reason) {
                return Err(EngineError::ImagePull(
                    waiting.message.clone().unwrap_or_else(|| reason.to_string()),
                ));
            }
            // Still coming up; the readiness timeout owns slow starts.
            return Ok(ContainerStatus::new(
                ProcessStatus::Starting,
                format!("Pod {job_name} is waiting: {reason}"),
            ));
        }
    }

    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown");
    match phase {
        "Pending" => Ok(ContainerStatus::new(
            ProcessStatus::Starting,
            messages::pod_not_running(job_name),
        )),
        other => Ok(ContainerStatus::new(
            ProcessStatus::Error,
            messages::pod_unexpected(job_name, other),
        )),
    }
}

#[async_trait]
impl ContainerEngine for KubernetesEngine {
    async fn start(
        &self,
        request: &ContainerRequest,
        log_handler: &dyn LogHandler,
    ) -> Result<String, EngineError> {
        let job_name = self.job_name(request);
        log_handler.write_message("Creating Job", false)?;
        log_handler.write_message(&format!("Image URL is {}", request.image_url), true)?;

        self.create_secret(request, &job_name, log_handler).await?;

        let job = self.build_job(request, &job_name, request.credential.is_some());
        log_handler
            .write_message(&format!("Container args {:?}", request.cmdline.to_args()), true)?;
        self.jobs()
            .create(&PostParams::default(), &job)
            .await
            .map_err(|e| EngineError::Start(format!("job creation failed: {e}")))?;
        tracing::info!(%job_name, "submitted job");

        // After the job exists, any failure must clean up what was made.
        let result = async {
            match self.wait_for_pod_start(&job_name).await {
                Ok(()) => {}
                Err(EngineError::ImagePull(_)) => {
                    return Err(EngineError::ImagePull(messages::image_pull_error(
                        &request.image_url,
                    )))
                }
                Err(e) => return Err(e),
            }

            if !request.ports.is_empty() {
                if let EngineExtra::Kubernetes { service_name: Some(service_name) } =
                    &request.extra
                {
                    self.create_service(request, &job_name, service_name).await?;
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            let msg = format!("Failed to start job {job_name}, doing cleanup. Reason: {e}");
            tracing::error!(%job_name, error = %e, "job start failed");
            log_handler.write_message(&msg, true)?;
            if let Err(cleanup_err) = self.cleanup(&job_name, log_handler).await {
                tracing::warn!(%job_name, error = %cleanup_err, "cleanup after failed start");
            }
            return Err(e);
        }

        tracing::info!(%job_name, "job is running");
        log_handler.write_message(&format!("Job {job_name} is running"), true)?;
        Ok(job_name)
    }

    async fn get_status(&self, container_id: &str) -> Result<ContainerStatus, EngineError> {
        let pod = self.get_job_pod(container_id).await?;
        let status = map_pod_status(container_id, &pod)?;
        tracing::debug!(job = %container_id, status = %status.status, "job status");
        Ok(status)
    }

    async fn update_logs(
        &self,
        container_id: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        let pod = self.get_job_pod(container_id).await?;
        let pod_name = pod.metadata.name.clone().unwrap_or_default();

        let state = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .and_then(|cs| cs.first())
            .and_then(|c| c.state.as_ref());
        let readable =
            state.is_some_and(|s| s.running.is_some() || s.terminated.is_some());
        if !readable {
            let msg = format!("Pod with label {container_id} has unhandled state.");
            tracing::warn!(job = %container_id, "pod logs not readable yet");
            log_handler.write_message(&msg, true)?;
            return Ok(());
        }

        let mut lp = LogParams { timestamps: true, ..Default::default() };
        if let Some(cursor_ms) = log_handler.get_log_read_at() {
            let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
            let since = now_ms.saturating_sub(cursor_ms) / 1000 + SINCE_MARGIN_SECS;
            lp.since_seconds = i64::try_from(since).ok();
        }

        let raw = self
            .pods()
            .logs(&pod_name, &lp)
            .await
            .map_err(|e| EngineError::UpdateLogs(e.to_string()))?;
        logparse::apply_raw_logs(&raw, log_handler)?;
        Ok(())
    }

    async fn cleanup(
        &self,
        container_id: &str,
        log_handler: &dyn LogHandler,
    ) -> Result<(), EngineError> {
        // Secrets and services share the job-name label; the job itself
        // goes last so a partial cleanup stays discoverable.
        let lp = ListParams::default().labels(&format!("job-name={container_id}"));
        let secrets = self
            .secrets()
            .list(&lp)
            .await
            .map_err(|e| EngineError::Cleanup(format!("secret list failed: {e}")))?;
        for secret in secrets {
            let Some(name) = secret.metadata.name else { continue };
            match self.secrets().delete(&name, &DeleteParams::default()).await {
                Ok(_) => {
                    log_handler.write_message(&format!("Secret {name} is deleted."), true)?;
                }
                Err(e) if is_not_found(&e) => {}
                Err(e) => {
                    return Err(EngineError::Cleanup(format!(
                        "failed to delete secret {name}: {e}"
                    )))
                }
            }
        }

        self.delete_services(container_id, log_handler).await?;
        self.delete_job(container_id, log_handler).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "kubernetes_tests.rs"]
mod tests;
