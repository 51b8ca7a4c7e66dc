//! Event pipeline: new PIDs from the kernel → containers → profiles

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::store::{CorrelationStore, ProcessRecord};
use crate::cache::TtlCache;
use crate::cluster::{ClusterError, PodInfo, PodLister};
use crate::config::Backoff;
use crate::ebpf::{comm_to_string, event_pid, BpfProgram};
use crate::host::{extract_container_id, HostInfo};
use crate::metrics::{self, outcome};

/// Resolves each new-process event and attributes it to a profile.
pub(crate) struct Pipeline {
    pub(crate) node_name: String,
    pub(crate) annotation_prefix: String,
    pub(crate) search_timeout: Duration,
    pub(crate) backoff: Backoff,
    pub(crate) host: Arc<dyn HostInfo>,
    pub(crate) pods: Arc<dyn PodLister>,
    pub(crate) store: Arc<CorrelationStore>,
    /// pid → container id
    pub(crate) containers: TtlCache<u32, String>,
}

impl Pipeline {
    /// Drain `events` until the sender side is closed or `shutdown` fires.
    ///
    /// Shutdown interrupts an in-flight cluster search; events still queued
    /// at that point are discarded.
    pub(crate) async fn run(
        self: Arc<Self>,
        program: Arc<dyn BpfProgram>,
        mut events: mpsc::Receiver<Vec<u8>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!("Event worker started");
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        debug!("Event stream closed, worker exiting");
                        return;
                    }
                },
            };

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                outcome = self.handle_event(program.as_ref(), &event) => metrics::record_event(outcome),
            }
        }

        debug!("Shutdown requested, discarding queued events");
    }

    /// Process one ring buffer record and return its outcome label.
    pub(crate) async fn handle_event(&self, program: &dyn BpfProgram, event: &[u8]) -> &'static str {
        let Some(pid) = event_pid(event) else {
            warn!(len = event.len(), "Dropping malformed event");
            return outcome::MALFORMED;
        };

        self.attribute(program, pid)
            .instrument(info_span!("event", pid))
            .await
    }

    async fn attribute(&self, program: &dyn BpfProgram, pid: u32) -> &'static str {
        let Some(container_id) = self.container_id(pid) else {
            return outcome::NO_CONTAINER;
        };
        debug!(pid, container_id = %container_id, "Found container for PID");

        if !self.store.has_pending(&container_id) {
            if let Err(outcome) = self.find_container(&container_id).await {
                return outcome;
            }
        }

        let Some(profile) = self.store.take_pending(&container_id) else {
            debug!(pid, container_id = %container_id, "Container is not recorded");
            return outcome::NOT_ANNOTATED;
        };

        let comm = match program.comm(pid) {
            Ok(Some(raw)) => comm_to_string(&raw),
            Ok(None) => {
                warn!(pid, "Unable to get command name for PID");
                String::new()
            }
            Err(e) => {
                warn!(pid, error = %e, "Unable to get command name for PID");
                String::new()
            }
        };

        info!(pid, profile = %profile, comm = %comm, "Saving PID for profile");
        self.store.append(&profile, ProcessRecord { pid, comm });
        outcome::RECORDED
    }

    fn container_id(&self, pid: u32) -> Option<String> {
        if let Some(id) = self.containers.get(&pid) {
            return Some(id);
        }

        match self.host.container_id(pid) {
            Ok(id) => {
                self.containers.insert(pid, id.clone());
                Some(id)
            }
            Err(e) => {
                // Most likely a host process or one that already exited.
                debug!(pid, error = %e, "No container ID for PID");
                None
            }
        }
    }

    /// Search the node's pods until `container_id` shows up or the search
    /// times out.
    async fn find_container(&self, container_id: &str) -> Result<(), &'static str> {
        match tokio::time::timeout(self.search_timeout, self.search(container_id)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(container_id, error = %e, "Unable to find container ID in cluster");
                Err(outcome::SEARCH_FAILED)
            }
            Err(_) => {
                error!(
                    container_id,
                    timeout = ?self.search_timeout,
                    "Timed out searching for container ID in cluster"
                );
                Err(outcome::SEARCH_TIMEOUT)
            }
        }
    }

    async fn search(&self, container_id: &str) -> Result<(), ClusterError> {
        let mut delay = self.backoff.initial;
        loop {
            debug!(container_id, "Searching for in-cluster container ID");
            let pods = self.pods.list_node_pods(&self.node_name).await?;
            if self.scan(&pods, container_id) {
                return Ok(());
            }

            tokio::time::sleep(delay).await;
            delay = self.backoff.next(delay);
        }
    }

    /// Note every annotated container as pending and report whether
    /// `container_id` was among them.
    fn scan(&self, pods: &[PodInfo], container_id: &str) -> bool {
        let mut found = false;
        for pod in pods {
            for status in &pod.containers {
                // Not started yet, so not the container we are after.
                if status.container_id.is_empty() {
                    debug!(pod = %pod.name, container = %status.name, "No container ID available");
                    continue;
                }

                let Some(id) = extract_container_id(&status.container_id) else {
                    warn!(
                        pod = %pod.name,
                        container = %status.name,
                        raw = %status.container_id,
                        "Unable to get container ID"
                    );
                    continue;
                };

                let key = format!("{}{}", self.annotation_prefix, status.name);
                if let Some(profile) = pod.annotations.get(&key) {
                    debug!(
                        profile = %profile,
                        container_id = id,
                        container = %status.name,
                        "Found profile to record"
                    );
                    self.store.set_pending(id, profile);
                }

                if id == container_id {
                    info!(container_id, container = %status.name, "Found container ID in cluster");
                    found = true;
                }
            }
        }
        found
    }
}
