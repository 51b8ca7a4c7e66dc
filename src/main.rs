use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use bpfrecorder::btf::BtfTable;
use bpfrecorder::cluster::KubeClient;
use bpfrecorder::ebpf::default_backend;
use bpfrecorder::grpc::{prepare_socket, serve};
use bpfrecorder::host::ProcHost;
use bpfrecorder::syscalls::HostSyscallTable;
use bpfrecorder::tracing::init_tracing;
use bpfrecorder::{metrics, Args, Collaborators, Recorder};

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(error = %e, "Unable to listen for SIGTERM");
            None
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = async {
            match terminate.as_mut() {
                Some(stream) => { stream.recv().await; }
                None => std::future::pending::<()>().await,
            }
        } => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format).map_err(|e| anyhow::anyhow!(e))?;

    // 1. Configuration (node name is mandatory)
    let config = args.into_config().context("validate configuration")?;
    metrics::init();

    let btf_table = match &config.btf_table {
        Some(path) => BtfTable::from_file(path)
            .with_context(|| format!("load BTF table {}", path.display()))?,
        None => BtfTable::default(),
    };
    info!(entries = btf_table.len(), "BTF table ready");

    // 2. Collaborators
    let pods = KubeClient::in_cluster().context("create in-cluster client")?;
    let deps = Collaborators {
        backend: default_backend(),
        host: Arc::new(ProcHost::default()),
        pods: Arc::new(pods),
        syscalls: Arc::new(HostSyscallTable::native()),
    };
    let recorder = Arc::new(Recorder::new(&config, deps).with_btf_table(btf_table));

    // 3. Control socket
    let listener = prepare_socket(&config.socket_path, config.socket_owner, config.socket_owner)
        .with_context(|| format!("prepare socket {}", config.socket_path.display()))?;
    info!(socket = %config.socket_path.display(), "Control socket ready");

    // 4. Self-test: the program must load on this node
    if config.self_test {
        if let Err(e) = recorder.self_test().await {
            recorder.shutdown().await;
            return Err(e).context("bpf load/unload self-test");
        }
    }

    // 5. Metrics endpoint
    let metrics_task = config.metrics_addr.map(|addr| {
        tokio::spawn(async move {
            if let Err(e) = metrics::serve_metrics(addr).await {
                error!(error = %e, "Metrics server failed");
            }
        })
    });

    // 6. Serve until signalled
    let result = serve(
        listener,
        Arc::clone(&recorder),
        config.max_message_size,
        shutdown_signal(),
    )
    .await;

    if let Some(task) = metrics_task {
        task.abort();
    }
    recorder.shutdown().await;
    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        warn!(error = %e, "Unable to remove control socket");
    }

    result.context("serve gRPC API")
}
