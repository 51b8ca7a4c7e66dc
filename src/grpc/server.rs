use std::fs;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use nix::unistd::{chown, Gid, Uid};
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, info_span, Instrument};

use super::api::bpf_recorder_server::{BpfRecorder, BpfRecorderServer};
use super::api::{EmptyRequest, EmptyResponse, ProfileRequest, SyscallsResponse};
use crate::metrics::GRPC_REQUEST_DURATION;
use crate::recorder::Recorder;

/// gRPC front end of a [`Recorder`].
pub struct RecorderService {
    recorder: Arc<Recorder>,
}

impl RecorderService {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self { recorder }
    }
}

fn observe<T>(method: &str, start: Instant, result: &Result<T, Status>) {
    let code = match result {
        Ok(_) => "ok".to_string(),
        Err(status) => format!("{:?}", status.code()),
    };
    GRPC_REQUEST_DURATION
        .with_label_values(&[method, &code])
        .observe(start.elapsed().as_secs_f64());
}

#[tonic::async_trait]
impl BpfRecorder for RecorderService {
    async fn start(
        &self,
        _request: Request<EmptyRequest>,
    ) -> Result<Response<EmptyResponse>, Status> {
        let start = Instant::now();
        let result = self
            .recorder
            .start()
            .instrument(info_span!("rpc", method = "start"))
            .await
            .map(|()| Response::new(EmptyResponse {}))
            .map_err(Status::from);
        observe("start", start, &result);
        result
    }

    async fn stop(
        &self,
        _request: Request<EmptyRequest>,
    ) -> Result<Response<EmptyResponse>, Status> {
        let start = Instant::now();
        self.recorder
            .stop()
            .instrument(info_span!("rpc", method = "stop"))
            .await;
        let result = Ok(Response::new(EmptyResponse {}));
        observe("stop", start, &result);
        result
    }

    async fn syscalls_for_profile(
        &self,
        request: Request<ProfileRequest>,
    ) -> Result<Response<SyscallsResponse>, Status> {
        let start = Instant::now();
        let name = request.into_inner().name;
        let result = self
            .recorder
            .syscalls_for_profile(&name)
            .instrument(info_span!("rpc", method = "syscalls_for_profile", profile = %name))
            .await
            .map(|syscalls| Response::new(SyscallsResponse { syscalls }))
            .map_err(Status::from);
        observe("syscalls_for_profile", start, &result);
        result
    }
}

/// Bind the control socket at `path`, replacing a stale one, and hand it to
/// `uid`/`gid`.
pub fn prepare_socket(path: &Path, uid: u32, gid: u32) -> io::Result<UnixListener> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path)?;
    chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))).map_err(io::Error::from)?;
    Ok(listener)
}

/// Serve the recorder on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: UnixListener,
    recorder: Arc<Recorder>,
    max_message_size: usize,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()>,
{
    let service = BpfRecorderServer::new(RecorderService::new(recorder))
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);

    info!("Starting GRPC API server");
    Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
        .await
}
