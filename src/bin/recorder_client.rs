//! Command line client for a running bpf-recorder.
//!
//! ```text
//! recorder-client start
//! recorder-client syscalls my-profile
//! recorder-client stop
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use bpfrecorder::config::DEFAULT_SOCKET_PATH;
use bpfrecorder::grpc::api::{EmptyRequest, ProfileRequest};
use bpfrecorder::grpc::dial;

#[derive(Debug, Parser)]
#[command(name = "recorder-client", version, about = "Control a bpf-recorder")]
struct Cli {
    /// Control socket of the recorder
    #[arg(long, env = "BPF_RECORDER_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Begin or join a recording session
    Start,
    /// Leave a recording session
    Stop,
    /// Print and consume the syscalls recorded for a profile
    Syscalls {
        /// Profile name from the pod annotation
        profile: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut client = dial(&cli.socket).await?;

    match cli.command {
        Command::Start => {
            client.start(EmptyRequest {}).await.context("start recording")?;
            println!("recording started");
        }
        Command::Stop => {
            client.stop(EmptyRequest {}).await.context("stop recording")?;
            println!("recording stopped");
        }
        Command::Syscalls { profile } => {
            let response = client
                .syscalls_for_profile(ProfileRequest { name: profile.clone() })
                .await
                .with_context(|| format!("get syscalls for profile {}", profile))?;
            for syscall in response.into_inner().syscalls {
                println!("{}", syscall);
            }
        }
    }

    Ok(())
}
