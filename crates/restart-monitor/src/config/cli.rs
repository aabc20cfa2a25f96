use std::path::PathBuf;

use clap::Parser;

use crate::version;

#[derive(Parser, Clone, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long,
        env = "KUBE_MASTER",
        help = "Kubernetes API server URL, overrides the one from the kubeconfig"
    )]
    pub master: Option<String>,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        alias = "eventReason",
        env = "EVENT_REASON",
        default_value = "ContainerRestart",
        help = "Reason set on the events recorded for container restarts"
    )]
    pub event_reason: String,

    #[arg(
        long,
        env = "EVENT_SOURCE_COMPONENT",
        default_value = "kube-restart-monitor",
        help = "Source component set on the recorded events"
    )]
    pub event_source: String,

    #[arg(
        long,
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds to wait for the API server to accept an event before giving up on it"
    )]
    pub event_timeout_secs: u64,

    #[arg(
        long,
        default_value = "300",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Base watch timeout in seconds, each watch picks a random timeout in [base, 2*base)"
    )]
    pub watch_timeout_secs: u64,

    #[arg(
        long,
        default_value = "128",
        value_parser = parse_capacity,
        help = "Number of pod events buffered between the watch and the restart detector"
    )]
    pub queue_capacity: usize,
}

fn parse_capacity(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("queue capacity must be at least 1".to_string()),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(format!("invalid queue capacity '{value}': {e}")),
    }
}
