//! kshield: raw syscall tracing with kernel-side fillers and policy evaluation.
//!
//! Startup loads a probe image and binds its filler programs into the tail-call
//! table ([`ebpf_manager`]). In steady state the per-CPU perf buffers are read,
//! reassembled into records, decoded and handed to an [`sink::EventSink`]
//! ([`event_processing`]).

use clap::Parser;
use std::path::PathBuf;

pub mod configuration;
pub mod ebpf_manager;
pub mod errors;
pub mod event_processing;
pub mod policy;
pub mod sink;

pub use configuration::{Configuration, ConfigurationBuilder, OutputFormat, SinkKind};
pub use errors::{KShieldError, PolicyError, RecordError, Result};

#[derive(Debug, Clone, Default, Parser)]
#[clap(name = "kshield", about = "eBPF syscall monitor with policy evaluation")]
pub struct Args {
    #[clap(long, help = "Configuration file path (YAML or JSON)")]
    pub config: Option<PathBuf>,

    #[clap(short, long, help = "Compiled probe object to load")]
    pub probe_image: Option<PathBuf>,

    #[clap(short, long, help = "Number of decoder workers")]
    pub workers: Option<usize>,

    #[clap(short, long, value_enum, help = "Where decoded events go")]
    pub sink: Option<SinkKind>,

    #[clap(long, value_enum, help = "Console output format")]
    pub format: Option<OutputFormat>,

    #[clap(short, long, help = "Show verbose output")]
    pub verbose: bool,

    #[clap(long, help = "Policy engine base URL")]
    pub opa_url: Option<String>,

    #[clap(long, help = "Directory of .rego policies to load at startup")]
    pub policy_dir: Option<PathBuf>,

    #[clap(short, long, help = "Duration to run in seconds")]
    pub duration: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_short_flags() {
        let args = Args::try_parse_from(["kshield", "-p", "/tmp/probe.o", "-w", "3", "-s", "console", "-v"])
            .unwrap();

        assert_eq!(args.probe_image, Some(PathBuf::from("/tmp/probe.o")));
        assert_eq!(args.workers, Some(3));
        assert_eq!(args.sink, Some(SinkKind::Console));
        assert!(args.verbose);
    }

    #[test]
    fn should_leave_unset_options_empty() {
        let args = Args::try_parse_from(["kshield"]).unwrap();

        assert_eq!(args.sink, None);
        assert_eq!(args.duration, None);
        assert!(!args.verbose);
    }

    #[test]
    fn should_reject_unknown_sink() {
        assert!(Args::try_parse_from(["kshield", "--sink", "syslog"]).is_err());
    }
}
