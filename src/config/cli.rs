//! Command-line argument definitions for the bind-mount proxy.

use camino::Utf8PathBuf;
use clap::Parser;

const AFTER_HELP: &str = "\
LISTEN_SPEC is either a port (ie. :1080) or an IP and port (ie. 127.0.0.1:1080).

OPENSHIFT_BINARY is the path to an openshift binary; when no rules file is
configured it is bind-mounted at /usr/bin/openshift into every OpenShift
origin image.

Example:
  bindmount-proxy :2375 \"$(which openshift)\"";

/// Command-line interface for the bind-mount proxy.
#[derive(Debug, Parser)]
#[command(name = "bindmount-proxy")]
#[command(
    author,
    version,
    about = "Container engine API proxy that injects bind mounts into created containers",
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Address to listen on, for example `:2375` or `127.0.0.1:2375`.
    #[arg(value_name = "LISTEN_SPEC")]
    pub listen: Option<String>,

    /// Path to an openshift binary used by the built-in rule set.
    #[arg(value_name = "OPENSHIFT_BINARY")]
    pub openshift_binary: Option<Utf8PathBuf>,

    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<Utf8PathBuf>,

    /// Path to a JSON rules file.
    #[arg(long)]
    pub rules: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long)]
    pub engine_socket: Option<String>,

    /// Mode appended to each injected bind (`z`, `Z`, `ro`, or empty for none).
    #[arg(long)]
    pub bind_mode: Option<String>,
}
