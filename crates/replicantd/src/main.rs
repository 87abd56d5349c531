//! replicantd: the Replicant daemon.
//!
//! Watches Deployments in one namespace, keeps their desired replica
//! counts in memory, and serves them over a REST API that requires client
//! certificates:
//! - Replica cache (watch + reconciler)
//! - Mutation gateway (merge patches)
//! - Readiness gate
//! - REST API (mTLS) and probe listener (plain HTTP)
//!
//! # Usage
//!
//! ```text
//! replicantd --tls-enabled=true --tls-cert-file tls.crt \
//!     --tls-key-file tls.key --tls-client-ca-file ca.crt
//! replicantd gen-certs --out-dir ./certs --host localhost --host 127.0.0.1
//! ```

mod config;
mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};

#[derive(Parser)]
#[command(name = "replicantd", about = "Replicant deployment replica service", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    config: Config,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the API and probe listeners (the default).
    Serve,

    /// Write a development CA, server certificate and client certificate.
    GenCerts {
        /// Directory to write PEM files into.
        #[arg(long, default_value = "certs")]
        out_dir: PathBuf,

        /// Hostname or IP the server certificate is valid for. Repeatable.
        #[arg(long = "host", default_values = ["localhost", "127.0.0.1"])]
        hosts: Vec<String>,

        /// Common name of the client certificate.
        #[arg(long, default_value = "replicant-client")]
        client_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.config.log_format);

    // kube's TLS stack and ours share the process-wide provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(namespace = %cli.config.namespace, "replicantd starting");
            server::run(cli.config).await
        }
        Command::GenCerts {
            out_dir,
            hosts,
            client_name,
        } => {
            let paths = replicant_tls::write_bundle(&out_dir, &hosts, &client_name)?;
            info!(
                ca = %paths.ca_cert.display(),
                server_cert = %paths.server_cert.display(),
                client_cert = %paths.client_cert.display(),
                "certificates written"
            );
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,replicantd=debug,replicant=debug".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}
