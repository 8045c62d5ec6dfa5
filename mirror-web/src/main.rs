//! Mirror proxy server binary

use clap::Parser;
use mirror_core::MirrorConfig;
use mirror_web::{init_logging, MirrorServer, WebConfig};
use tracing::info;

/// Multi-account authenticated mirror proxy
#[derive(Parser)]
#[command(name = "mirror-web")]
#[command(about = "Serves per-account rewritten mirrors of an upstream application")]
#[command(version)]
struct Args {
    /// Server host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// JSON file with seed accounts
    #[arg(long)]
    accounts_file: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var(
            "RUST_LOG",
            format!(
                "mirror_web={0},mirror_sessions={0},mirror_fetch={0},tower_http=info",
                args.log_level
            ),
        );
    }
    init_logging();

    let mirror = MirrorConfig::from_env();
    let mut config = WebConfig::from_env();
    config.host = args.host;
    config.port = args.port;
    if args.accounts_file.is_some() {
        config.accounts_file = args.accounts_file;
    }

    info!(
        address = %config.address(),
        upstream = %mirror.upstream.base_url,
        solver = %mirror.solver.url,
        "starting mirror server"
    );

    let server = MirrorServer::new(config, mirror).await?;
    server.start().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parsing() {
        let args = Args::parse_from(["mirror-web"]);
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 8080);

        let args = Args::parse_from([
            "mirror-web",
            "--host",
            "0.0.0.0",
            "--port",
            "3000",
            "--accounts-file",
            "accounts.json",
        ]);
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.port, 3000);
        assert_eq!(args.accounts_file.as_deref(), Some("accounts.json"));
    }
}
