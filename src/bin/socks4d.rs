//! `socks4d <port>` — a SOCKS4(a) relay server bound to `0.0.0.0:<port>`.

use clap::Parser;
use socksd::runtime;
use socksd::server::SocksVersion;

#[derive(Parser)]
#[command(name = "socks4d", about = "SOCKS4(a) relay server")]
struct Cli {
    /// Port to listen on.
    port: u16,
}

#[tokio::main]
async fn main() {
    if std::env::args().count() < 2 {
        eprintln!("usage: socks4d <port>");
        std::process::exit(1);
    }
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = runtime::serve(SocksVersion::V4, cli.port).await {
        tracing::error!(reason = %err, "socks4d exiting");
        std::process::exit(1);
    }
}
