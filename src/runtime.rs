//! Glue between a [`Server`] and the process: signal handling and the
//! default access policy. Out of scope per spec: argument parsing (the
//! binaries own that) and structured logging configuration (the binaries
//! install a `tracing` subscriber before calling [`serve`]).

use crate::access::AllowAll;
use crate::server::{Server, SocksVersion};

/// Runs one server instance until SIGINT/SIGTERM. A bind failure at
/// startup is fatal and propagates to the caller; once listening, a
/// transient accept error is retried internally by [`Server::run`] and
/// never reaches here.
pub async fn serve(version: SocksVersion, port: u16) -> std::io::Result<()> {
    let server = Server::new(version, port, AllowAll);
    let stop = server.stop_handle();

    tokio::select! {
        result = server.run() => result,
        _ = shutdown_signal() => {
            stop.notify_one();
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl_c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
