use anyhow::Context;
use application::{ClientSession, Renderer};
use config::{print_usage, ClientConfig, ConfigError};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_USAGE: u8 = 1;
const EXIT_CLIENT: u8 = 2;
const EXIT_HTTP_BIND: u8 = 3;

const DEFAULT_LOG_FILTER: &str =
    "peerflix=info,application=info,api_server=info,infrastructure=info,domain=info,tower_http=warn";

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout belongs to the progress view.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match ClientConfig::load(None) {
        Ok(config) => config,
        Err(ConfigError::MissingTorrent) => {
            print_usage();
            return ExitCode::from(EXIT_USAGE);
        }
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    info!("🚀 Starting peerflix");

    let session = match ClientSession::start(config.clone()).await {
        Ok(session) => session,
        Err(e) => {
            error!("❌ Could not create torrent client: {}", e);
            return ExitCode::from(EXIT_CLIENT);
        }
    };

    let listener = match bind(config.http_port).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("❌ {:#}", e);
            session.close().await;
            return ExitCode::from(EXIT_HTTP_BIND);
        }
    };

    let code = run(session.clone(), listener).await;
    session.close().await;
    code
}

async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("could not bind HTTP port {port}"))
}

async fn run(session: Arc<ClientSession>, listener: TcpListener) -> ExitCode {
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            error!("❌ could not read HTTP address: {}", e);
            return ExitCode::from(EXIT_HTTP_BIND);
        }
    };

    let mut server = tokio::spawn(api_server::serve(listener, session.clone()));
    let mut download = session.spawn_download();
    let mut download_running = true;
    session.spawn_blocklist();
    session.spawn_player(port);

    let mut renderer = Renderer::new(
        format!("http://localhost:{port}"),
        session.config().engine.upload_enabled,
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let client = session.client();
                if let Some(frame) = renderer.frame(&client.stats(), client.ready_for_playback()) {
                    let mut stdout = std::io::stdout().lock();
                    let _ = stdout.write_all(frame.as_bytes());
                    let _ = stdout.flush();
                }
            }
            result = &mut download, if download_running => {
                download_running = false;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        error!("❌ Download failed: {}", e);
                        return ExitCode::from(EXIT_CLIENT);
                    }
                    Err(e) => {
                        error!("❌ Download task aborted: {}", e);
                        return ExitCode::from(EXIT_CLIENT);
                    }
                }
            }
            result = &mut server => {
                match result {
                    Ok(Ok(())) => warn!("HTTP server stopped"),
                    Ok(Err(e)) => error!("❌ HTTP server failed: {}", e),
                    Err(e) => error!("❌ HTTP server task aborted: {}", e),
                }
                return ExitCode::FAILURE;
            }
            _ = &mut shutdown => {
                info!("👋 Shutting down");
                return ExitCode::SUCCESS;
            }
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let streams = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
        signal(SignalKind::quit()),
    );
    match streams {
        (Ok(mut int), Ok(mut term), Ok(mut hup), Ok(mut quit)) => {
            tokio::select! {
                _ = int.recv() => {}
                _ = term.recv() => {}
                _ = hup.recv() => {}
                _ = quit.recv() => {}
            }
        }
        _ => {
            warn!("cannot install signal handlers, falling back to Ctrl-C");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
