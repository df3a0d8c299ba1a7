use claude_proxy::error::ProxyError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,claude_proxy=debug")),
        )
        .json()
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ProxyError> {
    let state = claude_proxy::app::load_state().await?;
    let app = claude_proxy::app::build_app(state.clone());
    let addr: std::net::SocketAddr = state
        .runtime
        .listen
        .parse()
        .map_err(|err: std::net::AddrParseError| {
            ProxyError::Internal(format!("invalid listen address: {err}"))
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ProxyError::Internal(format!("listen failed: {err}")))?;
    tracing::info!(
        relay_mode = state.runtime.relay_mode.as_str(),
        "listening on {}",
        addr
    );
    axum::serve(listener, app)
        .await
        .map_err(|err| ProxyError::Internal(format!("serve failed: {err}")))?;
    Ok(())
}
