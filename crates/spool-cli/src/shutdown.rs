use tokio_util::sync::CancellationToken;

/// Returns a token that is cancelled on Ctrl-C.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("received Ctrl-C, shutting down");
        token_clone.cancel();
    });

    token
}
