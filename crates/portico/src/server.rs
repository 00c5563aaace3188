//! # サーバー起動補助

use tokio::signal;

/// Ctrl+C または SIGTERM を待つ
///
/// `App::serve` の `shutdown` 引数にそのまま渡せる。
/// シグナルハンドラの登録に失敗した側は待機を続ける。
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Ctrl+C ハンドラの登録に失敗しました: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("SIGTERM ハンドラの登録に失敗しました: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Ctrl+C を受信しました"),
        () = terminate => tracing::info!("SIGTERM を受信しました"),
    }
}
