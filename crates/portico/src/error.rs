//! # Portico エラー定義
//!
//! アプリケーション記述子の操作で発生するエラー。
//!
//! | エラー種別 | 発生箇所 |
//! |-----------|---------|
//! | `Configuration` | `openapi_url` 未設定での OpenAPI 生成など、記述子の設定不備 |
//! | `Router` | サブルーター取り込み時のプレフィックス・パス不正 |
//! | `Docs` | ドキュメントページのテンプレート描画失敗 |
//! | `Lifecycle` | 起動・停止フックの失敗 |
//! | `Schema` | OpenAPI ドキュメントの JSON 化失敗 |
//! | `Io` | リスナー・サーバーの I/O |
//!
//! HTTP ハンドラが返すエラーはここではなく [`crate::exception::ApiError`] を使う。

use thiserror::Error;

/// 記述子レベルのエラー
#[derive(Debug, Error)]
pub enum AppError {
    #[error("設定エラー: {0}")]
    Configuration(String),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Docs(#[from] DocsError),

    #[error("ライフサイクルフック '{hook}' が失敗しました: {source}")]
    Lifecycle {
        hook:   String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("OpenAPI ドキュメントのシリアライズに失敗しました: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("サーバー I/O エラー: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub(crate) fn lifecycle(hook: &str, source: anyhow::Error) -> Self {
        Self::Lifecycle {
            hook:   hook.to_string(),
            source: source.into(),
        }
    }
}

/// ルーターのマージ操作で発生するエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("プレフィックスは '/' で始まり '/' で終わらない必要があります: {0:?}")]
    InvalidPrefix(String),

    #[error("プレフィックスとパスがともに空のルートは取り込めません (route: {0})")]
    EmptyPath(String),
}

/// ドキュメントページ描画エラー
#[derive(Debug, Error)]
pub enum DocsError {
    #[error("ドキュメントテンプレートの描画に失敗しました: {0}")]
    Template(String),
}

impl From<tera::Error> for DocsError {
    fn from(err: tera::Error) -> Self {
        // tera::Error の Display は最上位のみなので原因チェーンも含める
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Template(message)
    }
}

/// 設定ファイル・環境変数の読み込みエラー
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("設定の読み込みに失敗しました: {0}")]
    Load(#[from] config::ConfigError),
}
