//! # Portico デモサーバー
//!
//! [`portico_demo::build_app`] で組み立てた記述子を HTTP サーバーとして起動する。
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `PORTICO_HOST` | No | バインドアドレス（デフォルト: `0.0.0.0`） |
//! | `PORTICO_PORT` | No | ポート番号（デフォルト: `8000`） |
//! | `PORTICO_SETTINGS` | No | 記述子の設定ファイル（TOML / YAML / JSON） |
//! | `PORTICO_ADMIN_API_KEY` | No | `/admin` 配下で要求する API キー |
//! | `PORTICO__*` | No | 記述子の設定（例: `PORTICO__TITLE`） |
//! | `LOG_FORMAT` | No | `json` で JSON 形式のログ |
//!
//! ## 起動方法
//!
//! ```bash
//! PORTICO_PORT=8000 PORTICO__TITLE=Inventory cargo run -p portico-demo
//! ```

use portico::{AppSettings, server::shutdown_signal};
use portico_demo::{build_app, config::DemoConfig};
use portico_shared::observability::{TracingConfig, init_tracing};
use tokio::net::TcpListener;

/// 以下の順序で初期化を行う:
///
/// 1. 環境変数の読み込み（.env ファイル）
/// 2. トレーシングの初期化
/// 3. サーバー設定・記述子設定の読み込み
/// 4. 記述子の組み立て
/// 5. HTTP サーバーの起動（起動フック → 配信 → 停止フック）
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    init_tracing(
        &TracingConfig::from_env("portico-demo")
            .with_default_directives("info,portico=debug,portico_demo=debug"),
    );
    let _tracing_guard = tracing::info_span!("app", service = "portico-demo").entered();

    let config = DemoConfig::from_env()?;
    let settings = AppSettings::load(config.settings_path.as_deref())?;
    let app = build_app(settings, config.admin_api_key.clone())?;

    let listener = TcpListener::bind(config.addr()).await?;
    tracing::info!(
        "{} {} を起動します: {}",
        app.title,
        app.version,
        listener.local_addr()?
    );

    app.serve(listener, shutdown_signal()).await?;

    tracing::info!("サーバーを停止しました");
    Ok(())
}
