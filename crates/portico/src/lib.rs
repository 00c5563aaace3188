//! # Portico
//!
//! axum 上に HTTP API を組み立てるためのアプリケーション記述子。
//!
//! ## 構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`app`] | 記述子本体。設定と登録を集約し、ルーター・生成器に委譲する |
//! | [`config`] | 構築オプションと、ファイル・環境変数からの設定読み込み |
//! | [`routing`] | ルート定義、サブルーターの取り込み、axum ルーターへの変換 |
//! | [`dependency`] | ハンドラ前に実行する名前付きガード |
//! | [`middleware`] | ミドルウェアエントリ |
//! | [`exception`] | `ApiError` と例外ハンドラ |
//! | [`lifecycle`] | 起動・停止フック |
//! | [`openapi`] | OpenAPI ドキュメント生成 |
//! | [`docs`] | Swagger UI / ReDoc ページ |
//! | [`server`] | シャットダウンシグナル |
//!
//! ## 使用例
//!
//! ```no_run
//! use portico::{App, AppConfig, Route, server::shutdown_signal};
//!
//! async fn list_items() -> &'static str {
//!     "[]"
//! }
//!
//! # async fn run() -> Result<(), portico::AppError> {
//! let mut app = App::new(AppConfig {
//!     title: "Inventory".to_string(),
//!     ..AppConfig::default()
//! });
//! app.add_route(Route::get("/items", list_items).tag("items"));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! app.serve(listener, shutdown_signal()).await
//! # }
//! ```

pub mod app;
pub mod config;
pub mod dependency;
pub mod docs;
pub mod error;
pub mod exception;
pub mod lifecycle;
pub mod middleware;
pub mod openapi;
pub mod response;
pub mod routing;
pub mod server;

pub use app::App;
pub use config::{AppConfig, AppSettings};
pub use dependency::{Dependency, DependencyOverrides, Guard, RequestHead};
pub use error::{AppError, DocsError, RouterError, SettingsError};
pub use exception::{ApiError, ErrorContext, ExceptionHandler, ExceptionHandlers, ExceptionKey};
pub use lifecycle::{Event, LifecycleHook};
pub use middleware::Middleware;
pub use openapi::{OpenApiGenerator, SchemaRequest, UtoipaGenerator, get_openapi};
pub use response::{ResponseSpec, ResponseType};
pub use routing::{ApiRouter, IncludeOptions, Route};
