//! # Portico 共有ユーティリティ
//!
//! このクレートは、Portico
//! プロジェクト全体で使用される共通ユーティリティを提供する。
//!
//! ## 設計方針
//!
//! - フレームワーク本体（`portico`）とアプリケーションの両方から依存される
//! - axum への依存を持たない純粋なデータ型・観測ユーティリティのみを配置
//! - 外部クレートへの依存は feature で切り替え、最小限に抑える

pub mod api_response;
#[cfg(feature = "observability")]
pub mod canonical_log;
pub mod error_response;
pub mod event_log;
pub mod health;
pub mod observability;

pub use api_response::ApiResponse;
pub use error_response::ErrorResponse;
pub use health::HealthResponse;
