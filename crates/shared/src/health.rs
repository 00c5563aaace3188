//! # ヘルスチェック共通型
//!
//! Portico で構築したサービスの `/health` エンドポイントが返すレスポンス型。

use serde::{Deserialize, Serialize};

/// 稼働状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum HealthStatus {
    /// 起動フックが完了し、リクエストを受け付けられる
    Healthy,
    /// 起動処理中、またはシャットダウン処理中
    Starting,
}

/// ヘルスチェックレスポンス
///
/// `version` にはアプリケーション記述子のバージョン文字列を設定する。
///
/// ```
/// use portico_shared::{HealthResponse, health::HealthStatus};
///
/// let response = HealthResponse::new(HealthStatus::Healthy, "0.1.0");
/// assert_eq!(response.status, HealthStatus::Healthy);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status:  HealthStatus,
    pub version: String,
}

impl HealthResponse {
    pub fn new(status: HealthStatus, version: impl Into<String>) -> Self {
        Self {
            status,
            version: version.into(),
        }
    }
}
