//! # エラーレスポンス（RFC 9457 Problem Details）
//!
//! Portico が返すすべてのエラーレスポンスの本文形式。
//!
//! ## 設計
//!
//! - `ErrorResponse` は純粋なデータ構造（`Serialize` / `Deserialize` のみ）
//! - axum の `IntoResponse` 変換は `portico` 側の `ApiError` が担う
//! - `type` は `kind`（例: `"not-found"`）をベース URI に連結して生成する

use serde::{Deserialize, Serialize};

/// error_type URI のベースパス
pub const ERROR_TYPE_BASE: &str = "https://portico.dev/errors";

/// エラーレスポンス（RFC 9457 Problem Details）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(as = ProblemDetails))]
pub struct ErrorResponse {
   #[serde(rename = "type")]
   pub error_type: String,
   pub title:      String,
   pub status:     u16,
   pub detail:     String,
}

impl ErrorResponse {
   /// 汎用コンストラクタ
   ///
   /// `kind` はベース URI に付加される（例: `"item-not-found"`）。
   pub fn new(
      kind: &str,
      title: impl Into<String>,
      status: u16,
      detail: impl Into<String>,
   ) -> Self {
      Self {
         error_type: format!("{ERROR_TYPE_BASE}/{kind}"),
         title: title.into(),
         status,
         detail: detail.into(),
      }
   }

   /// `type` URI から kind 部分を取り出す
   ///
   /// ベース URI 以外の `type` を持つ場合は `None`。
   pub fn kind(&self) -> Option<&str> {
      self
         .error_type
         .strip_prefix(ERROR_TYPE_BASE)
         .and_then(|rest| rest.strip_prefix('/'))
   }

   /// 404 Not Found
   pub fn not_found(detail: impl Into<String>) -> Self {
      Self::new("not-found", "Not Found", 404, detail)
   }

   /// 500 Internal Server Error
   ///
   /// detail は固定値（内部情報を漏らさないため）。
   pub fn internal_error() -> Self {
      Self::new(
         "internal-error",
         "Internal Server Error",
         500,
         "内部エラーが発生しました",
      )
   }
}
