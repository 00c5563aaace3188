//! # API レスポンスエンベロープ
//!
//! Portico で構築する API の成功レスポンス形式を提供する。
//!
//! - 単一リソース: `{ "data": T }`
//! - 一覧: `{ "data": [T], "total": n }`

use serde::{Deserialize, Serialize};

/// 単一リソースのレスポンス型
///
/// ```
/// use portico_shared::ApiResponse;
///
/// let response = ApiResponse::new("hello");
/// assert_eq!(response.data, "hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// 一覧レスポンス型
///
/// `total` は `data` の件数をそのまま持つ（ページネーションは行わない）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ListResponse<T> {
    pub data:  Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        let total = data.len();
        Self { data, total }
    }
}

impl<T> FromIterator<T> for ListResponse<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
