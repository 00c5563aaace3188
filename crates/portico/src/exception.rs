//! # 例外ハンドラ
//!
//! ハンドラ・依存が返す [`ApiError`] と、エラー識別子からハンドラへの対応表。
//!
//! ## 処理の流れ
//!
//! 1. `ApiError` は RFC 9457 形式の本文を持つレスポンスに変換され、
//!    自身をレスポンス extensions に記録する
//! 2. [`dispatch_exceptions`] ミドルウェアが 4xx / 5xx レスポンスを検査し、
//!    `Kind` → `Status` の順に登録済みハンドラを探す
//! 3. 見つからなければレスポンスをそのまま返す
//!
//! debug モードでは、ハンドラ未登録の 5xx について固定メッセージではなく
//! 実際の detail を返す。

use std::{borrow::Cow, collections::HashMap, fmt, sync::Arc};

use axum::{
    Json,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use portico_shared::{ErrorResponse, event_log::error};

/// HTTP ハンドラ・依存が返すエラー
///
/// `kind` は ProblemDetails の `type` URI 末尾と、例外ハンドラの検索キーを兼ねる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    kind:   Cow<'static, str>,
    detail: String,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        kind: impl Into<Cow<'static, str>>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            kind: kind.into(),
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad-request", detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not-found", detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", detail)
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation-error", detail)
    }

    /// 500 Internal Server Error
    ///
    /// `detail` はログと debug モードのレスポンスにのみ使われる。
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal-error", detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// レスポンス本文を組み立てる
    ///
    /// 5xx の detail は `expose_detail` が真のときだけ公開する。
    pub fn to_error_response(&self, expose_detail: bool) -> ErrorResponse {
        let title = self.status.canonical_reason().unwrap_or("Error");
        let detail = if self.status.is_server_error() && !expose_detail {
            ErrorResponse::internal_error().detail
        } else {
            self.detail.clone()
        };
        ErrorResponse::new(&self.kind, title, self.status.as_u16(), detail)
    }

    fn render(self, expose_detail: bool) -> Response {
        let body = self.to_error_response(expose_detail);
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.kind, self.detail)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                error.category = error::category::APPLICATION,
                error.kind = %self.kind,
                "{}",
                self.detail
            );
        }
        self.render(false)
    }
}

/// 例外ハンドラの検索キー
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionKey {
    /// レスポンスのステータスコード
    Status(StatusCode),
    /// [`ApiError::kind`]
    Kind(String),
}

impl From<StatusCode> for ExceptionKey {
    fn from(status: StatusCode) -> Self {
        Self::Status(status)
    }
}

impl From<&str> for ExceptionKey {
    fn from(kind: &str) -> Self {
        Self::Kind(kind.to_string())
    }
}

/// 例外ハンドラに渡される情報
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub method: Method,
    pub path:   String,
    pub status: StatusCode,
    /// レスポンスが `ApiError` 由来であればその値
    pub error:  Option<ApiError>,
}

type HandlerFn = dyn Fn(ErrorContext) -> Response + Send + Sync;

/// 例外ハンドラ
#[derive(Clone)]
pub struct ExceptionHandler(Arc<HandlerFn>);

impl ExceptionHandler {
    pub fn new<F, R>(handler: F) -> Self
    where
        F: Fn(ErrorContext) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        Self(Arc::new(move |context| handler(context).into_response()))
    }

    pub fn call(&self, context: ErrorContext) -> Response {
        (self.0)(context)
    }
}

impl fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExceptionHandler(..)")
    }
}

/// エラー識別子から例外ハンドラへの対応表
#[derive(Debug, Clone, Default)]
pub struct ExceptionHandlers {
    handlers: HashMap<ExceptionKey, ExceptionHandler>,
}

impl ExceptionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドラを登録する（同じキーは上書き）
    pub fn insert(&mut self, key: impl Into<ExceptionKey>, handler: ExceptionHandler) {
        self.handlers.insert(key.into(), handler);
    }

    pub fn get(&self, key: &ExceptionKey) -> Option<&ExceptionHandler> {
        self.handlers.get(key)
    }

    pub fn contains_key(&self, key: &ExceptionKey) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// `Kind` を優先し、次に `Status` でハンドラを探す
    pub fn lookup(&self, error: Option<&ApiError>, status: StatusCode) -> Option<&ExceptionHandler> {
        error
            .and_then(|error| self.get(&ExceptionKey::Kind(error.kind().to_string())))
            .or_else(|| self.get(&ExceptionKey::Status(status)))
    }
}

impl<K: Into<ExceptionKey>> FromIterator<(K, ExceptionHandler)> for ExceptionHandlers {
    fn from_iter<I: IntoIterator<Item = (K, ExceptionHandler)>>(iter: I) -> Self {
        let mut handlers = Self::new();
        for (key, handler) in iter {
            handlers.insert(key, handler);
        }
        handlers
    }
}

/// [`dispatch_exceptions`] の State
#[derive(Debug, Clone)]
pub(crate) struct ExceptionState {
    pub(crate) handlers: Arc<ExceptionHandlers>,
    pub(crate) debug:    bool,
}

/// 4xx / 5xx レスポンスを例外ハンドラに振り分けるミドルウェア
pub(crate) async fn dispatch_exceptions(
    State(state): State<ExceptionState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let error = response.extensions().get::<ApiError>().cloned();
    if let Some(handler) = state.handlers.lookup(error.as_ref(), status) {
        tracing::debug!(%status, path = %path, "例外ハンドラでレスポンスを置き換えます");
        return handler.call(ErrorContext {
            method,
            path,
            status,
            error,
        });
    }

    match error {
        Some(error) if state.debug && status.is_server_error() => error.render(true),
        _ => response,
    }
}
