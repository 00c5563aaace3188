//! # Canonical Log Line ミドルウェア
//!
//! HTTP リクエスト完了時に、そのリクエストの要点（メソッド、パス、ステータス、
//! レイテンシ）を1行に集約したサマリログを出力する tower Layer。
//!
//! `TraceLayer` の内側に配置し、`http_request` スパンのフィールド（`request_id` 等）が
//! JSON ログに自動的に含まれるようにする:
//!
//! ```text
//! SetRequestIdLayer → TraceLayer → CanonicalLogLineLayer → [ユーザーミドルウェア] → handler
//! ```
//!
//! ドキュメントページや OpenAPI JSON のようにノイズになるパスは
//! [`CanonicalLogLineLayer::skip_prefix`] で除外できる。

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use http::{Request, Response, StatusCode};
use tower::{Layer, Service};
use tracing::Level;

/// Canonical Log Line を出力する Layer
///
/// 2xx〜4xx は INFO、5xx は WARN、内側の Service がエラーを返した場合は ERROR。
/// いずれも `log.type = "canonical"` マーカー付き。
#[derive(Clone, Debug, Default)]
pub struct CanonicalLogLineLayer {
    skipped_prefixes: Arc<Vec<String>>,
}

impl CanonicalLogLineLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定プレフィックスで始まるパスをログ対象から除外する
    pub fn skip_prefix(mut self, prefix: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.skipped_prefixes).push(prefix.into());
        self
    }

    fn is_skipped(&self, path: &str) -> bool {
        self.skipped_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl<S> Layer<S> for CanonicalLogLineLayer {
    type Service = CanonicalLogLineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CanonicalLogLineService {
            inner,
            layer: self.clone(),
        }
    }
}

/// [`CanonicalLogLineLayer`] が生成する Service
#[derive(Clone, Debug)]
pub struct CanonicalLogLineService<S> {
    inner: S,
    layer: CanonicalLogLineLayer,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CanonicalLogLineService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // poll_ready 済みの inner を取り出し、代わりにクローンを残す
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.layer.is_skipped(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }
        let line = RequestLine {
            method:     req.method().to_string(),
            path:       req.uri().path().to_owned(),
            started_at: Instant::now(),
        };

        Box::pin(async move {
            let result = inner.call(req).await;
            match &result {
                Ok(response) => line.completed(response.status()),
                Err(err) => line.failed(err),
            }
            result
        })
    }
}

macro_rules! canonical_event {
    ($level:expr, $line:expr, $($fields:tt)*) => {
        tracing::event!(
            $level,
            log.r#type = "canonical",
            http.method = %$line.method,
            http.path = %$line.path,
            http.latency_ms = $line.started_at.elapsed().as_millis() as u64,
            $($fields)*
        )
    };
}

/// 1リクエスト分のサマリ
struct RequestLine {
    method:     String,
    path:       String,
    started_at: Instant,
}

impl RequestLine {
    fn completed(&self, status: StatusCode) {
        if status.is_server_error() {
            canonical_event!(Level::WARN, self, http.status_code = status.as_u16(), "リクエスト完了");
        } else {
            canonical_event!(Level::INFO, self, http.status_code = status.as_u16(), "リクエスト完了");
        }
    }

    fn failed(&self, err: &dyn std::fmt::Display) {
        canonical_event!(Level::ERROR, self, error.message = %err, "リクエスト処理エラー");
    }
}
