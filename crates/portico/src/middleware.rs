//! # ミドルウェア
//!
//! 記述子に登録するミドルウェアエントリ。各エントリは axum の `Router` に
//! tower Layer を掛ける変換として保持し、`App::into_router` で適用する。
//!
//! 適用順は登録順で、最初に登録したエントリが最も外側になる:
//!
//! ```text
//! [1 番目] → [2 番目] → … → 例外ハンドラ → ルート
//! ```

use std::{convert::Infallible, fmt, sync::Arc};

use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Response},
    routing::Route,
};
use tower::{Layer, Service};
use tower_http::cors::CorsLayer;

type ApplyFn = dyn Fn(Router) -> Router + Send + Sync;

/// 名前付きのミドルウェアエントリ
#[derive(Clone)]
pub struct Middleware {
    name:  String,
    apply: Arc<ApplyFn>,
}

impl Middleware {
    /// `Router` の変換関数からエントリを作る
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        Self {
            name:  name.into(),
            apply: Arc::new(apply),
        }
    }

    /// tower Layer からエントリを作る
    pub fn layer<L>(name: impl Into<String>, layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(name, move |router| router.layer(layer.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, router: Router) -> Router {
        (self.apply)(router)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// 全レスポンスに `Cache-Control: no-store` を付与する
pub fn no_cache() -> Middleware {
    Middleware::new("no_cache", |router| router.layer(from_fn(set_no_store)))
}

async fn set_no_store(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// CORS
pub fn cors(layer: CorsLayer) -> Middleware {
    Middleware::layer("cors", layer)
}

/// 登録順の先頭が最も外側になるよう適用する
pub(crate) fn apply_all(router: Router, middleware: &[Middleware]) -> Router {
    middleware
        .iter()
        .rev()
        .fold(router, |router, entry| entry.apply(router))
}
