//! # 依存（Dependency）
//!
//! ハンドラの前に実行される名前付きのガード。
//! 記述子全体・サブルーター取り込み時・ルート単位で宣言でき、
//! 実行順は「記述子 → 取り込み時 → ルート」の宣言順。
//!
//! 最初に失敗したガードの [`ApiError`] がそのままレスポンスになり、
//! 後続のガードとハンドラは実行されない。
//!
//! 依存は名前で識別され、[`DependencyOverrides`] で差し替えられる
//! （テストで認証ガードを無効化する用途など）。

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::exception::ApiError;

/// ガードに渡すリクエスト情報
///
/// 本文は含めない（ガードはヘッダー・パス・メソッドのみで判定する）。
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method:  Method,
    pub uri:     Uri,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn from_request<B>(request: &axum::http::Request<B>) -> Self {
        Self {
            method:  request.method().clone(),
            uri:     request.uri().clone(),
            headers: request.headers().clone(),
        }
    }

    /// ヘッダー値を文字列で取得する（非 ASCII の値は `None`）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// 依存の検査ロジック
#[async_trait]
pub trait Guard: Send + Sync {
    async fn check(&self, head: &RequestHead) -> Result<(), ApiError>;
}

struct FnGuard<F>(F);

#[async_trait]
impl<F> Guard for FnGuard<F>
where
    F: Fn(&RequestHead) -> Result<(), ApiError> + Send + Sync,
{
    async fn check(&self, head: &RequestHead) -> Result<(), ApiError> {
        (self.0)(head)
    }
}

/// 名前付きの依存宣言
#[derive(Clone)]
pub struct Dependency {
    name:  String,
    guard: Arc<dyn Guard>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, guard: impl Guard + 'static) -> Self {
        Self {
            name:  name.into(),
            guard: Arc::new(guard),
        }
    }

    /// 同期クロージャから依存を作る
    pub fn from_fn<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&RequestHead) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        Self::new(name, FnGuard(check))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn check(&self, head: &RequestHead) -> Result<(), ApiError> {
        self.guard.check(head).await
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// 依存の差し替え表（キーは依存名）
#[derive(Debug, Clone, Default)]
pub struct DependencyOverrides {
    overrides: HashMap<String, Dependency>,
}

impl DependencyOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name` の依存を `replacement` に差し替える
    pub fn insert(&mut self, name: impl Into<String>, replacement: Dependency) {
        self.overrides.insert(name.into(), replacement);
    }

    pub fn remove(&mut self, name: &str) -> Option<Dependency> {
        self.overrides.remove(name)
    }

    pub fn clear(&mut self) {
        self.overrides.clear();
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// 差し替えがあればそれを、なければ元の依存を返す
    pub fn resolve<'a>(&'a self, dependency: &'a Dependency) -> &'a Dependency {
        self.overrides.get(dependency.name()).unwrap_or(dependency)
    }
}

/// ルートに適用される依存の列
#[derive(Debug, Clone)]
pub(crate) struct DependencyChain(Arc<[Dependency]>);

impl DependencyChain {
    pub(crate) fn new(dependencies: Vec<Dependency>) -> Self {
        Self(dependencies.into())
    }
}

/// 依存を宣言順に実行するミドルウェア
pub(crate) async fn run_dependencies(
    State(chain): State<DependencyChain>,
    request: Request,
    next: Next,
) -> Response {
    let head = RequestHead::from_request(&request);
    for dependency in chain.0.iter() {
        if let Err(err) = dependency.check(&head).await {
            tracing::debug!(
                dependency = dependency.name(),
                status = %err.status(),
                "依存の検査に失敗しました"
            );
            return err.into_response();
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::{
        Router,
        body::Body,
        http::StatusCode,
        middleware::from_fn_with_state,
        routing::get,
    };
    use tower::ServiceExt;

    use super::*;

    fn require_header(name: &'static str) -> Dependency {
        Dependency::from_fn(name, move |head| {
            head.header(name)
                .map(|_| ())
                .ok_or_else(|| ApiError::unauthorized(format!("{name} ヘッダーが必要です")))
        })
    }

    struct RecordingGuard {
        label: &'static str,
        log:   Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Guard for RecordingGuard {
        async fn check(&self, _head: &RequestHead) -> Result<(), ApiError> {
            self.log.lock().unwrap().push(self.label);
            Ok(())
        }
    }

    fn app_with(chain: Vec<Dependency>) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(DependencyChain::new(chain), run_dependencies))
    }

    fn request(headers: &[(&str, &str)]) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_全依存が成功するとハンドラが実行される() {
        let app = app_with(vec![require_header("x-api-key")]);

        let response = app.oneshot(request(&[("x-api-key", "k")])).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_依存が失敗するとそのエラーがレスポンスになる() {
        let app = app_with(vec![require_header("x-api-key")]);

        let response = app.oneshot(request(&[])).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let error = response.extensions().get::<ApiError>().unwrap();
        assert_eq!(error.detail(), "x-api-key ヘッダーが必要です");
    }

    #[tokio::test]
    async fn test_依存は宣言順に実行され失敗以降は実行されない() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = app_with(vec![
            Dependency::new("first", RecordingGuard {
                label: "first",
                log:   log.clone(),
            }),
            require_header("x-tenant"),
            Dependency::new("third", RecordingGuard {
                label: "third",
                log:   log.clone(),
            }),
        ]);

        let response = app.oneshot(request(&[])).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_overridesは同名の依存を差し替える() {
        let original = require_header("x-api-key");
        let mut overrides = DependencyOverrides::new();
        overrides.insert("x-api-key", Dependency::from_fn("allow-all", |_| Ok(())));

        assert_eq!(overrides.resolve(&original).name(), "allow-all");
    }

    #[test]
    fn test_overridesに無い依存はそのまま返す() {
        let original = require_header("x-tenant");
        let overrides = DependencyOverrides::new();

        assert_eq!(overrides.resolve(&original).name(), "x-tenant");
        assert!(overrides.is_empty());
    }
}
