//! # アプリケーション記述子
//!
//! 設定（タイトル・バージョン・ドキュメント URL 等）と、ミドルウェア・依存・
//! 例外ハンドラ・ライフサイクルフックの登録を集約する。
//!
//! - ルーティングは所有する [`ApiRouter`] に委譲する
//! - OpenAPI ドキュメントは [`OpenApiGenerator`] に委譲する
//! - ドキュメントページは [`crate::docs`] の HTML 生成に委譲する
//!
//! ルートと起動・停止フックは `ApiRouter` のみが保持し、記述子のアクセサは
//! そこから借用する。記述子経由の変更はルーターから、ルーター経由の変更は
//! 記述子からそのまま見える。
//!
//! ## `into_router` が組み立てるレイヤー
//!
//! ```text
//! SetRequestId → Trace → CanonicalLogLine → PropagateRequestId
//!   → [ユーザーミドルウェア（登録順）] → 例外ハンドラ → 依存 → handler
//! ```

use std::{collections::HashSet, future::Future, sync::Arc};

use axum::{
    Router,
    body::Bytes,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
    response::Html,
    routing::get,
};
use portico_shared::{
    canonical_log::CanonicalLogLineLayer,
    event_log::{error, event},
    log_app_event,
    observability::{MakeRequestUuidV7, make_request_span},
};
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::openapi::{OpenApi, server::Server, tag::Tag};

use crate::{
    config::AppConfig,
    dependency::{Dependency, DependencyOverrides},
    docs::{self, DocsRenderer, RedocParams, SwaggerUiParams},
    error::{AppError, RouterError},
    exception::{ApiError, ExceptionHandler, ExceptionHandlers, ExceptionKey, ExceptionState, dispatch_exceptions},
    lifecycle::{self, Event, LifecycleHook},
    middleware::{self, Middleware},
    openapi::{OpenApiGenerator, SchemaRequest},
    routing::{self, ApiRouter, IncludeOptions, Route},
};

const OPENAPI_URL_NOT_SET: &str = "openapi_url が設定されていません";

/// アプリケーション記述子
pub struct App {
    pub debug: bool,
    pub title: String,
    pub description: String,
    pub version: String,
    pub openapi_url: Option<String>,
    pub openapi_tags: Option<Vec<Tag>>,
    pub servers: Option<Vec<Server>>,
    pub dependencies: Vec<Dependency>,
    pub docs_url: Option<String>,
    pub redoc_url: Option<String>,
    pub swagger_ui_oauth2_redirect_url: Option<String>,
    pub swagger_ui_init_oauth: Option<Value>,
    pub middleware: Vec<Middleware>,
    pub exception_handlers: ExceptionHandlers,
    pub extra: Map<String, Value>,
    pub schema_generator: Arc<dyn OpenApiGenerator>,
    router: ApiRouter,
    dependency_overrides: DependencyOverrides,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let router = ApiRouter::new()
            .with_default_response_type(config.default_response_type)
            .with_lifecycle(config.on_startup, config.on_shutdown);
        let mut app = Self {
            debug: config.debug,
            title: config.title,
            description: config.description,
            version: config.version,
            openapi_url: config.openapi_url,
            openapi_tags: config.openapi_tags,
            servers: config.servers,
            dependencies: config.dependencies,
            docs_url: config.docs_url,
            redoc_url: config.redoc_url,
            swagger_ui_oauth2_redirect_url: config.swagger_ui_oauth2_redirect_url,
            swagger_ui_init_oauth: config.swagger_ui_init_oauth,
            middleware: config.middleware,
            exception_handlers: config.exception_handlers,
            extra: config.extra,
            schema_generator: config.schema_generator,
            router,
            dependency_overrides: DependencyOverrides::new(),
        };
        for route in config.routes {
            app.add_route(route);
        }
        app
    }

    pub fn router(&self) -> &ApiRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut ApiRouter {
        &mut self.router
    }

    pub fn routes(&self) -> &[Route] {
        self.router.routes()
    }

    pub fn on_startup(&self) -> &[LifecycleHook] {
        self.router.on_startup()
    }

    pub fn on_shutdown(&self) -> &[LifecycleHook] {
        self.router.on_shutdown()
    }

    /// ルートをルーターの末尾に追加する
    pub fn add_route(&mut self, route: Route) {
        self.router.add_route(route);
    }

    /// サブルーターを取り込む（検証と結合はルーターが行う）
    pub fn include_router(
        &mut self,
        router: ApiRouter,
        options: IncludeOptions,
    ) -> Result<(), RouterError> {
        self.router.include_router(router, options)
    }

    pub fn add_event_handler(&mut self, event: Event, hook: LifecycleHook) {
        self.router.add_event_handler(event, hook);
    }

    /// ミドルウェアを追加する（先に追加したものほど外側）
    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.middleware.push(middleware);
    }

    pub fn add_exception_handler(&mut self, key: impl Into<ExceptionKey>, handler: ExceptionHandler) {
        self.exception_handlers.insert(key, handler);
    }

    /// 依存の差し替え表
    ///
    /// `into_router` 時点の内容が全ルートに適用される。
    pub fn dependency_overrides_mut(&mut self) -> &mut DependencyOverrides {
        &mut self.dependency_overrides
    }

    /// OpenAPI ドキュメントを生成する
    ///
    /// 呼び出しのたびに生成器を実行する。`openapi_url` が未設定または空文字列なら
    /// 設定エラー。
    pub fn openapi(&self) -> Result<OpenApi, AppError> {
        self.required_openapi_url()?;
        Ok(self.schema_generator.generate(&SchemaRequest {
            title:       &self.title,
            version:     &self.version,
            description: &self.description,
            routes:      self.router.routes(),
            tags:        self.openapi_tags.as_deref(),
            servers:     self.servers.as_deref(),
        }))
    }

    /// Swagger UI ページ
    ///
    /// 描画はテンプレートに委ねる。OpenAPI の URL を埋め込むため、
    /// `openapi_url` が無ければ [`App::openapi`] と同じ設定エラーを返す。
    pub fn docs(&self) -> Result<Html<String>, AppError> {
        let renderer = DocsRenderer::new()?;
        self.render_docs(&renderer)
    }

    /// ReDoc ページ
    ///
    /// [`App::docs`] と同じく、`openapi_url` が無ければ設定エラー。
    pub fn redoc(&self) -> Result<Html<String>, AppError> {
        let renderer = DocsRenderer::new()?;
        self.render_redoc(&renderer)
    }

    pub fn swagger_ui_oauth2_redirect(&self) -> Result<Html<String>, AppError> {
        Ok(docs::get_swagger_ui_oauth2_redirect_html()?)
    }

    fn render_docs(&self, renderer: &DocsRenderer) -> Result<Html<String>, AppError> {
        let openapi_url = self.required_openapi_url()?;
        let title = format!("{} - Swagger UI", self.title);
        let params = SwaggerUiParams::new(openapi_url, &title)
            .oauth2_redirect_url(configured(self.swagger_ui_oauth2_redirect_url.as_deref()))
            .init_oauth(self.swagger_ui_init_oauth.as_ref());
        Ok(renderer.swagger_ui(&params)?)
    }

    fn render_redoc(&self, renderer: &DocsRenderer) -> Result<Html<String>, AppError> {
        let openapi_url = self.required_openapi_url()?;
        let title = format!("{} - ReDoc", self.title);
        Ok(renderer.redoc(&RedocParams::new(openapi_url, &title))?)
    }

    fn required_openapi_url(&self) -> Result<&str, AppError> {
        configured(self.openapi_url.as_deref())
            .ok_or_else(|| AppError::Configuration(OPENAPI_URL_NOT_SET.to_string()))
    }

    /// axum の `Router` を組み立てる
    ///
    /// OpenAPI ドキュメントとドキュメントページはこの時点で一度だけ生成する。
    /// ユーザーが同じパスに `GET` ルートを登録していればそのページは登録しない。
    /// ページの URL が `/` で始まらない、パラメータを含む、または互いに重複する
    /// 場合は設定エラー。
    pub fn into_router(self) -> Result<Router, AppError> {
        let routes = self
            .router
            .into_axum(&self.dependencies, &self.dependency_overrides);
        let routes = self.add_pages(routes)?;

        let exception_state = ExceptionState {
            handlers: Arc::new(self.exception_handlers),
            debug:    self.debug,
        };
        let router = routes
            .fallback(|| async { ApiError::not_found("Not Found") })
            .layer(from_fn_with_state(exception_state, dispatch_exceptions));
        let router = middleware::apply_all(router, &self.middleware);

        let mut canonical_log = CanonicalLogLineLayer::new();
        for url in [
            self.openapi_url.as_deref(),
            self.docs_url.as_deref(),
            self.redoc_url.as_deref(),
        ]
        .into_iter()
        .filter_map(configured)
        {
            canonical_log = canonical_log.skip_prefix(url);
        }

        let router = router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(canonical_log)
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7));

        log_app_event!(
            event.category = event::category::ROUTING,
            event.action = event::action::APP_BUILT,
            event.result = event::result::SUCCESS,
            title = %self.title,
            route_count = self.router.routes().len(),
            middleware_count = self.middleware.len(),
            "アプリケーションを構築しました"
        );
        Ok(router)
    }

    /// OpenAPI JSON とドキュメントページのルートを追加する
    fn add_pages(&self, mut router: Router) -> Result<Router, AppError> {
        let Some(openapi_url) = configured(self.openapi_url.as_deref()) else {
            return Ok(router);
        };
        let docs_url = configured(self.docs_url.as_deref());
        let redirect_url = docs_url.and(configured(self.swagger_ui_oauth2_redirect_url.as_deref()));
        let redoc_url = configured(self.redoc_url.as_deref());

        let mut claimed = HashSet::new();
        for url in [Some(openapi_url), docs_url, redirect_url, redoc_url]
            .into_iter()
            .flatten()
        {
            if let Err(reason) = validate_page_url(url) {
                return Err(self.page_error(format!("ページの URL が不正です ({url}): {reason}")));
            }
            if !claimed.insert(url) {
                return Err(self.page_error(format!("ページの URL が重複しています: {url}")));
            }
        }

        let body = Bytes::from(serde_json::to_vec(&self.openapi()?)?);
        if self.claim_page(openapi_url) {
            router = router.route(
                openapi_url,
                get(move || async move {
                    (
                        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                        body,
                    )
                }),
            );
        }

        let renderer = DocsRenderer::new()?;
        if let Some(docs_url) = docs_url
            && self.claim_page(docs_url)
        {
            router = router.route(docs_url, html_page(self.render_docs(&renderer)?));
        }
        if let Some(redirect_url) = redirect_url
            && self.claim_page(redirect_url)
        {
            router = router.route(redirect_url, html_page(renderer.oauth2_redirect()?));
        }
        if let Some(redoc_url) = redoc_url
            && self.claim_page(redoc_url)
        {
            router = router.route(redoc_url, html_page(self.render_redoc(&renderer)?));
        }
        Ok(router)
    }

    fn page_error(&self, message: String) -> AppError {
        tracing::error!(
            error.category = error::category::CONFIGURATION,
            error.kind = error::kind::DOCS_PAGE,
            title = %self.title,
            "{message}"
        );
        AppError::Configuration(message)
    }

    /// ユーザーが同じパスに `GET` ルートを登録していなければ `true`
    fn claim_page(&self, url: &str) -> bool {
        let taken = self.router.routes().iter().any(|route| {
            route.is_routable() && route.path == url && route.methods.contains(&Method::GET)
        });
        if taken {
            tracing::warn!(url, "同じパスの GET ルートが登録済みのため、組み込みページを登録しません");
        }
        !taken
    }

    /// 起動フック → サーバー → 停止フックの順に実行する
    ///
    /// 起動フックが失敗した場合はサーバーを起動しない。
    /// `shutdown` が完了するとグレースフルシャットダウンに入る。
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let on_startup = self.on_startup().to_vec();
        let on_shutdown = self.on_shutdown().to_vec();
        let router = self.into_router()?;

        lifecycle::run_startup(&on_startup).await?;

        let addr = listener.local_addr()?;
        tracing::info!("サーバーを起動しました: {addr}");
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;
        tracing::info!("サーバーを停止しました");

        let stopped = lifecycle::run_shutdown(&on_shutdown).await;
        served?;
        stopped
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

/// 空文字列は未設定として扱う
fn configured(url: Option<&str>) -> Option<&str> {
    url.filter(|url| !url.is_empty())
}

/// ページはパラメータを持たない固定パスにのみ置ける
fn validate_page_url(url: &str) -> Result<(), &'static str> {
    routing::validate_path(url)?;
    if url.contains(['{', '}']) {
        return Err("パラメータは使えません");
    }
    Ok(())
}

fn html_page(page: Html<String>) -> axum::routing::MethodRouter {
    let Html(html) = page;
    let html: Arc<str> = html.into();
    get(move || {
        let html = html.clone();
        async move { Html(html.to_string()) }
    })
}
