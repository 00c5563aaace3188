//! # ルーター
//!
//! ルート定義（[`Route`]）の列と起動・停止フックを保持し、
//! サブルーターの取り込みと axum の `Router` への変換を担う。
//!
//! ## 取り込み時のマージ規則
//!
//! | 項目 | 規則 |
//! |------|------|
//! | パス | プレフィックス + ルートのパス |
//! | タグ | 取り込み時のタグ → ルートのタグ（重複は除去） |
//! | 依存 | 取り込み時の依存 → ルートの依存 |
//! | 追加レスポンス | 取り込み時の定義をルートの定義で上書き |
//! | レスポンス種別 | ルート → 取り込み時のデフォルト → このルーターのデフォルト |
//! | コールバック | 取り込み時のコールバック → ルートのコールバック |
//! | フック | サブルーターの起動・停止フックを末尾に追加 |

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    sync::LazyLock,
};

use axum::{
    Router,
    handler::Handler,
    http::Method,
    middleware::from_fn_with_state,
    routing::MethodRouter,
};
use portico_shared::{event_log::event, log_app_event};
use regex::Regex;

use crate::{
    dependency::{Dependency, DependencyChain, DependencyOverrides, run_dependencies},
    error::{AppError, RouterError},
    lifecycle::{self, Event, LifecycleHook},
    response::{ResponseSpec, ResponseType},
};

static PATH_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\*?([^}/]+)\}").expect("パスパラメータの正規表現は有効")
});

/// ルート定義
///
/// `handler` を持たないルートは OpenAPI にのみ記述される（コールバック用）。
#[derive(Clone)]
pub struct Route {
    pub path:              String,
    pub methods:           Vec<Method>,
    pub name:              String,
    pub summary:           Option<String>,
    pub description:       Option<String>,
    pub operation_id:      Option<String>,
    pub tags:              Vec<String>,
    pub dependencies:      Vec<Dependency>,
    /// ステータスコード（`"404"` 等）→ レスポンス定義
    pub responses:         BTreeMap<String, ResponseSpec>,
    pub response_type:     Option<ResponseType>,
    pub callbacks:         Vec<Route>,
    pub include_in_schema: bool,
    pub deprecated:        bool,
    handler:               Option<MethodRouter>,
}

macro_rules! method_constructors {
    ($($constructor:ident => $method:ident),* $(,)?) => {
        $(
            #[doc = concat!("`", stringify!($method), "` ルートを作る。名前はハンドラの関数名から決める。")]
            pub fn $constructor<H, T>(path: impl Into<String>, handler: H) -> Self
            where
                H: Handler<T, ()>,
                T: 'static,
            {
                let route = Self::new(path, [Method::$method], axum::routing::$constructor(handler));
                match handler_name::<H>() {
                    Some(name) => route.name(name),
                    None => route,
                }
            }
        )*
    };
}

impl Route {
    /// 任意のメソッドとハンドラからルートを作る
    ///
    /// 名前はパスから導出する（`/items/{id}` → `items_id`）。
    pub fn new(
        path: impl Into<String>,
        methods: impl IntoIterator<Item = Method>,
        handler: MethodRouter,
    ) -> Self {
        let mut route = Self::documented(path, methods);
        route.handler = Some(handler);
        route
    }

    /// ハンドラを持たない、OpenAPI 記述専用のルートを作る
    pub fn documented(path: impl Into<String>, methods: impl IntoIterator<Item = Method>) -> Self {
        let path = path.into();
        Self {
            name: name_from_path(&path),
            path,
            methods: methods.into_iter().collect(),
            summary: None,
            description: None,
            operation_id: None,
            tags: Vec::new(),
            dependencies: Vec::new(),
            responses: BTreeMap::new(),
            response_type: None,
            callbacks: Vec::new(),
            include_in_schema: true,
            deprecated: false,
            handler: None,
        }
    }

    method_constructors! {
        get => GET,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn response(mut self, status: impl Into<String>, spec: ResponseSpec) -> Self {
        self.responses.insert(status.into(), spec);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn callback(mut self, callback: Route) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn include_in_schema(mut self, include: bool) -> Self {
        self.include_in_schema = include;
        self
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    /// ハンドラを持つか（OpenAPI 記述専用ルートは `false`）
    pub fn is_routable(&self) -> bool {
        self.handler.is_some()
    }

    /// パス中の `{name}` / `{*name}` から取り出したパラメータ名
    pub fn path_params(&self) -> Vec<&str> {
        PATH_PARAM
            .captures_iter(&self.path)
            .filter_map(|captures| captures.get(1))
            .map(|m| m.as_str())
            .collect()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("dependencies", &self.dependencies)
            .field("routable", &self.is_routable())
            .finish_non_exhaustive()
    }
}

/// 関数アイテムの型名末尾（`my_app::handler::list_items` → `list_items`）
///
/// クロージャなど識別子として使えない型名は `None`。
fn handler_name<H>() -> Option<&'static str> {
    let last = std::any::type_name::<H>().rsplit("::").next()?;
    let is_ident = !last.is_empty()
        && last.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !last.starts_with(|c: char| c.is_ascii_digit());
    is_ident.then_some(last)
}

fn name_from_path(path: &str) -> String {
    let name = path
        .split('/')
        .map(|segment| segment.trim_matches(|c: char| matches!(c, '{' | '}' | '*')))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if name.is_empty() { "root".to_string() } else { name }
}

/// サブルーター取り込み時のオプション
#[derive(Debug, Clone, Default)]
pub struct IncludeOptions {
    pub prefix:                String,
    pub tags:                  Vec<String>,
    pub dependencies:          Vec<Dependency>,
    pub responses:             BTreeMap<String, ResponseSpec>,
    pub default_response_type: Option<ResponseType>,
    pub callbacks:             Vec<Route>,
}

impl IncludeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn response(mut self, status: impl Into<String>, spec: ResponseSpec) -> Self {
        self.responses.insert(status.into(), spec);
        self
    }

    pub fn default_response_type(mut self, response_type: ResponseType) -> Self {
        self.default_response_type = Some(response_type);
        self
    }

    pub fn callback(mut self, callback: Route) -> Self {
        self.callbacks.push(callback);
        self
    }
}

/// ルート定義とライフサイクルフックの所有者
#[derive(Debug, Clone, Default)]
pub struct ApiRouter {
    routes:                Vec<Route>,
    on_startup:            Vec<LifecycleHook>,
    on_shutdown:           Vec<LifecycleHook>,
    default_response_type: Option<ResponseType>,
}

impl ApiRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut router = Self::new();
        for route in routes {
            router.add_route(route);
        }
        router
    }

    pub fn with_lifecycle(
        mut self,
        on_startup: Vec<LifecycleHook>,
        on_shutdown: Vec<LifecycleHook>,
    ) -> Self {
        self.on_startup = on_startup;
        self.on_shutdown = on_shutdown;
        self
    }

    /// レスポンス種別を指定していないルートに適用するデフォルト
    ///
    /// 設定後に追加したルートにのみ適用される。
    pub fn with_default_response_type(mut self, response_type: ResponseType) -> Self {
        self.default_response_type = Some(response_type);
        self
    }

    /// ルートを追加する（ビルダー形式）
    pub fn route(mut self, route: Route) -> Self {
        self.add_route(route);
        self
    }

    /// ルートを末尾に追加する
    ///
    /// 検証は行わない。重複やパス不正は axum ルーター構築時に警告して読み飛ばす。
    pub fn add_route(&mut self, mut route: Route) {
        if route.response_type.is_none() {
            route.response_type = self.default_response_type;
        }
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut Vec<Route> {
        &mut self.routes
    }

    pub fn on_startup(&self) -> &[LifecycleHook] {
        &self.on_startup
    }

    pub fn on_shutdown(&self) -> &[LifecycleHook] {
        &self.on_shutdown
    }

    pub fn add_event_handler(&mut self, event: Event, hook: LifecycleHook) {
        match event {
            Event::Startup => self.on_startup.push(hook),
            Event::Shutdown => self.on_shutdown.push(hook),
        }
    }

    /// サブルーターのルートとフックを取り込む
    ///
    /// 全ルートの検証に成功した場合のみ変更する（失敗時はこのルーターは元のまま）。
    pub fn include_router(
        &mut self,
        router: ApiRouter,
        options: IncludeOptions,
    ) -> Result<(), RouterError> {
        let prefix = options.prefix.as_str();
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(RouterError::InvalidPrefix(options.prefix));
        }

        let ApiRouter {
            routes,
            on_startup,
            on_shutdown,
            ..
        } = router;

        let mut included = Vec::with_capacity(routes.len());
        for route in routes {
            let path = format!("{prefix}{}", route.path);
            if path.is_empty() {
                return Err(RouterError::EmptyPath(route.name));
            }
            included.push(self.merge_route(route, path, &options));
        }

        log_app_event!(
            event.category = event::category::ROUTING,
            event.action = event::action::ROUTER_INCLUDED,
            event.result = event::result::SUCCESS,
            prefix = %options.prefix,
            route_count = included.len(),
            "サブルーターを取り込みました"
        );

        self.routes.extend(included);
        self.on_startup.extend(on_startup);
        self.on_shutdown.extend(on_shutdown);
        Ok(())
    }

    fn merge_route(&self, route: Route, path: String, options: &IncludeOptions) -> Route {
        let mut tags = Vec::with_capacity(options.tags.len() + route.tags.len());
        for tag in options.tags.iter().chain(&route.tags) {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        let mut responses = options.responses.clone();
        responses.extend(route.responses);

        Route {
            path,
            tags,
            dependencies: options
                .dependencies
                .iter()
                .cloned()
                .chain(route.dependencies)
                .collect(),
            responses,
            response_type: route
                .response_type
                .or(options.default_response_type)
                .or(self.default_response_type),
            callbacks: options
                .callbacks
                .iter()
                .cloned()
                .chain(route.callbacks)
                .collect(),
            ..route
        }
    }

    /// 起動フックを登録順に実行する
    pub async fn startup(&self) -> Result<(), AppError> {
        lifecycle::run_startup(&self.on_startup).await
    }

    /// 停止フックを登録順にすべて実行する
    pub async fn shutdown(&self) -> Result<(), AppError> {
        lifecycle::run_shutdown(&self.on_shutdown).await
    }

    /// axum の `Router` を組み立てる
    ///
    /// 各ルートには `app_dependencies` → ルートの依存の順で依存ミドルウェアを掛ける。
    /// 依存は `overrides` で名前ごとに差し替えられる。
    /// 次のルートは警告して読み飛ばす（先に登録したルートが残る）:
    ///
    /// - axum が受け付けないパス（`validate_path`）
    /// - 同じパス・メソッドの二重登録
    /// - 登録済みのパスと同じ位置でパラメータ名だけが異なるパス
    pub fn into_axum(
        &self,
        app_dependencies: &[Dependency],
        overrides: &DependencyOverrides,
    ) -> Router {
        let mut by_path: HashMap<&str, MethodRouter> = HashMap::new();
        let mut registered: HashSet<(&str, &Method)> = HashSet::new();
        let mut params = ParamSegments::default();

        for route in &self.routes {
            let Some(handler) = &route.handler else {
                continue;
            };
            if let Err(reason) = validate_path(&route.path) {
                tracing::warn!(path = %route.path, route = %route.name, "ルートを読み飛ばします: {reason}");
                continue;
            }
            if let Some(method) = route
                .methods
                .iter()
                .find(|method| registered.contains(&(route.path.as_str(), *method)))
            {
                tracing::warn!(
                    path = %route.path,
                    method = %method,
                    route = %route.name,
                    "同じパス・メソッドのルートが登録済みのため読み飛ばします"
                );
                continue;
            }
            if let Some(existing) = params.conflict(&route.path) {
                tracing::warn!(
                    path = %route.path,
                    existing,
                    route = %route.name,
                    "パラメータ名だけが異なるルートが登録済みのため読み飛ばします"
                );
                continue;
            }
            params.record(&route.path);
            registered.extend(route.methods.iter().map(|method| (route.path.as_str(), method)));

            let chain: Vec<Dependency> = app_dependencies
                .iter()
                .chain(&route.dependencies)
                .map(|dependency| overrides.resolve(dependency).clone())
                .collect();
            let handler = if chain.is_empty() {
                handler.clone()
            } else {
                handler.clone().layer(from_fn_with_state(
                    DependencyChain::new(chain),
                    run_dependencies,
                ))
            };

            let merged = match by_path.remove(route.path.as_str()) {
                Some(existing) => existing.merge(handler),
                None => handler,
            };
            by_path.insert(route.path.as_str(), merged);
        }

        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, handler)| router.route(path, handler))
    }
}

/// axum に登録できるパスか検査する
///
/// `/` で始まり、`:` や `*` で始まるセグメント（旧形式のキャプチャ）を含まず、
/// `{*name}` は末尾のセグメントにのみ置ける。
pub(crate) fn validate_path(path: &str) -> Result<(), &'static str> {
    if !path.starts_with('/') {
        return Err("パスは '/' で始まる必要があります");
    }
    let mut segments = path.split('/').skip(1).peekable();
    while let Some(segment) = segments.next() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err("パラメータは `{name}` 形式で書く必要があります");
        }
        if segment.contains("{*") && segments.peek().is_some() {
            return Err("`{*name}` は末尾のセグメントにのみ置けます");
        }
    }
    Ok(())
}

/// 登録済みパスのパラメータセグメント
///
/// キーはパラメータを `{}` に置き換えたそのセグメントまでのプレフィックス。
/// axum は同じ位置に名前の異なるパラメータを登録できない。
#[derive(Default)]
struct ParamSegments<'a> {
    by_prefix: HashMap<String, &'a str>,
}

impl<'a> ParamSegments<'a> {
    /// 同じ位置に別名のパラメータを持つ登録済みセグメント
    fn conflict(&self, path: &str) -> Option<&'a str> {
        param_prefixes(path).find_map(|(prefix, segment)| {
            self.by_prefix
                .get(&prefix)
                .copied()
                .filter(|existing| *existing != segment)
        })
    }

    fn record(&mut self, path: &'a str) {
        for (prefix, segment) in param_prefixes(path) {
            self.by_prefix.entry(prefix).or_insert(segment);
        }
    }
}

fn param_prefixes(path: &str) -> impl Iterator<Item = (String, &str)> {
    let mut prefix = String::new();
    path.split('/').skip(1).filter_map(move |segment| {
        prefix.push('/');
        let normalized = PATH_PARAM.replace_all(segment, "{}");
        prefix.push_str(&normalized);
        (normalized != segment).then(|| (prefix.clone(), segment))
    })
}
