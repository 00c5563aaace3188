//! # OpenAPI ドキュメント生成
//!
//! ルート定義から OpenAPI 3.1 ドキュメントを組み立てる。
//! 生成器は [`OpenApiGenerator`] トレイトで差し替えられ、デフォルトは utoipa の
//! ビルダー API を使う [`UtoipaGenerator`]。
//!
//! リクエスト・レスポンス本文のスキーマは推論しない。記述するのはパス、メソッド、
//! パスパラメータ、タグ、追加レスポンス、コールバックのみ。

use std::{collections::HashSet, sync::LazyLock};

use axum::http::Method;
use portico_shared::{event_log::event, log_app_event};
use regex::Regex;
use utoipa::openapi::{
    Content,
    ContentBuilder,
    Deprecated,
    InfoBuilder,
    OpenApi,
    OpenApiBuilder,
    PathsBuilder,
    RefOr,
    Required,
    Response,
    ResponseBuilder,
    Schema,
    extensions::ExtensionsBuilder,
    path::{HttpMethod, Operation, OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder},
    schema::{Object, Type},
    server::Server,
    tag::Tag,
};

use crate::{response::ResponseSpec, routing::Route};

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W").expect("operationId 用の正規表現は有効"));

/// 生成器に渡す記述子の現在値
#[derive(Debug, Clone, Copy)]
pub struct SchemaRequest<'a> {
    pub title:       &'a str,
    pub version:     &'a str,
    /// 空文字列の場合は `info.description` を出力しない
    pub description: &'a str,
    pub routes:      &'a [Route],
    pub tags:        Option<&'a [Tag]>,
    pub servers:     Option<&'a [Server]>,
}

/// OpenAPI ドキュメント生成器
///
/// `App::openapi` は毎回この生成器を呼び出す（キャッシュしない）。
pub trait OpenApiGenerator: Send + Sync {
    fn generate(&self, request: &SchemaRequest<'_>) -> OpenApi;
}

/// utoipa のビルダー API による生成器
#[derive(Debug, Clone, Copy, Default)]
pub struct UtoipaGenerator;

impl OpenApiGenerator for UtoipaGenerator {
    fn generate(&self, request: &SchemaRequest<'_>) -> OpenApi {
        get_openapi(request)
    }
}

/// ルート定義から OpenAPI ドキュメントを生成する
///
/// `include_in_schema` が偽のルートは含めない。
/// operationId が重複した場合は警告ログを出し、そのまま出力する。
pub fn get_openapi(request: &SchemaRequest<'_>) -> OpenApi {
    let description = (!request.description.is_empty()).then_some(request.description);
    let info = InfoBuilder::new()
        .title(request.title)
        .version(request.version)
        .description(description)
        .build();

    let mut seen_ids = HashSet::new();
    let paths = build_paths(request.routes, &mut seen_ids);

    let document = OpenApiBuilder::new()
        .info(info)
        .paths(paths.build())
        .tags(request.tags.map(<[Tag]>::to_vec))
        .servers(request.servers.map(<[Server]>::to_vec))
        .build();

    log_app_event!(
        event.category = event::category::SCHEMA,
        event.action = event::action::OPENAPI_GENERATED,
        event.result = event::result::SUCCESS,
        path_count = document.paths.paths.len(),
        "OpenAPI ドキュメントを生成しました"
    );
    document
}

fn build_paths(routes: &[Route], seen_ids: &mut HashSet<String>) -> PathsBuilder {
    // 同じパスのメソッドを 1 つの PathItem にまとめる（出現順を保つ）
    let mut items: Vec<(&str, Vec<(HttpMethod, Operation)>)> = Vec::new();

    for route in routes.iter().filter(|route| route.include_in_schema) {
        for method in &route.methods {
            let Some(http_method) = to_http_method(method) else {
                tracing::warn!(%method, path = %route.path, "OpenAPI で扱えないメソッドを読み飛ばします");
                continue;
            };
            let operation = build_operation(route, method, seen_ids);
            match items.iter_mut().find(|(path, _)| *path == route.path) {
                Some((_, operations)) => operations.push((http_method, operation)),
                None => items.push((route.path.as_str(), vec![(http_method, operation)])),
            }
        }
    }

    items
        .into_iter()
        .fold(PathsBuilder::new(), |paths, (path, operations)| {
            let item = operations
                .into_iter()
                .fold(PathItemBuilder::new(), |item, (method, operation)| {
                    item.operation(method, operation)
                });
            paths.path(path, item.build())
        })
}

fn build_operation(route: &Route, method: &Method, seen_ids: &mut HashSet<String>) -> Operation {
    let operation_id = route
        .operation_id
        .clone()
        .unwrap_or_else(|| generate_operation_id(route, method));
    if !seen_ids.insert(operation_id.clone()) {
        tracing::warn!(
            operation_id = %operation_id,
            path = %route.path,
            "operationId が重複しています"
        );
    }

    let summary = route
        .summary
        .clone()
        .unwrap_or_else(|| generate_summary(&route.name));
    let tags = (!route.tags.is_empty()).then(|| route.tags.clone());

    let mut builder = OperationBuilder::new()
        .tags(tags)
        .summary(Some(summary))
        .description(route.description.clone())
        .operation_id(Some(operation_id));

    for param in route.path_params() {
        builder = builder.parameter(
            ParameterBuilder::new()
                .name(param)
                .parameter_in(ParameterIn::Path)
                .required(Required::True)
                .schema(Some(RefOr::T(Schema::Object(Object::with_type(Type::String))))),
        );
    }

    for (status, spec) in &route.responses {
        builder = builder.response(status, build_response(spec));
    }
    if !route.responses.keys().any(|status| status.starts_with('2')) {
        let content_type = route.response_type.unwrap_or_default().content_type();
        builder = builder.response(
            "200",
            ResponseBuilder::new()
                .description("Successful Response")
                .content(content_type, empty_content())
                .build(),
        );
    }

    if route.deprecated {
        builder = builder.deprecated(Some(Deprecated::True));
    }

    if !route.callbacks.is_empty() {
        builder = builder.extensions(Some(
            ExtensionsBuilder::new()
                .add("x-callbacks", build_callbacks(&route.callbacks, seen_ids))
                .build(),
        ));
    }

    builder.build()
}

/// `{コールバック名: {パス: PathItem}}` 形式の JSON
fn build_callbacks(callbacks: &[Route], seen_ids: &mut HashSet<String>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for callback in callbacks {
        let paths = build_paths(std::slice::from_ref(callback), seen_ids).build();
        match serde_json::to_value(&paths) {
            Ok(value) => {
                map.insert(callback.name.clone(), value);
            }
            Err(err) => {
                tracing::warn!(callback = %callback.name, "コールバックの記述に失敗しました: {err}");
            }
        }
    }
    serde_json::Value::Object(map)
}

fn build_response(spec: &ResponseSpec) -> Response {
    let builder = ResponseBuilder::new().description(&spec.description);
    let builder = match spec.content_type {
        Some(content_type) => builder.content(content_type.content_type(), empty_content()),
        None => builder,
    };
    builder.build()
}

fn empty_content() -> Content {
    ContentBuilder::new().build()
}

fn to_http_method(method: &Method) -> Option<HttpMethod> {
    let http_method = match *method {
        Method::GET => HttpMethod::Get,
        Method::POST => HttpMethod::Post,
        Method::PUT => HttpMethod::Put,
        Method::PATCH => HttpMethod::Patch,
        Method::DELETE => HttpMethod::Delete,
        Method::HEAD => HttpMethod::Head,
        Method::OPTIONS => HttpMethod::Options,
        Method::TRACE => HttpMethod::Trace,
        _ => return None,
    };
    Some(http_method)
}

/// ルート名から summary を作る（`list_items` → `List Items`）
pub fn generate_summary(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// ルート名・パス・メソッドから operationId を作る
///
/// `list_items` + `/items/{item_id}` + GET → `list_items_items__item_id__get`
pub fn generate_operation_id(route: &Route, method: &Method) -> String {
    let base = format!("{}{}", route.name, route.path);
    format!(
        "{}_{}",
        NON_WORD.replace_all(&base, "_"),
        method.as_str().to_lowercase()
    )
}
