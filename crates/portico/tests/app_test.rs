//! # App 記述子の結合テスト
//!
//! 記述子の登録操作、OpenAPI 生成器への委譲、`into_router` が組み立てる
//! axum ルーター、`serve` のライフサイクルを検証する。

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Response,
};
use portico::{
    ApiError,
    ApiRouter,
    App,
    AppConfig,
    AppError,
    Dependency,
    Event,
    ExceptionHandler,
    IncludeOptions,
    LifecycleHook,
    Middleware,
    OpenApiGenerator,
    Route,
    SchemaRequest,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::oneshot,
};
use tower::ServiceExt;
use utoipa::openapi::{OpenApi, OpenApiBuilder, server::Server, tag::Tag};

// ===== ヘルパー =====

async fn list_items() -> Json<Value> {
    Json(json!([{ "id": 1 }]))
}

async fn read_item() -> &'static str {
    "item"
}

async fn explode() -> Result<&'static str, ApiError> {
    Err(ApiError::internal("在庫 DB に接続できません"))
}

async fn send(app: App, method: &str, uri: &str, headers: &[(&str, &str)]) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    app.into_router()
        .unwrap()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn get(app: App, uri: &str) -> Response {
    send(app, "GET", uri, &[]).await
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// 受け取った引数を記録する生成器
#[derive(Default)]
struct RecordingGenerator {
    received: Mutex<Option<Received>>,
}

#[derive(Debug, PartialEq)]
struct Received {
    title:       String,
    version:     String,
    description: String,
    routes:      Vec<String>,
    tags:        Option<Vec<String>>,
    servers:     Option<Vec<String>>,
}

impl OpenApiGenerator for RecordingGenerator {
    fn generate(&self, request: &SchemaRequest<'_>) -> OpenApi {
        *self.received.lock().unwrap() = Some(Received {
            title:       request.title.to_string(),
            version:     request.version.to_string(),
            description: request.description.to_string(),
            routes:      request.routes.iter().map(|r| r.name.clone()).collect(),
            tags:        request
                .tags
                .map(|tags| tags.iter().map(|t| t.name.clone()).collect()),
            servers:     request
                .servers
                .map(|servers| servers.iter().map(|s| s.url.clone()).collect()),
        });
        OpenApiBuilder::new().build()
    }
}

// ===== 記述子の操作 =====

#[test]
fn test_openapi_url未設定ならopenapiは常に設定エラー() {
    let generator = Arc::new(RecordingGenerator::default());
    let app = App::new(AppConfig {
        openapi_url: None,
        schema_generator: generator.clone(),
        ..AppConfig::default()
    });

    for _ in 0..2 {
        let err = app.openapi().unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
    assert!(generator.received.lock().unwrap().is_none());
}

#[test]
fn test_生成器は記述子の現在値を受け取る() {
    let generator = Arc::new(RecordingGenerator::default());
    let mut app = App::new(AppConfig {
        title: "Inventory".to_string(),
        version: "2.1.0".to_string(),
        description: "在庫管理 API".to_string(),
        openapi_tags: Some(vec![Tag::new("items")]),
        servers: Some(vec![Server::new("https://api.example.com")]),
        schema_generator: generator.clone(),
        ..AppConfig::default()
    });
    app.add_route(Route::get("/items", list_items));
    app.title = "Inventory v2".to_string();

    app.openapi().unwrap();

    assert_eq!(
        generator.received.lock().unwrap().take(),
        Some(Received {
            title:       "Inventory v2".to_string(),
            version:     "2.1.0".to_string(),
            description: "在庫管理 API".to_string(),
            routes:      vec!["list_items".to_string()],
            tags:        Some(vec!["items".to_string()]),
            servers:     Some(vec!["https://api.example.com".to_string()]),
        })
    );
}

#[test]
fn test_登録したルートは登録順にルーターに現れる() {
    let mut app = App::default();
    app.add_route(Route::get("/items", list_items));
    app.add_route(Route::get("/items/{item_id}", read_item));
    app.add_route(Route::post("/items", list_items).name("create_item"));

    let names: Vec<_> = app.router().routes().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["list_items", "read_item", "create_item"]);
}

#[test]
fn test_デフォルト構築では登録リストが空() {
    let app = App::new(AppConfig::default());

    assert!(app.dependencies.is_empty());
    assert!(app.middleware.is_empty());
    assert!(app.on_startup().is_empty());
    assert!(app.on_shutdown().is_empty());
    assert!(app.exception_handlers.is_empty());
}

#[test]
fn test_include_routerはルーターのエラーをそのまま返す() {
    let mut app = App::default();
    let sub = ApiRouter::new().route(Route::get("/items", list_items));

    let err = app
        .include_router(sub, IncludeOptions::new().prefix("/v1/"))
        .unwrap_err();

    assert_eq!(err, portico::RouterError::InvalidPrefix("/v1/".to_string()));
    assert!(app.routes().is_empty());
}

// ===== 組み込みページ =====

#[tokio::test]
async fn test_openapi_jsonを配信する() {
    let mut app = App::new(AppConfig {
        title: "Inventory".to_string(),
        ..AppConfig::default()
    });
    app.add_route(Route::get("/items/{item_id}", read_item).tag("items"));

    let response = get(app, "/openapi.json").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body = json_body(response).await;
    assert_eq!(body["info"]["title"], "Inventory");
    assert_eq!(
        body["paths"]["/items/{item_id}"]["get"]["operationId"],
        "read_item_items__item_id__get"
    );
}

#[tokio::test]
async fn test_ドキュメントページを配信する() {
    let app = || {
        App::new(AppConfig {
            title: "Inventory".to_string(),
            ..AppConfig::default()
        })
    };

    let docs = text_body(get(app(), "/docs").await).await;
    assert!(docs.contains("<title>Inventory - Swagger UI</title>"));
    assert!(docs.contains(r#"oauth2RedirectUrl: window.location.origin + "/docs/oauth2-redirect","#));

    let redoc = text_body(get(app(), "/redoc").await).await;
    assert!(redoc.contains("<title>Inventory - ReDoc</title>"));

    let redirect = get(app(), "/docs/oauth2-redirect").await;
    assert_eq!(redirect.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_openapi_url未設定ならページを登録しない() {
    let app = || {
        App::new(AppConfig {
            openapi_url: None,
            ..AppConfig::default()
        })
    };

    for uri in ["/openapi.json", "/docs", "/redoc"] {
        assert_eq!(get(app(), uri).await.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_docs_url未設定ならswagger_uiとリダイレクトページを登録しない() {
    let app = || {
        App::new(AppConfig {
            docs_url: None,
            ..AppConfig::default()
        })
    };

    assert_eq!(get(app(), "/docs").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        get(app(), "/docs/oauth2-redirect").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(get(app(), "/redoc").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ユーザーのルートは組み込みページより優先される() {
    let mut app = App::default();
    app.add_route(Route::get("/docs", read_item));

    let response = get(app, "/docs").await;

    assert_eq!(text_body(response).await, "item");
}

#[tokio::test]
async fn test_getでないユーザールートは組み込みページと共存する() {
    let app = || {
        let mut app = App::default();
        app.add_route(Route::post("/docs", read_item));
        app
    };

    let docs = get(app(), "/docs").await;
    assert_eq!(docs.status(), StatusCode::OK);
    assert!(text_body(docs).await.contains("Swagger UI"));

    let posted = send(app(), "POST", "/docs", &[]).await;
    assert_eq!(text_body(posted).await, "item");
}

#[tokio::test]
async fn test_空文字列のopenapi_urlは未設定として扱う() {
    let app = || {
        App::new(AppConfig {
            openapi_url: Some(String::new()),
            ..AppConfig::default()
        })
    };

    assert!(matches!(app().openapi(), Err(AppError::Configuration(_))));
    assert!(matches!(app().docs(), Err(AppError::Configuration(_))));
    for uri in ["/openapi.json", "/docs", "/redoc"] {
        assert_eq!(get(app(), uri).await.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[test]
fn test_不正なページurlは設定エラー() {
    let configs = [
        AppConfig {
            docs_url: Some("docs".to_string()),
            ..AppConfig::default()
        },
        AppConfig {
            redoc_url: Some("/redoc/{version}".to_string()),
            ..AppConfig::default()
        },
        AppConfig {
            swagger_ui_oauth2_redirect_url: Some("oauth2-redirect".to_string()),
            ..AppConfig::default()
        },
        AppConfig {
            openapi_url: Some("openapi.json".to_string()),
            ..AppConfig::default()
        },
    ];

    for config in configs {
        let err = App::new(config).into_router().unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)), "{err}");
    }
}

#[test]
fn test_ページurlが重複すると設定エラー() {
    let configs = [
        AppConfig {
            redoc_url: Some("/docs".to_string()),
            ..AppConfig::default()
        },
        AppConfig {
            swagger_ui_oauth2_redirect_url: Some("/openapi.json".to_string()),
            ..AppConfig::default()
        },
    ];

    for config in configs {
        let err = App::new(config).into_router().unwrap_err();
        assert!(
            matches!(err, AppError::Configuration(ref message) if message.contains("重複")),
            "{err}"
        );
    }
}

#[tokio::test]
async fn test_パラメータ名だけが異なるルートがあっても構築できる() {
    let mut app = App::default();
    app.add_route(Route::get("/items/{id}", read_item));
    app.add_route(Route::delete("/items/{item_id}", read_item));

    let response = get(app, "/items/1").await;

    assert_eq!(text_body(response).await, "item");
}

// ===== 依存・例外ハンドラ・ミドルウェア =====

fn api_key_required() -> Dependency {
    Dependency::from_fn("api_key", |head| match head.header("x-api-key") {
        Some("secret") => Ok(()),
        _ => Err(ApiError::unauthorized("API キーが不正です")),
    })
}

#[tokio::test]
async fn test_アプリ全体の依存は全ルートの前に実行される() {
    let app = || {
        let mut app = App::new(AppConfig {
            dependencies: vec![api_key_required()],
            ..AppConfig::default()
        });
        app.add_route(Route::get("/items", list_items));
        app
    };

    let denied = get(app(), "/items").await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(denied).await;
    assert_eq!(body["type"], "https://portico.dev/errors/unauthorized");

    let allowed = send(app(), "GET", "/items", &[("x-api-key", "secret")]).await;
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dependency_overridesで依存を差し替える() {
    let mut app = App::new(AppConfig {
        dependencies: vec![api_key_required()],
        ..AppConfig::default()
    });
    app.add_route(Route::get("/items", list_items));
    app.dependency_overrides_mut()
        .insert("api_key", Dependency::from_fn("allow_all", |_| Ok(())));

    assert_eq!(get(app, "/items").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_例外ハンドラはkindをstatusより優先する() {
    let app = || {
        let mut app = App::default();
        app.add_route(Route::get("/items/{item_id}", || async {
            Err::<(), _>(ApiError::new(StatusCode::NOT_FOUND, "item-not-found", "42"))
        }));
        app.add_exception_handler(
            "item-not-found",
            ExceptionHandler::new(|context| {
                let detail = context.error.map(|e| e.detail().to_string());
                (StatusCode::GONE, Json(json!({ "item": detail })))
            }),
        );
        app.add_exception_handler(
            StatusCode::NOT_FOUND,
            ExceptionHandler::new(|context| {
                (StatusCode::NOT_FOUND, Json(json!({ "missing": context.path })))
            }),
        );
        app
    };

    let by_kind = get(app(), "/items/42").await;
    assert_eq!(by_kind.status(), StatusCode::GONE);
    assert_eq!(json_body(by_kind).await, json!({ "item": "42" }));

    let by_status = get(app(), "/unknown").await;
    assert_eq!(by_status.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(by_status).await, json!({ "missing": "/unknown" }));
}

#[tokio::test]
async fn test_debugモードでは500のdetailを返す() {
    let app = |debug| {
        let mut app = App::new(AppConfig {
            debug,
            ..AppConfig::default()
        });
        app.add_route(Route::get("/explode", explode));
        app
    };

    let hidden = json_body(get(app(false), "/explode").await).await;
    assert_eq!(hidden["detail"], "内部エラーが発生しました");

    let exposed = json_body(get(app(true), "/explode").await).await;
    assert_eq!(exposed["detail"], "在庫 DB に接続できません");
}

#[tokio::test]
async fn test_ミドルウェアは登録順に外側から適用される() {
    let mut app = App::default();
    app.add_route(Route::get("/items", list_items));
    app.add_middleware(portico::middleware::no_cache());
    app.add_middleware(Middleware::new("tag", |router| {
        router.layer(axum::middleware::map_response(|mut response: Response| async move {
            response
                .headers_mut()
                .insert("cache-control", "private".parse().unwrap());
            response
        }))
    }));

    let response = get(app, "/items").await;

    // 外側の no_cache が最後に上書きする
    assert_eq!(response.headers()["cache-control"], "no-store");
}

#[tokio::test]
async fn test_レスポンスにx_request_idが付与される() {
    let mut app = App::default();
    app.add_route(Route::get("/items", list_items));

    let generated = get(app, "/items").await;
    let id = generated.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(uuid_version(id), Some('7'));

    let mut app = App::default();
    app.add_route(Route::get("/items", list_items));
    let echoed = send(app, "GET", "/items", &[("x-request-id", "client-id-1")]).await;
    assert_eq!(echoed.headers()["x-request-id"], "client-id-1");
}

/// UUID 文字列のバージョン桁（`xxxxxxxx-xxxx-Vxxx-...` の V）
fn uuid_version(id: &str) -> Option<char> {
    id.split('-').nth(2).and_then(|group| group.chars().next())
}

#[tokio::test]
async fn test_サブルーターのルートはプレフィックス付きで配信される() {
    let mut app = App::default();
    let sub = ApiRouter::new().route(Route::get("/items", list_items));
    app.include_router(sub, IncludeOptions::new().prefix("/v1").tag("v1"))
        .unwrap();

    let response = get(app, "/v1/items").await;

    assert_eq!(response.status(), StatusCode::OK);
}

// ===== serve =====

type Log = Arc<Mutex<Vec<String>>>;

fn hook(name: &'static str, log: &Log) -> LifecycleHook {
    let log = log.clone();
    LifecycleHook::new(name, move || {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(name.to_string());
            Ok(())
        }
    })
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_serveは起動フックと停止フックを順に実行する() {
    let log = Log::default();
    let mut app = App::new(AppConfig {
        on_startup: vec![hook("start_a", &log)],
        ..AppConfig::default()
    });
    app.add_event_handler(Event::Startup, hook("start_b", &log));
    app.add_event_handler(Event::Shutdown, hook("stop_a", &log));
    app.add_event_handler(Event::Shutdown, hook("stop_b", &log));
    app.add_route(Route::get("/items", list_items));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(app.serve(listener, async move {
        stopped.await.ok();
    }));

    let response = http_get(addr, "/items").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert_eq!(*log.lock().unwrap(), vec!["start_a", "start_b"]);

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["start_a", "start_b", "stop_a", "stop_b"]
    );
}

#[tokio::test]
async fn test_起動フックが失敗するとサーバーを起動しない() {
    let log = Log::default();
    let mut app = App::default();
    app.add_event_handler(
        Event::Startup,
        LifecycleHook::new("connect_db", || async { Err(anyhow::anyhow!("接続拒否")) }),
    );
    app.add_event_handler(Event::Shutdown, hook("stop", &log));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let err = app.serve(listener, async {}).await.unwrap_err();

    assert!(matches!(err, AppError::Lifecycle { ref hook, .. } if hook == "connect_db"));
    assert!(log.lock().unwrap().is_empty());
}
