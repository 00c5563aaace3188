//! # Portico デモサービス
//!
//! 在庫アイテムを返す小さな API を Portico の記述子で組み立てる。
//!
//! ## ルート
//!
//! | パス | 説明 |
//! |------|------|
//! | `GET /health` | ヘルスチェック |
//! | `GET /items` | アイテム一覧 |
//! | `GET /items/{item_id}` | アイテム取得（存在しなければ `item-not-found`） |
//! | `GET /admin/stats` | 管理用統計（`x-api-key` が必要） |
//! | `POST /admin/cache/clear` | 管理用キャッシュクリア（`x-api-key` が必要） |

pub mod config;

use axum::{Json, extract::Path, http::StatusCode};
use portico::{
    ApiError,
    ApiRouter,
    App,
    AppConfig,
    AppSettings,
    Dependency,
    ErrorContext,
    Event,
    ExceptionHandler,
    IncludeOptions,
    LifecycleHook,
    ResponseSpec,
    ResponseType,
    Route,
    RouterError,
    middleware,
};
use portico_shared::{
    ApiResponse,
    ErrorResponse,
    HealthResponse,
    api_response::ListResponse,
    health::HealthStatus,
};
use serde::Serialize;
use serde_json::{Value, json};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ITEM_NOT_FOUND: &str = "item-not-found";

/// 在庫アイテム
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id:    u32,
    pub name:  &'static str,
    pub stock: u32,
}

const ITEMS: &[Item] = &[
    Item {
        id:    1,
        name:  "ボルト M6",
        stock: 1200,
    },
    Item {
        id:    2,
        name:  "ナット M6",
        stock: 800,
    },
    Item {
        id:    3,
        name:  "ワッシャー",
        stock: 0,
    },
];

async fn list_items() -> Json<ListResponse<Item>> {
    Json(ITEMS.iter().cloned().collect())
}

async fn read_item(Path(item_id): Path<u32>) -> Result<Json<ApiResponse<Item>>, ApiError> {
    ITEMS
        .iter()
        .find(|item| item.id == item_id)
        .map(|item| Json(ApiResponse::new(item.clone())))
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                ITEM_NOT_FOUND,
                format!("アイテム {item_id} は存在しません"),
            )
        })
}

async fn admin_stats() -> Json<Value> {
    let out_of_stock = ITEMS.iter().filter(|item| item.stock == 0).count();
    Json(json!({ "items": ITEMS.len(), "out_of_stock": out_of_stock }))
}

async fn clear_cache() -> StatusCode {
    tracing::info!("キャッシュをクリアしました");
    StatusCode::NO_CONTENT
}

/// `x-api-key` ヘッダーを検査する依存
pub fn api_key_dependency(expected: Option<String>) -> Dependency {
    Dependency::from_fn("api_key", move |head| {
        match (head.header(API_KEY_HEADER), expected.as_deref()) {
            (Some(given), Some(expected)) if given == expected => Ok(()),
            _ => Err(ApiError::unauthorized("API キーが不正です")),
        }
    })
}

fn admin_router() -> ApiRouter {
    ApiRouter::new()
        .route(Route::get("/stats", admin_stats).summary("在庫統計"))
        .route(Route::post("/cache/clear", clear_cache).response(
            "204",
            ResponseSpec::new("キャッシュをクリアした"),
        ))
}

fn lifecycle_hook(name: &'static str, message: &'static str) -> LifecycleHook {
    LifecycleHook::new(name, move || async move {
        tracing::info!("{message}");
        Ok(())
    })
}

/// デモサービスの記述子を組み立てる
pub fn build_app(settings: AppSettings, admin_api_key: Option<String>) -> Result<App, RouterError> {
    let mut app = App::new(AppConfig {
        on_startup: vec![lifecycle_hook("load_items", "アイテムを読み込みました")],
        ..AppConfig::from(settings)
    });

    let version = app.version.clone();
    app.add_route(
        Route::get("/health", move || {
            let version = version.clone();
            async move { Json(HealthResponse::new(HealthStatus::Healthy, version)) }
        })
        .name("health_check")
        .tag("health"),
    );
    app.add_route(Route::get("/items", list_items).tag("items"));
    app.add_route(
        Route::get("/items/{item_id}", read_item)
            .tag("items")
            .response("404", ResponseSpec::new("アイテムが存在しない").with_content(ResponseType::Json)),
    );

    app.include_router(
        admin_router(),
        IncludeOptions::new()
            .prefix("/admin")
            .tag("admin")
            .dependency(api_key_dependency(admin_api_key))
            .response("401", ResponseSpec::new("API キーが不正").with_content(ResponseType::Json)),
    )?;

    app.add_event_handler(
        Event::Shutdown,
        lifecycle_hook("flush_metrics", "メトリクスをフラッシュしました"),
    );
    app.add_exception_handler(ITEM_NOT_FOUND, ExceptionHandler::new(item_not_found));
    app.add_middleware(middleware::no_cache());

    Ok(app)
}

fn item_not_found(context: ErrorContext) -> (StatusCode, Json<ErrorResponse>) {
    let detail = context
        .error
        .map(|error| error.detail().to_string())
        .unwrap_or_default();
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            ITEM_NOT_FOUND,
            "Item Not Found",
            StatusCode::NOT_FOUND.as_u16(),
            format!("{detail}（{}）", context.path),
        )),
    )
}
