//! # 記述子の設定
//!
//! - [`AppConfig`]: `App::new` に渡す全オプション（ルート・フック等の実行時オブジェクトを含む）
//! - [`AppSettings`]: 設定ファイル・環境変数から読み込めるシリアライズ可能な部分
//!
//! 環境変数は `PORTICO__` プレフィックス、ネストは `__` 区切り:
//!
//! | 変数名 | 項目 |
//! |--------|------|
//! | `PORTICO__TITLE` | `title` |
//! | `PORTICO__DEBUG` | `debug` |
//! | `PORTICO__OPENAPI_URL` | `openapi_url`（空文字列で無効化） |
//! | `PORTICO__DOCS_URL` | `docs_url`（空文字列で無効化） |

use std::{fmt, path::Path, sync::Arc};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::openapi::{server::Server, tag::Tag};

use crate::{
    dependency::Dependency,
    error::SettingsError,
    exception::ExceptionHandlers,
    lifecycle::LifecycleHook,
    middleware::Middleware,
    openapi::{OpenApiGenerator, UtoipaGenerator},
    response::ResponseType,
    routing::Route,
};

pub const DEFAULT_TITLE: &str = "Portico";
pub const DEFAULT_VERSION: &str = "0.1.0";
pub const DEFAULT_OPENAPI_URL: &str = "/openapi.json";
pub const DEFAULT_DOCS_URL: &str = "/docs";
pub const DEFAULT_REDOC_URL: &str = "/redoc";
pub const DEFAULT_OAUTH2_REDIRECT_URL: &str = "/docs/oauth2-redirect";

const ENV_PREFIX: &str = "PORTICO";
const ENV_SEPARATOR: &str = "__";

/// 記述子の構築オプション
///
/// URL 系の項目は `None` で該当ページ（エンドポイント）を無効化する。
#[derive(Clone)]
pub struct AppConfig {
    pub debug: bool,
    pub routes: Vec<Route>,
    pub title: String,
    pub description: String,
    pub version: String,
    pub openapi_url: Option<String>,
    pub openapi_tags: Option<Vec<Tag>>,
    pub servers: Option<Vec<Server>>,
    /// 全ルートに適用する依存
    pub dependencies: Vec<Dependency>,
    pub default_response_type: ResponseType,
    pub docs_url: Option<String>,
    pub redoc_url: Option<String>,
    pub swagger_ui_oauth2_redirect_url: Option<String>,
    pub swagger_ui_init_oauth: Option<Value>,
    pub middleware: Vec<Middleware>,
    pub exception_handlers: ExceptionHandlers,
    pub on_startup: Vec<LifecycleHook>,
    pub on_shutdown: Vec<LifecycleHook>,
    /// 任意の追加設定
    pub extra: Map<String, Value>,
    pub schema_generator: Arc<dyn OpenApiGenerator>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            routes: Vec::new(),
            title: DEFAULT_TITLE.to_string(),
            description: String::new(),
            version: DEFAULT_VERSION.to_string(),
            openapi_url: Some(DEFAULT_OPENAPI_URL.to_string()),
            openapi_tags: None,
            servers: None,
            dependencies: Vec::new(),
            default_response_type: ResponseType::default(),
            docs_url: Some(DEFAULT_DOCS_URL.to_string()),
            redoc_url: Some(DEFAULT_REDOC_URL.to_string()),
            swagger_ui_oauth2_redirect_url: Some(DEFAULT_OAUTH2_REDIRECT_URL.to_string()),
            swagger_ui_init_oauth: None,
            middleware: Vec::new(),
            exception_handlers: ExceptionHandlers::new(),
            on_startup: Vec::new(),
            on_shutdown: Vec::new(),
            extra: Map::new(),
            schema_generator: Arc::new(UtoipaGenerator),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("debug", &self.debug)
            .field("title", &self.title)
            .field("version", &self.version)
            .field("openapi_url", &self.openapi_url)
            .field("docs_url", &self.docs_url)
            .field("redoc_url", &self.redoc_url)
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

/// 設定ファイル・環境変数から読み込む設定
///
/// 未指定の項目は [`AppConfig::default`] と同じ値になる。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub debug: bool,
    pub title: String,
    pub description: String,
    pub version: String,
    pub openapi_url: Option<String>,
    pub openapi_tags: Option<Vec<Tag>>,
    pub servers: Option<Vec<Server>>,
    pub default_response_type: ResponseType,
    pub docs_url: Option<String>,
    pub redoc_url: Option<String>,
    pub swagger_ui_oauth2_redirect_url: Option<String>,
    pub swagger_ui_init_oauth: Option<Value>,
    pub extra: Map<String, Value>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let defaults = AppConfig::default();
        Self {
            debug: defaults.debug,
            title: defaults.title,
            description: defaults.description,
            version: defaults.version,
            openapi_url: defaults.openapi_url,
            openapi_tags: defaults.openapi_tags,
            servers: defaults.servers,
            default_response_type: defaults.default_response_type,
            docs_url: defaults.docs_url,
            redoc_url: defaults.redoc_url,
            swagger_ui_oauth2_redirect_url: defaults.swagger_ui_oauth2_redirect_url,
            swagger_ui_init_oauth: defaults.swagger_ui_init_oauth,
            extra: defaults.extra,
        }
    }
}

impl AppSettings {
    /// 設定ファイル（任意）を読み込み、`PORTICO__*` 環境変数で上書きする
    ///
    /// ファイル形式は拡張子から判定する。
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// 文字列から読み込む（環境変数は参照しない）
    pub fn parse(content: &str, format: FileFormat) -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .add_source(File::from_str(content, format))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

/// 空文字列の URL は未設定として扱う
fn non_empty(url: Option<String>) -> Option<String> {
    url.filter(|url| !url.is_empty())
}

impl From<AppSettings> for AppConfig {
    fn from(settings: AppSettings) -> Self {
        Self {
            debug: settings.debug,
            title: settings.title,
            description: settings.description,
            version: settings.version,
            openapi_url: non_empty(settings.openapi_url),
            openapi_tags: settings.openapi_tags,
            servers: settings.servers,
            default_response_type: settings.default_response_type,
            docs_url: non_empty(settings.docs_url),
            redoc_url: non_empty(settings.redoc_url),
            swagger_ui_oauth2_redirect_url: non_empty(settings.swagger_ui_oauth2_redirect_url),
            swagger_ui_init_oauth: settings.swagger_ui_init_oauth,
            extra: settings.extra,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_デフォルト値() {
        let config = AppConfig::default();

        assert!(!config.debug);
        assert_eq!(config.title, "Portico");
        assert_eq!(config.version, "0.1.0");
        assert_eq!(config.description, "");
        assert_eq!(config.openapi_url.as_deref(), Some("/openapi.json"));
        assert_eq!(config.docs_url.as_deref(), Some("/docs"));
        assert_eq!(config.redoc_url.as_deref(), Some("/redoc"));
        assert_eq!(
            config.swagger_ui_oauth2_redirect_url.as_deref(),
            Some("/docs/oauth2-redirect")
        );
        assert!(config.routes.is_empty());
        assert!(config.dependencies.is_empty());
        assert!(config.middleware.is_empty());
        assert!(config.exception_handlers.is_empty());
        assert!(config.on_startup.is_empty());
        assert!(config.on_shutdown.is_empty());
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_設定ファイルの値で上書きし未指定はデフォルトのまま() {
        let settings = AppSettings::parse(
            r#"
                title = "Inventory"
                version = "2.0.0"
                debug = true
                default_response_type = "html"

                [[servers]]
                url = "https://api.example.com"

                [extra]
                team = "platform"
            "#,
            FileFormat::Toml,
        )
        .unwrap();

        assert_eq!(settings.title, "Inventory");
        assert_eq!(settings.version, "2.0.0");
        assert!(settings.debug);
        assert_eq!(settings.default_response_type, ResponseType::Html);
        assert_eq!(settings.servers.unwrap()[0].url, "https://api.example.com");
        assert_eq!(settings.extra["team"], "platform");
        assert_eq!(settings.openapi_url.as_deref(), Some("/openapi.json"));
    }

    #[test]
    fn test_空文字列のurlは無効化として扱う() {
        let settings = AppSettings::parse(
            r#"
                openapi_url = ""
                redoc_url = ""
            "#,
            FileFormat::Toml,
        )
        .unwrap();

        let config = AppConfig::from(settings);

        assert_eq!(config.openapi_url, None);
        assert_eq!(config.redoc_url, None);
        assert_eq!(config.docs_url.as_deref(), Some("/docs"));
    }

    #[test]
    fn test_不正な値は読み込みエラーになる() {
        let result = AppSettings::parse(r#"debug = "maybe""#, FileFormat::Toml);
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }
}
