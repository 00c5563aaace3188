//! # Observability 基盤
//!
//! トレーシング初期化、ログ出力形式、Request ID 生成を提供する。
//! `portico` が組み立てる HTTP スタックと、アプリケーションの `main` の両方から使う。
//!
//! 環境変数:
//!
//! | 変数名 | 説明 |
//! |--------|------|
//! | `LOG_FORMAT` | `json` / `pretty`（未設定・不正値は `pretty`） |
//! | `RUST_LOG` | ログレベル（未設定時は [`TracingConfig::default_directives`]） |

/// Request ID を運ぶヘッダー名
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON 形式（本番環境向け）
    Json,
    /// 人間が読みやすい形式（開発環境向け）
    #[default]
    Pretty,
}

impl LogFormat {
    /// 文字列からログ形式をパースする
    ///
    /// 大文字小文字は区別しない。不正な値は `Pretty` にフォールバックし、
    /// subscriber 初期化前なので stderr に警告を出す。
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" | "" => Self::Pretty,
            other => {
                eprintln!("WARNING: unknown LOG_FORMAT={other:?}, falling back to pretty");
                Self::Pretty
            }
        }
    }

    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|val| Self::parse(&val))
            .unwrap_or_default()
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// サービス名（起動ログとルートスパンに出力）
    pub service_name:       String,
    pub log_format:         LogFormat,
    /// `RUST_LOG` 未設定時に使うフィルタ
    pub default_directives: String,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
            default_directives: "info,portico=debug".to_string(),
        }
    }

    /// `LOG_FORMAT` から出力形式を決定する
    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self::new(service_name, LogFormat::from_env())
    }

    /// `RUST_LOG` 未設定時のフィルタを差し替える
    pub fn with_default_directives(mut self, directives: impl Into<String>) -> Self {
        self.default_directives = directives.into();
        self
    }
}

/// トレーシングを初期化する
///
/// JSON モードではイベントをフラットに出力し、現在のスパン（`http_request`）の
/// フィールドを含める。`tracing-error` の `ErrorLayer` も登録するため、
/// `SpanTrace` を捕捉するエラー型はスパン情報を保持できる。
///
/// 二重初期化はエラーにせず無視する（テストから複数回呼ばれるため）。
#[cfg(feature = "observability")]
pub fn init_tracing(config: &TracingConfig) {
    use tracing_subscriber::{Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.default_directives.as_str().into());

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    let initialized = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .is_ok();

    if initialized {
        tracing::debug!(
            service = %config.service_name,
            log_format = ?config.log_format,
            "トレーシングを初期化しました"
        );
    }
}

/// UUID v7 で Request ID を生成する
///
/// 時刻順にソート可能なため、ログ上でリクエストの前後関係を追いやすい。
#[cfg(feature = "observability")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV7;

#[cfg(feature = "observability")]
impl tower_http::request_id::MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(
        &mut self,
        _request: &http::Request<B>,
    ) -> Option<tower_http::request_id::RequestId> {
        let id = uuid::Uuid::now_v7().to_string();
        http::HeaderValue::from_str(&id)
            .ok()
            .map(tower_http::request_id::RequestId::new)
    }
}

/// `TraceLayer` 用のリクエストスパンを作成する
///
/// `SetRequestIdLayer` の内側に置くこと。ヘッダーに設定済みの Request ID を
/// スパンフィールド `request_id` として記録する。
#[cfg(feature = "observability")]
pub fn make_request_span<B>(request: &http::Request<B>) -> tracing::Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jsonでjsonを返す() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    }

    #[test]
    fn test_parse_不正な値でprettyにフォールバックする() {
        assert_eq!(LogFormat::parse("yaml"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
    }

    #[test]
    fn test_newでデフォルトフィルタが設定される() {
        let config = TracingConfig::new("demo", LogFormat::Json);

        assert_eq!(config.service_name, "demo");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_directives, "info,portico=debug");
    }

    #[test]
    fn test_with_default_directivesでフィルタを差し替える() {
        let config = TracingConfig::new("demo", LogFormat::Pretty).with_default_directives("warn");
        assert_eq!(config.default_directives, "warn");
    }
}

#[cfg(all(test, feature = "observability"))]
mod request_id_tests {
    use tower_http::request_id::MakeRequestId;

    use super::*;

    #[test]
    fn test_make_request_uuid_v7がuuid_v7を生成する() {
        let request = http::Request::builder().uri("/").body(()).unwrap();
        let id = MakeRequestUuidV7.make_request_id(&request).unwrap();

        let uuid = uuid::Uuid::parse_str(id.header_value().to_str().unwrap()).unwrap();
        assert_eq!(uuid.get_version(), Some(uuid::Version::SortRand));
    }
}
