//! # ドキュメントページ
//!
//! Swagger UI / ReDoc / OAuth2 リダイレクトの HTML を tera で生成する。
//!
//! - テンプレートは `include_str!` でバイナリに埋め込む
//! - JS・CSS は CDN から読み込む（URL は差し替え可能）
//! - `<script>` 内に埋め込む値は JSON 文字列化し、`<` をエスケープする

use axum::response::Html;
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::DocsError;

pub const SWAGGER_UI_JS_URL: &str =
    "https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui-bundle.js";
pub const SWAGGER_UI_CSS_URL: &str = "https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui.css";
pub const SWAGGER_UI_FAVICON_URL: &str =
    "https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/favicon-32x32.png";
pub const REDOC_JS_URL: &str = "https://cdn.jsdelivr.net/npm/redoc@2/bundles/redoc.standalone.js";

const SWAGGER_UI_TEMPLATE: &str = "swagger_ui.html";
const REDOC_TEMPLATE: &str = "redoc.html";
const OAUTH2_REDIRECT_TEMPLATE: &str = "oauth2_redirect.html";

/// Swagger UI ページのパラメータ
#[derive(Debug, Clone)]
pub struct SwaggerUiParams<'a> {
    pub openapi_url:         &'a str,
    pub title:               &'a str,
    pub oauth2_redirect_url: Option<&'a str>,
    /// `ui.initOAuth()` に渡すオプション
    pub init_oauth:          Option<&'a serde_json::Value>,
    pub js_url:              &'a str,
    pub css_url:             &'a str,
    pub favicon_url:         &'a str,
}

impl<'a> SwaggerUiParams<'a> {
    pub fn new(openapi_url: &'a str, title: &'a str) -> Self {
        Self {
            openapi_url,
            title,
            oauth2_redirect_url: None,
            init_oauth: None,
            js_url: SWAGGER_UI_JS_URL,
            css_url: SWAGGER_UI_CSS_URL,
            favicon_url: SWAGGER_UI_FAVICON_URL,
        }
    }

    pub fn oauth2_redirect_url(mut self, url: Option<&'a str>) -> Self {
        self.oauth2_redirect_url = url;
        self
    }

    pub fn init_oauth(mut self, init_oauth: Option<&'a serde_json::Value>) -> Self {
        self.init_oauth = init_oauth;
        self
    }
}

/// ReDoc ページのパラメータ
#[derive(Debug, Clone)]
pub struct RedocParams<'a> {
    pub openapi_url:       &'a str,
    pub title:             &'a str,
    pub js_url:            &'a str,
    pub favicon_url:       &'a str,
    pub with_google_fonts: bool,
}

impl<'a> RedocParams<'a> {
    pub fn new(openapi_url: &'a str, title: &'a str) -> Self {
        Self {
            openapi_url,
            title,
            js_url: REDOC_JS_URL,
            favicon_url: SWAGGER_UI_FAVICON_URL,
            with_google_fonts: true,
        }
    }
}

/// ドキュメントページのレンダラー
///
/// tera テンプレートエンジンをラップする。構築時にテンプレートを検証するため、
/// 一度構築できれば描画はパラメータ不備以外で失敗しない。
#[derive(Debug)]
pub struct DocsRenderer {
    engine: Tera,
}

impl DocsRenderer {
    /// `include_str!` で埋め込んだテンプレートを tera に登録する
    pub fn new() -> Result<Self, DocsError> {
        let mut engine = Tera::default();

        engine.add_raw_templates(vec![
            (
                SWAGGER_UI_TEMPLATE,
                include_str!("../templates/docs/swagger_ui.html"),
            ),
            (REDOC_TEMPLATE, include_str!("../templates/docs/redoc.html")),
            (
                OAUTH2_REDIRECT_TEMPLATE,
                include_str!("../templates/docs/oauth2_redirect.html"),
            ),
        ])?;

        Ok(Self { engine })
    }

    pub fn swagger_ui(&self, params: &SwaggerUiParams<'_>) -> Result<Html<String>, DocsError> {
        let mut context = Context::new();
        context.insert("title", params.title);
        context.insert("js_url", params.js_url);
        context.insert("css_url", params.css_url);
        context.insert("favicon_url", params.favicon_url);
        context.insert("openapi_url_json", &script_json(&params.openapi_url)?);
        context.insert(
            "oauth2_redirect_url_json",
            &params.oauth2_redirect_url.map(script_json).transpose()?,
        );
        context.insert(
            "init_oauth_json",
            &params.init_oauth.map(script_json).transpose()?,
        );

        self.render(SWAGGER_UI_TEMPLATE, &context)
    }

    pub fn redoc(&self, params: &RedocParams<'_>) -> Result<Html<String>, DocsError> {
        let mut context = Context::new();
        context.insert("title", params.title);
        context.insert("openapi_url", params.openapi_url);
        context.insert("js_url", params.js_url);
        context.insert("favicon_url", params.favicon_url);
        context.insert("with_google_fonts", &params.with_google_fonts);

        self.render(REDOC_TEMPLATE, &context)
    }

    /// Swagger UI の OAuth2 認可コードフローで使うリダイレクトページ
    pub fn oauth2_redirect(&self) -> Result<Html<String>, DocsError> {
        self.render(OAUTH2_REDIRECT_TEMPLATE, &Context::new())
    }

    fn render(&self, template: &str, context: &Context) -> Result<Html<String>, DocsError> {
        let html = self.engine.render(template, context)?;
        Ok(Html(html))
    }
}

/// `<script>` 内に埋め込む JSON 文字列
///
/// `</script>` で要素が閉じられないよう `<` を `\u003c` に置き換える。
fn script_json<T: Serialize + ?Sized>(value: &T) -> Result<String, DocsError> {
    let json = serde_json::to_string(value)
        .map_err(|e| DocsError::Template(format!("JSON 化に失敗しました: {e}")))?;
    Ok(json.replace('<', "\\u003c"))
}

/// Swagger UI ページを生成する
pub fn get_swagger_ui_html(params: &SwaggerUiParams<'_>) -> Result<Html<String>, DocsError> {
    DocsRenderer::new()?.swagger_ui(params)
}

/// ReDoc ページを生成する
pub fn get_redoc_html(params: &RedocParams<'_>) -> Result<Html<String>, DocsError> {
    DocsRenderer::new()?.redoc(params)
}

pub fn get_swagger_ui_oauth2_redirect_html() -> Result<Html<String>, DocsError> {
    DocsRenderer::new()?.oauth2_redirect()
}
