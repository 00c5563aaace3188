//! # デモサーバー設定
//!
//! 環境変数からバインド先と管理 API キーを読み込む。
//! 記述子の設定（タイトル・ドキュメント URL 等）は [`portico::AppSettings`] が
//! `PORTICO__*` 環境変数と設定ファイルから読み込む。

use std::{env, path::PathBuf};

use anyhow::Context as _;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// デモサーバーの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// バインドアドレス
    pub host: String,
    /// ポート番号
    pub port: u16,
    /// 記述子の設定ファイル（任意）
    pub settings_path: Option<PathBuf>,
    /// `/admin` 配下のルートで要求する API キー
    ///
    /// 未設定の場合、管理ルートはすべて 401 を返す。
    pub admin_api_key: Option<String>,
}

impl DemoConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("PORTICO_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: parse_port(env::var("PORTICO_PORT").ok().as_deref())?,
            settings_path: env::var_os("PORTICO_SETTINGS").map(PathBuf::from),
            admin_api_key: non_blank(env::var("PORTICO_ADMIN_API_KEY").ok()),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// ポート番号をパースする（未設定ならデフォルト）
fn parse_port(value: Option<&str>) -> anyhow::Result<u16> {
    match value {
        None => Ok(DEFAULT_PORT),
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("PORTICO_PORT は有効なポート番号である必要があります: {value}")),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
