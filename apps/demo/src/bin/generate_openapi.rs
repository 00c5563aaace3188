//! # OpenAPI YAML 生成ツール
//!
//! デモサービスの記述子から OpenAPI ドキュメントを YAML 形式で標準出力に出力する。
//! 記述子の設定は環境変数（`PORTICO__*`）と `PORTICO_SETTINGS` の設定ファイルに従う。
//!
//! ## 使い方
//!
//! ```bash
//! cargo run --bin generate-openapi -p portico-demo > openapi/openapi.yaml
//! ```

use std::{env, path::PathBuf};

use portico::AppSettings;
use portico_demo::build_app;

fn main() -> anyhow::Result<()> {
    let settings_path = env::var_os("PORTICO_SETTINGS").map(PathBuf::from);
    let settings = AppSettings::load(settings_path.as_deref())?;
    let app = build_app(settings, None)?;

    let yaml = app.openapi()?.to_yaml()?;
    print!("{yaml}");
    Ok(())
}
