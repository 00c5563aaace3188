//! # アプリケーションイベントログ
//!
//! ルート登録、サブルーターの取り込み、起動・停止フックの実行といった
//! アプリケーション構成上のイベントを構造化ログとして出力する。
//!
//! [`log_app_event!`] は `event.kind = "app_event"` マーカーを付与するため、
//! `jq 'select(.["event.kind"] == "app_event")'` で抽出できる。
//!
//! フィールド名はドット記法（`event.action` 等）。JSON 出力ではフラットなキーになる。

/// アプリケーションイベントを構造化ログとして出力する。
///
/// 慣例として `event.category` と `event.action`（[`event`] の定数）、
/// `event.result` を指定する。
#[macro_export]
macro_rules! log_app_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "app_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    pub mod category {
        pub const ROUTING: &str = "routing";
        pub const LIFECYCLE: &str = "lifecycle";
        pub const SCHEMA: &str = "schema";
    }

    pub mod action {
        pub const ROUTER_INCLUDED: &str = "router.included";
        pub const APP_BUILT: &str = "app.built";
        pub const STARTUP_HOOK_COMPLETED: &str = "lifecycle.startup_hook_completed";
        pub const SHUTDOWN_HOOK_COMPLETED: &str = "lifecycle.shutdown_hook_completed";
        pub const OPENAPI_GENERATED: &str = "openapi.generated";
    }

    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    pub mod category {
        /// ユーザーが登録したフック・ハンドラの失敗
        pub const APPLICATION: &str = "application";
        /// 記述子の設定不備
        pub const CONFIGURATION: &str = "configuration";
    }

    pub mod kind {
        pub const LIFECYCLE_HOOK: &str = "lifecycle_hook";
        pub const DOCS_PAGE: &str = "docs_page";
    }
}
