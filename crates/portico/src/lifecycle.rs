//! # ライフサイクルフック
//!
//! 起動時・停止時に実行する非同期処理。ルーターが保持し、
//! [`crate::App::serve`] がサーバー起動前・停止後に実行する。
//!
//! - 起動フック: 登録順に実行し、最初の失敗で中断する（サーバーは起動しない）
//! - 停止フック: 登録順にすべて実行し、失敗はログに残して最初のエラーを返す

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use portico_shared::{
    event_log::{error, event},
    log_app_event,
};

use crate::error::AppError;

type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type HookFn = dyn Fn() -> HookFuture + Send + Sync;

/// フックの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Event {
    Startup,
    Shutdown,
}

/// 名前付きの非同期フック
#[derive(Clone)]
pub struct LifecycleHook {
    name: String,
    run:  Arc<HookFn>,
}

impl LifecycleHook {
    pub fn new<F, Fut>(name: impl Into<String>, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run:  Arc::new(move || Box::pin(hook())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        (self.run)().await
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHook")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_startup(hooks: &[LifecycleHook]) -> Result<(), AppError> {
    for hook in hooks {
        if let Err(err) = hook.run().await {
            tracing::error!(
                event.category = event::category::LIFECYCLE,
                event.action = event::action::STARTUP_HOOK_COMPLETED,
                event.result = event::result::FAILURE,
                error.category = error::category::APPLICATION,
                error.kind = error::kind::LIFECYCLE_HOOK,
                hook = hook.name(),
                "起動フックが失敗しました: {err:#}"
            );
            return Err(AppError::lifecycle(hook.name(), err));
        }
        log_app_event!(
            event.category = event::category::LIFECYCLE,
            event.action = event::action::STARTUP_HOOK_COMPLETED,
            event.result = event::result::SUCCESS,
            hook = hook.name(),
            "起動フックを実行しました"
        );
    }
    Ok(())
}

pub(crate) async fn run_shutdown(hooks: &[LifecycleHook]) -> Result<(), AppError> {
    let mut first_error = None;
    for hook in hooks {
        match hook.run().await {
            Ok(()) => {
                log_app_event!(
                    event.category = event::category::LIFECYCLE,
                    event.action = event::action::SHUTDOWN_HOOK_COMPLETED,
                    event.result = event::result::SUCCESS,
                    hook = hook.name(),
                    "停止フックを実行しました"
                );
            }
            Err(err) => {
                tracing::error!(
                    event.category = event::category::LIFECYCLE,
                    event.action = event::action::SHUTDOWN_HOOK_COMPLETED,
                    event.result = event::result::FAILURE,
                    error.category = error::category::APPLICATION,
                    error.kind = error::kind::LIFECYCLE_HOOK,
                    hook = hook.name(),
                    "停止フックが失敗しました: {err:#}"
                );
                first_error.get_or_insert_with(|| AppError::lifecycle(hook.name(), err));
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}
