//! 等待调度器 - 挂起/恢复式的定时等待
//!
//! Wait 操作不允许占着工作线程睡眠：调度器为每次等待发放一个可恢复
//! 令牌并登记结果通道，由独立的定时任务在时长到期后携带令牌回调
//! `resume`，被挂起的测试在通道上异步等待，期间不占用任何执行资源。
//! 整个运行被中止时 `cancel_all` 丢弃所有挂起的等待。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use ctf_common::StepOutcome;

/// 等待令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitToken(Uuid);

impl std::fmt::Display for WaitToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 等待调度器
#[derive(Default)]
pub struct WaitScheduler {
    /// 挂起的等待 (令牌 -> 结果发送器)
    pending: Arc<RwLock<HashMap<WaitToken, oneshot::Sender<StepOutcome>>>>,
}

impl WaitScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 挂起当前步骤，返回令牌和结果接收器
    ///
    /// 调用方在接收器上等待；令牌交给外部定时器，到期后回调 [`resume`]。
    ///
    /// [`resume`]: WaitScheduler::resume
    pub async fn suspend(&self) -> (WaitToken, oneshot::Receiver<StepOutcome>) {
        let token = WaitToken(Uuid::new_v4());
        let (result_tx, result_rx) = oneshot::channel();

        self.pending.write().await.insert(token, result_tx);
        debug!("挂起等待: token={}", token);

        (token, result_rx)
    }

    /// 携带令牌恢复被挂起的步骤
    ///
    /// 令牌未知（已恢复或已取消）时忽略并返回 false。
    pub async fn resume(&self, token: WaitToken) -> bool {
        let sender = self.pending.write().await.remove(&token);

        match sender {
            Some(result_tx) => {
                debug!("恢复等待: token={}", token);
                if result_tx
                    .send(StepOutcome::succeeded_text("Wait Complete"))
                    .is_err()
                {
                    warn!("等待方已不在, 恢复被丢弃: token={}", token);
                }
                true
            }
            None => {
                warn!("收到未知令牌的恢复请求: token={}", token);
                false
            }
        }
    }

    /// 启动定时任务，在时长到期后恢复令牌
    pub fn schedule_resume(&self, token: WaitToken, duration: Duration) {
        let pending = self.pending.clone();

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;

            let sender = pending.write().await.remove(&token);
            if let Some(result_tx) = sender {
                debug!("定时器到期, 恢复等待: token={}", token);
                let _ = result_tx.send(StepOutcome::succeeded_text("Wait Complete"));
            }
        });
    }

    /// 挂起指定秒数后恢复，返回步骤结果
    ///
    /// 等待时长是下界；运行被中止导致等待被取消时返回失败结果。
    pub async fn wait(&self, wait_time: f64) -> StepOutcome {
        let duration = match Duration::try_from_secs_f64(wait_time) {
            Ok(duration) => duration,
            Err(_) => {
                return StepOutcome::failed(&format!("Error: invalid wait_time: {}", wait_time))
            }
        };

        let (token, result_rx) = self.suspend().await;
        self.schedule_resume(token, duration);

        match result_rx.await {
            Ok(outcome) => outcome,
            // 发送端被 cancel_all 丢弃
            Err(_) => StepOutcome::failed("Error: wait cancelled"),
        }
    }

    /// 取消所有挂起的等待（运行中止时调用）
    pub async fn cancel_all(&self) -> usize {
        let mut pending = self.pending.write().await;
        let count = pending.len();
        pending.clear();

        if count > 0 {
            warn!("取消 {} 个挂起的等待", count);
        }

        count
    }

    /// 挂起的等待数量
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}
