//! 测试组运行器 - 编排状态机
//!
//! 状态机流程：解析 → 循环{加载迭代 → 迭代耗尽? 收尾测试组 :
//! 并发执行本迭代的测试} → 结束。每个测试内部是严格串行的步骤循环：
//! 加载步骤 → 调度 → 记日志 → 回到加载步骤，`Completed` 哨兵触发
//! 测试完成器。迭代之间严格串行；迭代内的测试并发数由信号量限制；
//! 整个运行包在一个墙钟超时里。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use ctf_services::HandlerRegistry;
use ctf_storage::LogRepository;

use crate::definition::{TestDefinition, TestGroupDefinition};
use crate::dispatch::OperationDispatcher;
use crate::finisher::{FatalPolicy, IterationsFinisher, TestFinisher, TestSummary};
use crate::iteration::IterationLoader;
use crate::logger::StepLogger;
use crate::parser::{InputParser, TestSource};
use crate::step::StepLoader;
use crate::waiter::WaitScheduler;
use crate::{EngineError, Result};

/// 迭代内并发测试数的默认上限
pub const DEFAULT_MAX_CONCURRENCY: usize = 39;

/// 整个运行的默认墙钟超时
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// 运行器配置
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// 迭代内并发测试数上限
    pub max_concurrency: usize,

    /// 整个运行的墙钟超时
    pub run_timeout: Duration,

    /// 致命条件策略
    pub fatal_policy: FatalPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            fatal_policy: FatalPolicy::default(),
        }
    }
}

/// 运行报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// 测试组 ID
    pub test_group_id: String,

    /// 迭代是否全部耗尽（异常终止时为 false）
    pub completed: bool,

    /// 执行过的迭代数
    pub iterations_run: usize,

    /// 执行过的测试数
    pub tests_run: usize,

    /// 执行过的步骤数
    pub steps_executed: usize,

    /// 失败的步骤数
    pub failed_steps: usize,

    /// 开始时间
    pub start_time: DateTime<Utc>,

    /// 结束时间
    pub end_time: Option<DateTime<Utc>>,

    /// 总耗时（毫秒）
    pub duration_ms: u64,
}

impl RunReport {
    fn new(test_group_id: &str) -> Self {
        Self {
            test_group_id: test_group_id.to_string(),
            completed: false,
            iterations_run: 0,
            tests_run: 0,
            steps_executed: 0,
            failed_steps: 0,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: 0,
        }
    }
}

/// 测试组运行器
pub struct TestGroupRunner {
    /// 操作处理器注册表
    registry: Arc<HandlerRegistry>,

    /// 日志仓储
    repo: Arc<LogRepository>,

    /// 等待调度器
    waiter: Arc<WaitScheduler>,

    /// 配置
    config: RunnerConfig,

    /// 在途测试任务（超时中止时统一放弃）
    abort_handles: Arc<Mutex<Vec<AbortHandle>>>,
}

impl TestGroupRunner {
    /// 创建新的运行器
    pub fn new(registry: Arc<HandlerRegistry>, repo: Arc<LogRepository>) -> Self {
        Self {
            registry,
            repo,
            waiter: Arc::new(WaitScheduler::new()),
            config: RunnerConfig::default(),
            abort_handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 设置配置
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置并发上限
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    /// 设置运行超时
    pub fn with_timeout(mut self, run_timeout: Duration) -> Self {
        self.config.run_timeout = run_timeout;
        self
    }

    /// 设置致命条件策略
    pub fn with_fatal_policy(mut self, fatal_policy: FatalPolicy) -> Self {
        self.config.fatal_policy = fatal_policy;
        self
    }

    /// 等待调度器（外部恢复/测试用）
    pub fn waiter(&self) -> Arc<WaitScheduler> {
        self.waiter.clone()
    }

    /// 执行测试组直到迭代耗尽或异常终止
    ///
    /// 超时会放弃所有在途测试任务并取消挂起的等待；致命条件终止只
    /// 停止调度新的迭代，当前迭代的在途测试会先执行完。
    pub async fn run(
        &self,
        definition: &TestGroupDefinition,
        source: &dyn TestSource,
    ) -> Result<RunReport> {
        let start = Instant::now();
        info!("开始执行测试组: {}", definition.test_group_id);

        let result = timeout(self.config.run_timeout, self.run_inner(definition, source)).await;

        match result {
            Ok(inner) => {
                let mut report = inner?;
                report.end_time = Some(Utc::now());
                report.duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    "测试组 {} 执行结束: {} 个迭代, {} 个测试, {} 个步骤 ({} 个失败)",
                    report.test_group_id,
                    report.iterations_run,
                    report.tests_run,
                    report.steps_executed,
                    report.failed_steps
                );
                Ok(report)
            }
            Err(_) => {
                error!("测试组 {} 超过墙钟超时, 中止执行", definition.test_group_id);

                let mut handles = self.abort_handles.lock().await;
                for handle in handles.drain(..) {
                    handle.abort();
                }
                drop(handles);
                self.waiter.cancel_all().await;

                Err(EngineError::Timeout)
            }
        }
    }

    async fn run_inner(
        &self,
        definition: &TestGroupDefinition,
        source: &dyn TestSource,
    ) -> Result<RunReport> {
        let logger = Arc::new(StepLogger::new(
            self.repo.clone(),
            &definition.test_group_id,
        ));
        let dispatcher = Arc::new(OperationDispatcher::new(
            self.registry.clone(),
            self.waiter.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));

        let mut iterations = InputParser::parse(definition, source).await?;
        let mut report = RunReport::new(&definition.test_group_id);

        loop {
            let batch = IterationLoader::load_next(&iterations);

            if batch.completed {
                IterationsFinisher::finish(&logger, &self.config.fatal_policy).await?;
                report.completed = true;
                return Ok(report);
            }

            let tests = batch.tests.unwrap_or_default();
            info!(
                "迭代 {} 开始: {} 个测试并发执行, 剩余 {} 个迭代",
                report.iterations_run,
                tests.len(),
                batch.remaining.len()
            );

            // 并发执行本迭代的测试, 每个测试先占一个信号量许可
            let mut handles = Vec::with_capacity(tests.len());
            for test in tests {
                let semaphore = semaphore.clone();
                let dispatcher = dispatcher.clone();
                let logger = logger.clone();
                let policy = self.config.fatal_policy.clone();

                let handle = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("信号量在运行期间不会关闭");
                    Self::run_test(&test, &dispatcher, &logger, &policy).await
                });
                self.abort_handles.lock().await.push(handle.abort_handle());
                handles.push(handle);
            }

            let mut halt_requested = false;
            for handle in handles {
                match handle.await {
                    Ok(Ok(summary)) => {
                        report.tests_run += 1;
                        report.steps_executed += summary.steps_executed;
                        report.failed_steps += summary.failed_steps;
                        halt_requested |= summary.halt_requested;
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(e) => {
                        return Err(EngineError::FatalCondition(format!(
                            "测试任务异常退出: {}",
                            e
                        )))
                    }
                }
            }
            self.abort_handles.lock().await.clear();
            report.iterations_run += 1;

            // 致命条件: 当前迭代的测试已经跑完, 不再调度后续迭代
            if halt_requested {
                warn!(
                    "测试组 {} 触发致命条件, 剩余 {} 个迭代不再执行",
                    definition.test_group_id,
                    batch.remaining.len()
                );
                self.waiter.cancel_all().await;
                return Err(EngineError::FatalCondition(
                    "测试失败, 按策略提前终止".to_string(),
                ));
            }

            iterations = batch.remaining;
        }
    }

    /// 执行单个测试: 严格串行的 加载步骤 → 调度 → 记日志 循环
    async fn run_test(
        test: &TestDefinition,
        dispatcher: &OperationDispatcher,
        logger: &StepLogger,
        policy: &FatalPolicy,
    ) -> Result<TestSummary> {
        let mut step_id: i64 = -1;
        let mut steps_executed = 0usize;
        let mut failed_steps = 0usize;

        loop {
            let step = StepLoader::load_next(&test.test_id, &test.steps, step_id);
            step_id = step.step_id;

            if step.is_completed() {
                // 哨兵不产生结果行, 由测试完成器写完成行
                return TestFinisher::finish(
                    logger,
                    policy,
                    &test.test_id,
                    steps_executed,
                    failed_steps,
                )
                .await;
            }

            let outcome = dispatcher.dispatch(&step).await;
            if !outcome.is_succeeded() {
                failed_steps += 1;
            }

            // 步骤结果先落盘, 循环才前进
            logger.log_step(&test.test_id, &step, &outcome).await?;
            steps_executed += 1;
        }
    }
}
