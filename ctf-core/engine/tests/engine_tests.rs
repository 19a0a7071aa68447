//! 引擎端到端测试
//!
//! 覆盖编排核心的可观测性质：结果行数量、并发上限、等待不阻塞
//! 同迭代的其他测试、未知操作降级、致命条件与超时终止。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use ctf_common::{StepOutcome, GROUP_FINISH_SCENARIO_ID};
use ctf_engine::{
    EngineError, FatalPolicy, InMemoryTestSource, StepDefinition, TestGroupDefinition,
    TestGroupRunner,
};
use ctf_services::{HandlerRegistry, OperationHandler, ServiceContext};
use ctf_storage::{LogRepository, StorageManager};

fn definition(tests: &[(&str, &[&str])]) -> TestGroupDefinition {
    TestGroupDefinition {
        test_group_id: "group-e2e".to_string(),
        log_ref: "group-e2e-log".to_string(),
        test_group: tests
            .iter()
            .map(|(file, deps)| {
                (
                    file.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect::<HashMap<_, _>>(),
    }
}

fn step(operation: &str, input: Value) -> StepDefinition {
    StepDefinition {
        operation: operation.to_string(),
        input,
    }
}

async fn runner() -> (TestGroupRunner, Arc<LogRepository>) {
    let services = ServiceContext::new();
    let registry = Arc::new(HandlerRegistry::with_builtin_handlers(&services).await);
    let storage = StorageManager::new_in_memory().await.unwrap();
    let repo = Arc::new(LogRepository::new(storage.pool().clone()));
    (TestGroupRunner::new(registry, repo.clone()), repo)
}

/// 记录并发峰值的探针处理器
struct ProbeHandler {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ProbeHandler {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationHandler for ProbeHandler {
    fn operation(&self) -> &str {
        "Probe"
    }

    async fn execute(&self, _input: Value) -> StepOutcome {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        StepOutcome::succeeded_empty()
    }
}

#[tokio::test]
async fn test_two_iterations_end_to_end() {
    let (runner, repo) = runner().await;
    let source = InMemoryTestSource::new()
        .insert(
            "t1.json",
            vec![
                step("CreateBucket", json!({ "bucket_name": "b1" })),
                step("DeleteBucket", json!({ "bucket_name": "b1" })),
            ],
        )
        .insert(
            "t2.json",
            vec![
                step("CreateBucket", json!({ "bucket_name": "b2" })),
                step("DeleteBucket", json!({ "bucket_name": "b2" })),
            ],
        );

    let report = runner
        .run(
            &definition(&[("t1.json", &[]), ("t2.json", &["t1.json"])]),
            &source,
        )
        .await
        .unwrap();

    // 2 个迭代 × 1 个测试 × 2 个步骤 = 4 条结果行
    assert!(report.completed);
    assert_eq!(report.iterations_run, 2);
    assert_eq!(report.tests_run, 2);
    assert_eq!(report.steps_executed, 4);
    assert_eq!(report.failed_steps, 0);
    assert_eq!(repo.count_results("group-e2e").await.unwrap(), 4);

    // 每个测试一条完成行, 测试组完成行恰好一条
    let rows = repo.list_for_group("group-e2e").await.unwrap();
    let test_finish = rows
        .iter()
        .filter(|r| r.status == "FINISH" && r.test_scenario_id != GROUP_FINISH_SCENARIO_ID)
        .count();
    let group_finish = rows
        .iter()
        .filter(|r| r.test_scenario_id == GROUP_FINISH_SCENARIO_ID)
        .count();
    assert_eq!(test_finish, 2);
    assert_eq!(group_finish, 1);

    // 测试组完成行在所有结果行之后
    let last = rows.last().unwrap();
    assert_eq!(last.test_scenario_id, GROUP_FINISH_SCENARIO_ID);
}

#[tokio::test]
async fn test_n_steps_log_exactly_n_result_rows() {
    let (runner, repo) = runner().await;
    let source = InMemoryTestSource::new().insert(
        "t.json",
        vec![
            step("CreateBucket", json!({ "bucket_name": "b" })),
            step(
                "CreateFile",
                json!({ "bucket_name": "b", "file_name": "f", "file_contents": {} }),
            ),
            step("DeleteFile", json!({ "bucket_name": "b", "file_name": "f" })),
        ],
    );

    runner
        .run(&definition(&[("t.json", &[])]), &source)
        .await
        .unwrap();

    // N 个步骤恰好 N 条结果行, 哨兵不产生结果行
    let rows = repo.list_for_test("group-e2e", "t.json").await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.last().unwrap().step_id, Some(2));
}

#[tokio::test]
async fn test_unknown_operation_logs_failure_and_continues() {
    let (runner, repo) = runner().await;
    let source = InMemoryTestSource::new().insert(
        "t.json",
        vec![
            step("Bogus", json!({})),
            step("CreateBucket", json!({ "bucket_name": "b" })),
        ],
    );

    let report = runner
        .run(&definition(&[("t.json", &[])]), &source)
        .await
        .unwrap();

    assert!(report.completed);
    assert_eq!(report.failed_steps, 1);

    let rows = repo.list_for_test("group-e2e", "t.json").await.unwrap();
    assert_eq!(rows[0].status, "FAILED");
    assert!(rows[0]
        .output
        .as_ref()
        .unwrap()
        .contains("Unknown Operation Requested: Bogus"));
    assert_eq!(rows[1].status, "SUCCEEDED");
}

#[tokio::test]
async fn test_concurrency_stays_under_the_ceiling() {
    let services = ServiceContext::new();
    let registry = Arc::new(HandlerRegistry::with_builtin_handlers(&services).await);
    let probe = Arc::new(ProbeHandler::new());
    registry.register(probe.clone()).await;

    let storage = StorageManager::new_in_memory().await.unwrap();
    let repo = Arc::new(LogRepository::new(storage.pool().clone()));
    let runner = TestGroupRunner::new(registry, repo.clone()).with_max_concurrency(39);

    // 同一迭代内 100 个测试
    let mut source = InMemoryTestSource::new();
    let mut tests: Vec<(String, Vec<String>)> = Vec::new();
    for i in 0..100 {
        let name = format!("t{:03}.json", i);
        source = source.insert(&name, vec![step("Probe", json!({}))]);
        tests.push((name, Vec::new()));
    }
    let definition = TestGroupDefinition {
        test_group_id: "group-e2e".to_string(),
        log_ref: "group-e2e-log".to_string(),
        test_group: tests.into_iter().collect(),
    };

    let report = runner.run(&definition, &source).await.unwrap();

    assert_eq!(report.iterations_run, 1);
    assert_eq!(report.tests_run, 100);
    assert_eq!(repo.count_results("group-e2e").await.unwrap(), 100);
    assert!(probe.peak() >= 2, "tests should actually run concurrently");
    assert!(
        probe.peak() <= 39,
        "concurrency ceiling exceeded: {}",
        probe.peak()
    );
}

#[tokio::test]
async fn test_wait_suspends_without_blocking_siblings() {
    let (runner, repo) = runner().await;
    let source = InMemoryTestSource::new()
        .insert(
            "slow.json",
            vec![
                step("Wait", json!({ "wait_time": 0.4 })),
                step("CreateBucket", json!({ "bucket_name": "slow" })),
            ],
        )
        .insert(
            "fast.json",
            vec![step("CreateBucket", json!({ "bucket_name": "fast" }))],
        );

    let report = runner
        .run(
            &definition(&[("slow.json", &[]), ("fast.json", &[])]),
            &source,
        )
        .await
        .unwrap();

    // 等待是下界
    assert!(report.duration_ms >= 400);

    // 挂起的测试没有挡住同迭代的兄弟测试: fast 的结果行先落盘
    let rows = repo.list_for_group("group-e2e").await.unwrap();
    let fast_row = rows
        .iter()
        .find(|r| r.test_id.as_deref() == Some("fast.json"))
        .unwrap();
    let wait_row = rows
        .iter()
        .find(|r| r.test_scenario_id == "T<slow.json>:S<Wait>")
        .unwrap();
    assert!(fast_row.id < wait_row.id);
    assert_eq!(wait_row.status, "SUCCEEDED");
    assert!(wait_row.output.as_ref().unwrap().contains("Wait Complete"));
}

#[tokio::test]
async fn test_failed_step_threshold_halts_the_group() {
    let (runner, repo) = runner().await;
    let runner = runner.with_fatal_policy(FatalPolicy {
        failed_step_threshold: Some(2),
        halt_on_test_failure: false,
    });
    let source = InMemoryTestSource::new().insert(
        "t.json",
        vec![step("Bogus", json!({})), step("AlsoBogus", json!({}))],
    );

    let err = runner
        .run(&definition(&[("t.json", &[])]), &source)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FatalCondition(_)));

    // 异常终止时没有测试组完成行, 日志可以区分"失败但继续"和"提前终止"
    let rows = repo.list_for_group("group-e2e").await.unwrap();
    assert!(rows
        .iter()
        .all(|r| r.test_scenario_id != GROUP_FINISH_SCENARIO_ID));
    assert_eq!(repo.count_failed("group-e2e").await.unwrap(), 2);
}

#[tokio::test]
async fn test_malformed_definition_aborts_before_execution() {
    let (runner, repo) = runner().await;
    let source = InMemoryTestSource::new();

    // 依赖环
    let err = runner
        .run(
            &definition(&[("a.json", &["b.json"]), ("b.json", &["a.json"])]),
            &source,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedInput(_)));
    assert_eq!(repo.list_for_group("group-e2e").await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_empty_group_completes_with_finisher_only() {
    let (runner, repo) = runner().await;
    let source = InMemoryTestSource::new();

    let report = runner.run(&definition(&[]), &source).await.unwrap();

    assert!(report.completed);
    assert_eq!(report.tests_run, 0);

    let rows = repo.list_for_group("group-e2e").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].test_scenario_id, GROUP_FINISH_SCENARIO_ID);
}
