//! 运行编排：对外的 run 接口
//!
//! start_run 在调用方任务内完成倒推与重排（PlanningFailure / InvalidPlan 直接返回），
//! 然后把执行交给独立的 tokio 任务；每个 run 有自己的工作记忆、执行记录与取消令牌。
//! 状态经 watch 通道投影给 get_status，最终结果经另一个 watch 通道交给 get_result / wait。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::backward::{BackwardPlanner, Reasoner};
use crate::core::{AgentError, RecoveryEngine, RunId, RunScheduler, RunStatus, RunSupervisor};
use crate::engine::{ForwardExecutor, MonitoringSink, RunOutcome, TracingSink};
use crate::memory::WorkingMemory;
use crate::plan::{Goal, Reorderer};
use crate::tools::{default_tool_timeouts, ToolExecutor, ToolRegistry, DEFAULT_TOOL_TIMEOUT_SECS};

/// 单次运行的配置
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_planning_depth")]
    pub max_planning_depth: usize,
    #[serde(default = "default_max_retries_per_step")]
    pub max_retries_per_step: u32,
    /// 按工具名的超时（秒），未列出的工具用 default_tool_timeout_secs
    #[serde(default = "default_tool_timeouts")]
    pub tool_timeout_seconds: HashMap<String, u64>,
    #[serde(default = "default_tool_timeout_secs")]
    pub default_tool_timeout_secs: u64,
    #[serde(default = "default_allow_replanning")]
    pub allow_replanning: bool,
}

fn default_max_planning_depth() -> usize {
    10
}

fn default_max_retries_per_step() -> u32 {
    2
}

fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

fn default_allow_replanning() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_planning_depth: default_max_planning_depth(),
            max_retries_per_step: default_max_retries_per_step(),
            tool_timeout_seconds: default_tool_timeouts(),
            default_tool_timeout_secs: default_tool_timeout_secs(),
            allow_replanning: default_allow_replanning(),
        }
    }
}

struct RunEntry {
    supervisor: RunSupervisor,
    status_rx: watch::Receiver<RunStatus>,
    outcome_rx: watch::Receiver<Option<RunOutcome>>,
}

/// 管理所有 run 的生命周期
pub struct RunManager {
    reasoner: Arc<dyn Reasoner>,
    tools: Arc<ToolRegistry>,
    sink: Arc<dyn MonitoringSink>,
    scheduler: RunScheduler,
    shutdown: CancellationToken,
    runs: RwLock<HashMap<RunId, RunEntry>>,
}

impl RunManager {
    pub fn new(reasoner: Arc<dyn Reasoner>, tools: ToolRegistry) -> Self {
        Self {
            reasoner,
            tools: Arc::new(tools),
            sink: Arc::new(TracingSink),
            scheduler: RunScheduler::default(),
            shutdown: CancellationToken::new(),
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MonitoringSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.scheduler = RunScheduler::new(max);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// 规划并启动一个 run，返回 run_id；规划失败时不创建 run
    pub async fn start_run(
        &self,
        goal: Goal,
        initial_facts: Vec<String>,
        config: RunConfig,
    ) -> Result<RunId, AgentError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, goal = %goal.description, "starting run");

        let started = Instant::now();
        let planner = Arc::new(BackwardPlanner::new(self.reasoner.clone(), config.max_planning_depth));
        let chain = planner.decompose(&goal, &initial_facts).await?;
        let plan = Reorderer::new().reorder(&chain)?;
        let planning_time = started.elapsed();
        tracing::info!(run_id = %run_id, steps = plan.len(), "plan ready");

        let supervisor = RunSupervisor::child_of(&self.shutdown);
        let (status_tx, status_rx) = watch::channel(RunStatus::queued(run_id.clone(), plan.len()));
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let tools = Arc::new(
            ToolExecutor::new(self.tools.clone(), config.default_tool_timeout_secs)
                .with_timeouts(&config.tool_timeout_seconds),
        );
        let mut executor = ForwardExecutor::new(
            run_id.clone(),
            plan,
            WorkingMemory::new(goal, initial_facts),
            tools,
            planner,
            RecoveryEngine::new(config.max_retries_per_step, config.allow_replanning),
            self.sink.clone(),
            supervisor.cancel_token(),
        )
        .with_planning_time(planning_time)
        .with_status_channel(status_tx);

        self.runs.write().await.insert(
            run_id.clone(),
            RunEntry {
                supervisor: supervisor.clone(),
                status_rx,
                outcome_rx,
            },
        );

        let scheduler = self.scheduler.clone();
        let cancel = supervisor.cancel_token();
        tokio::spawn(async move {
            // 拿到许可前状态保持 QUEUED；排队期间被取消时拿不到许可，执行器会在第一轮检查中直接终止
            let _permit = scheduler.acquire(&cancel).await;
            let outcome = executor.run().await;
            outcome_tx.send_replace(Some(outcome));
        });

        Ok(run_id)
    }

    pub async fn get_status(&self, run_id: &str) -> Result<RunStatus, AgentError> {
        let runs = self.runs.read().await;
        let entry = runs
            .get(run_id)
            .ok_or_else(|| AgentError::RunNotFound(run_id.to_string()))?;
        let status = entry.status_rx.borrow().clone();
        Ok(status)
    }

    pub async fn cancel(&self, run_id: &str) -> Result<(), AgentError> {
        let runs = self.runs.read().await;
        let entry = runs
            .get(run_id)
            .ok_or_else(|| AgentError::RunNotFound(run_id.to_string()))?;
        tracing::info!(run_id, "cancel requested");
        entry.supervisor.cancel();
        Ok(())
    }

    /// 运行中返回 None
    pub async fn get_result(&self, run_id: &str) -> Result<Option<RunOutcome>, AgentError> {
        let runs = self.runs.read().await;
        let entry = runs
            .get(run_id)
            .ok_or_else(|| AgentError::RunNotFound(run_id.to_string()))?;
        let outcome = entry.outcome_rx.borrow().clone();
        Ok(outcome)
    }

    /// 等待 run 结束并返回结果
    pub async fn wait(&self, run_id: &str) -> Result<RunOutcome, AgentError> {
        let mut rx = {
            let runs = self.runs.read().await;
            runs.get(run_id)
                .ok_or_else(|| AgentError::RunNotFound(run_id.to_string()))?
                .outcome_rx
                .clone()
        };
        let outcome = rx
            .wait_for(|o| o.is_some())
            .await
            .map_err(|_| AgentError::Cancelled)?
            .clone();
        outcome.ok_or(AgentError::Cancelled)
    }

    /// 移除已结束的 run 并返回其结果；未结束的 run 保留并返回 RunInProgress
    pub async fn forget(&self, run_id: &str) -> Result<RunOutcome, AgentError> {
        let mut runs = self.runs.write().await;
        let entry = runs
            .get(run_id)
            .ok_or_else(|| AgentError::RunNotFound(run_id.to_string()))?;
        let outcome = entry.outcome_rx.borrow().clone();
        let Some(outcome) = outcome else {
            return Err(AgentError::RunInProgress(run_id.to_string()));
        };
        runs.remove(run_id);
        tracing::debug!(run_id, "run forgotten");
        Ok(outcome)
    }

    /// 管理器当前保存的 run 数
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// 取消所有 run（进程退出时调用）
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
