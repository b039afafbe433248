//! Forward Executor：按计划顺序执行步骤
//!
//! 单个 run 内串行：每轮检查取消，选出计划顺序中第一个前置步骤全部 done 的步骤，
//! 在执行时解析工具并调用；失败交给 RecoveryEngine 决定重试、重规划或终止。
//! 重规划以失败步骤描述为子目标、以当前有效事实为初始状态重新倒推，子计划拼接在失败步骤之后，
//! 依赖失败步骤的步骤改为依赖子计划目标步骤，失败步骤标记 skipped。
//! 每个原始步骤至多重规划一次，拼接进来的步骤不再重规划。
//! 未落地计划的尽力步骤不重规划：重试耗尽后标记 skipped 并记为假设事实，目标步骤除外。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backward::BackwardPlanner;
use crate::core::recovery::FailureContext;
use crate::core::{AgentError, RecoveryAction, RecoveryEngine, RunId, RunState, RunStatus};
use crate::engine::events::{EventType, MonitorEvent, MonitoringSink};
use crate::engine::record::{ExecutionRecord, RecordEntry};
use crate::memory::{Fact, FactSource, MemorySnapshot, WorkingMemory};
use crate::plan::{Goal, Plan, Reorderer, StepId, StepStatus};
use crate::tools::{ToolExecutor, ToolInput, REASONING_TOOL};

/// 运行摘要：执行步数、耗时
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionSummary {
    pub steps_executed: usize,
    pub total_steps: usize,
    pub replans: usize,
    pub planning_ms: u64,
    pub execution_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedRun {
    pub output: String,
    pub record: ExecutionRecord,
    pub memory: MemorySnapshot,
    pub summary: ExecutionSummary,
}

/// 终止时的部分结果：失败点、尝试次数、已完成输出与累积事实
#[derive(Debug, Clone, Serialize)]
pub struct PartialResult {
    pub failed_step: Option<StepId>,
    pub attempts: u32,
    pub error_kind: String,
    pub error: String,
    pub completed_outputs: BTreeMap<StepId, String>,
    pub facts: Vec<Fact>,
    pub record: ExecutionRecord,
    pub summary: ExecutionSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Completed(CompletedRun),
    Aborted(PartialResult),
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Completed(_) => RunState::Completed,
            RunOutcome::Aborted(_) => RunState::Aborted,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn summary(&self) -> &ExecutionSummary {
        match self {
            RunOutcome::Completed(c) => &c.summary,
            RunOutcome::Aborted(p) => &p.summary,
        }
    }
}

/// 执行中止的位置与原因
#[derive(Debug)]
struct Failure {
    step: Option<StepId>,
    attempts: u32,
    error: AgentError,
}

impl Failure {
    fn cancelled(step: Option<StepId>, attempts: u32) -> Self {
        Self {
            step,
            attempts,
            error: AgentError::Cancelled,
        }
    }
}

pub struct ForwardExecutor {
    run_id: RunId,
    plan: Plan,
    memory: WorkingMemory,
    record: ExecutionRecord,
    tools: Arc<ToolExecutor>,
    planner: Arc<BackwardPlanner>,
    recovery: RecoveryEngine,
    sink: Arc<dyn MonitoringSink>,
    cancel: CancellationToken,
    status_tx: watch::Sender<RunStatus>,
    /// 已重规划过的原始步骤
    replanned: HashSet<StepId>,
    planning_time: Duration,
    outcome: Option<RunOutcome>,
}

impl ForwardExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: impl Into<RunId>,
        plan: Plan,
        memory: WorkingMemory,
        tools: Arc<ToolExecutor>,
        planner: Arc<BackwardPlanner>,
        recovery: RecoveryEngine,
        sink: Arc<dyn MonitoringSink>,
        cancel: CancellationToken,
    ) -> Self {
        let run_id = run_id.into();
        let (status_tx, _) = watch::channel(RunStatus::queued(run_id.clone(), plan.len()));
        Self {
            run_id,
            plan,
            memory,
            record: ExecutionRecord::new(),
            tools,
            planner,
            recovery,
            sink,
            cancel,
            status_tx,
            replanned: HashSet::new(),
            planning_time: Duration::ZERO,
            outcome: None,
        }
    }

    pub fn with_planning_time(mut self, planning_time: Duration) -> Self {
        self.planning_time = planning_time;
        self
    }

    /// 使用外部的状态通道（编排器持有其接收端）
    pub fn with_status_channel(mut self, status_tx: watch::Sender<RunStatus>) -> Self {
        self.status_tx = status_tx;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    /// 执行直到目标步骤完成或终止；重复调用返回同一结果，不再调用任何工具
    pub async fn run(&mut self) -> RunOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let started = Instant::now();
        self.emit(
            None,
            EventType::Planned,
            json!({
                "steps": self.plan.steps.iter().map(|s| &s.description).collect::<Vec<_>>(),
                "ungrounded": self.plan.ungrounded,
            }),
        );
        if self.plan.ungrounded {
            tracing::warn!(run_id = %self.run_id, "plan is ungrounded; earliest steps run best-effort");
        }
        self.publish(RunState::Executing, None);

        let result = self.drive().await;
        let summary = ExecutionSummary {
            steps_executed: self.plan.done_steps().count(),
            total_steps: self
                .plan
                .steps
                .iter()
                .filter(|s| s.status != StepStatus::Skipped)
                .count(),
            replans: self.replanned.len(),
            planning_ms: self.planning_time.as_millis() as u64,
            execution_ms: started.elapsed().as_millis() as u64,
        };

        let outcome = match result {
            Ok(output) => {
                self.emit(None, EventType::RunCompleted, json!({ "summary": summary }));
                tracing::info!(
                    run_id = %self.run_id,
                    steps = summary.steps_executed,
                    execution_ms = summary.execution_ms,
                    "run completed"
                );
                RunOutcome::Completed(CompletedRun {
                    output,
                    record: self.record.clone(),
                    memory: self.memory.snapshot(),
                    summary,
                })
            }
            Err(failure) => {
                self.emit(
                    failure.step.as_deref(),
                    EventType::RunAborted,
                    json!({
                        "kind": failure.error.kind(),
                        "error": failure.error.to_string(),
                        "attempts": failure.attempts,
                    }),
                );
                tracing::warn!(
                    run_id = %self.run_id,
                    step_id = failure.step.as_deref().unwrap_or("-"),
                    error = %failure.error,
                    "run aborted"
                );
                RunOutcome::Aborted(PartialResult {
                    failed_step: failure.step,
                    attempts: failure.attempts,
                    error_kind: failure.error.kind().to_string(),
                    error: failure.error.to_string(),
                    completed_outputs: self.memory.outputs().clone(),
                    facts: self.memory.facts().to_vec(),
                    record: self.record.clone(),
                    summary,
                })
            }
        };

        self.publish(outcome.state(), None);
        self.outcome = Some(outcome.clone());
        outcome
    }

    async fn drive(&mut self) -> Result<String, Failure> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Failure::cancelled(None, 0));
            }

            if let Some(goal) = self.plan.goal_step() {
                if goal.status == StepStatus::Done {
                    return Ok(goal.result.clone().unwrap_or_default());
                }
            }

            let next = self
                .plan
                .steps
                .iter()
                .find(|s| matches!(s.status, StepStatus::Pending | StepStatus::Ready) && self.plan.deps_done(s))
                .map(|s| s.id.clone());
            let Some(step_id) = next else {
                return Err(Failure {
                    step: Some(self.plan.goal_step.clone()),
                    attempts: 0,
                    error: AgentError::InvalidPlan("no runnable step before the goal step".to_string()),
                });
            };

            self.execute_step(&step_id).await?;
        }
    }

    async fn execute_step(&mut self, step_id: &str) -> Result<(), Failure> {
        let (description, best_effort) = match self.plan.step_mut(step_id) {
            Some(step) => {
                step.status = StepStatus::Ready;
                (step.description.clone(), step.best_effort)
            }
            None => {
                return Err(Failure {
                    step: Some(step_id.to_string()),
                    attempts: 0,
                    error: AgentError::InvalidPlan(format!("unknown step {}", step_id)),
                })
            }
        };
        self.emit(Some(step_id), EventType::Ready, json!({ "description": description }));

        let tool = self.tools.resolve(&description);
        let tool_name = tool.name().to_string();
        // 未落地的最早步骤：不重规划，耗尽重试后跳过
        if best_effort {
            tracing::warn!(run_id = %self.run_id, step_id, "executing best-effort step");
        }

        loop {
            let attempts = self.plan.step(step_id).map(|s| s.attempts).unwrap_or(0);
            if self.cancel.is_cancelled() {
                return Err(Failure::cancelled(Some(step_id.to_string()), attempts));
            }

            let input = {
                let Some(step) = self.plan.step_mut(step_id) else {
                    return Err(Failure {
                        step: Some(step_id.to_string()),
                        attempts,
                        error: AgentError::InvalidPlan(format!("unknown step {}", step_id)),
                    });
                };
                step.attempts += 1;
                step.status = StepStatus::Running;
                step.tool = Some(tool_name.clone());
                ToolInput::from_step(step, &self.memory)
            };
            let attempt = attempts + 1;
            self.publish(RunState::Executing, Some(step_id));
            self.emit(
                Some(step_id),
                EventType::Started,
                json!({ "tool": tool_name, "attempt": attempt }),
            );
            tracing::debug!(status = %self.plan.render_status(Some(step_id)), "plan status");

            let input_text = input.payload_or_description().to_string();
            let started = Instant::now();
            let timestamp = Utc::now();
            let result = self.tools.invoke(tool.as_ref(), input, &self.cancel).await;
            self.record.push(RecordEntry {
                step_id: step_id.to_string(),
                attempt,
                tool: tool_name.clone(),
                input: input_text,
                output: result.as_ref().ok().cloned(),
                error: result.as_ref().err().map(|e| e.to_string()),
                timestamp,
                duration_ms: started.elapsed().as_millis() as u64,
            });

            let error = match result {
                Ok(output) => {
                    self.complete_step(step_id, &description, &tool_name, output);
                    return Ok(());
                }
                Err(e) => e,
            };

            let (can_replan, origin) = match self.plan.step_mut(step_id) {
                Some(step) => {
                    step.status = StepStatus::Failed;
                    (
                        !best_effort && step.origin.is_none() && !self.replanned.contains(step_id),
                        step.origin.clone(),
                    )
                }
                None => (false, None),
            };
            if matches!(error, AgentError::Cancelled) {
                return Err(Failure::cancelled(Some(step_id.to_string()), attempt));
            }
            self.emit(
                Some(step_id),
                EventType::Failed,
                json!({ "tool": tool_name, "attempt": attempt, "error": error.to_string() }),
            );

            match self.recovery.handle(&error, FailureContext { attempts: attempt, can_replan }) {
                RecoveryAction::Retry => {
                    tracing::info!(run_id = %self.run_id, step_id, attempt, "retrying step");
                }
                RecoveryAction::Replan => return self.replan(step_id, &description, attempt, error).await,
                RecoveryAction::Abort if best_effort && step_id != self.plan.goal_step => {
                    self.skip_best_effort(step_id, &description, attempt, &error);
                    return Ok(());
                }
                RecoveryAction::Abort => {
                    // 子计划步骤耗尽：归因到被替换的原始步骤
                    let error = match origin {
                        Some(origin) => AgentError::ReplanningExhausted {
                            step_id: origin,
                            attempts: attempt,
                            reason: error.to_string(),
                        },
                        None => error,
                    };
                    return Err(Failure {
                        step: Some(step_id.to_string()),
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }

    fn complete_step(&mut self, step_id: &str, description: &str, tool_name: &str, output: String) {
        if let Some(step) = self.plan.step_mut(step_id) {
            step.status = StepStatus::Done;
            step.result = Some(output.clone());
        }
        self.memory
            .record_step_output(&step_id.to_string(), description, output.clone());
        if tool_name == REASONING_TOOL {
            self.memory
                .add_fact(output.clone(), FactSource::Assumption(step_id.to_string()));
        }
        self.emit(
            Some(step_id),
            EventType::Completed,
            json!({ "tool": tool_name, "output": preview(&output) }),
        );
        self.publish(RunState::Executing, None);
    }

    /// 尽力步骤失败：标记 skipped，以假设事实记录未验证的前置条件，后续步骤照常执行
    fn skip_best_effort(&mut self, step_id: &str, description: &str, attempts: u32, error: &AgentError) {
        if let Some(step) = self.plan.step_mut(step_id) {
            step.status = StepStatus::Skipped;
        }
        self.memory.assert_fact(
            description,
            format!("Unverified: {} ({})", description, error),
            FactSource::Assumption(step_id.to_string()),
        );
        tracing::warn!(run_id = %self.run_id, step_id, attempts, error = %error, "best-effort step skipped");
        self.emit(
            Some(step_id),
            EventType::Skipped,
            json!({ "attempts": attempts, "error": error.to_string() }),
        );
        self.publish(RunState::Executing, None);
    }

    async fn replan(
        &mut self,
        failed_id: &str,
        description: &str,
        attempts: u32,
        cause: AgentError,
    ) -> Result<(), Failure> {
        self.replanned.insert(failed_id.to_string());
        tracing::info!(run_id = %self.run_id, step_id = failed_id, cause = %cause, "replanning step");

        let exhausted = |reason: String| Failure {
            step: Some(failed_id.to_string()),
            attempts,
            error: AgentError::ReplanningExhausted {
                step_id: failed_id.to_string(),
                attempts,
                reason,
            },
        };

        let facts = self.memory.fact_texts();
        let target = Goal::new(description);
        let chain = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(Failure::cancelled(Some(failed_id.to_string()), attempts));
            }
            r = self.planner.decompose(&target, &facts) => r.map_err(|e| exhausted(e.to_string()))?,
        };
        let prefix = format!("{}.r", failed_id);
        let mut sub = Reorderer::new()
            .reorder_with_prefix(&chain, &prefix)
            .map_err(|e| exhausted(e.to_string()))?;

        let Some(pos) = self.plan.position(failed_id) else {
            return Err(exhausted(format!("step {} vanished from plan", failed_id)));
        };
        let failed_deps = self.plan.steps[pos].dependencies.clone();
        for step in sub.steps.iter_mut() {
            step.origin = Some(failed_id.to_string());
            if step.dependencies.is_empty() {
                step.dependencies = failed_deps.clone();
            }
        }
        let sub_goal = sub.goal_step.clone();

        for step in self.plan.steps.iter_mut() {
            for dep in step.dependencies.iter_mut() {
                if dep == failed_id {
                    *dep = sub_goal.clone();
                }
            }
        }
        {
            let failed = &mut self.plan.steps[pos];
            failed.status = StepStatus::Skipped;
            failed.replaced_by = Some(sub_goal.clone());
        }
        if self.plan.goal_step == failed_id {
            self.plan.goal_step = sub_goal.clone();
        }
        let sub_ids: Vec<StepId> = sub.steps.iter().map(|s| s.id.clone()).collect();
        for (offset, step) in sub.steps.into_iter().enumerate() {
            self.plan.steps.insert(pos + 1 + offset, step);
        }
        self.plan.validate_order().map_err(exhausted)?;

        self.emit(
            Some(failed_id),
            EventType::Replanned,
            json!({ "replaced_by": sub_goal, "steps": sub_ids, "cause": cause.to_string() }),
        );
        self.publish(RunState::Executing, None);
        Ok(())
    }

    fn publish(&self, state: RunState, current: Option<&str>) {
        let status = RunStatus {
            run_id: self.run_id.clone(),
            state,
            completed_steps: self.plan.done_steps().map(|s| s.id.clone()).collect(),
            current_step: current.map(str::to_string),
            total_steps: self
                .plan
                .steps
                .iter()
                .filter(|s| s.status != StepStatus::Skipped)
                .count(),
        };
        self.status_tx.send_replace(status);
    }

    fn emit(&self, step_id: Option<&str>, event_type: EventType, payload: serde_json::Value) {
        self.sink
            .emit(MonitorEvent::new(&self.run_id, step_id, event_type, payload));
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
