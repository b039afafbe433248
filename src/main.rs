//! Backplan 命令行入口
//!
//! 加载配置，注册内置工具与 step-back 分解表，启动一个 run；Ctrl+C 取消。
//! 结果以 JSON 打印，run 终止（ABORTED）时以非零状态退出。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use backplan::backward::ScriptedReasoner;
use backplan::config::{load_config, AppConfig};
use backplan::observability;
use backplan::tools::{CodeExecTool, ShellTool, TerminateTool, ToolRegistry, WebSearchTool};
use backplan::{Goal, RunManager, RunOutcome};
use clap::Parser;

/// 从目标倒推前置条件，再正向执行
#[derive(Parser, Debug)]
#[command(name = "backplan")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 目标描述
    goal: String,

    /// 初始事实，可重复
    #[arg(long = "fact", value_name = "TEXT")]
    facts: Vec<String>,

    /// 额外的配置文件
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// step-back 分解表（TOML），覆盖配置中的 reasoner.script
    #[arg(long, value_name = "PATH")]
    script: Option<PathBuf>,
}

fn build_tools(cfg: &AppConfig) -> anyhow::Result<ToolRegistry> {
    let workdir = cfg.app.workspace_root();
    std::fs::create_dir_all(&workdir)
        .with_context(|| format!("Failed to create workspace {}", workdir.display()))?;

    let mut registry = ToolRegistry::new();
    registry.register(ShellTool::new(cfg.tools.shell.allowed_commands.clone()).with_workdir(&workdir));
    registry.register(
        CodeExecTool::new(cfg.tools.code.interpreter.clone(), cfg.tools.code.args.clone()).with_workdir(&workdir),
    );
    registry.register(WebSearchTool::new(
        cfg.tools.search.endpoint.clone(),
        cfg.tools.search.allowed_domains.clone(),
        cfg.tools.search.max_result_chars,
    ));
    registry.register(TerminateTool);
    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    observability::init(&cfg.log.level);

    let reasoner = match cli.script.as_ref().or(cfg.reasoner.script.as_ref()) {
        Some(path) => ScriptedReasoner::from_file(path).map_err(anyhow::Error::msg)?,
        None => {
            tracing::warn!("no step-back script configured; the goal is planned as a single step");
            ScriptedReasoner::new()
        }
    };

    let tools = build_tools(&cfg)?;
    tracing::info!(tools = ?tools.tool_names(), "tools registered");

    let manager = RunManager::new(Arc::new(reasoner), tools)
        .with_max_concurrent_runs(cfg.engine.max_concurrent_runs);
    let run_id = manager
        .start_run(Goal::new(cli.goal), cli.facts, cfg.engine.run.clone())
        .await
        .context("Planning failed")?;

    let outcome = tokio::select! {
        outcome = manager.wait(&run_id) => outcome?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(run_id = %run_id, "interrupted, cancelling run");
            manager.cancel(&run_id).await?;
            manager.wait(&run_id).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    let summary = outcome.summary();
    eprintln!(
        "{:?}: {}/{} steps, planning {}ms, execution {}ms",
        outcome.state(),
        summary.steps_executed,
        summary.total_steps,
        summary.planning_ms,
        summary.execution_ms
    );

    if let RunOutcome::Aborted(partial) = outcome {
        anyhow::bail!(
            "run {} aborted at {}: {}",
            run_id,
            partial.failed_step.as_deref().unwrap_or("-"),
            partial.error
        );
    }
    Ok(())
}
