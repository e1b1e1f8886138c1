//! hive - 命令行入口
//!
//! 用法：`hive [--config PATH] [--agents PATH] <query...>`
//! 加载配置与团队声明，回答一个 Query 并打印回答与委托记录。缺少凭据时以退出码 2 结束。

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use hive::{
    agents::load_team_spec,
    config::load_config,
    llm::Credentials,
    observability, AgentError, HiveBuilder, Query,
};
use tokio_util::sync::CancellationToken;

struct Args {
    config: Option<PathBuf>,
    agents: Option<PathBuf>,
    query: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut agents = None;
    let mut words = Vec::new();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(it.next().context("--config needs a path")?)),
            "--agents" => agents = Some(PathBuf::from(it.next().context("--agents needs a path")?)),
            _ => words.push(arg),
        }
    }
    let query = words.join(" ");
    if query.trim().is_empty() {
        bail!("usage: hive [--config PATH] [--agents PATH] <query...>");
    }
    Ok(Args { config, agents, query })
}

async fn run() -> anyhow::Result<ExitCode> {
    let args = parse_args()?;
    let cfg = load_config(args.config).context("Failed to load config")?;
    let agents_file = args.agents.unwrap_or_else(|| cfg.agents_file());
    let team = load_team_spec(&agents_file)
        .with_context(|| format!("Failed to load agents from {}", agents_file.display()))?;

    let hive = HiveBuilder::new(cfg).build(&team).context("Failed to build team")?;
    let mut session = hive.new_session();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    // 凭据来自配置中 api_key_env 指定的环境变量（作为服务端默认 Key 注入 Provider 池）
    let query = Query::new(args.query).with_credentials(Credentials::new());
    match hive.coordinator.run(&mut session, &query, &cancel).await {
        Ok(answer) => {
            println!("{}", answer.text);
            println!();
            println!("provider: {} | rounds: {}", answer.provider, answer.rounds);
            for record in &answer.transcript {
                println!(
                    "  [{}] {} -> {}",
                    record.round,
                    record.target,
                    record.observation.lines().next().unwrap_or("")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(AgentError::NeedsCredential { provider }) => {
            eprintln!(
                "Provider '{provider}' needs a credential. \
                 Set its API key environment variable and retry."
            );
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e).context("Query failed"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    observability::init();
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
