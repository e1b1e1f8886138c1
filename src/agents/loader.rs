//! 团队声明加载器
//!
//! 读取 agents.toml 为 TeamSpec；prompt_file 相对该文件所在目录解析并读入 system_prompt。

use std::path::Path;

use crate::agents::{AgentSpec, TeamSpec};
use crate::core::AgentError;

/// 从字符串解析并校验（不处理 prompt_file）
pub fn parse_team_spec(text: &str) -> Result<TeamSpec, AgentError> {
    let team: TeamSpec =
        toml::from_str(text).map_err(|e| AgentError::InvalidSpec(e.to_string()))?;
    team.validate()?;
    Ok(team)
}

fn resolve_prompt_file(spec: &mut AgentSpec, base_dir: &Path) -> Result<(), AgentError> {
    if spec.system_prompt.is_some() {
        return Ok(());
    }
    if let Some(file) = &spec.prompt_file {
        let path = base_dir.join(file);
        let prompt = std::fs::read_to_string(&path).map_err(|e| {
            AgentError::ConfigError(format!("prompt file {}: {}", path.display(), e))
        })?;
        spec.system_prompt = Some(prompt.trim().to_string());
    }
    Ok(())
}

/// 从文件加载团队声明
pub fn load_team_spec(path: impl AsRef<Path>) -> Result<TeamSpec, AgentError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| AgentError::ConfigError(format!("agents file {}: {}", path.display(), e)))?;
    let mut team = parse_team_spec(&text)?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    if let Some(coordinator) = team.coordinator.as_mut() {
        resolve_prompt_file(coordinator, base_dir)?;
    }
    for agent in team.agents.iter_mut() {
        resolve_prompt_file(agent, base_dir)?;
    }
    tracing::info!(
        path = %path.display(),
        agents = ?team.agents.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        "loaded team spec"
    );
    Ok(team)
}
