//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MEDAGENT__*` 覆盖（双下划线表示嵌套，
//! 如 `MEDAGENT__LLM__MODEL=gemma3`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub review: ReviewSection,
    pub prompt: PromptSection,
    pub tools: ToolsSection,
}

/// [app] 段：重试预算、工具往返上限、历史轮数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 安全审查拒绝后的最大重试次数（达到后 GiveUp，答案标记 unverified）
    pub max_retries: u32,
    /// 每回合允许的工具往返次数
    pub max_tool_rounds: u32,
    /// 对话历史保留轮数（短期记忆）
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_tool_rounds: 1,
            max_context_turns: 20,
        }
    }
}

/// [llm] 段：生成模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    /// OpenAI 兼容端点；None 时用官方默认（Ollama 场景填 http://localhost:11434/v1）
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 传输失败时的立即重试次数（与安全重试预算无关）
    pub generation_attempts: u32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gemma3".to_string(),
            base_url: None,
            temperature: 0.2,
            max_tokens: 1024,
            generation_attempts: 2,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次补全请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [review] 段：审查模型；model 未设置时复用生成模型
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ReviewSection {
    pub model: Option<String>,
}

/// [prompt] 段：提示字符预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptSection {
    pub max_chars: usize,
}

impl Default for PromptSection {
    fn default() -> Self {
        Self { max_chars: 16_000 }
    }
}

/// [tools] 段：工具超时与各适配器配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub pubmed: PubMedSection,
    pub knowledge: KnowledgeSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            pubmed: PubMedSection::default(),
            knowledge: KnowledgeSection::default(),
        }
    }
}

/// [tools.pubmed] 段：E-utilities 端点与 NCBI 凭据
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PubMedSection {
    pub base_url: Option<String>,
    /// 未设置时回退环境变量 NCBI_API_KEY
    pub api_key: Option<String>,
    pub email: Option<String>,
}

impl PubMedSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("NCBI_API_KEY").ok())
    }

    pub fn resolved_email(&self) -> Option<String> {
        self.email
            .clone()
            .or_else(|| std::env::var("NCBI_EMAIL").ok())
    }
}

/// [tools.knowledge] 段：本地临床指南文件
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct KnowledgeSection {
    pub path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 MEDAGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MEDAGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MEDAGENT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_retries, 2);
        assert_eq!(cfg.app.max_tool_rounds, 1);
        assert_eq!(cfg.llm.generation_attempts, 2);
        assert!(cfg.review.model.is_none());
    }
}
