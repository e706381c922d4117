//! MedAgent - 医疗问答智能体
//!
//! 模块划分：
//! - **agent**: 提示构建（PromptBuilder）、生成步骤（Generator）、安全审查（SafetyReviewer）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 回合状态机、检查点、会话管理与编排
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话对话历史（短期记忆）
//! - **tools**: 工具箱（pubmed、ehr、clinical）与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod tools;
