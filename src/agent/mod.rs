//! 认知层：提示构建、生成步骤与安全审查

pub mod generate;
pub mod prompt;
pub mod review;

pub use generate::{parse_tool_call, Generator, ToolCallRequest};
pub use prompt::PromptBuilder;
pub use review::{SafetyReviewer, Verdict};
