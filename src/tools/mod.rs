//! 工具箱：外部服务适配器与执行器
//!
//! 每个适配器实现统一的 Tool trait（JSON 参数 -> 结果或失败原因），由 ToolRegistry
//! 按名注册，ToolExecutor 在调用时加超时并输出审计日志。

pub mod clinical;
pub mod ehr;
pub mod executor;
pub mod pubmed;
pub mod registry;

pub use clinical::ClinicalGuidelineTool;
pub use ehr::EhrTool;
pub use executor::ToolExecutor;
pub use pubmed::PubMedTool;
pub use registry::{Tool, ToolRegistry};
