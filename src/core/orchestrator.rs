//! 回合编排器
//!
//! 显式状态机驱动一个回合：BUILD_PROMPT -> GENERATE -> REVIEW -> {ACCEPT, RETRY, GIVE_UP}。
//! 编排器在整个回合期间持有会话互斥锁（同一会话的回合串行化），终态时提交历史与
//! 检查点；取消或致命错误不会留下半成品状态——检查点只在终态写入，会话历史在出错
//! 路径上回滚到上一个已提交版本。

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::{Generator, PromptBuilder, SafetyReviewer};
use crate::config::AppConfig;
use crate::core::checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use crate::core::error::AgentError;
use crate::core::session::SessionManager;
use crate::core::state::{TurnPhase, TurnReport, TurnState, TurnStatus};
use crate::llm::{CompletionOptions, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::Message;
use crate::tools::{ClinicalGuidelineTool, EhrTool, PubMedTool, ToolExecutor, ToolRegistry};

/// 请求表面（CLI / HTTP）递交的一个回合
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub query: String,
    /// 省略时由编排器生成并随应答返回
    pub session_id: Option<String>,
    /// true 时在处理前清空该会话的历史与检查点
    pub reset: bool,
}

/// 编排器：持有全部注入的组件与会话注册表
pub struct Orchestrator {
    prompt: PromptBuilder,
    generator: Generator,
    reviewer: SafetyReviewer,
    executor: Arc<ToolExecutor>,
    sessions: SessionManager,
    checkpoints: Arc<dyn CheckpointStore>,
    max_retries: u32,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        prompt: PromptBuilder,
        generator: Generator,
        reviewer: SafetyReviewer,
        executor: Arc<ToolExecutor>,
        checkpoints: Arc<dyn CheckpointStore>,
        max_retries: u32,
        max_context_turns: usize,
    ) -> Self {
        Self {
            prompt,
            generator,
            reviewer,
            executor,
            sessions: SessionManager::new(max_context_turns),
            checkpoints,
            max_retries,
        }
    }

    /// 执行一个回合；Err 仅为致命条件（PromptTooLarge / GenerationUnavailable /
    /// Cancelled），其余情况总能得到一个 TurnReport。
    pub async fn run_turn(
        &self,
        req: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<TurnReport, AgentError> {
        let session_id = req
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        tracing::info!(session_id = %session_id, reset = req.reset, "turn started");

        // 锁从检查点读取一直持有到终态写回；同一会话不可能交错读写检查点
        let session = self.sessions.get_or_create(&session_id).await;
        let mut session = session.lock().await;

        if req.reset {
            session.history.clear();
            self.checkpoints.remove(&session_id).await;
        }

        // 进程重启后的恢复路径：内存历史为空而检查点存在时，从检查点恢复并回到 BUILD_PROMPT
        if session.history.is_empty() {
            if let Some(cp) = self.checkpoints.get(&session_id).await {
                tracing::info!(session_id = %session_id, "resuming session from checkpoint");
                session.history.restore(cp.history);
            }
        }

        // 已提交状态快照；出错路径整体回滚到这里
        let committed: Vec<Message> = session.history.messages().to_vec();

        let mut turn = TurnState::new(&req.query);
        let result = self.drive(&mut turn, &committed, &cancel).await;

        let (terminal, report) = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                session.history.restore(committed);
                return Err(e);
            }
        };

        // 终态提交：历史追加本回合，再持久化检查点
        session.history.push(Message::user(&req.query));
        session.history.push(Message::assistant(&report.answer));
        self.checkpoints
            .put(
                &session_id,
                Checkpoint::new(
                    &session_id,
                    session.history.messages().to_vec(),
                    terminal,
                ),
            )
            .await;

        tracing::info!(
            session_id = %session_id,
            status = ?report.status,
            retries = turn.retries,
            "turn finished"
        );
        Ok(TurnReport {
            session_id,
            ..report
        })
    }

    /// 状态机主循环；终态返回 (到达的阶段, 报告)。session_id 字段由调用方补全。
    async fn drive(
        &self,
        turn: &mut TurnState,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<(TurnPhase, TurnReport), AgentError> {
        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            match turn.phase {
                TurnPhase::BuildPrompt => {
                    // 预算校验在此阶段完成；超预算对回合致命
                    self.prompt.build(
                        history,
                        &turn.query,
                        &turn.tool_records,
                        turn.feedback.as_deref(),
                    )?;
                    turn.phase = TurnPhase::Generate;
                }
                TurnPhase::Generate => {
                    let candidate = self
                        .generator
                        .run(&self.prompt, history, turn, &self.executor, cancel)
                        .await?;
                    turn.candidate = Some(candidate);
                    turn.phase = TurnPhase::Review;
                }
                TurnPhase::Review => {
                    let candidate = turn.candidate.as_deref().unwrap_or_default();
                    match self.reviewer.review(candidate).await {
                        Ok(verdict) => {
                            tracing::info!(accepted = verdict.accepted, "safety review done");
                            turn.verdict = Some(verdict.accepted);
                            turn.rationale = Some(verdict.rationale);
                            turn.phase = if verdict.accepted {
                                TurnPhase::Accept
                            } else if turn.retries >= self.max_retries {
                                TurnPhase::GiveUp
                            } else {
                                TurnPhase::Retry
                            };
                        }
                        Err(AgentError::ReviewUnavailable(e)) => {
                            // 审查中断不得阻塞用户应答：降级为 unverified 终态
                            tracing::warn!(error = %e, "safety review unavailable, degrading to unverified");
                            turn.verdict = Some(false);
                            turn.rationale = Some("safety review unavailable".to_string());
                            turn.phase = TurnPhase::GiveUp;
                        }
                        Err(other) => return Err(other),
                    }
                }
                TurnPhase::Retry => {
                    turn.retries += 1;
                    turn.feedback = turn.rationale.clone();
                    turn.candidate = None;
                    turn.phase = TurnPhase::BuildPrompt;
                }
                TurnPhase::Accept => {
                    return Ok((TurnPhase::Accept, self.report(turn, TurnStatus::Success)));
                }
                TurnPhase::GiveUp => {
                    // 重试预算耗尽不是错误：返回最后的候选答案并显式标记未验证
                    return Ok((TurnPhase::GiveUp, self.report(turn, TurnStatus::Unverified)));
                }
            }
        }
    }

    fn report(&self, turn: &TurnState, status: TurnStatus) -> TurnReport {
        TurnReport {
            session_id: String::new(),
            status,
            answer: turn.candidate.clone().unwrap_or_default(),
            safety_verdict: turn.verdict.unwrap_or(false),
            safety_rationale: turn.rationale.clone().unwrap_or_default(),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.executor.tool_names()
    }
}

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
///
/// 同一进程内生成与审查各持有一个显式构造的客户端实例，不使用模块级单例。
fn create_llm_from_config(cfg: &AppConfig, model_override: Option<&str>) -> Arc<dyn LlmClient> {
    let model = model_override.unwrap_or(&cfg.llm.model);
    if std::env::var("OPENAI_API_KEY").is_ok() || cfg.llm.base_url.is_some() {
        tracing::info!(model, "using OpenAI-compatible LLM backend");
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
            cfg.llm.timeouts.request,
        ))
    } else {
        tracing::warn!("no API key or base_url configured, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

/// 从配置组装完整编排器：工具注册表、执行器、提示构建器、生成与审查步骤
pub fn create_orchestrator(cfg: &AppConfig) -> Orchestrator {
    let mut registry = ToolRegistry::new();
    registry.register(PubMedTool::new(
        cfg.tools.pubmed.base_url.clone(),
        cfg.tools.pubmed.resolved_api_key(),
        cfg.tools.pubmed.resolved_email(),
        cfg.tools.tool_timeout_secs,
    ));
    registry.register(EhrTool::new());
    registry.register(ClinicalGuidelineTool::from_file(
        cfg.tools.knowledge.path.as_deref(),
    ));
    let executor = Arc::new(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs));

    let prompt = PromptBuilder::new(&executor.tool_descriptions(), cfg.prompt.max_chars);

    let gen_llm = create_llm_from_config(cfg, None);
    let generator = Generator::new(
        gen_llm,
        CompletionOptions {
            temperature: cfg.llm.temperature,
            max_tokens: cfg.llm.max_tokens,
        },
        cfg.llm.generation_attempts,
        cfg.app.max_tool_rounds,
    );

    let review_llm = create_llm_from_config(cfg, cfg.review.model.as_deref());
    let reviewer = SafetyReviewer::new(
        review_llm,
        CompletionOptions {
            temperature: 0.0,
            max_tokens: 512,
        },
    );

    Orchestrator::new(
        prompt,
        generator,
        reviewer,
        executor,
        Arc::new(MemoryCheckpointStore::new()),
        cfg.app.max_retries,
        cfg.app.max_context_turns,
    )
}

/// 便于在二进制入口加载配置失败时继续以默认配置运行
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
