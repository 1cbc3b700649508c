//! 会话驱动：主控循环
//!
//! 负责：根据配置创建语言服务与 Researcher、建立 cmd/state 两个通道，并在后台任务中消费用户命令，
//! 依次驱动 澄清 -> 规划 -> 检索循环 -> 报告，每一步完成后更新 UI 状态。
//! 会话只由这个任务持有和修改；服务调用期间仍监听 Cancel / Quit，收到即丢弃进行中的请求。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{ResearchError, UiState, WizardStep};
use crate::llm::{create_deepseek_client, LlmClient, OpenAiClient, ResponsesClient, DEEPSEEK_CHAT};
use crate::research::{
    prompts, research_loop, synthesize_report, ResearchEvent, ResearchSession, ResearchSettings,
    Researcher,
};

/// 从 UI 发往驱动任务的用户命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提供 API Key（未在配置 / 环境变量中找到时）
    SetApiKey(String),
    /// 提交主题并生成澄清问题
    SubmitTopic(String),
    /// 填写第 index 个问题的答案
    SetAnswer { index: usize, text: String },
    /// 生成调研计划
    GeneratePlan,
    /// 执行检索循环并生成报告
    RunResearch,
    /// 检索已完成但报告失败时重新生成报告
    GenerateReport,
    /// 取消当前请求
    Cancel,
    /// 放弃当前会话，回到输入主题
    Reset,
    /// 退出
    Quit,
}

/// 根据配置选择语言服务后端（OpenAI Responses / DeepSeek / OpenAI 兼容 Chat）
pub fn create_llm_from_config(cfg: &AppConfig, api_key: &str) -> Arc<dyn LlmClient> {
    let timeout = cfg.llm.timeouts.request;
    let base = cfg.llm.base_url.as_deref();
    match cfg.llm.provider.to_lowercase().as_str() {
        "deepseek" => {
            tracing::info!("Using DeepSeek chat API (no server-side web search)");
            Arc::new(create_deepseek_client(api_key, timeout))
        }
        "compat" => {
            tracing::info!(base_url = ?base, "Using OpenAI-compatible chat API (no server-side web search)");
            Arc::new(OpenAiClient::new("compat", base, api_key, timeout))
        }
        other => {
            if other != "openai" {
                tracing::warn!(provider = %other, "Unknown provider, falling back to OpenAI Responses API");
            }
            tracing::info!(model = %cfg.llm.model, "Using OpenAI Responses API");
            Arc::new(ResponsesClient::new(base, api_key, timeout))
        }
    }
}

/// 调研参数；DeepSeek 后端仍是 OpenAI 默认模型名时替换为 deepseek-chat
pub fn research_settings(cfg: &AppConfig) -> ResearchSettings {
    let mut settings = ResearchSettings::from_config(cfg);
    if cfg.llm.provider.eq_ignore_ascii_case("deepseek") {
        for model in [&mut settings.model, &mut settings.mini_model] {
            if model.starts_with("gpt-") {
                *model = DEEPSEEK_CHAT.to_string();
            }
        }
    }
    settings
}

/// 一次服务调用的结局
enum StepOutcome<T> {
    Done(Result<T, ResearchError>),
    Cancelled,
    Quit,
}

fn publish(state_tx: &watch::Sender<UiState>, ui: &UiState) {
    let _ = state_tx.send(ui.clone());
}

/// 等待 fut 完成，同时转发检索事件、响应 Cancel / Quit；其余命令在忙碌时忽略
async fn until_interrupted<T, F>(
    fut: F,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    event_rx: &mut mpsc::UnboundedReceiver<ResearchEvent>,
    cancel: &CancellationToken,
    ui: &mut UiState,
    state_tx: &watch::Sender<UiState>,
) -> StepOutcome<T>
where
    F: Future<Output = Result<T, ResearchError>>,
{
    tokio::pin!(fut);
    let outcome = loop {
        tokio::select! {
            res = &mut fut => break StepOutcome::Done(res),
            Some(ev) = event_rx.recv() => {
                ui.apply_event(&ev);
                publish(state_tx, ui);
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Cancel) => {
                    cancel.cancel();
                    break StepOutcome::Cancelled;
                }
                Some(Command::Quit) | None => {
                    cancel.cancel();
                    break StepOutcome::Quit;
                }
                Some(other) => tracing::debug!(?other, "command ignored while busy"),
            }
        }
    };
    while let Ok(ev) = event_rx.try_recv() {
        ui.apply_event(&ev);
    }
    outcome
}

/// 驱动任务持有的全部状态
struct SessionDriver {
    cfg: AppConfig,
    researcher: Option<Researcher>,
    session: Option<ResearchSession>,
    ui: UiState,
    state_tx: watch::Sender<UiState>,
}

impl SessionDriver {
    fn connect(&mut self, api_key: &str) {
        let llm = create_llm_from_config(&self.cfg, api_key);
        self.attach(llm);
    }

    fn attach(&mut self, llm: Arc<dyn LlmClient>) {
        self.ui.provider = llm.provider().to_string();
        self.researcher = Some(Researcher::new(
            llm,
            prompts::load_instructions(),
            research_settings(&self.cfg),
        ));
        self.ui.step = WizardStep::Topic;
    }

    fn publish(&self) {
        publish(&self.state_tx, &self.ui);
    }

    fn fail(&mut self, err: &ResearchError) {
        tracing::error!(error = %err, "step failed");
        self.ui.busy = false;
        self.ui.activity = None;
        self.ui.error_message = Some(err.to_string());
    }

    fn begin(&mut self, activity: &str) {
        self.ui.busy = true;
        self.ui.activity = Some(activity.to_string());
        self.ui.error_message = None;
        self.publish();
    }

    fn finish(&mut self) {
        self.ui.busy = false;
        self.ui.activity = None;
    }

    fn cancelled(&mut self) {
        tracing::info!("step cancelled by user");
        self.finish();
        self.ui.error_message = Some(ResearchError::Cancelled.to_string());
    }

    /// 处理一条命令；返回 false 表示退出
    async fn handle(&mut self, cmd: Command, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        match cmd {
            Command::SetApiKey(key) => {
                let key = key.trim();
                if key.is_empty() {
                    self.ui.error_message = Some("API Key 不能为空".to_string());
                } else {
                    self.ui.error_message = None;
                    self.connect(key);
                }
            }
            Command::SubmitTopic(topic) => return self.clarify(topic, cmd_rx).await,
            Command::SetAnswer { index, text } => {
                if let Some(session) = self.session.as_mut() {
                    match session.set_answer(index, text) {
                        Ok(()) => {
                            self.ui.answers = session.answers.clone();
                            self.ui.error_message = None;
                        }
                        Err(e) => self.ui.error_message = Some(e.to_string()),
                    }
                }
            }
            Command::GeneratePlan => return self.plan(cmd_rx).await,
            Command::RunResearch => return self.research(cmd_rx).await,
            Command::GenerateReport => return self.report(cmd_rx).await,
            Command::Cancel => {}
            Command::Reset => {
                self.session = None;
                self.ui.reset_session();
                if self.researcher.is_none() {
                    self.ui.step = WizardStep::ApiKey;
                }
            }
            Command::Quit => return false,
        }
        self.publish();
        true
    }

    async fn clarify(&mut self, topic: String, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        if self.researcher.is_none() {
            return true;
        }
        let mut session = match ResearchSession::new(topic) {
            Ok(s) => s,
            Err(e) => {
                self.fail(&e);
                self.publish();
                return true;
            }
        };
        self.ui.topic = session.topic.clone();
        self.begin("生成澄清问题…");

        let Some(researcher) = self.researcher.as_ref() else {
            return true;
        };
        let cancel = CancellationToken::new();
        let (_event_tx, mut event_rx) = mpsc::unbounded_channel();
        let outcome = until_interrupted(
            researcher.clarify(&mut session),
            cmd_rx,
            &mut event_rx,
            &cancel,
            &mut self.ui,
            &self.state_tx,
        )
        .await;

        match outcome {
            StepOutcome::Done(Ok(questions)) => {
                self.finish();
                self.ui.answers = vec![String::new(); questions.len()];
                self.ui.questions = questions;
                self.ui.step = WizardStep::Answers;
                self.session = Some(session);
            }
            StepOutcome::Done(Err(e)) => self.fail(&e),
            StepOutcome::Cancelled => self.cancelled(),
            StepOutcome::Quit => return false,
        }
        self.publish();
        true
    }

    async fn plan(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        if self.researcher.is_none() || self.session.is_none() {
            return true;
        }
        self.begin("生成调研计划…");

        let (Some(researcher), Some(session)) = (self.researcher.as_ref(), self.session.as_mut()) else {
            return true;
        };

        let cancel = CancellationToken::new();
        let (_event_tx, mut event_rx) = mpsc::unbounded_channel();
        let outcome = until_interrupted(
            researcher.plan(session),
            cmd_rx,
            &mut event_rx,
            &cancel,
            &mut self.ui,
            &self.state_tx,
        )
        .await;

        match outcome {
            StepOutcome::Done(Ok(plan)) => {
                self.finish();
                self.ui.goal = plan.goal;
                self.ui.queries = plan.queries;
                self.ui.step = WizardStep::Plan;
            }
            StepOutcome::Done(Err(e)) => self.fail(&e),
            StepOutcome::Cancelled => self.cancelled(),
            StepOutcome::Quit => return false,
        }
        self.publish();
        true
    }

    async fn research(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        let kept = match (&self.researcher, &self.session) {
            (Some(_), Some(session)) => session.findings().len(),
            _ => return true,
        };
        self.ui.step = WizardStep::Research;
        self.ui.research_done = false;
        if kept > 0 {
            self.ui.push_log(format!("（保留上次已收集的 {} 条结果）", kept));
        }
        self.begin("开始检索…");

        let (Some(researcher), Some(session)) = (self.researcher.as_ref(), self.session.as_mut()) else {
            return true;
        };

        let cancel = CancellationToken::new();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let outcome = until_interrupted(
            research_loop(researcher, session, Some(&event_tx), cancel.clone()),
            cmd_rx,
            &mut event_rx,
            &cancel,
            &mut self.ui,
            &self.state_tx,
        )
        .await;

        match outcome {
            StepOutcome::Done(Ok(summary)) => {
                tracing::info!(rounds = summary.rounds, findings = summary.findings, outcome = ?summary.outcome, "research loop finished");
                self.ui.research_done = true;
                self.publish();
                self.report(cmd_rx).await
            }
            StepOutcome::Done(Err(e)) => {
                self.fail(&e);
                self.publish();
                true
            }
            StepOutcome::Cancelled => {
                self.cancelled();
                self.publish();
                true
            }
            StepOutcome::Quit => false,
        }
    }

    async fn report(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        if self.researcher.is_none() || self.session.is_none() {
            return true;
        }
        self.begin("撰写报告…");

        let (Some(researcher), Some(session)) = (self.researcher.as_ref(), self.session.as_mut()) else {
            return true;
        };

        let cancel = CancellationToken::new();
        let (_event_tx, mut event_rx) = mpsc::unbounded_channel();
        let outcome = until_interrupted(
            synthesize_report(researcher, session),
            cmd_rx,
            &mut event_rx,
            &cancel,
            &mut self.ui,
            &self.state_tx,
        )
        .await;

        match outcome {
            StepOutcome::Done(Ok(report)) => {
                self.finish();
                self.ui.report = Some(report.body);
                self.ui.sources = report.sources;
                self.ui.step = WizardStep::Report;
            }
            StepOutcome::Done(Err(e)) => self.fail(&e),
            StepOutcome::Cancelled => self.cancelled(),
            StepOutcome::Quit => return false,
        }
        self.publish();
        true
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = cmd_rx.recv().await {
            if !self.handle(cmd, &mut cmd_rx).await {
                break;
            }
        }
        tracing::info!("session driver stopped");
    }
}

/// 创建会话驱动：返回命令发送端与状态接收端；后台任务消费命令并更新 state。
/// 已能解析到 API Key 时直接进入输入主题步骤。
pub fn spawn_driver(cfg: AppConfig) -> (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>) {
    let llm = cfg
        .llm
        .resolve_api_key()
        .map(|key| create_llm_from_config(&cfg, &key));
    start_driver(cfg, llm)
}

/// 使用给定语言服务创建会话驱动（跳过 API Key 步骤）
pub fn spawn_driver_with(
    cfg: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>) {
    start_driver(cfg, Some(llm))
}

fn start_driver(
    cfg: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(UiState::default());

    let mut driver = SessionDriver {
        cfg,
        researcher: None,
        session: None,
        ui: UiState::default(),
        state_tx,
    };
    if let Some(llm) = llm {
        driver.attach(llm);
    }
    driver.publish();

    tokio::spawn(driver.run(cmd_rx));
    (cmd_tx, state_rx)
}
