use aav3_core::{AgentRole, AppError, Implementation, Message, Plan, Research, Review, TesterFocus};
use aav3_llm::Llm;
use serde::de::DeserializeOwned;

use crate::prompt::{build_user_prompt, nudge};

const PLANNER_SYSTEM_PROMPT: &str = "You are the Planner in a multi-agent software engineering \
session. Given a task brief and environment constraints, produce a short strategy, an ordered \
list of steps, and any unknowns the Researcher should resolve.";
const PLANNER_SHAPE: &str = r#"{"strategy": "<string>", "steps": ["<string>", ...], "unknowns": ["<string>", ...]}"#;

const RESEARCHER_SYSTEM_PROMPT: &str = "You are the Researcher. Resolve the Planner's unknowns \
with short factual findings, give one recommendation, and state your confidence.";
const RESEARCHER_SHAPE: &str = r#"{"findings": ["<string>", ...], "recommendation": "<string>", "confidence": "low"|"medium"|"high"}"#;

const CODER_SYSTEM_PROMPT: &str = "You are the Coder. Produce the complete set of files needed \
to implement the plan, each with a workspace-relative path and its full UTF-8 content. Never \
use absolute paths or '..' segments.";
const CODER_SHAPE: &str = r#"{"files_to_create": [{"path": "<relative/path>", "content": "<string>"}, ...], "key_decisions": ["<string>", ...], "status": "complete"|"in_progress"}"#;

const REVIEWER_SYSTEM_PROMPT: &str = "You are the Reviewer. Examine the implementation and the \
test outcome and render a verdict with strengths, issues, and suggestions.";
const REVIEWER_SHAPE: &str = r#"{"verdict": "approved"|"needs_revision"|"rejected", "strengths": ["<string>", ...], "issues": ["<string>", ...], "suggestions": ["<string>", ...]}"#;

const TESTER_SYSTEM_PROMPT: &str = "You are the Tester. Propose what a test pass should focus on \
and the risks it should catch; you do not execute anything yourself.";
const TESTER_SHAPE: &str = r#"{"focus_areas": ["<string>", ...], "risks": ["<string>", ...]}"#;

/// Run one role-specialized agent call: build the prompt, call the LLM,
/// extract JSON, validate shape. On a shape failure, retry once with a
/// nudge; on a transient `LlmTimeout`/`LlmTransport`, retry once with the
/// same prompt; on a second failure either way, propagate the error and let
/// the Orchestrator decide (spec.md §4.4, §4.7, §7).
async fn run_role<T: DeserializeOwned>(
    llm: &dyn Llm,
    system_prompt: &str,
    task_text: &str,
    environment_constraints: &str,
    history: &[&Message],
    shape_instruction: &str,
    timeout_sec: u64,
) -> Result<T, AppError> {
    let user_prompt = build_user_prompt(task_text, environment_constraints, history, shape_instruction);

    let first_attempt = try_once::<T>(llm, system_prompt, &user_prompt, timeout_sec).await;
    match first_attempt {
        Ok(value) => Ok(value),
        Err(AppError::MalformedAgentOutput { .. }) => {
            tracing::warn!("agent reply failed shape validation, retrying with nudge");
            let nudged_prompt = format!("{user_prompt}\n\n{}", nudge(shape_instruction));
            try_once::<T>(llm, system_prompt, &nudged_prompt, timeout_sec).await
        }
        Err(e @ AppError::LlmTimeout { .. }) | Err(e @ AppError::LlmTransport(_)) => {
            tracing::warn!(error = %e, "transient LLM error, retrying once with the same prompt");
            try_once::<T>(llm, system_prompt, &user_prompt, timeout_sec).await
        }
        Err(other) => Err(other),
    }
}

async fn try_once<T: DeserializeOwned>(
    llm: &dyn Llm,
    system_prompt: &str,
    user_prompt: &str,
    timeout_sec: u64,
) -> Result<T, AppError> {
    let text = llm.call(system_prompt, user_prompt, timeout_sec).await?;
    let value = aav3_json::extract(&text)?;
    serde_json::from_value(value.clone()).map_err(|e| AppError::MalformedAgentOutput {
        reason: e.to_string(),
        raw_excerpt: value.to_string(),
    })
}

pub async fn run_planner(
    llm: &dyn Llm,
    task_text: &str,
    environment_constraints: &str,
    history: &[&Message],
    timeout_sec: u64,
) -> Result<Plan, AppError> {
    run_role(
        llm,
        PLANNER_SYSTEM_PROMPT,
        task_text,
        environment_constraints,
        history,
        PLANNER_SHAPE,
        timeout_sec,
    )
    .await
}

pub async fn run_researcher(
    llm: &dyn Llm,
    task_text: &str,
    environment_constraints: &str,
    history: &[&Message],
    timeout_sec: u64,
) -> Result<Research, AppError> {
    run_role(
        llm,
        RESEARCHER_SYSTEM_PROMPT,
        task_text,
        environment_constraints,
        history,
        RESEARCHER_SHAPE,
        timeout_sec,
    )
    .await
}

pub async fn run_coder(
    llm: &dyn Llm,
    task_text: &str,
    environment_constraints: &str,
    history: &[&Message],
    timeout_sec: u64,
) -> Result<Implementation, AppError> {
    run_role(
        llm,
        CODER_SYSTEM_PROMPT,
        task_text,
        environment_constraints,
        history,
        CODER_SHAPE,
        timeout_sec,
    )
    .await
}

pub async fn run_reviewer(
    llm: &dyn Llm,
    task_text: &str,
    environment_constraints: &str,
    history: &[&Message],
    timeout_sec: u64,
) -> Result<Review, AppError> {
    run_role(
        llm,
        REVIEWER_SYSTEM_PROMPT,
        task_text,
        environment_constraints,
        history,
        REVIEWER_SHAPE,
        timeout_sec,
    )
    .await
}

pub async fn run_tester(
    llm: &dyn Llm,
    task_text: &str,
    environment_constraints: &str,
    history: &[&Message],
    timeout_sec: u64,
) -> Result<TesterFocus, AppError> {
    run_role(
        llm,
        TESTER_SYSTEM_PROMPT,
        task_text,
        environment_constraints,
        history,
        TESTER_SHAPE,
        timeout_sec,
    )
    .await
}

/// The system prompt for a given role, exposed for callers that want to
/// log or display it (e.g. a `--verbose` CLI flag).
pub fn system_prompt_for(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Planner => PLANNER_SYSTEM_PROMPT,
        AgentRole::Researcher => RESEARCHER_SYSTEM_PROMPT,
        AgentRole::Coder => CODER_SYSTEM_PROMPT,
        AgentRole::Reviewer => REVIEWER_SYSTEM_PROMPT,
        AgentRole::Tester => TESTER_SYSTEM_PROMPT,
        AgentRole::Orchestrator => "",
    }
}
