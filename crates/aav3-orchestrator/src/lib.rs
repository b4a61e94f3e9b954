//! The session state machine: INIT -> PROBE -> PLAN -> RESEARCH -> IMPLEMENT
//! -> TEST -> [FIX_LOOP] -> REVIEW -> CONSENSUS -> DONE (spec.md §4.7).
//!
//! Every phase transition is driven by plain control flow, not another LLM
//! call: the fix loop keeps going while `TestResult.verdict == needs_fixes
//! && round_count < max_rounds`, and consensus is a structural vote count,
//! not a further model opinion (spec.md §9 "keep the decision out of the
//! LLM").

mod materialize;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use aav3_config::Config;
use aav3_core::{
    AgentRole, AppError, ConsensusResult, ErrorRecord, FinalVerdict, Message, MessageRole, SessionStatus, VoteRecord,
};
use aav3_llm::Llm;
use aav3_memory::SharedMemory;
use aav3_store::SessionStore;
use aav3_testadapters::AdapterTimeouts;
use chrono::Utc;

pub struct SessionParams {
    pub session_id: String,
    pub task_text: String,
    pub base_dir: PathBuf,
}

/// Run one full session to completion. Never panics on agent/test failure;
/// recoverable errors (§7: LLMTimeout, LLMTransport, MalformedAgentOutput)
/// have already been retried once inside the agent layer by the time they
/// reach here, so any error surfacing from an agent call at this level is
/// fatal for the session.
pub async fn run_session(
    params: SessionParams,
    config: &Config,
    llm: &dyn Llm,
    cancel: &AtomicBool,
) -> FinalVerdict {
    let started = Instant::now();

    let store = match SessionStore::create(&params.base_dir, &params.session_id) {
        Ok(s) => s,
        Err(e) => return error_verdict(&params.session_id, config, started, "INIT", e),
    };

    let mut memory = match SharedMemory::open(store.conversation_log_path()) {
        Ok(m) => m,
        Err(e) => return error_verdict(&params.session_id, config, started, "INIT", e),
    };

    if cancel.load(Ordering::Relaxed) {
        return cancelled_verdict(&params.session_id, config, started);
    }

    // PROBE
    let environment = aav3_probe::probe().await;
    if let Err(e) = store.write_environment(&environment) {
        return error_verdict(&params.session_id, config, started, "PROBE", e);
    }
    let constraints = aav3_probe::render_constraint_block(&environment);

    if cancel.load(Ordering::Relaxed) {
        return cancelled_verdict(&params.session_id, config, started);
    }

    // PLAN
    let history = memory.history(None, None);
    let plan = match aav3_agent::run_planner(llm, &params.task_text, &constraints, &history, config.llm_timeout_sec).await
    {
        Ok(p) => p,
        Err(e) => return error_verdict(&params.session_id, config, started, "PLAN", e),
    };
    if let Err(e) = store.write_plan(&plan) {
        return error_verdict(&params.session_id, config, started, "PLAN", e);
    }
    if let Err(e) = append_message(&mut memory, AgentRole::Planner, MessageRole::Plan, &plan) {
        return error_verdict(&params.session_id, config, started, "PLAN", e);
    }

    if cancel.load(Ordering::Relaxed) {
        return cancelled_verdict(&params.session_id, config, started);
    }

    // RESEARCH
    let history = memory.history(None, None);
    let research = match aav3_agent::run_researcher(llm, &params.task_text, &constraints, &history, config.llm_timeout_sec).await
    {
        Ok(r) => r,
        Err(e) => return error_verdict(&params.session_id, config, started, "RESEARCH", e),
    };
    if let Err(e) = store.write_research(&research) {
        return error_verdict(&params.session_id, config, started, "RESEARCH", e);
    }
    if let Err(e) = append_message(&mut memory, AgentRole::Researcher, MessageRole::Research, &research) {
        return error_verdict(&params.session_id, config, started, "RESEARCH", e);
    }

    if cancel.load(Ordering::Relaxed) {
        return cancelled_verdict(&params.session_id, config, started);
    }

    // IMPLEMENT (round 0)
    let history = memory.history(None, None);
    let implementation = match aav3_agent::run_coder(llm, &params.task_text, &constraints, &history, config.llm_timeout_sec).await
    {
        Ok(i) => i,
        Err(e) => return error_verdict(&params.session_id, config, started, "IMPLEMENT", e),
    };
    if let Err(e) = store.write_implementation(&implementation) {
        return error_verdict(&params.session_id, config, started, "IMPLEMENT", e);
    }
    if let Err(e) = append_message(&mut memory, AgentRole::Coder, MessageRole::Implementation, &implementation) {
        return error_verdict(&params.session_id, config, started, "IMPLEMENT", e);
    }
    let mut files_created = match materialize::materialize(&store.workspace_dir(), &implementation.files_to_create) {
        Ok(f) => f,
        Err(e) => return error_verdict(&params.session_id, config, started, "IMPLEMENT", e),
    };

    if cancel.load(Ordering::Relaxed) {
        return cancelled_verdict(&params.session_id, config, started);
    }

    // TEST (round 0): the Tester proposes what to look for; the Orchestrator
    // runs the actual deterministic adapters regardless of that proposal.
    let history = memory.history(None, None);
    let focus = match aav3_agent::run_tester(llm, &params.task_text, &constraints, &history, config.llm_timeout_sec).await
    {
        Ok(f) => f,
        Err(e) => return error_verdict(&params.session_id, config, started, "TEST", e),
    };
    if let Err(e) = append_message(&mut memory, AgentRole::Tester, MessageRole::System, &focus) {
        return error_verdict(&params.session_id, config, started, "TEST", e);
    }

    let timeouts = AdapterTimeouts {
        python_syntax_timeout_sec: config.python_syntax_timeout_sec,
        docker_build_timeout_sec: config.docker_build_timeout_sec,
        unit_test_timeout_sec: config.unit_test_timeout_sec,
    };
    let mut test_result = aav3_testadapters::run_all(
        &store.workspace_dir(),
        &files_created,
        &environment,
        &params.session_id,
        timeouts,
    )
    .await;
    if let Err(e) = store.write_test_result(&test_result) {
        return error_verdict(&params.session_id, config, started, "TEST", e);
    }
    if let Err(e) = append_message(&mut memory, AgentRole::Tester, MessageRole::TestResult, &test_result) {
        return error_verdict(&params.session_id, config, started, "TEST", e);
    }

    // FIX_LOOP: keep re-coding and re-testing while tests fail and rounds remain.
    let mut rounds_used = 0u32;
    while test_result.verdict == aav3_core::Verdict::NeedsFixes && rounds_used < config.max_rounds {
        if cancel.load(Ordering::Relaxed) {
            return cancelled_verdict(&params.session_id, config, started);
        }
        rounds_used += 1;

        let history = memory.history(None, None);
        let fix = match aav3_agent::run_coder(llm, &params.task_text, &constraints, &history, config.llm_timeout_sec).await
        {
            Ok(i) => i,
            Err(e) => return error_verdict(&params.session_id, config, started, "FIX_LOOP", e),
        };
        if let Err(e) = store.write_implementation(&fix) {
            return error_verdict(&params.session_id, config, started, "FIX_LOOP", e);
        }
        if let Err(e) = append_message(&mut memory, AgentRole::Coder, MessageRole::Implementation, &fix) {
            return error_verdict(&params.session_id, config, started, "FIX_LOOP", e);
        }

        // An empty file set means the Coder found no further change to make;
        // re-test once more against the existing workspace, then stop
        // looping regardless of the outcome (spec.md §4.7 tie-break).
        let no_change = fix.files_to_create.is_empty();
        if !no_change {
            files_created = match materialize::materialize(&store.workspace_dir(), &fix.files_to_create) {
                Ok(f) => f,
                Err(e) => return error_verdict(&params.session_id, config, started, "FIX_LOOP", e),
            };
        }

        let history = memory.history(None, None);
        let focus = match aav3_agent::run_tester(llm, &params.task_text, &constraints, &history, config.llm_timeout_sec).await
        {
            Ok(f) => f,
            Err(e) => return error_verdict(&params.session_id, config, started, "FIX_LOOP", e),
        };
        if let Err(e) = append_message(&mut memory, AgentRole::Tester, MessageRole::System, &focus) {
            return error_verdict(&params.session_id, config, started, "FIX_LOOP", e);
        }

        test_result = aav3_testadapters::run_all(
            &store.workspace_dir(),
            &files_created,
            &environment,
            &params.session_id,
            timeouts,
        )
        .await;
        if let Err(e) = store.write_test_result(&test_result) {
            return error_verdict(&params.session_id, config, started, "FIX_LOOP", e);
        }
        if let Err(e) = append_message(&mut memory, AgentRole::Tester, MessageRole::TestResult, &test_result) {
            return error_verdict(&params.session_id, config, started, "FIX_LOOP", e);
        }

        if no_change {
            break;
        }
    }

    if cancel.load(Ordering::Relaxed) {
        return cancelled_verdict(&params.session_id, config, started);
    }

    // REVIEW
    let history = memory.history(None, None);
    let review = match aav3_agent::run_reviewer(llm, &params.task_text, &constraints, &history, config.llm_timeout_sec).await
    {
        Ok(r) => r,
        Err(e) => return error_verdict(&params.session_id, config, started, "REVIEW", e),
    };
    if let Err(e) = store.write_review(&review) {
        return error_verdict(&params.session_id, config, started, "REVIEW", e);
    }
    if let Err(e) = append_message(&mut memory, AgentRole::Reviewer, MessageRole::Review, &review) {
        return error_verdict(&params.session_id, config, started, "REVIEW", e);
    }

    // CONSENSUS: one structural vote per role, tallied against the threshold.
    let mut votes = std::collections::HashMap::new();
    for role in AgentRole::voting_roles() {
        let (vote, reason) = aav3_agent::vote(role, &test_result);
        votes.insert(role.as_str().to_string(), VoteRecord { vote, reason });
    }
    let consensus = ConsensusResult::tally(votes, config.consensus_threshold);
    if let Err(e) = store.write_consensus(&consensus) {
        return error_verdict(&params.session_id, config, started, "CONSENSUS", e);
    }
    if let Err(e) = append_message(&mut memory, AgentRole::Orchestrator, MessageRole::Consensus, &consensus) {
        return error_verdict(&params.session_id, config, started, "CONSENSUS", e);
    }

    // DONE
    let verdict = FinalVerdict {
        session_id: params.session_id.clone(),
        status: SessionStatus::Done,
        approved: consensus.approved,
        approval_rate: consensus.approval_rate,
        consensus_threshold: config.consensus_threshold,
        rounds_used,
        test_result: Some(test_result),
        review_verdict: Some(review.verdict),
        duration_sec: started.elapsed().as_secs_f64(),
        errors: Vec::new(),
    };
    if let Err(e) = store.write_verdict(&verdict) {
        return error_verdict(&params.session_id, config, started, "DONE", e);
    }
    verdict
}

fn append_message<T: serde::Serialize>(
    memory: &mut SharedMemory,
    from_agent: AgentRole,
    role: MessageRole,
    content: &T,
) -> Result<(), AppError> {
    let value = serde_json::to_value(content).map_err(|e| AppError::FilesystemError {
        path: "conversation.jsonl".to_string(),
        reason: format!("failed to serialize message content: {e}"),
    })?;
    let message = Message::new(from_agent, role, role.as_str(), value, Utc::now());
    memory.append(message)
}

fn error_verdict(session_id: &str, config: &Config, started: Instant, phase: &str, e: AppError) -> FinalVerdict {
    tracing::error!(phase, error = %e, "session terminated with a fatal error");
    FinalVerdict {
        session_id: session_id.to_string(),
        status: SessionStatus::Error,
        approved: false,
        approval_rate: 0.0,
        consensus_threshold: config.consensus_threshold,
        rounds_used: 0,
        test_result: None,
        review_verdict: None,
        duration_sec: started.elapsed().as_secs_f64(),
        errors: vec![ErrorRecord {
            phase: phase.to_string(),
            kind: e.kind().to_string(),
            message: e.to_string(),
        }],
    }
}

fn cancelled_verdict(session_id: &str, config: &Config, started: Instant) -> FinalVerdict {
    tracing::info!("session cancelled");
    FinalVerdict {
        session_id: session_id.to_string(),
        status: SessionStatus::Cancelled,
        approved: false,
        approval_rate: 0.0,
        consensus_threshold: config.consensus_threshold,
        rounds_used: 0,
        test_result: None,
        review_verdict: None,
        duration_sec: started.elapsed().as_secs_f64(),
        errors: Vec::new(),
    }
}
