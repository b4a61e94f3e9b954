use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five LLM-backed roles plus the orchestrator itself, which also
/// appends system messages to the shared log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Researcher,
    Coder,
    Reviewer,
    Tester,
    Orchestrator,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Researcher => "researcher",
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::Tester => "tester",
            Self::Orchestrator => "orchestrator",
        }
    }

    /// The five roles that cast a consensus vote. Orchestrator never votes.
    pub fn voting_roles() -> [AgentRole; 5] {
        [
            AgentRole::Planner,
            AgentRole::Researcher,
            AgentRole::Coder,
            AgentRole::Reviewer,
            AgentRole::Tester,
        ]
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of content a `Message` carries, independent of who produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Plan,
    Research,
    Implementation,
    Review,
    TestResult,
    Consensus,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Research => "research",
            Self::Implementation => "implementation",
            Self::Review => "review",
            Self::TestResult => "test_result",
            Self::Consensus => "consensus",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in `SharedMemory`. Append-only: never edited or deleted once
/// durably written to `conversation.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub from_agent: AgentRole,
    pub role: MessageRole,
    pub message_type: String,
    pub content: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        from_agent: AgentRole,
        role: MessageRole,
        message_type: impl Into<String>,
        content: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            from_agent,
            role,
            message_type: message_type.into(),
            content,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Planner output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub strategy: String,
    pub steps: Vec<String>,
    pub unknowns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_to_create: Option<Vec<String>>,
}

/// Researcher output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Research {
    pub findings: Vec<String>,
    pub recommendation: String,
    pub confidence: Confidence,
}

/// A single file the Coder wants materialized into `workspace_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: String,
    pub content: String,
}

/// Coder output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    pub files_to_create: Vec<FileSpec>,
    pub key_decisions: Vec<String>,
    pub status: String,
}

impl Implementation {
    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    NeedsRevision,
    Rejected,
}

impl fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::NeedsRevision => "needs_revision",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Reviewer output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub verdict: ReviewVerdict,
    pub strengths: Vec<String>,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Tester proposes what to look for; the Orchestrator runs the actual tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesterFocus {
    pub focus_areas: Vec<String>,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pass,
    Fail,
    Skip,
}

/// One test performed by a TestAdapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub test_name: String,
    pub suite: String,
    pub result: TestOutcome,
    #[serde(default)]
    pub stdout_excerpt: String,
    #[serde(default)]
    pub stderr_excerpt: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    NeedsFixes,
}

/// Aggregate result of one TEST phase round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub verdict: Verdict,
    pub tests_executed: u32,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub issues_found: Vec<TestRecord>,
}

impl TestResult {
    /// `verdict = pass` iff every record is pass/skip and at least one is pass.
    pub fn from_records(records: Vec<TestRecord>) -> Self {
        let tests_executed = records.len() as u32;
        let tests_passed = records
            .iter()
            .filter(|r| r.result == TestOutcome::Pass)
            .count() as u32;
        let tests_failed = records
            .iter()
            .filter(|r| r.result == TestOutcome::Fail)
            .count() as u32;
        let has_fail = tests_failed > 0;
        let has_pass = tests_passed > 0;
        let verdict = if !has_fail && has_pass {
            Verdict::Pass
        } else {
            Verdict::NeedsFixes
        };
        Self {
            verdict,
            tests_executed,
            tests_passed,
            tests_failed,
            issues_found: records,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Approve,
    Reject,
}

/// One agent's consensus ballot: `{vote, reason}` per spec.md §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub vote: Vote,
    pub reason: String,
}

/// Result of the single consensus round at the end of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub votes: HashMap<String, VoteRecord>,
    pub approval_rate: f64,
    pub approved: bool,
    pub reason: String,
}

const CONSENSUS_EPSILON: f64 = 1e-9;

impl ConsensusResult {
    /// `approved` iff `approval_rate + epsilon >= threshold`, so that exact
    /// boundary shares (e.g. 2/3 against a 0.67 threshold) round the way a
    /// human reading the ratio would expect.
    pub fn tally(votes: HashMap<String, VoteRecord>, threshold: f64) -> Self {
        let total = AgentRole::voting_roles().len() as f64;
        let approvals = votes.values().filter(|v| v.vote == Vote::Approve).count() as f64;
        let approval_rate = approvals / total;
        let approved = approval_rate + CONSENSUS_EPSILON >= threshold;
        let reason = format!(
            "{approvals}/{total} agents approved ({approval_rate:.3} vs threshold {threshold:.3})"
        );
        Self {
            votes,
            approval_rate,
            approved,
            reason,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolVersion {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerCapability {
    pub available: bool,
    pub compose: bool,
    pub buildx: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuCapability {
    pub nvidia: bool,
    pub amd: bool,
    pub apple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuda_version: Option<String>,
    #[serde(default)]
    pub devices: Vec<String>,
}

impl GpuCapability {
    pub fn any_present(&self) -> bool {
        self.nvidia || self.amd || self.apple
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageCapabilities {
    pub python: ToolVersion,
    pub node: ToolVersion,
    pub rust: ToolVersion,
    pub go: ToolVersion,
    pub java: ToolVersion,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityCapabilities {
    pub git: ToolVersion,
    pub grep: ToolVersion,
    pub trivy: ToolVersion,
    pub syft: ToolVersion,
    pub grype: ToolVersion,
    pub pip_audit: ToolVersion,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkCapabilities {
    pub internet: bool,
    pub github: bool,
    pub pypi: bool,
    pub npm: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultimediaCapabilities {
    pub ffmpeg: ToolVersion,
    pub imagemagick: ToolVersion,
    pub opencv: ToolVersion,
}

/// Computed once per session before PLAN; never recomputed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentCapabilities {
    pub docker: DockerCapability,
    pub gpu: GpuCapability,
    pub languages: LanguageCapabilities,
    pub security: SecurityCapabilities,
    pub network: NetworkCapabilities,
    pub multimedia: MultimediaCapabilities,
    pub summary: String,
}

/// A live session: its identity, paths, and tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub task_text: String,
    pub workspace_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub consensus_threshold: f64,
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Done,
    Error,
    Cancelled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub phase: String,
    pub kind: String,
    pub message: String,
}

/// The `verdict.json` schema, per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub session_id: String,
    pub status: SessionStatus,
    pub approved: bool,
    pub approval_rate: f64,
    pub consensus_threshold: f64,
    pub rounds_used: u32,
    pub test_result: Option<TestResult>,
    pub review_verdict: Option<ReviewVerdict>,
    pub duration_sec: f64,
    pub errors: Vec<ErrorRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_role_as_str_roundtrips_through_serde() {
        for role in AgentRole::voting_roles() {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
    }

    #[test]
    fn test_result_pass_requires_at_least_one_pass() {
        let result = TestResult::from_records(vec![TestRecord {
            test_name: "only_skip".into(),
            suite: "gpu_smoke".into(),
            result: TestOutcome::Skip,
            stdout_excerpt: String::new(),
            stderr_excerpt: String::new(),
            exit_code: None,
            duration_ms: 0,
            reason: Some("gpu not detected".into()),
        }]);
        assert_eq!(result.verdict, Verdict::NeedsFixes);
    }

    #[test]
    fn test_result_pass_with_skip_and_one_pass() {
        let result = TestResult::from_records(vec![
            TestRecord {
                test_name: "syntax".into(),
                suite: "python_syntax".into(),
                result: TestOutcome::Pass,
                stdout_excerpt: String::new(),
                stderr_excerpt: String::new(),
                exit_code: Some(0),
                duration_ms: 12,
                reason: None,
            },
            TestRecord {
                test_name: "docker_build".into(),
                suite: "docker".into(),
                result: TestOutcome::Skip,
                stdout_excerpt: String::new(),
                stderr_excerpt: String::new(),
                exit_code: None,
                duration_ms: 0,
                reason: Some("docker not available".into()),
            },
        ]);
        assert_eq!(result.verdict, Verdict::Pass);
    }

    #[test]
    fn test_result_any_fail_forces_needs_fixes() {
        let result = TestResult::from_records(vec![
            TestRecord {
                test_name: "a".into(),
                suite: "python_syntax".into(),
                result: TestOutcome::Pass,
                stdout_excerpt: String::new(),
                stderr_excerpt: String::new(),
                exit_code: Some(0),
                duration_ms: 1,
                reason: None,
            },
            TestRecord {
                test_name: "b".into(),
                suite: "python_unit".into(),
                result: TestOutcome::Fail,
                stdout_excerpt: String::new(),
                stderr_excerpt: "AssertionError".into(),
                exit_code: Some(1),
                duration_ms: 5,
                reason: None,
            },
        ]);
        assert_eq!(result.verdict, Verdict::NeedsFixes);
    }

    fn vote_record(vote: Vote) -> VoteRecord {
        VoteRecord {
            vote,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn consensus_threshold_monotonicity() {
        let mut votes = HashMap::new();
        votes.insert("planner".to_string(), vote_record(Vote::Approve));
        votes.insert("researcher".to_string(), vote_record(Vote::Approve));
        votes.insert("coder".to_string(), vote_record(Vote::Approve));
        votes.insert("reviewer".to_string(), vote_record(Vote::Reject));
        votes.insert("tester".to_string(), vote_record(Vote::Reject));

        let low = ConsensusResult::tally(votes.clone(), 0.5);
        let high = ConsensusResult::tally(votes, 0.67);
        assert!(low.approved);
        assert!(!high.approved);
    }

    #[test]
    fn consensus_epsilon_tolerates_exact_boundary() {
        let mut votes = HashMap::new();
        votes.insert("planner".to_string(), vote_record(Vote::Approve));
        votes.insert("researcher".to_string(), vote_record(Vote::Approve));
        votes.insert("coder".to_string(), vote_record(Vote::Approve));
        votes.insert("reviewer".to_string(), vote_record(Vote::Reject));
        votes.insert("tester".to_string(), vote_record(Vote::Reject));

        // 3/5 == 0.6 exactly.
        let result = ConsensusResult::tally(votes, 0.6);
        assert!(result.approved);
    }

    #[test]
    fn missing_votes_default_to_reject_via_empty_map() {
        let result = ConsensusResult::tally(HashMap::new(), 0.1);
        assert_eq!(result.approval_rate, 0.0);
        assert!(!result.approved);
    }
}
