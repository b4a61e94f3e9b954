use aav3_core::{AgentRole, TestResult, Verdict, Vote};

/// Each agent's consensus vote is a structural function of the actual test
/// outcome, not a further LLM call: approve iff the final `TestResult`
/// passed, otherwise reject (spec.md §4.4, §4.7, §9 "keep the decision out
/// of the LLM").
pub fn vote(role: AgentRole, test_result: &TestResult) -> (Vote, String) {
    match test_result.verdict {
        Verdict::Pass => (
            Vote::Approve,
            format!("{role}: all executed tests passed or were skipped"),
        ),
        Verdict::NeedsFixes => (
            Vote::Reject,
            format!(
                "{role}: {} test(s) still failing",
                test_result.tests_failed
            ),
        ),
    }
}
