pub mod consensus;
pub mod prompt;
pub mod roles;

pub use consensus::vote;
pub use roles::{run_coder, run_planner, run_researcher, run_reviewer, run_tester, system_prompt_for};
