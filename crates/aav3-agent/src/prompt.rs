use aav3_core::Message;

/// Render the last-N shared-memory messages as `[from_agent/role] <content>`
/// blocks, the format every role prompt appends after task + constraints
/// (spec.md §4.4).
pub fn render_history(history: &[&Message]) -> String {
    history
        .iter()
        .map(|m| format!("[{}/{}] {}", m.from_agent, m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the user-turn prompt: task brief, environment constraints,
/// rendered history, and the role-specific shape instruction.
pub fn build_user_prompt(
    task_text: &str,
    environment_constraints: &str,
    history: &[&Message],
    shape_instruction: &str,
) -> String {
    let history_block = render_history(history);
    format!(
        "TASK:\n{task_text}\n\nENVIRONMENT CONSTRAINTS:\n{environment_constraints}\n\nCONVERSATION HISTORY:\n{history_block}\n\n{shape_instruction}\n\nReturn *only* a JSON object in the shape described above. No prose before or after."
    )
}

/// The nudge appended on a shape-validation retry (spec.md §4.4).
pub fn nudge(shape_instruction: &str) -> String {
    format!(
        "Your previous reply was not valid; return JSON matching exactly this shape: {shape_instruction}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use aav3_core::{AgentRole, MessageRole};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn render_history_formats_from_agent_and_role() {
        let msg = Message::new(
            AgentRole::Planner,
            MessageRole::Plan,
            "plan_created",
            json!({"strategy": "do it"}),
            Utc::now(),
        );
        let rendered = render_history(&[&msg]);
        assert!(rendered.starts_with("[planner/plan]"));
        assert!(rendered.contains("do it"));
    }

    #[test]
    fn build_user_prompt_includes_all_sections() {
        let prompt = build_user_prompt("build a thing", "no docker", &[], "shape: {...}");
        assert!(prompt.contains("build a thing"));
        assert!(prompt.contains("no docker"));
        assert!(prompt.contains("shape: {...}"));
        assert!(prompt.contains("Return *only* a JSON object"));
    }
}
