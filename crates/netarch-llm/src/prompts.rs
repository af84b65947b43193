//! Prompt builders. Each is a pure function of its inputs so the exact text
//! sent to the service can be asserted in tests.

use netarch_core::{ChatMessage, CompletionRequest, MasteryLevel};

/// Lower temperature keeps diagnostic feedback focused on the submitted config.
pub const DIAGNOSE_TEMPERATURE: f64 = 0.4;

pub fn diagnose(code: &str, hypothesis: &str, topic: &str, temperature: f64) -> CompletionRequest {
    let system = format!(
        "You are a Socratic networking tutor.\n\
         Current lab topic: {topic}\n\
         \n\
         Inputs:\n\
         1. The student's configuration or log (see the user message).\n\
         2. The student's own guess about what is wrong: {hypothesis}\n\
         \n\
         How to reply:\n\
         1. First assess the student's guess. If they are looking in the right direction, say so; \
         if not, explain why that direction is not the root cause.\n\
         2. Then analyse the actual fault in the configuration.\n\
         3. Do not hand over corrected configuration. Guide with questions instead, for example: \
         \"You noticed the Area ID, but did you check the wildcard mask format?\"\n\
         4. Reply in Markdown, friendly but professional."
    );
    CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(code)])
        .with_temperature(temperature)
}

pub fn generate_task(topic: &str, mastery: MasteryLevel) -> CompletionRequest {
    let difficulty = if mastery.wants_guided_steps() {
        "Include detailed step-by-step hints for every stage of the task."
    } else {
        "Hide 2-3 subtle faults in the scenario for me to troubleshoot, without pointing at them."
    };
    let prompt = format!(
        "I am a student on a Computer Networks course.\n\
         Today's focus: {topic}\n\
         Self-assessed mastery: {level} ({described})\n\
         \n\
         Design a hands-on exercise I can complete in Packet Tracer or GNS3.\n\
         \n\
         Requirements:\n\
         1. {difficulty}\n\
         2. The exercise must stay on \"{topic}\".\n\
         \n\
         Output structure:\n\
         ### 🎯 Today's challenge goal\n\
         ### 🧩 Topology requirements\n\
         ### 💣 Seeded faults / configuration tasks\n\
         ### 🔍 Acceptance criteria (ping / show commands)",
        level = mastery.as_str(),
        described = mastery.describe(),
    );
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
}

pub fn generate_solution(task_content: &str) -> CompletionRequest {
    let prompt = format!(
        "You are a professional network engineer. Provide the reference answer for the lab task below.\n\
         \n\
         Task:\n\
         {task_content}\n\
         \n\
         Output requirements:\n\
         1. List the configuration commands per device, Cisco IOS syntax preferred.\n\
         2. Explain what the key lines do.\n\
         3. Give 1-2 core verification commands (show ...) and their expected output.\n\
         4. Keep it well formatted and put all commands in Markdown code blocks."
    );
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
}

pub fn socratic_quiz(concept: &str) -> CompletionRequest {
    let prompt = format!(
        "Explain the networking concept \"{concept}\" with the simplest possible analogy, \
         then ask me one deep follow-up question that tests whether I really understood it."
    );
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
}
