//! Prompt composition for the study-plan and chat features.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::config::{BudgetConfig, ChatConfig};
use crate::types::{ChatMessage, MaterialDescriptor, StudyGoal};

/// Days assumed when the deadline cannot be parsed.
pub const FALLBACK_DAYS_UNTIL_DEADLINE: i64 = 14;

pub const PLAN_SYSTEM_PROMPT: &str = r#"You are Exam Pal, an AI study assistant that helps students prepare for exams effectively.
Create a personalized study plan from the student's uploaded materials, their goal, and their exam deadline. The plan must be specific, actionable, and tailored to the content.

The study plan should include:
1. An overview of the material and the key topics to focus on
2. A timeline of milestones with concrete tasks, each on a specific date
3. Learning strategies suited to the material
4. Practice exercises or self-assessment methods

IMPORTANT: Identify the units, chapters, or major topics in the materials and order the plan so it follows them in a logical progression. Each milestone should focus on specific units or topics.

Respond in JSON with exactly this structure:
{
    "overview": "General overview and approach",
    "milestones": [
        {
            "date": "YYYY-MM-DD",
            "title": "Milestone title",
            "description": "What this milestone covers",
            "unit": "Unit or topic this milestone covers",
            "tasks": ["Task 1", "Task 2"]
        }
    ]
}

Spread the milestones evenly from now until the deadline, grouped by unit or topic where the materials have them."#;

const CHAT_PERSONA: &str = r#"You are Exam Pal, a Gen Z, Hinglish-speaking study buddy. Your vibe:
- Super helpful, with a funny, mast (cool) tone
- You ALWAYS mix Hindi and English (Hinglish), e.g. "samajh gaye?" instead of "understand?"
- Explain complex topics in very simple words, ELI5 style
- Use desi Gen Z slang like "bhai", "yaar", "matlab", "ekdum", "scene", "vibe"
- Drop funny Hindi idioms and filmy references when they fit
- Use emojis generously 🔥😎👌
- Keep explanations ultra-short; no lengthy professor vibes
- Check understanding now and then with "haina?", "na?", "matlab samjhe?"
- Talk like a friend, with examples young students relate to"#;

const CHAT_RULES: &str = r#"When responding to questions:
1. If the answer is in the materials, give it clearly in Hinglish with some humor
2. If the answer isn't in the materials, say honestly (and funnily) that you don't have that info
3. Break complex topics into super simple points with Hinglish examples
4. Keep responses under 200 words unless more detail is explicitly requested
5. Start with a catchphrase like "Arre yaar!", "Bro!", "Dekho na", or "Aisa hai"

DO NOT make up information that is not in the materials."#;

/// Build the chat system prompt around the budgeted material text.
pub fn chat_system_prompt(material_text: &str) -> String {
    format!(
        "{CHAT_PERSONA}\n\nYou have access to the following study materials:\n\n{material_text}\n{CHAT_RULES}"
    )
}

/// Build the study-plan user prompt.
pub fn plan_user_prompt(material_text: &str, goal: StudyGoal, deadline: &str, days: i64) -> String {
    format!(
        "Create a study plan for me based on these materials:\n\n\
         {material_text}\n\
         My goal is to {goal}.\n\
         My exam is in {days} days (on {deadline}).\n\n\
         Please make the plan specific to the content in these materials and give me a realistic schedule.",
        goal = goal.description(),
    )
}

/// Parse a deadline string into local naive time.
///
/// Accepts RFC 3339 with an offset, `YYYY-MM-DDTHH:MM[:SS[.f]]` with `T` or
/// a space, and a bare `YYYY-MM-DD` (midnight).
pub fn parse_deadline(deadline: &str) -> Option<NaiveDateTime> {
    let deadline = deadline.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(deadline) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(deadline, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(deadline, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Whole days from `now` until the deadline, floored (a deadline 12 hours
/// in the past is day -1). Unparsable deadlines yield
/// [`FALLBACK_DAYS_UNTIL_DEADLINE`].
pub fn days_until_deadline(deadline: &str, now: NaiveDateTime) -> i64 {
    match parse_deadline(deadline) {
        Some(at) => (at - now).num_milliseconds().div_euclid(86_400_000),
        None => {
            warn!(deadline, "Error parsing deadline, assuming two weeks");
            FALLBACK_DAYS_UNTIL_DEADLINE
        }
    }
}

/// Composes model messages from materials, history and user input.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    budget: BudgetConfig,
    chat_window: usize,
}

impl PromptComposer {
    pub fn new(budget: BudgetConfig, chat: &ChatConfig) -> Self {
        Self {
            budget,
            chat_window: chat.request_window,
        }
    }

    /// System and user messages for a study-plan request.
    pub fn plan_messages(
        &self,
        materials: &[MaterialDescriptor],
        goal: StudyGoal,
        deadline: &str,
        now: NaiveDateTime,
    ) -> Vec<ChatMessage> {
        let material_text = self.budget.plan.apply(materials);
        let days = days_until_deadline(deadline, now);
        vec![
            ChatMessage::system(PLAN_SYSTEM_PROMPT),
            ChatMessage::user(plan_user_prompt(&material_text, goal, deadline, days)),
        ]
    }

    /// System prompt, the most recent history window, then the new message.
    ///
    /// `history` must not already contain `message`.
    pub fn chat_messages(
        &self,
        materials: &[MaterialDescriptor],
        history: &[ChatMessage],
        message: &str,
    ) -> Vec<ChatMessage> {
        let material_text = self.budget.chat.apply(materials);
        let window_start = history.len().saturating_sub(self.chat_window);

        let mut messages = Vec::with_capacity(history.len() - window_start + 2);
        messages.push(ChatMessage::system(chat_system_prompt(&material_text)));
        messages.extend_from_slice(&history[window_start..]);
        messages.push(ChatMessage::user(message));
        messages
    }
}
