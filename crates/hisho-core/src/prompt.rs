use chrono::NaiveDate;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Hisho, a capable personal secretary. \
You help the user with their calendar and their mail using the tools provided. \
Always use a tool to look things up instead of guessing, and confirm the details \
with the user before sending mail or creating events on their behalf. \
Keep replies short and friendly.";

/// The system prompt for a conversation.
///
/// Today's date is always included so the model can resolve relative dates.
pub fn build_system_prompt(base: Option<&str>, user_name: Option<&str>, today: NaiveDate) -> String {
    let mut prompt = base.unwrap_or(DEFAULT_SYSTEM_PROMPT).trim().to_string();
    if let Some(name) = user_name.map(str::trim).filter(|n| !n.is_empty()) {
        prompt.push_str(&format!("\n\nThe user's name is {name}. Address them by name."));
    }
    prompt.push_str(&format!(
        "\n\nToday is {} ({}). Dates passed to tools use YYYY-MM-DD.",
        today.format("%Y-%m-%d"),
        today.format("%A")
    ));
    prompt
}
