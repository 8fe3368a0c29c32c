//! System prompt construction.
//!
//! One fixed ruleset, composed once at startup and reused for every turn.
//! Operator-supplied custom rules are spliced into their own section; when
//! none are supplied the section carries an explicit marker instead of being
//! dropped, so the model always sees the section.

/// Rules that apply to EVERY interaction.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a helpful TastyTrade trading assistant.

**Core Rules:**
- Always confirm with the user before executing real trades (dry-run disabled)
- Provide risk warnings for complex options strategies
- Show portfolio impact before large trades
- Use concise, clear language
- When showing quotes or positions, format data in readable tables

**Trading Guidelines:**
- For options: Always check IV rank before suggesting trades
- Monitor portfolio Greeks (delta, theta exposure)
- Suggest position sizing based on account balance
- Warn about earnings dates and high-volatility events

**Custom Rules (loaded from env):**
{custom_rules}
"#;

/// Marker used when no custom rules are configured.
const NO_RULES_MARKER: &str = "None specified";

/// Compose the immutable instruction block for the session.
///
/// A blank or whitespace-only fragment counts as absent.
pub fn compose(custom_rules: Option<&str>) -> String {
    let rules = custom_rules
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(NO_RULES_MARKER);
    SYSTEM_PROMPT_TEMPLATE.replace("{custom_rules}", rules)
}
