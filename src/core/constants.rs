//! Shared constants used across the application

/// Instruction sent as the system message of every session.
pub const SYSTEM_INSTRUCTION: &str = "You are a friendly English grammar tutor. \
When the user sends a sentence, check it for grammar, spelling, and word-choice mistakes. \
If there are mistakes, reply with a line starting with \"Correction:\" that contains the corrected sentence, \
followed by a short explanation of each change. \
If the sentence is already correct, say so and briefly explain why it works. \
If the user asks a question about English, answer it clearly with examples. \
Keep replies concise and encouraging.";

/// Sampling temperature applied to every request.
pub const TEMPERATURE: f32 = 0.7;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_GREETING: &str = "Hi! Send me any English sentence and I'll check its grammar. \
I'll point out mistakes, suggest a corrected version, and explain what changed.";

/// Shown when a turn fails because no API key is configured.
pub const MISSING_CREDENTIAL_APOLOGY: &str = "I can't reach the grammar service because no API key is configured. \
Run `gramfix auth` or set GRAMFIX_API_KEY, then try again.";

/// Shown for every other failed turn.
pub const GENERIC_APOLOGY: &str =
    "Sorry, I ran into a problem checking that sentence. Please try again.";

pub const API_KEY_ENV: &str = "GRAMFIX_API_KEY";
pub const FALLBACK_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "GRAMFIX_BASE_URL";
pub const LOG_FILTER_ENV: &str = "GRAMFIX_LOG";
