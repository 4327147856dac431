//! Prompt builder for the chat-completions advisor.
//!
//! [`CoachingPrompt::build_chat`] returns a `(system_msg, user_msg)` pair.
//! The user message describes the current sample, the recent history and the
//! target note in plain text so that small local models cope with it.

use std::fmt::Write as _;

use crate::analysis::{note_name, VocalMetrics};
use crate::coaching::advisor::CoachingRequest;

// ---------------------------------------------------------------------------
// System instruction
// ---------------------------------------------------------------------------

const SYSTEM_INSTRUCTION: &str = "\
You are a friendly karaoke vocal coach watching a singer in real time.
Task: Give short, encouraging, practical advice based on live measurements.

Measurements:
- pitch: cents relative to A4 (0 = A4 440 Hz, 100 cents = one semitone).
- volume, stability, confidence: 0 to 100, higher is better.

Rules:
1. Reply with ONLY a JSON object: {\"feedback\": \"...\", \"tips\": [\"...\", \"...\"]}.
2. feedback is one sentence about the overall performance.
3. Give at most 2 tips, each under 15 words, most important first.
4. Focus on breath support, pitch accuracy, and volume control.
5. Never mention the raw numbers.";

const EXAMPLE: &str = "
Example:
Current: note A4, pitch +30 cents from target, volume 20, stability 45
Reply: {\"feedback\": \"You are close to the note but a little timid.\", \"tips\": [\"Take a deeper breath before the phrase\", \"Let the sound project forward\"]}
";

// ---------------------------------------------------------------------------
// CoachingPrompt
// ---------------------------------------------------------------------------

/// Builds coaching prompts in chat-message format.
///
/// # Example
/// ```rust
/// use vocal_coach::analysis::VocalMetrics;
/// use vocal_coach::coaching::{CoachingPrompt, CoachingRequest};
/// use std::time::Duration;
///
/// let metrics = VocalMetrics::no_signal(0.0, Duration::ZERO, 0);
/// let (system, user) = CoachingPrompt::new().build_chat(&CoachingRequest::new(metrics));
/// assert!(system.contains("vocal coach"));
/// assert!(user.contains("no voice detected"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CoachingPrompt;

impl CoachingPrompt {
    pub fn new() -> Self {
        Self
    }

    pub fn build_chat(&self, request: &CoachingRequest) -> (String, String) {
        let mut user_msg = String::with_capacity(512);
        user_msg.push_str(EXAMPLE);

        match request.target {
            Some(target) => {
                let note = note_name(target.cents()).unwrap_or_else(|| "?".into());
                let _ = writeln!(user_msg, "\nTarget note: {note} ({:.0} Hz)", target.hz());
            }
            None => user_msg.push_str("\nTarget note: none\n"),
        }

        if !request.history.is_empty() {
            user_msg.push_str("Recent samples (oldest first):\n");
            for m in &request.history {
                let _ = writeln!(user_msg, "- {}", describe(m));
            }
        }

        let _ = write!(user_msg, "Current: {}\n\nReply:\n", describe(&request.metrics));

        (SYSTEM_INSTRUCTION.to_string(), user_msg)
    }
}

fn describe(m: &VocalMetrics) -> String {
    if !m.signal {
        return "no voice detected".to_string();
    }
    let note = note_name(m.pitch).unwrap_or_else(|| "?".into());
    format!(
        "note {note}, pitch {:+.0} cents, volume {:.0}, stability {:.0}, confidence {:.0}, {}",
        m.pitch,
        m.volume,
        m.stability,
        m.confidence,
        if m.in_tune { "in tune" } else { "not in tune" },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
