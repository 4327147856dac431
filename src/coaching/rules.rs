//! Offline coaching heuristics.
//!
//! [`RuleBasedAdvisor`] looks at the current sample and the recent history and
//! picks tips from a fixed table.  It never fails, so it is both the default
//! provider and the fallback for [`FallbackAdvisor`](super::FallbackAdvisor).
//!
//! | Condition                                  | Tip                                 |
//! |--------------------------------------------|-------------------------------------|
//! | no voice in the sample                     | move closer to the microphone       |
//! | volume < 30                                | support the breath, project         |
//! | volume > 90                                | back off, avoid straining           |
//! | off target by ≥ 50 cents                   | sharp / flat correction             |
//! | stability < 50                             | sustain vowels evenly               |
//! | stability dropped ≥ 15 over the history    | pace the breath                     |
//! | none of the above                          | encouragement + practice routine    |

use async_trait::async_trait;

use crate::analysis::{VocalMetrics, IN_TUNE_THRESHOLD_CENTS};
use crate::coaching::advisor::{Advice, AdvisorError, CoachingAdvisor, CoachingRequest};

pub const QUIET_VOLUME: f64 = 30.0;
pub const LOUD_VOLUME: f64 = 90.0;
pub const UNSTABLE_BELOW: f64 = 50.0;
const STABILITY_DROP: f64 = 15.0;

const TIP_NO_VOICE: &str = "Move a little closer to the microphone and sing out";
const TIP_QUIET: &str = "Practice diaphragmatic breathing to support a fuller sound";
const TIP_LOUD: &str = "Ease off the volume a little so you don't strain your voice";
const TIP_SHARP: &str = "You're a bit sharp, relax your throat and let the note settle down";
const TIP_FLAT: &str = "You're a bit flat, lift your soft palate and aim slightly higher";
const TIP_UNSTABLE: &str = "Hold each vowel steadily instead of letting the pitch wander";
const TIP_FADING: &str = "Pace your breath so long phrases stay steady to the end";
const TIP_WARM_UP: &str = "Warm up with vocal scales before the next song";
const TIP_RECORD: &str = "Record yourself to identify areas for improvement";

/// Heuristic, network-free advisor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedAdvisor;

impl RuleBasedAdvisor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of [`CoachingAdvisor::produce_tips`].
    pub fn evaluate(&self, request: &CoachingRequest) -> Advice {
        let m = &request.metrics;

        if !m.signal {
            let feedback = if m.stalled {
                "The microphone stopped sending audio."
            } else {
                "I can't hear you yet."
            };
            return Advice {
                feedback: feedback.to_string(),
                tips: vec![TIP_NO_VOICE.to_string()],
            };
        }

        let mut tips = Vec::new();

        if m.volume < QUIET_VOLUME {
            tips.push(TIP_QUIET);
        } else if m.volume > LOUD_VOLUME {
            tips.push(TIP_LOUD);
        }

        if let Some(target) = request.target {
            let offset = m.pitch - target.cents();
            if offset >= IN_TUNE_THRESHOLD_CENTS {
                tips.push(TIP_SHARP);
            } else if offset <= -IN_TUNE_THRESHOLD_CENTS {
                tips.push(TIP_FLAT);
            }
        }

        if m.stability < UNSTABLE_BELOW {
            tips.push(TIP_UNSTABLE);
        } else if stability_dropped(&request.history, m) {
            tips.push(TIP_FADING);
        }

        let feedback = if tips.is_empty() {
            tips.push(TIP_WARM_UP);
            tips.push(TIP_RECORD);
            "Great control, keep it up!"
        } else if m.confidence >= 60.0 {
            "Solid singing with a couple of things to polish."
        } else {
            "Your performance shows potential, focus on breath support and steady pitch."
        };

        Advice {
            feedback: feedback.to_string(),
            tips: tips.into_iter().map(str::to_string).collect(),
        }
    }
}

fn stability_dropped(history: &[VocalMetrics], current: &VocalMetrics) -> bool {
    let voiced: Vec<f64> = history.iter().filter(|m| m.signal).map(|m| m.stability).collect();
    if voiced.is_empty() {
        return false;
    }
    let mean = voiced.iter().sum::<f64>() / voiced.len() as f64;
    mean - current.stability >= STABILITY_DROP
}

#[async_trait]
impl CoachingAdvisor for RuleBasedAdvisor {
    async fn produce_tips(&self, request: &CoachingRequest) -> Result<Advice, AdvisorError> {
        Ok(self.evaluate(request))
    }
}
