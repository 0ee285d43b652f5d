//! Dialogue Engine — the step protocol of a simulated support call.
//!
//! `continue_prompt` is decided locally by keyword classification. The question
//! and feedback steps are delegated to server-side services that own their own
//! sub-state; the engine passes that state through and trusts what comes back.

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Closed set of protocol steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStep {
    #[default]
    ContinuePrompt,
    HandleQuestions,
    InitialQuestion,
    CheckSteps,
    GetFeedback,
    FeedbackPrompt,
    EndCall,
    Completed,
    Error,
}

impl DialogueStep {
    pub fn as_str(self) -> &'static str {
        match self {
            DialogueStep::ContinuePrompt => "continue_prompt",
            DialogueStep::HandleQuestions => "handle_questions",
            DialogueStep::InitialQuestion => "initial_question",
            DialogueStep::CheckSteps => "check_steps",
            DialogueStep::GetFeedback => "get_feedback",
            DialogueStep::FeedbackPrompt => "feedback_prompt",
            DialogueStep::EndCall => "end_call",
            DialogueStep::Completed => "completed",
            DialogueStep::Error => "error",
        }
    }

    /// Parse a step name coming from a delegate. Names outside the closed set
    /// become `Error`.
    pub fn from_wire(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!("delegate returned unknown dialogue step {:?}", name);
            DialogueStep::Error
        })
    }
}

impl fmt::Display for DialogueStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialogueStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let step = match s.trim() {
            "continue_prompt" => DialogueStep::ContinuePrompt,
            "handle_questions" => DialogueStep::HandleQuestions,
            "initial_question" => DialogueStep::InitialQuestion,
            "check_steps" => DialogueStep::CheckSteps,
            "get_feedback" => DialogueStep::GetFeedback,
            "feedback_prompt" => DialogueStep::FeedbackPrompt,
            "end_call" => DialogueStep::EndCall,
            "completed" => DialogueStep::Completed,
            "error" => DialogueStep::Error,
            other => return Err(format!("unknown dialogue step: {}", other)),
        };
        Ok(step)
    }
}

/// Step plus the delegates' opaque sub-state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueState {
    pub step: DialogueStep,
    /// Owned by the question/feedback services. Never inspected here except for
    /// an optional `step` field.
    #[serde(default = "empty_aux")]
    pub aux: Value,
    /// Consecutive clarification prompts issued at `continue_prompt`.
    #[serde(default)]
    pub clarifications: u32,
}

fn empty_aux() -> Value {
    Value::Object(Default::default())
}

impl Default for DialogueState {
    fn default() -> Self {
        Self {
            step: DialogueStep::ContinuePrompt,
            aux: empty_aux(),
            clarifications: 0,
        }
    }
}

impl DialogueState {
    pub fn at(step: DialogueStep) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }
}

/// Reply of the question-handling service
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionsReply {
    pub ai_text: String,
    pub aux: Value,
    pub resolved: Option<bool>,
}

/// Reply of the feedback service
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackReply {
    pub ai_text: String,
    pub next_step: String,
}

/// Server-side services the deeper steps are delegated to
#[async_trait]
pub trait DialogueDelegate: Send + Sync {
    async fn handle_questions(
        &self,
        call_id: &str,
        user_text: &str,
        aux: &Value,
    ) -> Result<QuestionsReply, TransportError>;

    async fn get_feedback(
        &self,
        call_id: &str,
        user_text: &str,
    ) -> Result<FeedbackReply, TransportError>;
}

/// Keyword lists and fixed utterances of the local steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueScript {
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
    pub acknowledgement: String,
    pub first_question: String,
    pub closing: String,
    pub clarification: String,
    pub clarification_limit: String,
    pub farewell: String,
    pub apology: String,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for DialogueScript {
    fn default() -> Self {
        Self {
            affirmative: words(&[
                "نعم", "ايوه", "ايوا", "اكيد", "تمام", "موافق", "ماشي", "حاضر", "طيب", "yes",
                "okay",
            ]),
            negative: words(&["لا", "لأ", "كلا", "مش عايز", "مش عاوز", "مش دلوقتي", "no"]),
            acknowledgement: "تمام، خلينا نبدأ.".to_string(),
            first_question: "ممكن توصف لي المشكلة اللي بتواجهها بالتفصيل؟".to_string(),
            closing: "تمام، شكرا لوقتك. لو احتجت أي مساعدة إحنا موجودين دايما.".to_string(),
            clarification: "معلش، مش فاهم قصدك. تحب نكمل؟ من فضلك قول نعم أو لا.".to_string(),
            clarification_limit: "معلش، مش قادر أفهم الرد. هننهي المكالمة دلوقتي، شكرا لوقتك."
                .to_string(),
            farewell: "شكرا لاتصالك، مع السلامة.".to_string(),
            apology: "عذرا، حصلت مشكلة. من فضلك حاول تاني.".to_string(),
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Clarification prompts allowed at `continue_prompt` before the engine gives
    /// up and moves to `end_call`. `None` keeps asking.
    #[serde(default)]
    pub max_clarifications: Option<u32>,
    #[serde(default)]
    pub script: DialogueScript,
}

/// How `continue_prompt` read the utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Affirmative,
    Negative,
    Unclear,
}

/// What kind of move the engine made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueOutcome {
    Affirmed,
    Declined,
    /// Neither keyword list matched; the step is unchanged.
    Ambiguous,
    /// Clarification cap reached.
    GaveUp,
    Delegated,
    Farewell,
    Unrecognized,
}

/// One engine step
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueTurn {
    pub ai_text: String,
    pub state: DialogueState,
    pub resolved: Option<bool>,
    pub outcome: DialogueOutcome,
}

/// Lowercase, unify alef/yeh/teh-marbuta variants, drop diacritics and tatweel.
pub fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            'أ' | 'إ' | 'آ' | 'ٱ' => Some('ا'),
            'ى' => Some('ي'),
            'ة' => Some('ه'),
            '\u{0640}' | '\u{064B}'..='\u{0652}' | '\u{0670}' => None,
            other => Some(other),
        })
        .collect()
}

fn normalized_keywords(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|w| normalize(w))
        .filter(|w| !w.is_empty())
        .collect()
}

pub struct DialogueEngine {
    config: DialogueConfig,
    affirmative: Vec<String>,
    negative: Vec<String>,
    delegate: Box<dyn DialogueDelegate>,
}

impl DialogueEngine {
    pub fn new(config: DialogueConfig, delegate: Box<dyn DialogueDelegate>) -> Self {
        let affirmative = normalized_keywords(&config.script.affirmative);
        let negative = normalized_keywords(&config.script.negative);
        Self {
            config,
            affirmative,
            negative,
            delegate,
        }
    }

    pub fn script(&self) -> &DialogueScript {
        &self.config.script
    }

    /// Affirmative keywords are checked first, so they win when both match.
    pub fn classify(&self, utterance: &str) -> Intent {
        let text = normalize(utterance);
        if self.affirmative.iter().any(|k| text.contains(k.as_str())) {
            Intent::Affirmative
        } else if self.negative.iter().any(|k| text.contains(k.as_str())) {
            Intent::Negative
        } else {
            Intent::Unclear
        }
    }

    /// Advance the protocol by one user utterance.
    pub async fn next(
        &self,
        call_id: &str,
        state: &DialogueState,
        utterance: &str,
    ) -> Result<DialogueTurn, TransportError> {
        let script = &self.config.script;
        let turn = match state.step {
            DialogueStep::ContinuePrompt => self.continue_prompt(state, utterance),
            DialogueStep::InitialQuestion
            | DialogueStep::CheckSteps
            | DialogueStep::HandleQuestions => {
                let reply = self
                    .delegate
                    .handle_questions(call_id, utterance, &state.aux)
                    .await?;
                let step = reply
                    .aux
                    .get("step")
                    .and_then(Value::as_str)
                    .map(DialogueStep::from_wire)
                    .unwrap_or(state.step);
                DialogueTurn {
                    ai_text: reply.ai_text,
                    state: DialogueState {
                        step,
                        aux: reply.aux,
                        clarifications: 0,
                    },
                    resolved: reply.resolved,
                    outcome: DialogueOutcome::Delegated,
                }
            }
            DialogueStep::GetFeedback | DialogueStep::FeedbackPrompt => {
                let reply = self.delegate.get_feedback(call_id, utterance).await?;
                DialogueTurn {
                    ai_text: reply.ai_text,
                    state: DialogueState {
                        step: DialogueStep::from_wire(&reply.next_step),
                        aux: state.aux.clone(),
                        clarifications: 0,
                    },
                    resolved: None,
                    outcome: DialogueOutcome::Delegated,
                }
            }
            DialogueStep::EndCall => DialogueTurn {
                ai_text: script.farewell.clone(),
                state: DialogueState {
                    step: DialogueStep::Completed,
                    ..state.clone()
                },
                resolved: None,
                outcome: DialogueOutcome::Farewell,
            },
            DialogueStep::Completed | DialogueStep::Error => DialogueTurn {
                ai_text: script.apology.clone(),
                state: DialogueState {
                    step: DialogueStep::Error,
                    ..state.clone()
                },
                resolved: None,
                outcome: DialogueOutcome::Unrecognized,
            },
        };
        info!(
            "🧭 dialogue {} -> {} ({:?})",
            state.step, turn.state.step, turn.outcome
        );
        Ok(turn)
    }

    fn continue_prompt(&self, state: &DialogueState, utterance: &str) -> DialogueTurn {
        let script = &self.config.script;
        let intent = self.classify(utterance);
        debug!("continue_prompt classified {:?} as {:?}", utterance, intent);
        match intent {
            Intent::Affirmative => DialogueTurn {
                ai_text: format!("{} {}", script.acknowledgement, script.first_question),
                state: DialogueState {
                    step: DialogueStep::InitialQuestion,
                    aux: state.aux.clone(),
                    clarifications: 0,
                },
                resolved: None,
                outcome: DialogueOutcome::Affirmed,
            },
            Intent::Negative => DialogueTurn {
                ai_text: script.closing.clone(),
                state: DialogueState {
                    step: DialogueStep::EndCall,
                    aux: state.aux.clone(),
                    clarifications: 0,
                },
                resolved: None,
                outcome: DialogueOutcome::Declined,
            },
            Intent::Unclear => {
                let clarifications = state.clarifications + 1;
                let capped = self
                    .config
                    .max_clarifications
                    .is_some_and(|max| clarifications > max);
                if capped {
                    DialogueTurn {
                        ai_text: script.clarification_limit.clone(),
                        state: DialogueState {
                            step: DialogueStep::EndCall,
                            aux: state.aux.clone(),
                            clarifications,
                        },
                        resolved: None,
                        outcome: DialogueOutcome::GaveUp,
                    }
                } else {
                    DialogueTurn {
                        ai_text: script.clarification.clone(),
                        state: DialogueState {
                            step: DialogueStep::ContinuePrompt,
                            aux: state.aux.clone(),
                            clarifications,
                        },
                        resolved: None,
                        outcome: DialogueOutcome::Ambiguous,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records calls and answers with canned replies.
    #[derive(Default)]
    struct ScriptedDelegate {
        questions: Mutex<Vec<(String, Value)>>,
        aux_reply: Value,
        resolved: Option<bool>,
        feedback_step: String,
    }

    #[async_trait]
    impl DialogueDelegate for ScriptedDelegate {
        async fn handle_questions(
            &self,
            _call_id: &str,
            user_text: &str,
            aux: &Value,
        ) -> Result<QuestionsReply, TransportError> {
            self.questions
                .lock()
                .unwrap()
                .push((user_text.to_string(), aux.clone()));
            Ok(QuestionsReply {
                ai_text: "delegated answer".to_string(),
                aux: self.aux_reply.clone(),
                resolved: self.resolved,
            })
        }

        async fn get_feedback(
            &self,
            _call_id: &str,
            _user_text: &str,
        ) -> Result<FeedbackReply, TransportError> {
            Ok(FeedbackReply {
                ai_text: "thanks for the feedback".to_string(),
                next_step: self.feedback_step.clone(),
            })
        }
    }

    fn engine(delegate: ScriptedDelegate) -> DialogueEngine {
        DialogueEngine::new(DialogueConfig::default(), Box::new(delegate))
    }

    #[test]
    fn normalize_unifies_alef_and_strips_marks() {
        assert_eq!(normalize("أكيد"), "اكيد");
        assert_eq!(normalize("  نَعَم "), "نعم");
        assert_eq!(normalize("تمـــام"), "تمام");
        assert_eq!(normalize("YES"), "yes");
    }

    #[test]
    fn affirmative_wins_over_negative() {
        let engine = engine(ScriptedDelegate::default());
        assert_eq!(engine.classify("لا لا، تمام خلاص"), Intent::Affirmative);
        assert_eq!(engine.classify("لا شكرا"), Intent::Negative);
        assert_eq!(engine.classify("بكرة"), Intent::Unclear);
    }

    #[tokio::test]
    async fn affirmative_jumps_to_initial_question() {
        let engine = engine(ScriptedDelegate::default());
        let turn = engine
            .next("CA1", &DialogueState::default(), "ايوه")
            .await
            .unwrap();
        assert_eq!(turn.state.step, DialogueStep::InitialQuestion);
        assert_eq!(turn.outcome, DialogueOutcome::Affirmed);
        assert!(turn.ai_text.contains(&engine.script().first_question));
    }

    #[tokio::test]
    async fn negative_moves_to_end_call_without_verdict() {
        let engine = engine(ScriptedDelegate::default());
        let turn = engine
            .next("CA1", &DialogueState::default(), "لا")
            .await
            .unwrap();
        assert_eq!(turn.state.step, DialogueStep::EndCall);
        assert_eq!(turn.resolved, None);
        assert_eq!(turn.ai_text, engine.script().closing);
    }

    #[tokio::test]
    async fn clarification_cap_gives_up() {
        let config = DialogueConfig {
            max_clarifications: Some(1),
            ..Default::default()
        };
        let engine = DialogueEngine::new(config, Box::new(ScriptedDelegate::default()));

        let first = engine
            .next("CA1", &DialogueState::default(), "بكرة")
            .await
            .unwrap();
        assert_eq!(first.state.step, DialogueStep::ContinuePrompt);
        assert_eq!(first.outcome, DialogueOutcome::Ambiguous);

        let second = engine.next("CA1", &first.state, "بكرة").await.unwrap();
        assert_eq!(second.state.step, DialogueStep::EndCall);
        assert_eq!(second.outcome, DialogueOutcome::GaveUp);
    }

    #[tokio::test]
    async fn question_delegate_owns_next_step_and_aux() {
        let delegate = ScriptedDelegate {
            aux_reply: json!({ "step": "get_feedback", "attempt": 2 }),
            resolved: Some(true),
            ..Default::default()
        };
        let engine = engine(delegate);
        let state = DialogueState {
            step: DialogueStep::CheckSteps,
            aux: json!({ "attempt": 1 }),
            clarifications: 0,
        };

        let turn = engine.next("CA1", &state, "اشتغل").await.unwrap();
        assert_eq!(turn.state.step, DialogueStep::GetFeedback);
        assert_eq!(turn.state.aux, json!({ "step": "get_feedback", "attempt": 2 }));
        assert_eq!(turn.resolved, Some(true));
        assert_eq!(turn.ai_text, "delegated answer");
    }

    #[tokio::test]
    async fn question_delegate_without_step_keeps_current() {
        let delegate = ScriptedDelegate {
            aux_reply: json!({ "notes": [] }),
            ..Default::default()
        };
        let engine = engine(delegate);
        let turn = engine
            .next("CA1", &DialogueState::at(DialogueStep::InitialQuestion), "النت فاصل")
            .await
            .unwrap();
        assert_eq!(turn.state.step, DialogueStep::InitialQuestion);
    }

    #[tokio::test]
    async fn feedback_unknown_step_becomes_error() {
        let delegate = ScriptedDelegate {
            feedback_step: "mystery".to_string(),
            ..Default::default()
        };
        let engine = engine(delegate);
        let turn = engine
            .next("CA1", &DialogueState::at(DialogueStep::FeedbackPrompt), "ممتاز")
            .await
            .unwrap();
        assert_eq!(turn.state.step, DialogueStep::Error);
    }

    #[tokio::test]
    async fn end_call_says_farewell_then_completes() {
        let engine = engine(ScriptedDelegate::default());
        let turn = engine
            .next("CA1", &DialogueState::at(DialogueStep::EndCall), "")
            .await
            .unwrap();
        assert_eq!(turn.state.step, DialogueStep::Completed);
        assert_eq!(turn.ai_text, engine.script().farewell);

        let after = engine.next("CA1", &turn.state, "الو").await.unwrap();
        assert_eq!(after.state.step, DialogueStep::Error);
        assert_eq!(after.outcome, DialogueOutcome::Unrecognized);
    }

    #[test]
    fn step_names_round_trip_through_wire_format() {
        assert_eq!(DialogueStep::from_wire("check_steps"), DialogueStep::CheckSteps);
        assert_eq!(DialogueStep::from_wire("??"), DialogueStep::Error);
        assert_eq!(
            serde_json::to_value(DialogueStep::FeedbackPrompt).unwrap(),
            json!("feedback_prompt")
        );
    }
}
