//! Three-step orientation wizard: collect the series and transcript, answer
//! the generated questions, show the recommended filières.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use shared::{
    domain::{QuestionId, SessionId},
    protocol::{
        AnswerPayload, Filiere, InitialSubmissionResponse, Question, SubmitAnswersRequest,
    },
};
use tracing::{info, warn};

use crate::{
    error::{ValidationError, WorkflowError},
    transcript::{InitialInput, TranscriptImage},
    OrientationApi,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowStep {
    #[default]
    CollectingInitial,
    AwaitingAnswers,
    ShowingResults,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            WorkflowStep::CollectingInitial => "collecting initial information",
            WorkflowStep::AwaitingAnswers => "awaiting answers",
            WorkflowStep::ShowingResults => "showing results",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub question_id: QuestionId,
    pub response: String,
}

impl Answer {
    pub fn is_blank(&self) -> bool {
        self.response.trim().is_empty()
    }
}

/// Backend session opened by a successful initial submission.
#[derive(Debug, Clone)]
struct ActiveSession {
    id: SessionId,
    initial_analysis: Option<String>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
}

impl ActiveSession {
    fn from_response(response: InitialSubmissionResponse) -> Self {
        let mut seen = HashSet::new();
        let answers = response
            .questions
            .iter()
            .filter(|question| seen.insert(question.id))
            .map(|question| Answer {
                question_id: question.id,
                response: String::new(),
            })
            .collect();

        Self {
            id: response.session_id,
            initial_analysis: response
                .initial_analysis
                .filter(|text| !text.trim().is_empty()),
            questions: response.questions,
            answers,
        }
    }

    fn has_question(&self, question_id: QuestionId) -> bool {
        self.answers
            .iter()
            .any(|answer| answer.question_id == question_id)
    }

    fn slot_mut(&mut self, question_id: QuestionId) -> Option<&mut Answer> {
        self.answers
            .iter_mut()
            .find(|answer| answer.question_id == question_id)
    }
}

/// Shared view of the in-flight flag, for a UI that wants to disable its
/// controls or show progress while a submission runs.
#[derive(Debug, Clone)]
pub struct BusyIndicator(Arc<AtomicBool>);

impl BusyIndicator {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Held for the duration of one request; clears the flag when dropped,
/// including when the request future itself is dropped. Requests take
/// `&mut OrientationWorkflow`, so at most one guard exists at a time.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn enter(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct OrientationWorkflow<A: OrientationApi> {
    api: A,
    step: WorkflowStep,
    initial_input: Option<InitialInput>,
    session: Option<ActiveSession>,
    recommendations: Vec<Filiere>,
    general_advice: Option<String>,
    last_error: Option<String>,
    busy: Arc<AtomicBool>,
}

impl<A: OrientationApi> OrientationWorkflow<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            step: WorkflowStep::CollectingInitial,
            initial_input: None,
            session: None,
            recommendations: Vec::new(),
            general_advice: None,
            last_error: None,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    pub fn initial_input(&self) -> Option<&InitialInput> {
        self.initial_input.as_ref()
    }

    pub fn initial_analysis(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|session| session.initial_analysis.as_deref())
    }

    pub fn questions(&self) -> &[Question] {
        self.session
            .as_ref()
            .map(|session| session.questions.as_slice())
            .unwrap_or_default()
    }

    pub fn answers(&self) -> &[Answer] {
        self.session
            .as_ref()
            .map(|session| session.answers.as_slice())
            .unwrap_or_default()
    }

    pub fn recommendations(&self) -> &[Filiere] {
        &self.recommendations
    }

    pub fn general_advice(&self) -> Option<&str> {
        self.general_advice.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn busy_indicator(&self) -> BusyIndicator {
        BusyIndicator(self.busy.clone())
    }

    fn ensure_step(&self, expected: WorkflowStep, action: &'static str) -> Result<(), WorkflowError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(WorkflowError::InvalidStep {
                action,
                step: self.step,
            })
        }
    }

    fn fail(&mut self, err: WorkflowError) -> WorkflowError {
        self.last_error = Some(err.user_message());
        err
    }

    /// Validates the series and transcript, then opens a backend session.
    /// Nothing is sent when validation fails.
    pub async fn submit_initial(
        &mut self,
        serie: &str,
        transcript: TranscriptImage,
    ) -> Result<(), WorkflowError> {
        self.ensure_step(WorkflowStep::CollectingInitial, "submit initial information")?;
        let input = match InitialInput::parse(serie, transcript) {
            Ok(input) => input,
            Err(err) => return Err(self.fail(err.into())),
        };
        self.send_initial(input).await
    }

    /// Sends the series and transcript kept from an earlier attempt again,
    /// e.g. after [`go_back`](Self::go_back) or a failed submission.
    pub async fn resubmit_initial(&mut self) -> Result<(), WorkflowError> {
        self.ensure_step(WorkflowStep::CollectingInitial, "submit initial information")?;
        let Some(input) = self.initial_input.clone() else {
            return Err(self.fail(ValidationError::MissingField("releve_note").into()));
        };
        self.send_initial(input).await
    }

    async fn send_initial(&mut self, input: InitialInput) -> Result<(), WorkflowError> {
        let _in_flight = InFlight::enter(&self.busy);
        self.last_error = None;

        let result = self
            .api
            .submit_initial(input.serie, &input.transcript)
            .await;
        self.initial_input = Some(input);

        match result {
            Ok(response) => {
                let session = ActiveSession::from_response(response);
                info!(
                    session_id = %session.id,
                    questions = session.questions.len(),
                    "orientation session opened"
                );
                self.session = Some(session);
                self.recommendations.clear();
                self.general_advice = None;
                self.step = WorkflowStep::AwaitingAnswers;
                Ok(())
            }
            Err(err) => {
                warn!(%err, "initial submission failed");
                Err(self.fail(err.into()))
            }
        }
    }

    pub fn set_answer(
        &mut self,
        question_id: QuestionId,
        response: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        self.ensure_step(WorkflowStep::AwaitingAnswers, "edit answers")?;
        let slot = self
            .session
            .as_mut()
            .and_then(|session| session.slot_mut(question_id));
        match slot {
            Some(slot) => {
                slot.response = response.into();
                Ok(())
            }
            None => Err(self.fail(ValidationError::UnknownQuestion(question_id).into())),
        }
    }

    /// Merges `answers` into the answer slots and submits them once every
    /// question has a non-blank response.
    pub async fn submit_answers<I, S>(&mut self, answers: I) -> Result<(), WorkflowError>
    where
        I: IntoIterator<Item = (QuestionId, S)>,
        S: Into<String>,
    {
        self.ensure_step(WorkflowStep::AwaitingAnswers, "submit answers")?;
        let Some(session) = self.session.as_mut() else {
            return Err(WorkflowError::InvalidStep {
                action: "submit answers",
                step: self.step,
            });
        };

        // Every id is checked before any slot is written.
        let answers: Vec<(QuestionId, String)> = answers
            .into_iter()
            .map(|(question_id, response)| (question_id, response.into()))
            .collect();
        if let Some(unknown) = answers
            .iter()
            .map(|(question_id, _)| *question_id)
            .find(|question_id| !session.has_question(*question_id))
        {
            return Err(self.fail(ValidationError::UnknownQuestion(unknown).into()));
        }
        for (question_id, response) in answers {
            if let Some(slot) = session.slot_mut(question_id) {
                slot.response = response;
            }
        }

        let unanswered: Vec<QuestionId> = session
            .answers
            .iter()
            .filter(|answer| answer.is_blank())
            .map(|answer| answer.question_id)
            .collect();
        let request = SubmitAnswersRequest {
            session_id: session.id,
            answers: session
                .answers
                .iter()
                .map(|answer| AnswerPayload {
                    question_id: answer.question_id,
                    response: answer.response.clone(),
                })
                .collect(),
        };

        if !unanswered.is_empty() {
            return Err(self.fail(ValidationError::UnansweredQuestions(unanswered).into()));
        }
        let _in_flight = InFlight::enter(&self.busy);
        self.last_error = None;

        match self.api.submit_answers(&request).await {
            Ok(response) => {
                info!(
                    session_id = %request.session_id,
                    filieres = response.filieres.len(),
                    "orientation completed"
                );
                self.recommendations = response.filieres;
                self.general_advice = response
                    .general_advice
                    .filter(|text| !text.trim().is_empty());
                self.step = WorkflowStep::ShowingResults;
                Ok(())
            }
            Err(err) => {
                warn!(%err, session_id = %request.session_id, "answer submission failed");
                Err(self.fail(err.into()))
            }
        }
    }

    /// Returns to the first step keeping the series and transcript. The
    /// backend session is abandoned; submitting again opens a new one.
    pub fn go_back(&mut self) -> Result<(), WorkflowError> {
        self.ensure_step(WorkflowStep::AwaitingAnswers, "go back")?;
        self.session = None;
        self.last_error = None;
        self.step = WorkflowStep::CollectingInitial;
        Ok(())
    }

    /// Starts over from any step, discarding everything collected so far.
    pub fn reset(&mut self) {
        self.step = WorkflowStep::CollectingInitial;
        self.initial_input = None;
        self.session = None;
        self.recommendations.clear();
        self.general_advice = None;
        self.last_error = None;
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
