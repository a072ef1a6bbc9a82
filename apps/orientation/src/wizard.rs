//! Line-oriented driver for [`OrientationWorkflow`].
//!
//! Every prompt also accepts `:back` (return to the first step keeping the
//! series and transcript), `:reset` (start over) and `:quit`.

use std::{
    future::Future,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::{
    BusyIndicator, OrientationApi, OrientationWorkflow, TranscriptImage, WorkflowError,
    WorkflowStep,
};
use shared::domain::{QuestionId, SerieBac};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::render;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(750);

/// Values given on the command line for the first step.
#[derive(Debug, Clone)]
pub struct Preset {
    pub serie: String,
    pub transcript: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Text(String),
    Back,
    Reset,
    Quit,
}

impl Input {
    fn parse(line: &str) -> Self {
        match line.trim() {
            ":back" => Input::Back,
            ":reset" => Input::Reset,
            ":quit" | ":q" => Input::Quit,
            _ => Input::Text(line.to_string()),
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

pub struct Wizard<R, W> {
    input: R,
    output: W,
}

impl<R, W> Wizard<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs until the user quits, input ends, or results are dismissed.
    pub async fn run<A: OrientationApi>(
        &mut self,
        workflow: &mut OrientationWorkflow<A>,
        mut preset: Option<Preset>,
    ) -> anyhow::Result<()> {
        loop {
            let flow = match workflow.step() {
                WorkflowStep::CollectingInitial => {
                    self.collect_initial(workflow, preset.take()).await?
                }
                WorkflowStep::AwaitingAnswers => self.collect_answers(workflow).await?,
                WorkflowStep::ShowingResults => self.show_results(workflow).await?,
            };
            if let Flow::Quit = flow {
                return Ok(());
            }
        }
    }

    async fn read_input(&mut self, prompt: &str) -> anyhow::Result<Input> {
        write!(self.output, "{prompt} ")?;
        self.output.flush()?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .await
            .context("failed to read from standard input")?;
        if read == 0 {
            writeln!(self.output)?;
            return Ok(Input::Quit);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        Ok(Input::parse(line))
    }

    fn report(&mut self, err: &WorkflowError) -> anyhow::Result<()> {
        writeln!(self.output, "Error: {}", err.user_message())?;
        Ok(())
    }

    /// Polls `future` to completion, printing a dot on every tick while the
    /// workflow reports a request in flight.
    async fn with_progress<F, T>(&mut self, busy: BusyIndicator, future: F) -> anyhow::Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::pin!(future);
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.tick().await;
        let mut ticked = false;

        let output = loop {
            tokio::select! {
                output = &mut future => break output,
                _ = ticker.tick() => {
                    if busy.is_busy() {
                        write!(self.output, ".")?;
                        self.output.flush()?;
                        ticked = true;
                    }
                }
            }
        };
        if ticked {
            writeln!(self.output)?;
        }
        Ok(output)
    }

    async fn collect_initial<A: OrientationApi>(
        &mut self,
        workflow: &mut OrientationWorkflow<A>,
        preset: Option<Preset>,
    ) -> anyhow::Result<Flow> {
        if let Some(preset) = preset {
            return self.submit_from_path(workflow, &preset.serie, &preset.transcript).await;
        }

        if let Some(kept) = workflow.initial_input() {
            let prompt = format!(
                "Press Enter to send series {} with '{}' again, or type a new series:",
                kept.serie, kept.transcript.filename
            );
            match self.read_input(&prompt).await? {
                Input::Text(text) if text.trim().is_empty() => {
                    let busy = workflow.busy_indicator();
                    writeln!(self.output, "Analysing your transcript...")?;
                    let result = self.with_progress(busy, workflow.resubmit_initial()).await?;
                    return self.after_initial(workflow, result);
                }
                Input::Text(serie) => return self.ask_transcript(workflow, &serie).await,
                Input::Reset => {
                    workflow.reset();
                    return Ok(Flow::Continue);
                }
                Input::Back => return Ok(Flow::Continue),
                Input::Quit => return Ok(Flow::Quit),
            }
        }

        let series: Vec<&str> = SerieBac::ALL.iter().map(|serie| serie.as_str()).collect();
        let prompt = format!("Baccalaureate series ({}):", series.join(", "));
        match self.read_input(&prompt).await? {
            Input::Text(serie) => self.ask_transcript(workflow, &serie).await,
            Input::Back | Input::Reset => Ok(Flow::Continue),
            Input::Quit => Ok(Flow::Quit),
        }
    }

    async fn ask_transcript<A: OrientationApi>(
        &mut self,
        workflow: &mut OrientationWorkflow<A>,
        serie: &str,
    ) -> anyhow::Result<Flow> {
        match self.read_input("Path to your transcript image:").await? {
            Input::Text(path) => {
                self.submit_from_path(workflow, serie, Path::new(path.trim()))
                    .await
            }
            Input::Back => Ok(Flow::Continue),
            Input::Reset => {
                workflow.reset();
                Ok(Flow::Continue)
            }
            Input::Quit => Ok(Flow::Quit),
        }
    }

    async fn submit_from_path<A: OrientationApi>(
        &mut self,
        workflow: &mut OrientationWorkflow<A>,
        serie: &str,
        path: &Path,
    ) -> anyhow::Result<Flow> {
        let transcript = match TranscriptImage::from_path(path).await {
            Ok(transcript) => transcript,
            Err(err) => {
                writeln!(self.output, "Error: {err}")?;
                return Ok(Flow::Continue);
            }
        };
        debug!(path = %path.display(), size = transcript.size(), "transcript loaded");

        let busy = workflow.busy_indicator();
        writeln!(self.output, "Analysing your transcript...")?;
        let result = self
            .with_progress(busy, workflow.submit_initial(serie, transcript))
            .await?;
        self.after_initial(workflow, result)
    }

    fn after_initial<A: OrientationApi>(
        &mut self,
        workflow: &OrientationWorkflow<A>,
        result: Result<(), WorkflowError>,
    ) -> anyhow::Result<Flow> {
        match result {
            Ok(()) => {
                if let Some(analysis) = workflow.initial_analysis() {
                    writeln!(self.output, "\n{analysis}\n")?;
                }
                writeln!(
                    self.output,
                    "Please answer the following {} question(s).",
                    workflow.questions().len()
                )?;
            }
            Err(err) => self.report(&err)?,
        }
        Ok(Flow::Continue)
    }

    async fn collect_answers<A: OrientationApi>(
        &mut self,
        workflow: &mut OrientationWorkflow<A>,
    ) -> anyhow::Result<Flow> {
        let all_answered = workflow.answers().iter().all(|answer| !answer.is_blank());
        let resend = if all_answered && !workflow.questions().is_empty() {
            match self
                .read_input("Press Enter to send your answers again, or type :edit to change them:")
                .await?
            {
                Input::Text(text) => text.trim() != ":edit",
                Input::Back => return self.go_back(workflow),
                Input::Reset => {
                    workflow.reset();
                    return Ok(Flow::Continue);
                }
                Input::Quit => return Ok(Flow::Quit),
            }
        } else {
            all_answered
        };

        let mut collected: Vec<(QuestionId, String)> = Vec::new();
        if !resend {
            let questions = workflow.questions().to_vec();
            let total = questions.len();
            for (index, question) in questions.iter().enumerate() {
                let previous = workflow
                    .answers()
                    .iter()
                    .find(|answer| answer.question_id == question.id)
                    .filter(|answer| !answer.is_blank())
                    .map(|answer| answer.response.clone());
                writeln!(self.output, "\n[{}/{total}] {}", index + 1, question.prompt)?;
                if let Some(previous) = &previous {
                    writeln!(self.output, "(Enter keeps: {previous})")?;
                }

                loop {
                    match self.read_input(">").await? {
                        Input::Text(text) if !text.trim().is_empty() => {
                            collected.push((question.id, text));
                            break;
                        }
                        Input::Text(_) => match &previous {
                            Some(previous) => {
                                collected.push((question.id, previous.clone()));
                                break;
                            }
                            None => writeln!(self.output, "An answer is required.")?,
                        },
                        Input::Back => return self.go_back(workflow),
                        Input::Reset => {
                            workflow.reset();
                            return Ok(Flow::Continue);
                        }
                        Input::Quit => return Ok(Flow::Quit),
                    }
                }
            }
        }

        let busy = workflow.busy_indicator();
        writeln!(self.output, "Computing your recommendations...")?;
        let result = self
            .with_progress(busy, workflow.submit_answers(collected))
            .await?;
        if let Err(err) = result {
            self.report(&err)?;
        }
        Ok(Flow::Continue)
    }

    fn go_back<A: OrientationApi>(
        &mut self,
        workflow: &mut OrientationWorkflow<A>,
    ) -> anyhow::Result<Flow> {
        if let Err(err) = workflow.go_back() {
            self.report(&err)?;
        }
        Ok(Flow::Continue)
    }

    async fn show_results<A: OrientationApi>(
        &mut self,
        workflow: &mut OrientationWorkflow<A>,
    ) -> anyhow::Result<Flow> {
        writeln!(self.output, "\nRecommended programmes:\n")?;
        let text = render::recommendations(workflow.recommendations(), workflow.general_advice());
        write!(self.output, "{text}")?;

        match self
            .read_input("Type :reset to start a new orientation, or press Enter to finish:")
            .await?
        {
            Input::Reset => {
                workflow.reset();
                Ok(Flow::Continue)
            }
            _ => Ok(Flow::Quit),
        }
    }
}

#[cfg(test)]
#[path = "tests/wizard_tests.rs"]
mod tests;
