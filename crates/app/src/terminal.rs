//! Plain-text rendering and the interactive exam prompt.

use std::time::Duration;

use prep_core::model::OptionKey;
use prep_core::time::{format_clock, format_elapsed};
use services::{
    ExamError, ExamResultView, ExamSessionEngine, ExamSnapshot, ExamState, QuestionStatus,
    ReviewItem, ReviewStatus, SubmitFailure, SubmitOutcome, SubmitTrigger, UserStats,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{self, MissedTickBehavior};

/// Parsed prompt input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Select(OptionKey),
    Next,
    Previous,
    GoTo(usize),
    Submit,
    Show,
    Help,
    Quit,
}

impl Input {
    /// `go` takes a 1-based question number.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let head = parts.next()?.to_ascii_lowercase();
        let input = match head.as_str() {
            "n" | "next" => Self::Next,
            "p" | "prev" => Self::Previous,
            "g" | "go" => {
                let n: usize = parts.next()?.parse().ok()?;
                Self::GoTo(n.checked_sub(1)?)
            }
            "s" | "submit" => Self::Submit,
            "t" | "show" => Self::Show,
            "h" | "help" | "?" => Self::Help,
            "q" | "quit" => Self::Quit,
            other => Self::Select(OptionKey::parse(other).ok()?),
        };
        if parts.next().is_some() {
            return None;
        }
        Some(input)
    }
}

fn print_help() {
    println!("  a-d      choose an option for the current question");
    println!("  n / p    next / previous question");
    println!("  go <n>   jump to question n");
    println!("  t        show the question again");
    println!("  submit   submit the exam");
    println!("  q        quit without submitting");
}

//
// ─── RENDERING ─────────────────────────────────────────────────────────────────
//

fn describe_failure(failure: &SubmitFailure) -> String {
    let what = match failure.trigger {
        SubmitTrigger::Timer => "Time is up, but the automatic submission failed",
        SubmitTrigger::Manual => "The last submission failed",
    };
    let next = if failure.retryable {
        "Your answers are kept; type submit to try again."
    } else {
        "Your answers are kept; fix the problem above, then type submit."
    };
    format!("{what}: {}. {next}", failure.message)
}

pub fn render_snapshot(snapshot: &ExamSnapshot) {
    let progress = &snapshot.progress;
    println!();
    println!(
        "[{}] {}  time left {}  answered {}/{}",
        snapshot.category,
        snapshot.state,
        format_clock(i64::from(snapshot.remaining_seconds)),
        progress.answered,
        progress.total,
    );
    let map: String = progress
        .statuses
        .iter()
        .map(|status| match status {
            QuestionStatus::Current => '>',
            QuestionStatus::Answered => '#',
            QuestionStatus::Unattempted => '.',
        })
        .collect();
    if !map.is_empty() {
        println!("  {map}");
    }
    if let Some(failure) = &snapshot.submit_failure {
        println!("  {}", describe_failure(failure));
    }

    let Some(question) = &snapshot.current_question else {
        println!("  No questions available for this exam.");
        return;
    };
    let chosen = snapshot.answers.get(question.id());
    println!();
    println!(
        "Question {} of {}",
        snapshot.current_index + 1,
        snapshot.question_count()
    );
    println!("{}", question.text());
    for key in OptionKey::ALL {
        let mark = if chosen == Some(key) { '*' } else { ' ' };
        println!(" {mark} {key}) {}", question.option(key));
    }
}

pub fn render_result(view: &ExamResultView) {
    println!();
    println!("Session   {}", view.session_id);
    println!("Exam      {}", view.category);
    println!(
        "Score     {}/{} ({}%)",
        view.score, view.total_questions, view.percentage
    );
    println!(
        "Answered  {} (unanswered {})",
        view.answered, view.unanswered
    );
    println!(
        "Time      {} of {}",
        format_elapsed(view.time_taken_seconds),
        format_elapsed(view.time_given_seconds)
    );
    println!("Submitted {}", view.submitted_at.to_rfc3339());
}

pub fn render_review(items: &[ReviewItem]) {
    for (idx, item) in items.iter().enumerate() {
        let status = match item.status {
            ReviewStatus::Correct => "correct",
            ReviewStatus::Incorrect => "incorrect",
            ReviewStatus::Unanswered => "unanswered",
        };
        println!();
        println!("{}. {} [{status}]", idx + 1, item.text);
        for key in OptionKey::ALL {
            let mut marks = String::new();
            if item.user_choice.key() == Some(key) {
                marks.push_str(" <- your answer");
            }
            if item.correct_key == key {
                marks.push_str(" <- correct");
            }
            println!("   {key}) {}{marks}", item.options[key.index()]);
        }
        if let Some(explanation) = &item.explanation {
            println!("   {explanation}");
        }
    }
}

pub fn render_stats(stats: &UserStats) {
    println!("Sessions  {}", stats.sessions);
    println!("Answered  {}", stats.total_answered);
    println!("Correct   {}", stats.total_correct);
    println!("Accuracy  {}%", stats.accuracy);
    println!("Streak    {} day(s)", stats.study_streak);
    println!("Today     {} answered", stats.today_count);
}

//
// ─── INTERACTIVE LOOP ──────────────────────────────────────────────────────────
//

/// Drive a loaded engine from stdin until the exam is submitted or abandoned.
///
/// Returns the submitted snapshot, or `None` if the user quit.
///
/// # Errors
///
/// Returns I/O errors from stdin.
pub async fn run_exam(engine: &ExamSessionEngine) -> std::io::Result<Option<ExamSnapshot>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut watch = time::interval(Duration::from_millis(250));
    watch.set_missed_tick_behavior(MissedTickBehavior::Skip);

    render_snapshot(&engine.snapshot());
    print_help();
    let mut announced: Option<SubmitFailure> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(None);
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Some(input) = Input::parse(&line) else {
                    println!("  unrecognized input, type h for help");
                    continue;
                };
                if let Some(done) = apply(engine, input).await {
                    return Ok(done);
                }
            }
            _ = watch.tick() => {
                let snapshot = engine.snapshot();
                if snapshot.is_submitted() {
                    println!();
                    println!("Time is up. The exam was submitted automatically.");
                    return Ok(Some(snapshot));
                }
                if snapshot.submit_failure != announced {
                    // Manual failures are reported by `apply` as they happen.
                    if let Some(failure) = snapshot
                        .submit_failure
                        .as_ref()
                        .filter(|f| f.trigger == SubmitTrigger::Timer)
                    {
                        println!();
                        println!("{}", describe_failure(failure));
                    }
                    announced = snapshot.submit_failure;
                }
            }
        }
    }
}

/// Apply one input. `Some` ends the loop.
async fn apply(engine: &ExamSessionEngine, input: Input) -> Option<Option<ExamSnapshot>> {
    let snapshot = engine.snapshot();
    match input {
        Input::Select(key) => {
            let Some(question) = &snapshot.current_question else {
                println!("  nothing to answer");
                return None;
            };
            if let Err(err) = engine.select_option(question.id(), key) {
                println!("  {err}");
            }
            render_snapshot(&engine.snapshot());
        }
        Input::Next => {
            engine.navigate(snapshot.current_index.saturating_add(1));
            render_snapshot(&engine.snapshot());
        }
        Input::Previous => {
            engine.navigate(snapshot.current_index.saturating_sub(1));
            render_snapshot(&engine.snapshot());
        }
        Input::GoTo(index) => {
            engine.navigate(index);
            render_snapshot(&engine.snapshot());
        }
        Input::Show => render_snapshot(&snapshot),
        Input::Help => print_help(),
        Input::Quit => return Some(None),
        Input::Submit => match engine.submit().await {
            Ok(SubmitOutcome::Submitted(_) | SubmitOutcome::AlreadySubmitted(_)) => {
                return Some(Some(engine.snapshot()));
            }
            Ok(SubmitOutcome::InFlight) => println!("  submission already in progress"),
            Err(ExamError::NotAuthenticated) => {
                println!("  not signed in; set EXAMPREP_USER_ID or pass --user, then submit again");
            }
            Err(err) if err.is_retryable() => {
                println!("  {err}");
                println!("  your answers are kept; type submit to try again");
            }
            Err(err) => println!("  {err}"),
        },
    }
    if engine.state() == ExamState::Submitted {
        return Some(Some(engine.snapshot()));
    }
    None
}
