use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use exam_core::model::{
    AttemptId, Choice, ExamCommand, ExamPaper, ProctoringSettings, ProctoringSettingsDraft,
};
use exam_core::proctoring::{
    AudioSource, FaceClassifier, FaceDetector, FocusDetector, FocusTransition, NoiseDetector,
    SourceError, VideoFrame, VideoSource,
};
use services::{
    Clock, DetectorSet, ExamRuntime, ExamSnapshot, HttpSubmissionEndpoint, ProctoredExam,
    RuntimeCommand, StoredSubmissionEndpoint, SubmissionEndpoint, TerminalNotice,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingExam,
    EmptyCandidate,
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingExam => write!(f, "--exam <path> (or EXAM_PAPER) is required"),
            ArgsError::EmptyCandidate => write!(f, "--candidate cannot be empty"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p app -- --exam <paper.json> [--settings <settings.json>] \
         [--candidate <id>] [--db <sqlite_url> | --submit-url <url>]"
    );
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --candidate local");
    eprintln!("  --db sqlite:exam.sqlite3 (used when --submit-url is absent)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_PAPER, EXAM_SETTINGS, EXAM_CANDIDATE, EXAM_DB_URL, EXAM_SUBMIT_URL, EXAM_LOG");
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    exam_path: PathBuf,
    settings_path: Option<PathBuf>,
    candidate: String,
    db_url: String,
    submit_url: Option<String>,
}

impl Args {
    fn parse(
        args: &mut impl Iterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut exam_path = env("EXAM_PAPER").map(PathBuf::from);
        let mut settings_path = env("EXAM_SETTINGS").map(PathBuf::from);
        let mut candidate = env("EXAM_CANDIDATE").unwrap_or_else(|| "local".into());
        let mut db_url = env("EXAM_DB_URL")
            .map_or_else(|| "sqlite://exam.sqlite3".into(), normalize_sqlite_url);
        let mut submit_url = env("EXAM_SUBMIT_URL").filter(|v| !v.trim().is_empty());

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--exam" => exam_path = Some(require_value(args, "--exam")?.into()),
                "--settings" => settings_path = Some(require_value(args, "--settings")?.into()),
                "--candidate" => candidate = require_value(args, "--candidate")?,
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--submit-url" => submit_url = Some(require_value(args, "--submit-url")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if candidate.trim().is_empty() {
            return Err(ArgsError::EmptyCandidate);
        }
        Ok(Self {
            exam_path: exam_path.ok_or(ArgsError::MissingExam)?,
            settings_path,
            candidate,
            db_url,
            submit_url,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

static INIT_TRACING: Once = Once::new();

fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env("EXAM_LOG")
            .unwrap_or_else(|_| EnvFilter::new("app=info,services=info,exam_core=info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    });
}

//
// ─── INPUTS ────────────────────────────────────────────────────────────────────
//

fn load_paper(path: &std::path::Path) -> Result<ExamPaper, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let paper: ExamPaper = serde_json::from_str(&raw)?;
    paper.validate().map_err(exam_core::Error::from)?;
    Ok(paper)
}

fn load_settings(
    path: Option<&std::path::Path>,
) -> Result<ProctoringSettings, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(ProctoringSettings::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let draft: ProctoringSettingsDraft = serde_json::from_str(&raw)?;
    Ok(draft.validate().map_err(exam_core::Error::from)?)
}

/// Camera and microphone are not reachable from a terminal; the detectors
/// report them unavailable once and stop.
struct NoCamera;

impl VideoSource for NoCamera {
    fn capture(&mut self) -> Result<VideoFrame, SourceError> {
        Err(SourceError::Unavailable("no camera in terminal mode".into()))
    }
}

struct NoClassifier;

impl FaceClassifier for NoClassifier {
    fn count_faces(&mut self, _frame: &VideoFrame) -> Result<u32, SourceError> {
        Err(SourceError::Unavailable("no face classifier configured".into()))
    }
}

struct NoMicrophone;

impl AudioSource for NoMicrophone {
    fn read(&mut self) -> Result<Vec<f32>, SourceError> {
        Err(SourceError::Unavailable("no microphone in terminal mode".into()))
    }
}

fn terminal_detectors(settings: &ProctoringSettings) -> DetectorSet {
    DetectorSet::new()
        .with_sampled(Box::new(FaceDetector::new(
            Box::new(NoCamera),
            Box::new(NoClassifier),
            settings.face_sample_interval(),
        )))
        .with_sampled(Box::new(NoiseDetector::new(
            Box::new(NoMicrophone),
            settings.noise_sample_interval(),
            settings.noise_threshold(),
            settings.noise_sustain(),
        )))
        .with_focus(FocusDetector::new())
}

//
// ─── COMMAND LINE ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Runtime(RuntimeCommand),
    Focus(FocusTransition),
    Show,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(Input::Show);
    };
    let arg = words.next();
    let index = |what: &str| -> Result<usize, String> {
        let raw = arg.ok_or_else(|| format!("{verb} needs a {what} number"))?;
        match raw.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(n - 1),
            _ => Err(format!("invalid {what} number: {raw}")),
        }
    };

    let input = match verb.to_ascii_lowercase().as_str() {
        "select" | "s" => {
            let raw = arg.ok_or("select needs a choice (A-D)")?;
            let choice: Choice = raw.parse().map_err(|e| format!("{e}"))?;
            Input::Runtime(ExamCommand::Select(choice).into())
        }
        "next" | "save" | "n" => Input::Runtime(ExamCommand::SaveAndNext.into()),
        "clear" | "c" => Input::Runtime(ExamCommand::ClearResponse.into()),
        "mark" | "m" => Input::Runtime(ExamCommand::MarkForReview.into()),
        "prev" | "p" => Input::Runtime(ExamCommand::Previous.into()),
        "jump" | "j" => Input::Runtime(ExamCommand::JumpTo(index("question")?).into()),
        "section" => Input::Runtime(ExamCommand::ChangeSection(index("section")?).into()),
        "dismiss" | "d" => Input::Runtime(RuntimeCommand::DismissWarning),
        "submit" => Input::Runtime(RuntimeCommand::Submit),
        "hide" => Input::Focus(FocusTransition::Hidden),
        "show-tab" => Input::Focus(FocusTransition::Visible),
        "blur" => Input::Focus(FocusTransition::Blurred),
        "focus" => Input::Focus(FocusTransition::Focused),
        "fullscreen-exit" => Input::Focus(FocusTransition::FullscreenExited),
        "show" | "status" => Input::Show,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(input)
}

fn print_commands() {
    println!("commands: select <A-D> | next | clear | mark | prev | jump <n> | section <n>");
    println!("          dismiss | submit | show | quit");
    println!("simulate: hide | show-tab | blur | focus | fullscreen-exit");
}

fn render(snapshot: &ExamSnapshot) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let section = snapshot
        .sections
        .get(snapshot.cursor.section)
        .map_or("", |s| s.name.as_str());
    let question = &snapshot.question;
    let _ = writeln!(
        out,
        "[{}] {} | {} | Q{} ({:?})",
        snapshot.timer_label,
        snapshot.exam_title,
        section,
        question.number,
        question.status,
    );
    let _ = writeln!(out, "{}", question.text);
    for choice in Choice::ALL {
        let marker = if question.selected == Some(choice) { '*' } else { ' ' };
        let _ = writeln!(out, " {marker} {choice}) {}", question.options[choice.index()]);
    }
    let stats = snapshot.stats;
    let _ = write!(
        out,
        "answered {} | not answered {} | marked {} | not visited {} | warnings {}",
        stats.answered,
        stats.not_answered,
        stats.marked,
        stats.not_visited,
        snapshot.live.warning_count,
    );
    if snapshot.running_low {
        out.push_str(" | time running low");
    }
    if let Some(warning) = &snapshot.warning {
        let _ = write!(
            out,
            "\n! {} ({} #{}, {} total) - type `dismiss`",
            warning.event.message, warning.event.category, warning.category_count, warning.total
        );
    }
    out
}

fn render_notice(notice: &TerminalNotice) -> String {
    match notice {
        TerminalNotice::Submitted { at } => format!("Exam submitted at {at}."),
        TerminalNotice::TimeExpired { at } => format!("Time is up. Exam submitted at {at}."),
        TerminalNotice::Terminated { at, breach } => match breach {
            Some(breach) => format!("EXAM TERMINATED at {at}: {breach}."),
            None => format!("EXAM TERMINATED at {at}."),
        },
    }
}

//
// ─── RUN ───────────────────────────────────────────────────────────────────────
//

async fn build_endpoint(
    args: &Args,
) -> Result<Arc<dyn SubmissionEndpoint>, Box<dyn std::error::Error>> {
    if let Some(url) = &args.submit_url {
        info!(%url, "submitting over http");
        return Ok(Arc::new(HttpSubmissionEndpoint::new(url)?));
    }
    prepare_sqlite_file(&args.db_url)?;
    info!(db = %args.db_url, "storing submissions locally");
    Ok(Arc::new(StoredSubmissionEndpoint::sqlite(&args.db_url).await?))
}

/// Resolves on a submitted snapshot (forced by time or violations) or once
/// the runtime stops publishing. Holds no borrow of `watcher` afterwards.
async fn until_submitted(watcher: &mut watch::Receiver<ExamSnapshot>) {
    let _ = watcher
        .wait_for(ExamSnapshot::is_submitted)
        .await
        .map(|_| ());
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv, |key| std::env::var(key).ok()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_tracing();

    let paper = load_paper(&args.exam_path)?;
    let settings = load_settings(args.settings_path.as_deref())?;
    let endpoint = build_endpoint(&args).await?;

    let clock = Clock::default();
    let exam = ProctoredExam::start(
        paper,
        &settings,
        args.candidate.clone(),
        AttemptId::generate(),
        clock.now(),
    )?;
    let handle = ExamRuntime::spawn(exam, terminal_detectors(&settings), endpoint, clock);

    print_commands();
    println!("{}", render(&handle.snapshot()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut watcher = handle.subscribe();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Ok(Input::Runtime(command)) => {
                        if handle.send(command).await.is_err() {
                            break;
                        }
                        // let the session loop apply it before rendering
                        let _ = watcher.changed().await;
                        println!("{}", render(&watcher.borrow_and_update()));
                    }
                    Ok(Input::Focus(transition)) => {
                        if handle.focus(transition).await.is_err() {
                            println!("focus monitoring has stopped");
                        }
                    }
                    Ok(Input::Show) => println!("{}", render(&handle.snapshot())),
                    Ok(Input::Help) => print_commands(),
                    Ok(Input::Quit) => break,
                    Err(message) => println!("{message}"),
                }
            }
            () = until_submitted(&mut watcher) => break,
        }
    }

    let outcome = handle.shutdown().await?;
    match &outcome.snapshot.notice {
        Some(notice) => println!("{}", render_notice(notice)),
        None => println!("Exam closed without submission."),
    }
    if let Some(Err(err)) = &outcome.delivery {
        // Retrying is left to the operator.
        eprintln!("submission delivery failed: {err}");
    }
    if let Some(submission) = &outcome.submission {
        println!(
            "score {} ({} correct, {} wrong, {} unanswered)",
            submission.score.final_marks,
            submission.score.correct,
            submission.score.wrong,
            submission.score.unanswered
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> std::vec::IntoIter<String> {
        list.iter()
            .map(|s| (*s).to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn flags_override_env() {
        let env = |key: &str| match key {
            "EXAM_PAPER" => Some("env.json".to_string()),
            "EXAM_CANDIDATE" => Some("ENV-1".to_string()),
            "EXAM_DB_URL" => Some("sqlite:///tmp/env.sqlite3".to_string()),
            _ => None,
        };
        let parsed = Args::parse(
            &mut args(&["--exam", "flag.json", "--submit-url", "https://x.test"]),
            env,
        )
        .unwrap();

        assert_eq!(parsed.exam_path, PathBuf::from("flag.json"));
        assert_eq!(parsed.candidate, "ENV-1");
        assert_eq!(parsed.db_url, "sqlite:///tmp/env.sqlite3");
        assert_eq!(parsed.submit_url.as_deref(), Some("https://x.test"));
        assert_eq!(parsed.settings_path, None);
    }

    #[test]
    fn exam_path_is_required() {
        let err = Args::parse(&mut args(&[]), |_| None).unwrap_err();
        assert!(matches!(err, ArgsError::MissingExam));

        let err = Args::parse(&mut args(&["--exam"]), |_| None).unwrap_err();
        assert!(matches!(err, ArgsError::MissingValue { flag: "--exam" }));

        let err = Args::parse(&mut args(&["--exam", "p.json", "--candidate", " "]), |_| None)
            .unwrap_err();
        assert!(matches!(err, ArgsError::EmptyCandidate));
    }

    #[test]
    fn parses_exam_commands() {
        assert_eq!(
            parse_input("select b"),
            Ok(Input::Runtime(RuntimeCommand::Exam(ExamCommand::Select(
                Choice::B
            ))))
        );
        assert_eq!(
            parse_input("jump 3"),
            Ok(Input::Runtime(RuntimeCommand::Exam(ExamCommand::JumpTo(2))))
        );
        assert_eq!(
            parse_input("section 1"),
            Ok(Input::Runtime(RuntimeCommand::Exam(
                ExamCommand::ChangeSection(0)
            )))
        );
        assert_eq!(parse_input("hide"), Ok(Input::Focus(FocusTransition::Hidden)));
        assert_eq!(parse_input("   "), Ok(Input::Show));
        assert!(parse_input("jump 0").is_err());
        assert!(parse_input("select e").is_err());
        assert!(parse_input("dance").is_err());
    }

    #[tokio::test]
    async fn forced_submission_wakes_the_input_loop() {
        let demos = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos");
        let paper = load_paper(&demos.join("sample_exam.json")).unwrap();
        let start = exam_core::time::fixed_now();
        let mut exam = ProctoredExam::start(
            paper,
            &ProctoringSettings::default(),
            "local",
            AttemptId::generate(),
            start,
        )
        .unwrap();
        let (tx, mut watcher) = watch::channel(exam.snapshot());

        exam.tick(start + chrono::Duration::seconds(900));
        tx.send_replace(exam.snapshot());
        until_submitted(&mut watcher).await;

        // The receiver is usable again, as the input branch needs it.
        assert!(watcher.borrow_and_update().is_submitted());
        drop(tx);
        assert!(watcher.changed().await.is_err());
    }

    #[test]
    fn sample_paper_loads() {
        let demos = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos");
        let paper = load_paper(&demos.join("sample_exam.json")).unwrap();
        assert_eq!(paper.total_questions(), 5);

        let settings = load_settings(Some(&demos.join("proctoring.json"))).unwrap();
        assert!((settings.noise_threshold() - 60.0).abs() < f32::EPSILON);
        assert_eq!(load_settings(None).unwrap(), ProctoringSettings::default());
    }
}
