use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use prep_core::model::syllabus::SUBJECTS;
use prep_core::model::{ExamMode, ExamPhase, ExamScore, option_from_letter, option_letter};
use prep_core::time::format_countdown;
use services::{
    ASPECT_RATIOS, AppConfig, AppServices, ChatMessage, Clock, DEFAULT_ASPECT_RATIO, ExamService,
    ExamServiceError, ExamView, GroundedAnswer, ImageSize, SavedSessionInfo,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

const DEFAULT_HISTORY_LIMIT: u32 = 10;
const PREFETCH_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidMode { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidSize { raw: String },
    InvalidAspect { raw: String },
    MissingText { command: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidMode { raw } => write!(f, "invalid --mode value: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidSize { raw } => write!(f, "invalid --size value: {raw} (1K, 2K or 4K)"),
            ArgsError::InvalidAspect { raw } => write!(
                f,
                "invalid --aspect value: {raw} ({})",
                ASPECT_RATIOS.join(", ")
            ),
            ArgsError::MissingText { command } => write!(f, "{command} requires some text"),
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
    eprintln!("  radio-prep exam     --mode <mode> [--subject <name>]");
    eprintln!("  radio-prep resume");
    eprintln!("  radio-prep discard");
    eprintln!("  radio-prep status");
    eprintln!("  radio-prep history  [--limit <n>]");
    eprintln!("  radio-prep subjects");
    eprintln!("  radio-prep ask      <question...>");
    eprintln!("  radio-prep search   <query...>");
    eprintln!("  radio-prep centers  <lat> <lng>");
    eprintln!("  radio-prep analyze  <jpeg-path> <prompt...>");
    eprintln!("  radio-prep diagram  <prompt...> [--size 1K|2K|4K] [--aspect <ratio>] [--out <path>]");
    eprintln!();
    eprintln!("Global flags:");
    eprintln!("  --db <sqlite_url>    history database (default: <data-dir>/history.sqlite3)");
    eprintln!("  --data-dir <path>    where the in-progress exam is saved");
    eprintln!();
    eprintln!("Modes: {}", ExamMode::ALL.map(ExamMode::key).join(", "));
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PREP_DATA_DIR, PREP_DB_URL, PREP_SNAPSHOT_MAX_AGE_HOURS,");
    eprintln!("  GEMINI_API_KEY, PREP_GEMINI_BASE_URL, PREP_GEMINI_MODEL, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Exam,
    Resume,
    Discard,
    Status,
    History,
    Subjects,
    Ask,
    Search,
    Centers,
    Analyze,
    Diagram,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "exam" => Some(Self::Exam),
            "resume" => Some(Self::Resume),
            "discard" => Some(Self::Discard),
            "status" => Some(Self::Status),
            "history" => Some(Self::History),
            "subjects" => Some(Self::Subjects),
            "ask" => Some(Self::Ask),
            "search" => Some(Self::Search),
            "centers" => Some(Self::Centers),
            "analyze" => Some(Self::Analyze),
            "diagram" => Some(Self::Diagram),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    command: Command,
    db_url: Option<String>,
    data_dir: Option<PathBuf>,
    mode: Option<ExamMode>,
    subject: Option<String>,
    limit: u32,
    size: ImageSize,
    aspect: String,
    out: Option<PathBuf>,
    words: Vec<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let command = match args.next() {
            None => Command::Status,
            Some(first) if matches!(first.as_str(), "--help" | "-h" | "help") => return Ok(None),
            Some(first) => {
                Command::from_arg(&first).ok_or(ArgsError::UnknownCommand(first))?
            }
        };

        let mut parsed = Self {
            command,
            db_url: None,
            data_dir: None,
            mode: None,
            subject: None,
            limit: DEFAULT_HISTORY_LIMIT,
            size: ImageSize::default(),
            aspect: DEFAULT_ASPECT_RATIO.to_string(),
            out: None,
            words: Vec::new(),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(normalize_sqlite_url(value));
                }
                "--data-dir" => {
                    parsed.data_dir = Some(PathBuf::from(require_value(&mut args, "--data-dir")?));
                }
                "--mode" => {
                    let value = require_value(&mut args, "--mode")?;
                    let mode = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidMode { raw: value.clone() })?;
                    parsed.mode = Some(mode);
                }
                "--subject" => parsed.subject = Some(require_value(&mut args, "--subject")?),
                "--limit" => {
                    let value = require_value(&mut args, "--limit")?;
                    parsed.limit = value.parse().map_err(|_| ArgsError::InvalidNumber {
                        flag: "--limit",
                        raw: value.clone(),
                    })?;
                }
                "--size" => {
                    let value = require_value(&mut args, "--size")?;
                    parsed.size = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSize { raw: value.clone() })?;
                }
                "--aspect" => {
                    let value = require_value(&mut args, "--aspect")?;
                    if !ASPECT_RATIOS.contains(&value.trim()) {
                        return Err(ArgsError::InvalidAspect { raw: value });
                    }
                    parsed.aspect = value.trim().to_string();
                }
                "--out" => parsed.out = Some(PathBuf::from(require_value(&mut args, "--out")?)),
                "--help" | "-h" => return Ok(None),
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => parsed.words.push(arg),
            }
        }

        Ok(Some(parsed))
    }

    fn text(&self, command: &'static str) -> Result<String, ArgsError> {
        let text = self.words.join(" ");
        if text.trim().is_empty() {
            return Err(ArgsError::MissingText { command });
        }
        Ok(text)
    }

    fn config(&self) -> Result<AppConfig, services::ConfigError> {
        let data_dir = self
            .data_dir
            .as_ref()
            .map(|dir| dir.display().to_string());
        let db_url = self.db_url.clone();
        AppConfig::from_lookup(|name| match name {
            "PREP_DATA_DIR" if data_dir.is_some() => data_dir.clone(),
            "PREP_DB_URL" if db_url.is_some() => db_url.clone(),
            _ => std::env::var(name).ok(),
        })
    }
}

/// Split `analyze` words into the image path and the prompt.
fn image_and_prompt(words: &[String]) -> Result<(PathBuf, String), ArgsError> {
    let Some((path, prompt)) = words.split_first() else {
        return Err(ArgsError::MissingText { command: "analyze" });
    };
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err(ArgsError::MissingText { command: "analyze" });
    }
    Ok((PathBuf::from(path), prompt))
}

fn read_image_base64(path: &Path) -> std::io::Result<String> {
    Ok(BASE64.encode(std::fs::read(path)?))
}

/// Decode the payload of a `data:<mime>;base64,<data>` URL.
fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let (header, data) = url.strip_prefix("data:")?.split_once(',')?;
    if !header.ends_with(";base64") {
        return None;
    }
    BASE64.decode(data).ok()
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
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}?mode=rwc", absolute.display())
}

fn prepare_sqlite_parent(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

//
// ─── RENDERING ─────────────────────────────────────────────────────────────────
//

fn render_view(view: &ExamView) {
    if view.phase != ExamPhase::Active {
        println!("Nenhum simulado em andamento.");
        return;
    }
    let mode = view.mode.map_or("", ExamMode::label);
    println!();
    println!(
        "[{mode}] Questão {}/{} | respondidas {} | tempo {}",
        view.current_index + 1,
        view.question_count,
        view.answered_count,
        format_countdown(view.remaining_seconds)
    );
    if view.prefetch_pending {
        println!("Carregando mais questões em segundo plano...");
    }
    if view.is_time_up {
        println!("Tempo esgotado! Use 'f' para finalizar.");
    }
    let Some(question) = &view.question else {
        println!("Nenhuma questão disponível. Use 'f' para finalizar.");
        return;
    };
    println!("({}) {}", question.subject, question.text);
    for (index, option) in question.options.iter().enumerate() {
        let letter = option_letter(index).unwrap_or('?');
        let marker = match &question.feedback {
            Some(f) if f.correct_index == index => "✔",
            Some(f) if f.selected == index => "✘",
            _ => " ",
        };
        println!("  {marker} {letter}) {option}");
    }
    if let Some(feedback) = &question.feedback {
        println!(
            "{} {}",
            if feedback.is_correct { "Correto!" } else { "Incorreto." },
            feedback.explanation
        );
    }
}

fn render_score(score: &ExamScore) {
    println!();
    println!(
        "Resultado: {}/{} corretas ({}%), {} respondidas",
        score.correct(),
        score.total(),
        score.rounded_percentage(),
        score.answered()
    );
    for subject in score.by_subject() {
        println!(
            "  {:<28} {}/{} ({:.0}%)",
            subject.subject,
            subject.correct,
            subject.total,
            subject.percentage()
        );
    }
}

fn render_saved(info: &SavedSessionInfo) {
    let subject = info
        .subject_filter
        .as_deref()
        .map(|s| format!(" - {s}"))
        .unwrap_or_default();
    println!(
        "Simulado salvo: {}{subject} | {}/{} respondidas | tempo restante {} | salvo em {}",
        info.mode.label(),
        info.answered,
        info.total,
        format_countdown(info.remaining_seconds),
        info.saved_at.format("%d/%m/%Y %H:%M")
    );
}

fn render_grounded(answer: &GroundedAnswer) {
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        for source in &answer.sources {
            println!("  - {} <{}>", source.title, source.uri);
        }
    }
}

fn print_exam_help() {
    println!("Comandos: a-d responder | n próxima | p anterior | s mostrar | f finalizar | q sair (o simulado fica salvo)");
}

//
// ─── INTERACTIVE EXAM ──────────────────────────────────────────────────────────
//

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> std::io::Result<Option<String>> {
    print!("> ");
    std::io::stdout().flush()?;
    lines.next_line().await
}

fn report(result: Result<ExamView, ExamServiceError>) {
    match result {
        Ok(view) => render_view(&view),
        Err(err) => println!("{err}"),
    }
}

async fn run_exam(exam: Arc<ExamService>, view: ExamView) -> Result<(), Box<dyn std::error::Error>> {
    let countdown = exam.spawn_countdown();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_exam_help();
    render_view(&view);

    while let Some(line) = read_line(&mut lines).await? {
        let input = line.trim().to_lowercase();
        match input.as_str() {
            "a" | "b" | "c" | "d" => {
                let choice = input.chars().next().and_then(option_from_letter);
                if let Some(choice) = choice {
                    report(exam.answer(choice));
                }
            }
            "n" => report(exam.next()),
            "p" => report(exam.previous()),
            "" | "s" => report(exam.view()),
            "f" => {
                println!("Finalizar o simulado? (s/n)");
                let confirmed = read_line(&mut lines)
                    .await?
                    .is_some_and(|answer| answer.trim().eq_ignore_ascii_case("s"));
                if confirmed {
                    let score = exam.finish().await?;
                    render_score(&score);
                    break;
                }
            }
            "q" => {
                println!("Simulado salvo. Use 'radio-prep resume' para continuar.");
                break;
            }
            "h" | "?" => print_exam_help(),
            other => println!("Comando desconhecido: {other}"),
        }
    }

    countdown.abort();
    if tokio::time::timeout(PREFETCH_GRACE, exam.wait_for_prefetch())
        .await
        .is_err()
    {
        tracing::warn!("background questions still loading; they will not be saved");
    }
    Ok(())
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = match Args::parse(std::env::args().skip(1)) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    };

    if parsed.command == Command::Subjects {
        for subject in SUBJECTS {
            println!("{:<28} {}", subject.name, subject.area.label());
        }
        println!();
        for mode in ExamMode::ALL {
            println!("{:<16} {} - {}", mode.key(), mode.label(), mode.description());
        }
        return Ok(());
    }

    let config = parsed.config()?;
    prepare_sqlite_parent(&config.db_url)?;
    let services = AppServices::from_config(&config, Clock::default_clock()).await?;
    let exam = services.exam();

    match parsed.command {
        Command::Exam => {
            let mode = parsed.mode.ok_or(ArgsError::MissingValue { flag: "--mode" })?;
            println!("Gerando questões ({})...", mode.label());
            match exam.start(mode, parsed.subject.as_deref()).await {
                Ok(view) => run_exam(exam, view).await?,
                Err(ExamServiceError::UnfinishedSession) => {
                    if let Some(info) = exam.saved_session()? {
                        render_saved(&info);
                    }
                    println!("Use 'radio-prep resume' ou 'radio-prep discard'.");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Resume => match exam.resume()? {
            Some(view) => run_exam(exam, view).await?,
            None => println!("Nenhum simulado salvo."),
        },
        Command::Discard => {
            exam.discard()?;
            println!("Simulado descartado.");
        }
        Command::Status => match exam.saved_session()? {
            Some(info) => render_saved(&info),
            None => println!("Nenhum simulado salvo."),
        },
        Command::History => {
            let history = services.history();
            let rows = history.recent(parsed.limit).await?;
            if rows.is_empty() {
                println!("Nenhum simulado concluído ainda.");
            }
            for row in &rows {
                let record = &row.record;
                println!(
                    "#{:<4} {} {:<18} {}/{} ({:.0}%)",
                    row.id,
                    record.finished_at.format("%d/%m/%Y %H:%M"),
                    record.mode.label(),
                    record.correct,
                    record.total,
                    record.percentage()
                );
            }
            let weak = history.weak_subjects().await?;
            if !weak.is_empty() {
                println!();
                println!("Pontos fracos: {}", weak.join(", "));
            }
        }
        Command::Ask => {
            let question = parsed.text("ask")?;
            let reply = services.tutor().chat(&[ChatMessage::user(question)]).await?;
            println!("{reply}");
        }
        Command::Search => {
            let query = parsed.text("search")?;
            render_grounded(&services.tutor().search_exam_info(&query).await?);
        }
        Command::Centers => {
            let [lat, lng] = parsed.words.as_slice() else {
                return Err(ArgsError::MissingText { command: "centers" }.into());
            };
            let lat: f64 = lat.parse().map_err(|_| ArgsError::InvalidNumber {
                flag: "<lat>",
                raw: lat.clone(),
            })?;
            let lng: f64 = lng.parse().map_err(|_| ArgsError::InvalidNumber {
                flag: "<lng>",
                raw: lng.clone(),
            })?;
            render_grounded(&services.tutor().find_study_centers(lat, lng).await?);
        }
        Command::Analyze => {
            let (path, prompt) = image_and_prompt(&parsed.words)?;
            let image = read_image_base64(&path)?;
            println!("{}", services.tutor().analyze_image(&image, &prompt).await?);
        }
        Command::Diagram => {
            let prompt = parsed.text("diagram")?;
            println!("Gerando diagrama ({}, {})...", parsed.size.as_str(), parsed.aspect);
            let url = services
                .tutor()
                .generate_study_image(&prompt, parsed.size, &parsed.aspect)
                .await?;
            match &parsed.out {
                Some(out) => {
                    let bytes = decode_data_url(&url).ok_or("the generated image could not be decoded")?;
                    std::fs::write(out, bytes)?;
                    println!("Imagem salva em {}", out.display());
                }
                None => println!("{url}"),
            }
        }
        Command::Subjects => {}
    }
    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so they do not interleave with the exam on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
