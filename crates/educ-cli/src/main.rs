//! educ: EduChain terminal client
//!
//! Session:
//!   login / logout / whoami       - sign in against the REST backend
//!   config show                   - display current configuration
//!
//! Student:
//!   assignments                   - list assignments with their submission state
//!   submit <id>                   - encrypt an answer and submit it once
//!   submissions                   - submission history with grades
//!
//! Professor:
//!   courses                       - courses an assignment can be attached to
//!   assignment create             - new key pair, private key handoff, upload
//!   pending                       - ungraded submissions
//!   decrypt <id> / grade <id>     - decrypt with the pasted private key, grade once
//!
//! Offline:
//!   keygen / hash-identity

use std::io::{BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use zeroize::Zeroizing;

use educ_backend::{build_from_core_config, AuthService, Backend, SubmissionRepository};
use educ_core::config::{expand_tilde, EducConfig, DEFAULT_CONFIG_PATH};
use educ_core::types::{timestamp, LoginRequest};
use educ_core::{Role, Session};
use educ_crypto::{canonicalize_email, hash_identity, PrivateKeyEnvelope, SealMode};
use educ_secrets::{find_private_key, handoff_for, read_pasted_key, SessionStore};
use educ_workflow::{
    block_on_detached, create_assignment, generate_and_handoff, list_assignments, AssignmentDraft, FlowError, FlowSettings,
    GradingSession, SubmissionFlow, SubmissionState, TrailerCheck,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "educ",
    version,
    about = "EduChain client",
    long_about = "educ: confidential assignment submission and grading from the terminal"
)]
struct Cli {
    /// Path to the educ configuration file
    #[arg(long, short = 'c', env = "EDUC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides log.level
    #[arg(long, env = "EDUC_LOG")]
    log: Option<String>,

    /// Log format; overrides log.format
    #[arg(long, env = "EDUC_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(long, short = 'e')]
        email: String,
        /// student or professor
        #[arg(long, short = 'r')]
        role: Role,
        /// Password (prompted when absent)
        #[arg(long, env = "EDUC_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show who is signed in
    Whoami,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    // ── Student ───────────────────────────────────────────────────────────────

    /// List your assignments and where each submission stands
    Assignments,

    /// Encrypt an answer under the assignment public key and submit it
    ///
    /// The answer is read from --answer, --answer-file, or stdin. A failed
    /// submission is never retried automatically.
    Submit {
        assignment_id: i64,
        #[arg(long, short = 'a', conflicts_with = "answer_file")]
        answer: Option<String>,
        #[arg(long, short = 'f')]
        answer_file: Option<PathBuf>,
        /// single, hybrid or auto (overrides crypto.mode)
        #[arg(long)]
        mode: Option<SealMode>,
    },

    /// Your submission history with grades and feedback
    Submissions,

    // ── Professor ─────────────────────────────────────────────────────────────

    /// List the courses you teach
    Courses,

    /// Assignment management
    Assignment {
        #[command(subcommand)]
        action: AssignmentAction,
    },

    /// List ungraded submissions to your assignments
    Pending,

    /// Decrypt a pending submission with the assignment private key
    Decrypt {
        submission_id: i64,
        /// Private key file (otherwise EDUC_PRIVATE_KEY_FILE, EDUC_PRIVATE_KEY, or paste)
        #[arg(long, short = 'k')]
        key_file: Option<PathBuf>,
    },

    /// Decrypt a pending submission, then grade it (0-20). Not reversible.
    Grade {
        submission_id: i64,
        #[arg(long, short = 'g')]
        grade: f64,
        #[arg(long, default_value = "")]
        feedback: String,
        #[arg(long, short = 'k')]
        key_file: Option<PathBuf>,
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },

    // ── Offline ───────────────────────────────────────────────────────────────

    /// Generate an assignment key pair and hand off the private key
    Keygen {
        #[arg(long, default_value = "assignment")]
        label: String,
        /// clipboard, file or stdout (overrides handoff.method)
        #[arg(long)]
        handoff: Option<String>,
    },

    /// Print the anti-plagiarism identity hash of an email
    #[command(name = "hash-identity")]
    HashIdentity { email: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Subcommand, Debug)]
enum AssignmentAction {
    /// Create an assignment with a fresh RSA-2048 key pair
    ///
    /// The private key is handed off before the public key is uploaded; if
    /// the handoff fails nothing is created.
    Create {
        #[arg(long)]
        course: i64,
        #[arg(long, short = 't')]
        title: String,
        #[arg(long, short = 'd', default_value = "")]
        description: String,
        /// Due date, RFC 3339 or "YYYY-MM-DD HH:MM:SS" (UTC)
        #[arg(long, value_parser = parse_due)]
        due: DateTime<Utc>,
        /// clipboard, file or stdout (overrides handoff.method)
        #[arg(long)]
        handoff: Option<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    block_on_detached(run(cli)).context("starting tokio runtime")?
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = expand_tilde(&cli.config);
    let config = EducConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);
    debug!(config = %config_path.display(), "educ starting");

    let store = SessionStore::new(&config.session.file);

    match cli.command {
        Commands::Login { email, role, password } => cmd_login(&config, &store, &email, role, password).await,
        Commands::Logout => cmd_logout(&store),
        Commands::Whoami => cmd_whoami(&store),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
        Commands::Assignments => cmd_assignments(&config, &store).await,
        Commands::Submit {
            assignment_id,
            answer,
            answer_file,
            mode,
        } => cmd_submit(&config, &store, assignment_id, answer, answer_file.as_deref(), mode).await,
        Commands::Submissions => cmd_submissions(&config, &store).await,
        Commands::Courses => cmd_courses(&config, &store).await,
        Commands::Assignment {
            action:
                AssignmentAction::Create {
                    course,
                    title,
                    description,
                    due,
                    handoff,
                },
        } => {
            let draft = AssignmentDraft {
                course_id: course,
                title,
                description,
                due_date: due,
            };
            cmd_assignment_create(&config, &store, &draft, handoff.as_deref()).await
        }
        Commands::Pending => cmd_pending(&config, &store).await,
        Commands::Decrypt { submission_id, key_file } => {
            cmd_decrypt(&config, &store, submission_id, key_file.as_deref()).await
        }
        Commands::Grade {
            submission_id,
            grade,
            feedback,
            key_file,
            yes,
        } => cmd_grade(&config, &store, submission_id, grade, &feedback, key_file.as_deref(), yes).await,
        Commands::Keygen { label, handoff } => cmd_keygen(&config, &label, handoff.as_deref()).await,
        Commands::HashIdentity { email } => cmd_hash_identity(&email),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output and, for stdout handoffs, the private key
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn parse_due(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    timestamp::parse(s).ok_or_else(|| {
        format!("invalid due date '{s}' (expected RFC 3339 or YYYY-MM-DD HH:MM:SS, UTC)")
    })
}

/// Render a workflow error the way the user should read it.
fn explain(err: FlowError) -> anyhow::Error {
    let message = err.user_message();
    if err.is_retryable() {
        anyhow::anyhow!("{message}\n(nothing was retried automatically; run the command again)")
    } else {
        anyhow::anyhow!(message)
    }
}

fn require_session(store: &SessionStore) -> Result<Session> {
    store
        .load()?
        .context("not signed in; run `educ login --email <email> --role <role>` first")
}

fn connect(config: &EducConfig, session: Option<&Session>) -> Result<Arc<dyn Backend>> {
    let client = build_from_core_config(&config.backend).context("building backend client")?;
    Ok(match session {
        Some(session) => Arc::new(client.with_session(session)),
        None => Arc::new(client),
    })
}

fn settings(config: &EducConfig) -> Result<FlowSettings> {
    FlowSettings::from_config(&config.crypto).map_err(explain)
}

fn handoff_config(config: &EducConfig, method: Option<&str>) -> educ_core::config::HandoffConfig {
    let mut handoff = config.handoff.clone();
    if let Some(method) = method {
        handoff.method = method.to_string();
    }
    handoff
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn fmt_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".into())
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading confirmation")?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Discovery chain, then an interactive paste.
async fn load_private_key(key_file: Option<&Path>) -> Result<PrivateKeyEnvelope> {
    if let Some(source) = find_private_key(key_file).await? {
        eprintln!("Using private key from {}", source.origin);
        return Ok(source.envelope);
    }
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("Paste the assignment private key (ends with -----END PRIVATE KEY-----):");
    }
    read_pasted_key(stdin.lock())
}

// ── Session commands ──────────────────────────────────────────────────────────

async fn cmd_login(
    config: &EducConfig,
    store: &SessionStore,
    email: &str,
    role: Role,
    password: Option<String>,
) -> Result<()> {
    let mut password = match password {
        Some(p) => Zeroizing::new(p),
        None => Zeroizing::new(
            rpassword::prompt_password(format!("Password for {email}: ")).context("reading password")?,
        ),
    };
    let backend = connect(config, None)?;
    let session = backend
        .login(&login_request(email, &mut password, role))
        .await
        .map_err(|e| explain(e.into()))?;

    store.save(&session)?;
    println!("Signed in as {} <{}> ({})", session.name, session.email, session.role);
    println!("  session: {}", store.path().display());
    Ok(())
}

/// Moves the password out of `password` so only the request holds it.
fn login_request(email: &str, password: &mut Zeroizing<String>, role: Role) -> LoginRequest {
    LoginRequest {
        email: email.trim().to_string(),
        password: std::mem::take(&mut **password),
        role,
    }
}

fn cmd_logout(store: &SessionStore) -> Result<()> {
    if store.clear()? {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

fn cmd_whoami(store: &SessionStore) -> Result<()> {
    match store.load()? {
        Some(session) => {
            println!("{} <{}>", session.name, session.email);
            println!("  role:    {}", session.role);
            println!("  user id: {}", session.user_id);
        }
        None => println!("Not signed in."),
    }
    Ok(())
}

fn cmd_config_show(config: &EducConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config")?;
    print!("{rendered}");
    Ok(())
}

// ── Student commands ──────────────────────────────────────────────────────────

async fn cmd_assignments(config: &EducConfig, store: &SessionStore) -> Result<()> {
    let session = require_session(store)?;
    let backend = connect(config, Some(&session))?;
    let rows = list_assignments(backend.as_ref(), &session, Utc::now())
        .await
        .map_err(explain)?;

    if rows.is_empty() {
        println!("No assignments.");
        return Ok(());
    }
    for row in &rows {
        let a = &row.assignment;
        println!();
        println!("#{}  {} [{}]", a.id, a.title, row.state);
        println!("  course:  {} {}", a.course_code, a.course_name);
        println!("  due:     {}", fmt_time(a.due_date));
        if let Some(grade) = &row.grade {
            println!("  grade:   {grade}/20");
        }
        if let Some(feedback) = &row.feedback {
            println!("  feedback: {feedback}");
        }
    }
    Ok(())
}

async fn read_answer(answer: Option<String>, answer_file: Option<&Path>) -> Result<Zeroizing<String>> {
    if let Some(answer) = answer {
        return Ok(Zeroizing::new(answer));
    }
    if let Some(path) = answer_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading answer: {}", path.display()))?;
        return Ok(Zeroizing::new(text));
    }
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("Type your answer, then Ctrl-D:");
    }
    let mut text = Zeroizing::new(String::new());
    stdin.read_to_string(&mut text).context("reading answer from stdin")?;
    Ok(text)
}

async fn cmd_submit(
    config: &EducConfig,
    store: &SessionStore,
    assignment_id: i64,
    answer: Option<String>,
    answer_file: Option<&Path>,
    mode: Option<SealMode>,
) -> Result<()> {
    let session = require_session(store)?;
    let mode = match mode {
        Some(mode) => mode,
        None => settings(config)?.mode,
    };
    let backend = connect(config, Some(&session))?;

    let mut flow = SubmissionFlow::open(backend, &session, assignment_id, mode, Utc::now())
        .await
        .map_err(explain)?;
    let assignment = flow.assignment();
    println!("#{}  {} ({})", assignment.id, assignment.title, assignment.course_code);
    println!("  due:     {}", fmt_time(assignment.due_date));
    if flow.state() != SubmissionState::NotSubmitted {
        anyhow::bail!("this assignment is {}; nothing to submit", flow.state());
    }

    let answer = read_answer(answer, answer_file).await?;
    let pb = make_spinner("submit");
    pb.set_message("encrypting and sending");
    let result = flow.submit(&answer, Utc::now()).await;
    pb.finish_and_clear();

    let receipt = result.map_err(explain)?;
    println!("Submitted.");
    println!("  submission: {}", receipt.submission_id);
    println!("  identity:   {}", hash_identity(&session.email));
    if let Some(message) = receipt.message {
        println!("  backend:    {message}");
    }
    Ok(())
}

async fn cmd_submissions(config: &EducConfig, store: &SessionStore) -> Result<()> {
    let session = require_session(store)?;
    session.require_role(Role::Student).map_err(|e| explain(e.into()))?;
    let backend = connect(config, Some(&session))?;
    let history = backend
        .history(&session.email)
        .await
        .map_err(|e| explain(e.into()))?;

    if history.is_empty() {
        println!("No submissions.");
        return Ok(());
    }
    for row in &history {
        println!();
        println!("#{}  {} ({})", row.id, row.assignment_title, row.course_code);
        println!("  submitted: {}", fmt_time(row.submitted_at));
        println!("  professor: {}", row.professor_name);
        match row.grade_value() {
            Some(grade) => println!("  grade:     {grade}/20"),
            None => println!("  grade:     awaiting"),
        }
        if !row.feedback.trim().is_empty() {
            println!("  feedback:  {}", row.feedback.trim());
        }
    }
    Ok(())
}

// ── Professor commands ────────────────────────────────────────────────────────

async fn cmd_courses(config: &EducConfig, store: &SessionStore) -> Result<()> {
    let session = require_session(store)?;
    let backend = connect(config, Some(&session))?;
    let courses = educ_workflow::professor::courses(backend.as_ref(), &session)
        .await
        .map_err(explain)?;

    if courses.is_empty() {
        println!("No courses.");
    }
    for course in &courses {
        println!("{:>5}  {:<10} {}", course.id, course.course_code, course.course_name);
    }
    Ok(())
}

async fn cmd_assignment_create(
    config: &EducConfig,
    store: &SessionStore,
    draft: &AssignmentDraft,
    handoff_method: Option<&str>,
) -> Result<()> {
    let session = require_session(store)?;
    let settings = settings(config)?;
    let handoff = handoff_for(&handoff_config(config, handoff_method))?;
    let backend = connect(config, Some(&session))?;

    let pb = make_spinner("create");
    pb.set_message("generating RSA-2048 key pair");
    let result = create_assignment(
        backend.as_ref(),
        &session,
        draft,
        handoff.as_ref(),
        settings.keygen_timeout,
        Utc::now(),
    )
    .await;
    pb.finish_and_clear();
    let created = result.map_err(explain)?;

    let info = &created.created.assignment;
    println!("Assignment created:");
    println!("  id:          {}", info.id);
    println!("  title:       {}", info.title);
    println!("  course:      {} {}", info.course.code, info.course.name);
    println!("  due:         {}", fmt_time(info.due_date));
    println!("  fingerprint: {}", created.key.fingerprint);
    match &created.key.handoff.path {
        Some(path) => println!("  private key: {}", path.display()),
        None => println!("  private key: {}", created.key.handoff.method),
    }
    println!();
    println!("Keep the private key: without it no submission to this assignment can be decrypted.");
    Ok(())
}

async fn cmd_pending(config: &EducConfig, store: &SessionStore) -> Result<()> {
    let session = require_session(store)?;
    let backend = connect(config, Some(&session))?;
    let grading = GradingSession::new(backend, &session).map_err(explain)?;
    let pending = grading.pending().await.map_err(explain)?;

    if pending.is_empty() {
        println!("No submissions waiting for a grade.");
        return Ok(());
    }
    for s in &pending {
        println!();
        println!("#{}  {} ({})", s.id, s.assignment_title, s.course_code);
        println!("  student:   {} <{}>", s.student_fullname, s.student_email);
        println!("  submitted: {}", fmt_time(s.submitted_at));
        println!("  identity:  {}", s.student_id_hash);
        println!("  size:      {} chars", s.encrypted_content.len());
    }
    Ok(())
}

/// Load the key and decrypt one pending submission, printing the answer.
async fn decrypt_and_show(
    grading: &mut GradingSession,
    submission_id: i64,
    key_file: Option<&Path>,
) -> Result<()> {
    let submission = grading.find(submission_id).await.map_err(explain)?;
    let envelope = load_private_key(key_file).await?;
    let fingerprint = grading.load_key(envelope).await.map_err(explain)?;
    debug!(fingerprint = %fingerprint, "private key loaded");

    let pb = make_spinner("decrypt");
    let result = grading.decrypt(&submission).await;
    pb.finish_and_clear();
    let decrypted = result.map_err(explain)?;

    println!("#{}  {} ({})", submission.id, submission.assignment_title, submission.course_code);
    println!("  student: {} <{}>", submission.student_fullname, submission.student_email);
    match decrypted.trailer() {
        TrailerCheck::Match => println!("  identity: verified"),
        TrailerCheck::Mismatch { embedded } => {
            println!("  identity: MISMATCH (answer carries {embedded})")
        }
        TrailerCheck::Missing => println!("  identity: no trailer in the answer"),
    }
    println!();
    println!("{}", decrypted.answer());
    println!();
    Ok(())
}

async fn cmd_decrypt(
    config: &EducConfig,
    store: &SessionStore,
    submission_id: i64,
    key_file: Option<&Path>,
) -> Result<()> {
    let session = require_session(store)?;
    let backend = connect(config, Some(&session))?;
    let mut grading = GradingSession::new(backend, &session).map_err(explain)?;
    decrypt_and_show(&mut grading, submission_id, key_file).await
}

async fn cmd_grade(
    config: &EducConfig,
    store: &SessionStore,
    submission_id: i64,
    grade: f64,
    feedback: &str,
    key_file: Option<&Path>,
    yes: bool,
) -> Result<()> {
    let session = require_session(store)?;
    let backend = connect(config, Some(&session))?;
    let mut grading = GradingSession::new(backend, &session).map_err(explain)?;
    decrypt_and_show(&mut grading, submission_id, key_file).await?;

    if !yes && !confirm(&format!("Grade submission {submission_id} with {grade}/20? This cannot be changed"))? {
        grading.clear();
        println!("Not graded.");
        return Ok(());
    }
    let ack = grading
        .grade(submission_id, grade, feedback)
        .await
        .map_err(explain)?;
    grading.clear();

    println!(
        "Graded: {}",
        ack.message.as_deref().unwrap_or("grade recorded")
    );
    Ok(())
}

// ── Offline commands ──────────────────────────────────────────────────────────

async fn cmd_keygen(config: &EducConfig, label: &str, handoff_method: Option<&str>) -> Result<()> {
    let settings = settings(config)?;
    let handoff = handoff_for(&handoff_config(config, handoff_method))?;

    let pb = make_spinner("keygen");
    pb.set_message("generating RSA-2048 key pair");
    let result = generate_and_handoff(label, handoff.as_ref(), settings.keygen_timeout).await;
    pb.finish_and_clear();
    let key = result.map_err(explain)?;

    eprintln!("fingerprint: {}", key.fingerprint);
    match &key.handoff.path {
        Some(path) => eprintln!("private key: {}", path.display()),
        None => eprintln!("private key: {}", key.handoff.method),
    }
    print!("{}", key.public_key);
    Ok(())
}

fn cmd_hash_identity(email: &str) -> Result<()> {
    let canonical = canonicalize_email(email);
    if canonical.is_empty() {
        anyhow::bail!("email is empty");
    }
    println!("{}", hash_identity(&canonical));
    Ok(())
}
