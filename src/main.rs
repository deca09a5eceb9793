//! Terminal client for joining a live session and answering polls.

use std::{
    env,
    io::{self, Write as _},
    sync::Arc,
};

use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pollwave_student::{
    api::{HttpBackend, StudentBackend},
    config::ClientConfig,
    dto::SessionCode,
    session::{self, SessionHandle, SessionUpdate},
    store::{self, FileProfileStore, JoinedSession, ProfileStore},
};

/// Environment variable overriding where the local profile lives.
const PROFILE_DIR_ENV: &str = "POLLWAVE_PROFILE_DIR";
/// Default directory for the local profile files.
const DEFAULT_PROFILE_DIR: &str = ".pollwave";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::load();
    let store = FileProfileStore::new(
        env::var(PROFILE_DIR_ENV).unwrap_or_else(|_| DEFAULT_PROFILE_DIR.into()),
    );
    let profile = store::load_or_create_profile(&store).context("loading student profile")?;
    info!(student_id = %profile.id, "profile ready");

    let auth_token = match config.auth_token.clone() {
        Some(token) => Some(token),
        None => store.auth_token().context("reading stored auth token")?,
    };

    let code = read_session_code(&store).await?;
    let backend: Arc<dyn StudentBackend> = Arc::new(
        HttpBackend::new(&config.api_base_url, auth_token.as_deref())
            .context("building REST client")?,
    );

    let mut handle = session::start(&config, backend, code, profile.id)
        .await
        .context("joining session")?;

    let entry = JoinedSession::now(
        handle.info().id.clone(),
        handle.info().title.clone(),
        handle.info().course_name.clone(),
    );
    if let Err(err) = store::remember_joined_session(&store, entry) {
        warn!(error = %err, "could not update the join history");
    }

    println!("Joined \"{}\".", handle.info().title);
    println!("Type A/B/C/... to pick an option, then: submit, who, sync, quit.");

    run_repl(&handle).await?;

    handle.leave();
    handle.closed().await;
    println!("Left the session.");
    Ok(())
}

/// Pump session updates and stdin commands until the student quits.
async fn run_repl(handle: &SessionHandle) -> anyhow::Result<()> {
    let mut updates = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    if !render_update(&update) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "update feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                if !apply_input(handle, line.trim()) {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("interrupted");
                break;
            }
        }
    }
    Ok(())
}

/// Print one update. Returns `false` when the session cannot go on.
fn render_update(update: &SessionUpdate) -> bool {
    match update {
        SessionUpdate::Connection(status) => println!("[channel] {status:?}"),
        SessionUpdate::PollStarted { poll, remaining } => {
            println!();
            println!("Poll: {}", poll.question);
            for (index, option) in poll.options.iter().enumerate() {
                println!("  {}) {option}", option_letter(index));
            }
            println!("{remaining} seconds to answer.");
        }
        SessionUpdate::CountdownTick { remaining } => println!("  {remaining}s left"),
        SessionUpdate::SelectionChanged { option } => {
            println!("Selected {}.", option_letter(*option));
        }
        SessionUpdate::AnswerRecorded { record } => match &record.error {
            Some(note) => println!("Answer kept locally, but: {note}"),
            None if record.is_correct => {
                println!("Correct! Answered in {}s.", record.response_secs);
            }
            None => println!("Answer recorded. Not correct this time."),
        },
        SessionUpdate::TimeExpired => println!("Time's up!"),
        SessionUpdate::ResultsRevealed { poll } => {
            let answer = poll
                .options
                .get(poll.correct_answer)
                .map(String::as_str)
                .unwrap_or("?");
            println!("Correct answer: {}) {answer}", option_letter(poll.correct_answer));
            if let Some(justification) = &poll.justification {
                println!("Why: {justification}");
            }
        }
        SessionUpdate::PollCleared => println!("Waiting for the next poll..."),
        SessionUpdate::ParticipantsOnline { count } => println!("{count} participants online."),
        SessionUpdate::AuthExpired => {
            println!("Your sign-in expired. Please sign in again.");
            return false;
        }
    }
    true
}

/// Apply one line of input. Returns `false` on quit.
fn apply_input(handle: &SessionHandle, input: &str) -> bool {
    match input {
        "" => {}
        "quit" | "exit" | "q" => return false,
        "submit" | "s" => handle.submit_answer(),
        "who" | "w" => handle.refresh_participants(),
        // The terminal equivalent of the page coming back into view.
        "sync" => handle.visibility_regained(),
        other => match option_index(other) {
            Some(index) => handle.select_option(index),
            None => println!("Unknown command {other:?}. Use A/B/C, submit, who, sync, or quit."),
        },
    }
    true
}

/// Resolve the join code from the first argument or an interactive prompt.
async fn read_session_code(store: &FileProfileStore) -> anyhow::Result<SessionCode> {
    if let Some(raw) = env::args().nth(1) {
        return Ok(SessionCode::parse(&raw)?);
    }

    match store.joined_sessions() {
        Ok(sessions) if !sessions.is_empty() => {
            println!("Recently joined:");
            for session in sessions.iter().take(5) {
                println!("  {}  {}", session.session_id, session.title);
            }
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "could not read the join history"),
    }

    print!("Session code: ");
    io::stdout().flush().ok();
    let line = BufReader::new(tokio::io::stdin())
        .lines()
        .next_line()
        .await
        .context("reading the session code")?
        .unwrap_or_default();
    Ok(SessionCode::parse(&line)?)
}

fn option_letter(index: usize) -> char {
    char::from(b'A' + (index % 26) as u8)
}

fn option_index(input: &str) -> Option<usize> {
    let mut chars = input.chars();
    let letter = chars.next()?.to_ascii_lowercase();
    if chars.next().is_some() || !letter.is_ascii_lowercase() {
        return None;
    }
    Some((letter as u8 - b'a') as usize)
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM before tearing the session down.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
