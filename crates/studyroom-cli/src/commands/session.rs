use clap::Subcommand;
use studyroom_core::presence::PresenceDebouncer;
use studyroom_core::session::{Phase, SessionConfig, SessionHandle, SessionService};
use studyroom_core::storage::{Config, Database, SnapshotStore};
use studyroom_core::Event;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run a study session in the terminal
    Run {
        /// Study length in minutes (defaults to config)
        #[arg(long)]
        minutes: Option<u64>,
        /// Minutes of study between breaks; 0 disables breaks
        #[arg(long)]
        break_every: Option<u64>,
        /// Break length in minutes
        #[arg(long)]
        break_for: Option<u64>,
        /// Page goal for the session
        #[arg(long)]
        pages: Option<u32>,
        /// Discard any recovery snapshot and start fresh
        #[arg(long)]
        fresh: bool,
    },
    /// Show whether a recovery snapshot is pending
    Status,
    /// Discard a pending recovery snapshot
    Discard,
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::Run {
            minutes,
            break_every,
            break_for,
            pages,
            fresh,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_session(minutes, break_every, break_for, pages, fresh))
        }
        SessionAction::Status => {
            let store = SnapshotStore::open()?;
            if store.exists() {
                println!("a recovery snapshot is pending; `session run` will continue it");
            } else {
                println!("no recovery snapshot");
            }
            Ok(())
        }
        SessionAction::Discard => {
            let store = SnapshotStore::open()?;
            store.clear()?;
            println!("recovery snapshot discarded");
            Ok(())
        }
    }
}

async fn run_session(
    minutes: Option<u64>,
    break_every: Option<u64>,
    break_for: Option<u64>,
    pages: Option<u32>,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let app_config = Config::load()?;
    let defaults = app_config.session_config();
    let config = SessionConfig::new(
        minutes.map_or(defaults.study_seconds, |m| m * 60),
        break_every.map_or(defaults.break_interval_seconds, |m| m * 60),
        break_for.map_or(defaults.break_duration_seconds, |m| m * 60),
    )
    .with_page_goal(pages.unwrap_or(defaults.page_goal));

    let store = SnapshotStore::open()?;
    if fresh {
        store.clear()?;
    }

    // A pending snapshot is consumed here, at most once; if it turns out
    // malformed it is discarded and a fresh session starts instead.
    let (service, handle) = match store.load() {
        Some(snapshot) => {
            println!(
                "recovering previous session: {} of {} minutes studied",
                snapshot.elapsed_seconds / 60,
                snapshot.study_seconds / 60
            );
            SessionService::restore(&snapshot)
        }
        None => SessionService::new(config)?,
    };

    let service = service
        .with_store(SnapshotStore::open()?)
        .with_database(Database::open()?)
        .with_grace_period(app_config.grace_period())
        .with_debouncer(PresenceDebouncer::with_confidence_floor(
            app_config.presence.confidence_floor,
        ));
    if !app_config.presence.enabled {
        handle.report_presence_unavailable();
    }

    let mut events = handle.subscribe_events();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => render_event(&event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let session = tokio::spawn(service.run());

    println!("commands: pause | resume | exit | page <n> | fs on|off | present | absent");
    handle.load_material();

    let mut state_rx = handle.subscribe_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => apply_command(&handle, line.trim()),
                    None => {
                        handle.request_exit();
                        break;
                    }
                }
            }
            _ = state_rx.wait_for(|s| s.phase == Phase::Ended) => break,
        }
    }

    session.await?;
    printer.abort();
    Ok(())
}

fn apply_command(handle: &SessionHandle, line: &str) {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("pause") => handle.request_pause(),
        Some("resume") => handle.request_resume(),
        Some("exit") => handle.request_exit(),
        Some("page") => match parts.next().and_then(|n| n.parse().ok()) {
            Some(page) => handle.page_read(page),
            None => eprintln!("usage: page <n>"),
        },
        Some("fs") => match parts.next() {
            Some("on") => handle.report_fullscreen_changed(true),
            Some("off") => handle.report_fullscreen_changed(false),
            _ => eprintln!("usage: fs on|off"),
        },
        // Manual presence simulation for running without a detector.
        // Sent twice so a single command clears the debounce threshold.
        Some("present") => {
            handle.report_presence(true, 1.0);
            handle.report_presence(true, 1.0);
        }
        Some("absent") => {
            handle.report_presence(false, 1.0);
            handle.report_presence(false, 1.0);
        }
        None => {}
        Some(other) => eprintln!("unknown command: {other}"),
    }
}

fn render_event(event: &Event) {
    match event {
        Event::StateChanged { state, .. } => {
            let minutes = state.remaining_seconds / 60;
            let seconds = state.remaining_seconds % 60;
            println!(
                "[{:?}] {minutes}:{seconds:02} remaining, {} pages read",
                state.phase, state.pages_read
            );
        }
        other => {
            if let Ok(json) = serde_json::to_string(other) {
                println!("{json}");
            }
        }
    }
}
