//! Startup sequence and the interactive dashboard loop.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::analysis::{client_from_config, AnalysisError};
use crate::auth::{spawn_token_refresh, AuthClient, AuthError, IdToken};
use crate::cli::{Cli, Command, HELP};
use crate::config::{ConfigError, MonitorConfig};
use crate::monitor::{DashboardUpdate, MonitorController};
use crate::presentation::{self, AnalysisView};
use crate::realtime::{FirebaseRest, RealtimeError, RealtimeSource};

/// Failures that end the process.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Sign-in failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Could not read commands: {0}")]
    Input(#[from] std::io::Error),
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Configure, sign in, and run the dashboard until the doctor quits.
pub async fn start(cli: Cli) -> Result<(), AppError> {
    let config = MonitorConfig::from_env()?;

    let auth = AuthClient::new(&config.firebase_api_key)?;
    let doctor = auth.sign_in(&cli.email, &cli.password).await?;
    println!("Signed in as {}", doctor.email);

    let token = IdToken::new(doctor.id_token.clone());
    let source: Arc<dyn RealtimeSource> =
        Arc::new(FirebaseRest::new(&config.database_url, token.clone())?);
    let analysis = client_from_config(&config.analysis)?;
    let refresher = spawn_token_refresh(auth, &doctor, token);

    let controller = MonitorController::new(source, analysis, config.poll_interval)
        .with_preferred_patient(cli.patient);
    let result = run_dashboard(controller, cli.analyze_on_start).await;
    refresher.abort();
    result
}

/// Drive the controller from realtime events and stdin commands.
pub async fn run_dashboard(
    mut controller: MonitorController,
    analyze_on_start: bool,
) -> Result<(), AppError> {
    controller.start();
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut analyze_pending = analyze_on_start;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = controller.next_event() => {
                let Some(event) = event else {
                    tracing::info!("Event sources closed");
                    break;
                };
                let updates = controller.handle(event);
                print_updates(&controller, &updates);

                if analyze_pending && controller.session().is_some_and(|s| s.has_data()) {
                    analyze_pending = false;
                    run_command(&mut controller, Command::Analyze);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("Input closed");
                    break;
                };
                let flow = match Command::parse(&line) {
                    Ok(Some(command)) => run_command(&mut controller, command),
                    Ok(None) => Flow::Continue,
                    Err(err) => {
                        println!("{err}");
                        Flow::Continue
                    }
                };
                if flow == Flow::Quit {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    tracing::info!("Signed out");
    Ok(())
}

fn run_command(controller: &mut MonitorController, command: Command) -> Flow {
    match command {
        Command::Select(patient_id) => match controller.select_patient(&patient_id) {
            Ok(updates) => print_updates(controller, &updates),
            Err(err) => println!("{err}"),
        },
        Command::Analyze => match controller.analyze_now() {
            Ok(update) => print_updates(controller, &[update]),
            Err(err) => println!("{}", AnalysisView::from_outcome(&Err(err)).render()),
        },
        Command::Patients => println!(
            "{}",
            presentation::render_patient_list(controller.directory(), controller.selected_patient())
        ),
        Command::Help => println!("{HELP}"),
        Command::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn print_updates(controller: &MonitorController, updates: &[DashboardUpdate]) {
    for update in updates {
        if let DashboardUpdate::AnalysisStarted { mode } = update {
            println!("{}", AnalysisView::pending(*mode).render());
            continue;
        }
        println!(
            "{}",
            presentation::render_update(update, controller.selected_patient())
        );
    }
}
