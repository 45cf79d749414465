//! `gramalert watch`: mounts the dashboard for the signed-in role and prints
//! what changes until Ctrl+C, SIGTERM or `quit`.
//!
//! Commands read from stdin, one per line:
//! - `status <id> <status>` (admin)
//! - `delete-alert <id>` (admin)
//! - `refresh`
//! - `quit`
use anyhow::{bail, Result};
use dashboard::{
    api::ApiClient,
    config::Config,
    controller::{
        Access, Collection, DashboardController, Level, Notification, Phase, Route, View,
    },
    realtime::RealtimeClient,
};
use models::Status;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    signal,
    sync::mpsc,
};
use tracing::warn;

use crate::commands::{print_alert, print_grievance};

pub async fn execute(config: &Config, api: ApiClient) -> Result<()> {
    let Some(identity) = api.session().identity() else {
        bail!("Not signed in. Run `gramalert login <username>` first");
    };

    let realtime = RealtimeClient::from_config(config);
    let mut controller = DashboardController::new(View::for_role(identity.role), api, realtime);

    let (notifications, mut pending) = mpsc::unbounded_channel();
    controller.observe(move |notification: &Notification| {
        let _ = notifications.send(notification.clone());
    });

    if let Access::Redirect(route) = controller.mount().await {
        bail!("Not allowed here, go to {route:?}");
    }
    render(&controller, &mut pending);
    println!("Watching. Commands: status <id> <status>, delete-alert <id>, refresh, quit");

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = controller.next_event() => match event {
                Some(event) => controller.apply(event),
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !run_command(&mut controller, line.trim()).await {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Stopped reading commands: {e}");
                    stdin_open = false;
                }
            },
        }

        render(&controller, &mut pending);
    }

    controller.unmount();
    println!("Stopped watching");

    Ok(())
}

/// Returns false on `quit`.
async fn run_command(controller: &mut DashboardController, line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();

    match words.as_slice() {
        [] => {}
        ["quit"] | ["exit"] => return false,
        ["refresh"] => controller.refresh().await,
        ["status", id, status @ ..] => {
            let status = status.join(" ");
            match (id.parse::<i64>(), status.parse::<Status>()) {
                (Ok(id), Ok(status)) => {
                    if let Err(e) = controller.change_status(id, status).await {
                        warn!("Status change failed: {e}");
                    }
                }
                (Err(_), _) => println!("Not a grievance id: {id}"),
                (_, Err(e)) => println!("{e}"),
            }
        }
        ["delete-alert", id] => match id.parse::<i64>() {
            Ok(id) => {
                if let Err(e) = controller.delete_alert(id).await {
                    warn!("Alert deletion failed: {e}");
                }
            }
            Err(_) => println!("Not an alert id: {id}"),
        },
        _ => println!("Unknown command: {line}"),
    }

    true
}

fn render(controller: &DashboardController, pending: &mut mpsc::UnboundedReceiver<Notification>) {
    let dashboard = controller.dashboard();
    let api = controller.api();

    while let Ok(notification) = pending.try_recv() {
        match notification {
            Notification::Phase(Phase::Loading) => println!("Loading..."),
            Notification::Phase(Phase::Ready) => println!("Up to date"),
            Notification::Phase(Phase::Error(message)) => {
                println!("Could not load the dashboard: {message}. Type `refresh` to retry.")
            }
            Notification::Phase(Phase::Uninitialized) => {}
            Notification::Collection(Collection::Grievances) => {
                println!("== All grievances ({}) ==", dashboard.grievances().len());
                for grievance in dashboard.grievances() {
                    print_grievance(api, grievance);
                }
            }
            Notification::Collection(Collection::MyRequests) => {
                println!("== My requests ({}) ==", dashboard.my_requests().len());
                for grievance in dashboard.my_requests() {
                    print_grievance(api, grievance);
                }
            }
            Notification::Collection(Collection::Alerts) => {
                println!("== Alerts ({}) ==", dashboard.alerts().len());
                dashboard.alerts().iter().for_each(print_alert);
            }
            Notification::Toast(toast) => {
                let marker = match toast.level {
                    Level::Info => "*",
                    Level::Error => "!",
                };
                println!("{marker} {}: {}", toast.title, toast.description);
            }
            Notification::Redirect(Route::Login) => println!("Signed out, please log in again"),
            Notification::Redirect(route) => println!("Moved to {route:?}"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
