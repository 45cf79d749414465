//! One-shot subcommands. Each makes one or two API calls and prints the outcome.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Args, Subcommand};
use dashboard::{
    api::{ApiClient, Attachment, NewGrievance},
    session::Session,
};
use models::{
    Alert, AlertDraft, Grievance, GrievanceEdit, Location, NewUser, ProfileUpdate, Registration,
    Role,
};
use tokio::io::{self, AsyncBufReadExt, BufReader};

#[derive(Debug, Args)]
pub struct GrievanceArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub category: String,
    #[arg(long, requires = "lng", allow_negative_numbers = true)]
    pub lat: Option<f64>,
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lng: Option<f64>,
    /// Photo or document to attach. Only used on submit.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl GrievanceArgs {
    fn location(&self) -> Option<Location> {
        Some(Location {
            lat: self.lat?,
            lng: self.lng?,
        })
    }
}

#[derive(Debug, Args)]
pub struct AlertArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: String,
    #[arg(long, default_value = AlertDraft::DEFAULT_CATEGORY)]
    pub category: String,
    #[arg(long, default_value = AlertDraft::DEFAULT_SEVERITY)]
    pub severity: String,
    /// Local time, e.g. 2025-03-01T09:00:00
    #[arg(long)]
    pub start: Option<NaiveDateTime>,
    #[arg(long)]
    pub end: Option<NaiveDateTime>,
}

impl From<AlertArgs> for AlertDraft {
    fn from(args: AlertArgs) -> Self {
        AlertDraft {
            category: args.category,
            severity: args.severity,
            start_time: args.start,
            end_time: args.end,
            ..AlertDraft::new(args.title, args.description)
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum AlertCommand {
    /// List alerts, newest first.
    List,
    Create(AlertArgs),
    Edit {
        id: i64,
        #[command(flatten)]
        alert: AlertArgs,
    },
    Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    List,
    /// The new account gets the server's default password.
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "VILLAGER")]
        role: Role,
    },
    Delete { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    Show,
    /// Changes sign you out.
    Update {
        #[arg(long)]
        username: Option<String>,
        #[arg(long, requires = "old_password")]
        password: Option<String>,
        #[arg(long)]
        old_password: Option<String>,
    },
    /// Check your current password without changing anything.
    Verify {
        #[arg(long)]
        password: String,
    },
}

pub async fn login(
    api: &ApiClient,
    session: &Session,
    username: &str,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt("Password: ").await?,
    };

    let identity = session
        .login(api, username, &password)
        .await
        .context("Login failed")?;
    println!("Signed in as {} ({})", identity.username, identity.role);

    Ok(())
}

pub fn logout(session: &Session) -> Result<()> {
    session.logout()?;
    println!("Signed out");

    Ok(())
}

pub async fn register(
    api: &ApiClient,
    username: String,
    email: String,
    password: String,
) -> Result<()> {
    let message = api
        .register(&Registration {
            username,
            email,
            password,
        })
        .await?;
    println!("{message}");

    Ok(())
}

pub fn whoami(session: &Session) -> Result<()> {
    match session.identity() {
        Some(identity) => println!("{} ({})", identity.username, identity.role),
        None => println!("Not signed in"),
    }

    Ok(())
}

pub async fn submit(api: &ApiClient, args: GrievanceArgs) -> Result<()> {
    let attachment = match &args.file {
        Some(path) => Some(
            Attachment::from_path(path)
                .await
                .with_context(|| format!("Cannot read {}", path.display()))?,
        ),
        None => None,
    };

    let grievance = api
        .submit_grievance(NewGrievance {
            location: args.location(),
            title: args.title,
            description: args.description,
            category: args.category,
            attachment,
        })
        .await?;

    println!("Your request has been submitted.");
    print_grievance(api, &grievance);

    Ok(())
}

pub async fn edit(api: &ApiClient, id: i64, args: GrievanceArgs) -> Result<()> {
    if args.file.is_some() {
        bail!("Attachments cannot be changed after submission");
    }

    let grievance = api
        .edit_grievance(
            id,
            &GrievanceEdit {
                latitude: args.lat,
                longitude: args.lng,
                title: args.title,
                description: args.description,
                category: args.category,
            },
        )
        .await?;

    println!("Your request has been updated.");
    print_grievance(api, &grievance);

    Ok(())
}

pub async fn alert(api: &ApiClient, command: AlertCommand) -> Result<()> {
    match command {
        AlertCommand::List => {
            let mut alerts = api.alerts().await?;
            dashboard::merge::sort_newest_first(&mut alerts);
            alerts.iter().for_each(print_alert);
        }
        AlertCommand::Create(args) => {
            let alert = api.create_alert(&args.into()).await?;
            println!("Alert has been created.");
            print_alert(&alert);
        }
        AlertCommand::Edit { id, alert } => {
            let alert = api.update_alert(id, &alert.into()).await?;
            println!("Alert has been updated.");
            print_alert(&alert);
        }
        AlertCommand::Delete { id } => {
            api.delete_alert(id).await?;
            println!("Alert {id} deleted");
        }
    }

    Ok(())
}

pub async fn users(api: &ApiClient, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::List => {
            for user in api.users().await? {
                println!(
                    "{:>4}  {:<20} {:<30} {}",
                    user.id, user.username, user.email, user.role
                );
            }
        }
        UserCommand::Create {
            username,
            email,
            role,
        } => {
            let message = api
                .create_user(&NewUser {
                    username,
                    email,
                    role,
                })
                .await?;
            println!("{message}");
        }
        UserCommand::Delete { id } => {
            api.delete_user(id).await?;
            println!("User {id} deleted");
        }
    }

    Ok(())
}

pub async fn profile(api: &ApiClient, session: &Session, command: ProfileCommand) -> Result<()> {
    match command {
        ProfileCommand::Show => {
            let profile = api.profile().await?;
            println!("{} <{}>", profile.username, profile.email);
        }
        ProfileCommand::Update {
            username,
            password,
            old_password,
        } => {
            let update = ProfileUpdate {
                username: username.filter(|name| !name.trim().is_empty()),
                password: password.filter(|password| !password.is_empty()),
                old_password,
            };

            if update.username.is_none() && update.password.is_none() {
                bail!("Nothing to update");
            }

            let message = api.update_profile(&update).await?;
            println!("{message}");

            session.logout()?;
        }
        ProfileCommand::Verify { password } => {
            api.verify_password(&password).await?;
            println!("Password verified");
        }
    }

    Ok(())
}

async fn prompt(label: &str) -> Result<String> {
    eprint!("{label}");

    let mut line = String::new();
    BufReader::new(io::stdin()).read_line(&mut line).await?;

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub fn print_grievance(api: &ApiClient, grievance: &Grievance) {
    let overdue = if grievance.is_overdue { "  OVERDUE" } else { "" };

    println!(
        "#{} [{}] {} ({}, {} priority, {}){overdue}",
        grievance.id,
        grievance.status,
        grievance.title,
        grievance.category,
        grievance.priority,
        grievance.escalation_level,
    );
    println!("     by {}: {}", grievance.submitted_by, grievance.description);

    if let Some(location) = grievance.location() {
        println!("     at {:.5}, {:.5}", location.lat, location.lng);
    }

    if let Some(file) = grievance.file_url.as_deref() {
        match api.file_url(file) {
            Ok(url) => println!("     attachment {url}"),
            Err(_) => println!("     attachment {file}"),
        }
    }
}

pub fn print_alert(alert: &Alert) {
    println!(
        "#{} [{} / {}] {}{}",
        alert.id,
        alert.severity,
        alert.category,
        alert.title,
        window(alert, Local::now().naive_local())
    );
    println!("     {}", alert.description);
}

fn window(alert: &Alert, now: NaiveDateTime) -> String {
    let span = match (alert.start_time, alert.end_time) {
        (Some(start), Some(end)) => format!(" from {start} to {end}"),
        (Some(start), None) => format!(" from {start}"),
        (None, Some(end)) => format!(" until {end}"),
        (None, None) => String::new(),
    };

    if alert.is_active(now) {
        format!("{span}  ACTIVE")
    } else {
        span
    }
}
