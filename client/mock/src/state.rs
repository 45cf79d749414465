use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{Duration, Local, NaiveDateTime};
use models::{
    topics::GRIEVANCES, Alert, AlertDraft, Credentials, EscalationLevel, Grievance,
    GrievanceEdit, LoginResponse, NewUser, Priority, Profile, ProfileUpdate, Registration, Role,
    Status, User,
};
use tracing::{info, warn};

use crate::{
    broker::Broker,
    error::{AppError, Result},
};

pub const DEFAULT_PASSWORD: &str = "password";
const PRIMARY_ADMIN: i64 = 1;

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Days until an unresolved grievance counts as overdue.
pub fn deadline_days(category: &str) -> i64 {
    match category.to_lowercase().as_str() {
        "water" | "electricity" => 2,
        "health" => 3,
        "roads" | "sanitation" => 7,
        _ => 10,
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl Account {
    fn user(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Multipart fields of a new grievance.
#[derive(Debug, Default)]
pub struct Submission {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub file_name: Option<String>,
}

struct Tracked {
    grievance: Grievance,
    owner: i64,
    deadline: NaiveDateTime,
}

#[derive(Default)]
pub struct Store {
    accounts: BTreeMap<i64, Account>,
    tokens: HashMap<String, i64>,
    grievances: BTreeMap<i64, Tracked>,
    alerts: BTreeMap<i64, Alert>,
    next_account: i64,
    next_grievance: i64,
    next_alert: i64,
    issued: u64,
}

impl Store {
    pub fn seeded() -> Self {
        let mut store = Self::default();
        store.add_account("admin", "admin@gramalert.com", DEFAULT_PASSWORD, Role::Admin);
        store.add_account(
            "villager",
            "villager@gramalert.com",
            DEFAULT_PASSWORD,
            Role::Villager,
        );

        store
    }

    fn add_account(&mut self, username: &str, email: &str, password: &str, role: Role) -> i64 {
        self.next_account += 1;
        let id = self.next_account;

        self.accounts.insert(
            id,
            Account {
                id,
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                role,
            },
        );

        id
    }

    fn username_taken(&self, username: &str) -> bool {
        self.accounts.values().any(|a| a.username == username)
    }

    fn account(&self, id: i64) -> Result<&Account> {
        self.accounts
            .get(&id)
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    pub fn login(&mut self, credentials: &Credentials) -> Result<LoginResponse> {
        let account = self
            .accounts
            .values()
            .find(|a| a.username == credentials.username && a.password == credentials.password)
            .ok_or(AppError::BadCredentials)?;

        let (id, role, username) = (account.id, account.role, account.username.clone());

        self.issued += 1;
        let token = format!("mock-{id}-{}", self.issued);
        self.tokens.insert(token.clone(), id);

        info!("Issued token for {username}");

        Ok(LoginResponse {
            token,
            role,
            username,
        })
    }

    pub fn authenticate(&self, token: &str) -> Option<&Account> {
        self.tokens
            .get(token)
            .and_then(|id| self.accounts.get(id))
    }

    pub fn register(&mut self, registration: &Registration) -> Result<String> {
        if self.username_taken(&registration.username) {
            return Err(AppError::Rejected("Username already exists".to_string()));
        }

        self.add_account(
            &registration.username,
            &registration.email,
            &registration.password,
            Role::Villager,
        );

        Ok(format!(
            "User registered successfully with username: {}",
            registration.username
        ))
    }

    pub fn grievances(&self) -> Vec<Grievance> {
        self.grievances
            .values()
            .map(|t| t.grievance.clone())
            .collect()
    }

    pub fn grievances_of(&self, owner: i64) -> Vec<Grievance> {
        self.grievances
            .values()
            .filter(|t| t.owner == owner)
            .map(|t| t.grievance.clone())
            .collect()
    }

    pub fn submit(
        &mut self,
        owner: &Account,
        submission: Submission,
        at: NaiveDateTime,
    ) -> Result<Grievance> {
        let required = |field: Option<String>, name: &str| {
            field
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::Rejected(format!("Missing field: {name}")))
        };

        let title = required(submission.title, "title")?;
        let description = required(submission.description, "description")?;
        let category = required(submission.category, "category")?;

        self.next_grievance += 1;
        let id = self.next_grievance;

        let grievance = Grievance {
            id,
            title,
            description,
            status: Status::Received,
            priority: Priority::Medium,
            created_at: Some(at),
            submitted_by: owner.username.clone(),
            latitude: submission.latitude,
            longitude: submission.longitude,
            file_url: submission
                .file_name
                .map(|name| format!("/uploads/{id}-{name}")),
            is_overdue: false,
            report_count: 0,
            escalation_level: EscalationLevel::GRAM_PANCHAYAT,
            category,
        };

        let deadline = at + Duration::days(deadline_days(&grievance.category));
        self.grievances.insert(
            id,
            Tracked {
                grievance: grievance.clone(),
                owner: owner.id,
                deadline,
            },
        );

        Ok(grievance)
    }

    pub fn edit(&mut self, id: i64, caller: &Account, edit: &GrievanceEdit) -> Result<Grievance> {
        let tracked = self
            .grievances
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Grievance".to_string()))?;

        if tracked.owner != caller.id {
            warn!("{} tried to edit grievance {id}", caller.username);
            return Err(AppError::Forbidden);
        }

        let grievance = &mut tracked.grievance;
        grievance.title.clone_from(&edit.title);
        grievance.description.clone_from(&edit.description);
        grievance.category.clone_from(&edit.category);
        if edit.latitude.is_some() && edit.longitude.is_some() {
            grievance.latitude = edit.latitude;
            grievance.longitude = edit.longitude;
        }

        Ok(grievance.clone())
    }

    pub fn set_status(&mut self, id: i64, status: Status) -> Result<Grievance> {
        let tracked = self
            .grievances
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Grievance".to_string()))?;

        tracked.grievance.status = status;

        Ok(tracked.grievance.clone())
    }

    /// Marks unresolved grievances past their deadline. Returns the ones that changed.
    pub fn escalate(&mut self, at: NaiveDateTime) -> Vec<Grievance> {
        let mut escalated = Vec::new();

        for tracked in self.grievances.values_mut() {
            let grievance = &mut tracked.grievance;

            if grievance.status == Status::Resolved || grievance.is_overdue || at <= tracked.deadline
            {
                continue;
            }

            warn!("Grievance {} is now overdue, escalating", grievance.id);
            grievance.is_overdue = true;
            grievance.priority = Priority::High;
            grievance.escalation_level = EscalationLevel::BLOCK_PANCHAYAT;

            escalated.push(grievance.clone());
        }

        escalated
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.values().cloned().collect()
    }

    pub fn create_alert(&mut self, draft: &AlertDraft, at: NaiveDateTime) -> Alert {
        self.next_alert += 1;

        let alert = Alert {
            id: self.next_alert,
            title: draft.title.clone(),
            description: draft.description.clone(),
            category: draft.category.clone(),
            severity: draft.severity.clone(),
            start_time: draft.start_time,
            end_time: draft.end_time,
            created_at: Some(at),
        };
        self.alerts.insert(alert.id, alert.clone());

        alert
    }

    pub fn update_alert(&mut self, id: i64, draft: &AlertDraft) -> Result<Alert> {
        let alert = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Alert {id}")))?;

        alert.title.clone_from(&draft.title);
        alert.description.clone_from(&draft.description);
        alert.category.clone_from(&draft.category);
        alert.severity.clone_from(&draft.severity);
        alert.start_time = draft.start_time;
        alert.end_time = draft.end_time;

        Ok(alert.clone())
    }

    pub fn delete_alert(&mut self, id: i64) -> Result<()> {
        self.alerts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Alert {id}")))
    }

    pub fn users(&self) -> Vec<User> {
        self.accounts.values().map(Account::user).collect()
    }

    pub fn create_user(&mut self, user: &NewUser) -> Result<String> {
        if self.username_taken(&user.username) {
            return Err(AppError::Rejected("Username already exists".to_string()));
        }

        self.add_account(&user.username, &user.email, DEFAULT_PASSWORD, user.role);

        Ok("User created successfully.".to_string())
    }

    pub fn delete_user(&mut self, id: i64) -> Result<()> {
        if id == PRIMARY_ADMIN {
            return Err(AppError::Rejected(
                "Cannot delete the primary admin account.".to_string(),
            ));
        }

        self.accounts
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {id}")))?;
        self.tokens.retain(|_, owner| *owner != id);

        Ok(())
    }

    pub fn profile(&self, id: i64) -> Result<Profile> {
        let account = self.account(id)?;

        Ok(Profile {
            username: account.username.clone(),
            email: account.email.clone(),
        })
    }

    pub fn update_profile(&mut self, id: i64, update: &ProfileUpdate) -> Result<String> {
        let account = self.account(id)?;
        let current = account.username.clone();

        let rename = update
            .username
            .as_deref()
            .filter(|name| !name.trim().is_empty() && *name != current);
        if let Some(name) = rename {
            if self.username_taken(name) {
                return Err(AppError::Rejected(format!(
                    "Username '{name}' is already taken."
                )));
            }
        }

        let password = update.password.as_deref().filter(|p| !p.is_empty());
        if password.is_some() {
            match update.old_password.as_deref().filter(|p| !p.is_empty()) {
                None => {
                    return Err(AppError::Rejected(
                        "Current password is required to set a new one.".to_string(),
                    ))
                }
                Some(old) if old != account.password => {
                    return Err(AppError::Rejected("Incorrect current password.".to_string()))
                }
                Some(_) => {}
            }
        }

        if let Some(name) = rename {
            for tracked in self.grievances.values_mut().filter(|t| t.owner == id) {
                tracked.grievance.submitted_by = name.to_string();
            }
        }

        if let Some(account) = self.accounts.get_mut(&id) {
            if let Some(name) = rename {
                account.username = name.to_string();
            }
            if let Some(password) = password {
                account.password = password.to_string();
            }
        }

        Ok("Profile updated successfully. Please log in again.".to_string())
    }

    pub fn verify_password(&self, id: i64, password: &str) -> Result<()> {
        if self.account(id)?.password == password {
            Ok(())
        } else {
            Err(AppError::IncorrectPassword)
        }
    }
}

pub struct AppState {
    store: Mutex<Store>,
    pub broker: Broker,
    failing: Mutex<HashSet<String>>,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(Store::seeded()),
            broker: Broker::new(),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn token_valid(&self, token: &str) -> bool {
        self.store().authenticate(token).is_some()
    }

    pub fn caller(&self, headers: &HeaderMap) -> Result<Account> {
        let token = bearer(headers).ok_or(AppError::Unauthorized)?;

        self.store()
            .authenticate(token)
            .cloned()
            .ok_or(AppError::Unauthorized)
    }

    pub fn admin(&self, headers: &HeaderMap) -> Result<Account> {
        let caller = self.caller(headers)?;

        match caller.role {
            Role::Admin => Ok(caller),
            Role::Villager => Err(AppError::Forbidden),
        }
    }

    pub fn fail(&self, path: &str) {
        self.failing_paths().insert(path.to_string());
    }

    pub fn recover(&self, path: &str) {
        self.failing_paths().remove(path);
    }

    pub fn is_failing(&self, path: &str) -> bool {
        self.failing_paths().contains(path)
    }

    /// Runs the overdue sweep and publishes every grievance it changed.
    pub fn escalate(&self, at: NaiveDateTime) -> usize {
        let escalated = self.store().escalate(at);

        for grievance in &escalated {
            self.broker.publish_json(GRIEVANCES, grievance);
        }

        escalated.len()
    }

    fn failing_paths(&self) -> MutexGuard<'_, HashSet<String>> {
        self.failing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}
