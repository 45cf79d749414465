//! # Controller
//!
//! One dashboard per role-specific view.
//!
//! [`Dashboard`] is the synchronous state: phase, collections, observers and
//! the generation ticket that makes stale loads harmless. [`DashboardController`]
//! drives it from the API and the realtime feeds.
//!
//! ```text
//! Uninitialized -> Loading -> Ready | Error
//!                     ^         |      |
//!                     +---------+------+   refresh
//! ```
//!
//! Realtime events are applied in any phase and never move it. Mutations
//! only report success or failure; the resulting record comes back over the
//! realtime feed like everybody else's.
use std::future::Future;

use futures_util::StreamExt;
use models::{Alert, AlertDraft, Grievance, GrievanceEdit, Identity, Role, Status};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    api::{ApiClient, NewGrievance},
    error::{AppError, Result},
    merge::{evict, sort_newest_first, upsert, upsert_if, Merged},
    realtime::{RealtimeClient, Subscription, ALERTS, ALERTS_DELETED, GRIEVANCES},
    session::Session,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Admin,
    Villager,
}

impl View {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Admin => View::Admin,
            Role::Villager => View::Villager,
        }
    }

    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            View::Admin => &[Role::Admin],
            View::Villager => &[Role::Villager],
        }
    }

    pub fn collections(&self) -> &'static [Collection] {
        match self {
            View::Admin => &[Collection::Grievances, Collection::Alerts],
            View::Villager => &[
                Collection::MyRequests,
                Collection::Grievances,
                Collection::Alerts,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    AdminDashboard,
    VillagerDashboard,
}

impl Route {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Admin => Route::AdminDashboard,
            Role::Villager => Route::VillagerDashboard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Redirect(Route),
}

/// Where a session may go before anything is loaded.
pub fn gate(view: View, identity: Option<&Identity>) -> Access {
    match identity {
        None => Access::Redirect(Route::Login),
        Some(identity) if view.allowed_roles().contains(&identity.role) => Access::Granted,
        Some(identity) => Access::Redirect(Route::for_role(identity.role)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Grievances,
    MyRequests,
    Alerts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: Level,
    pub title: String,
    pub description: String,
}

impl Toast {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            title: title.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Phase(Phase),
    Collection(Collection),
    Toast(Toast),
    Redirect(Route),
}

pub trait Observer: Send {
    fn notify(&mut self, notification: &Notification);
}

impl<F> Observer for F
where
    F: FnMut(&Notification) + Send,
{
    fn notify(&mut self, notification: &Notification) {
        self(notification)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    pub grievances: Vec<Grievance>,
    pub my_requests: Vec<Grievance>,
    pub alerts: Vec<Alert>,
}

/// Identifies one load. Only the latest ticket may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Grievance(Grievance),
    Alert(Alert),
    AlertDeleted(i64),
}

pub struct Dashboard {
    view: View,
    username: Option<String>,
    phase: Phase,
    collections: Collections,
    generation: u64,
    disposed: bool,
    observers: Vec<Box<dyn Observer>>,
}

impl Dashboard {
    pub fn new(view: View) -> Self {
        Self {
            view,
            username: None,
            phase: Phase::Uninitialized,
            collections: Collections::default(),
            generation: 0,
            disposed: false,
            observers: Vec::new(),
        }
    }

    pub fn observe(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Owner whose grievances belong in "my requests".
    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn grievances(&self) -> &[Grievance] {
        &self.collections.grievances
    }

    pub fn my_requests(&self) -> &[Grievance] {
        &self.collections.my_requests
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.collections.alerts
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Enters `Loading` and supersedes any load still in flight.
    pub fn begin_load(&mut self) -> Option<Ticket> {
        if self.disposed {
            return None;
        }

        self.generation += 1;
        self.set_phase(Phase::Loading);

        Some(Ticket(self.generation))
    }

    /// Applies a load result, all at once or not at all. Returns false for stale tickets.
    pub fn finish_load(&mut self, ticket: Ticket, result: Result<Collections>) -> bool {
        if self.disposed || ticket.0 != self.generation {
            debug!("Discarding stale load {:?}", ticket);
            return false;
        }

        match result {
            Ok(mut loaded) => {
                sort_newest_first(&mut loaded.grievances);
                sort_newest_first(&mut loaded.my_requests);
                sort_newest_first(&mut loaded.alerts);
                self.collections = loaded;

                for collection in self.view.collections() {
                    self.emit(Notification::Collection(*collection));
                }
                self.set_phase(Phase::Ready);
            }
            Err(e) => {
                warn!("Dashboard load failed: {e}");
                self.set_phase(Phase::Error(e.to_string()));
                self.toast(Toast::error(
                    "Failed to load data",
                    "Could not connect to the server.",
                ));
            }
        }

        true
    }

    pub fn apply(&mut self, event: Event) {
        match event {
            Event::Grievance(grievance) => self.apply_grievance(grievance),
            Event::Alert(alert) => self.apply_alert(alert),
            Event::AlertDeleted(id) => self.apply_alert_deleted(id),
        }
    }

    pub fn apply_grievance(&mut self, grievance: Grievance) {
        if self.disposed {
            return;
        }

        if self.view == View::Villager {
            let owner = self.username.clone();
            let title = grievance.title.clone();
            let status = grievance.status;

            let merged = upsert_if(
                &mut self.collections.my_requests,
                grievance.clone(),
                |incoming| owner.as_deref() == Some(incoming.submitted_by.as_str()),
            );

            if merged == Some(Merged::Updated) {
                self.toast(Toast::info(
                    "Your Request Was Updated",
                    format!("Status for \"{title}\" is now {status}."),
                ));
            }
            if merged.is_some() {
                self.emit(Notification::Collection(Collection::MyRequests));
            }
        }

        upsert(&mut self.collections.grievances, grievance);
        self.emit(Notification::Collection(Collection::Grievances));
    }

    pub fn apply_alert(&mut self, alert: Alert) {
        if self.disposed {
            return;
        }

        let title = alert.title.clone();
        let merged = upsert(&mut self.collections.alerts, alert);

        if self.view == View::Villager {
            let heading = match merged {
                Merged::Inserted => "New Village Alert",
                Merged::Updated => "Village Alert Updated",
            };
            self.toast(Toast::info(heading, title));
        }

        self.emit(Notification::Collection(Collection::Alerts));
    }

    pub fn apply_alert_deleted(&mut self, id: i64) {
        if self.disposed {
            return;
        }

        if evict(&mut self.collections.alerts, id) {
            self.emit(Notification::Collection(Collection::Alerts));
            self.toast(Toast::info(
                "Alert Deleted",
                "The alert has been successfully removed.",
            ));
        }
    }

    /// Forgets every record and any load in flight, as after a sign-out.
    pub fn clear(&mut self) {
        if self.disposed {
            return;
        }

        self.generation += 1;
        self.collections = Collections::default();

        for collection in self.view.collections() {
            self.emit(Notification::Collection(*collection));
        }
    }

    pub fn redirect(&mut self, route: Route) {
        info!("Redirecting {:?} dashboard to {:?}", self.view, route);
        self.emit(Notification::Redirect(route));
    }

    pub fn toast(&mut self, toast: Toast) {
        self.emit(Notification::Toast(toast));
    }

    /// Returns false if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }

        self.disposed = true;
        self.generation += 1;

        true
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase.clone();
        self.emit(Notification::Phase(phase));
    }

    fn emit(&mut self, notification: Notification) {
        if self.disposed {
            return;
        }

        for observer in &mut self.observers {
            observer.notify(&notification);
        }
    }
}

/// Fetches for one load, detached from the controller so events keep flowing meanwhile.
pub struct PendingLoad {
    ticket: Ticket,
    api: ApiClient,
    view: View,
}

impl PendingLoad {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub async fn fetch(self) -> (Ticket, Result<Collections>) {
        let result = fetch(&self.api, self.view).await;

        (self.ticket, result)
    }
}

async fn fetch(api: &ApiClient, view: View) -> Result<Collections> {
    match view {
        View::Admin => {
            let (grievances, alerts) = tokio::try_join!(api.grievances(), api.alerts())?;

            Ok(Collections {
                grievances,
                my_requests: Vec::new(),
                alerts,
            })
        }
        View::Villager => {
            let (my_requests, grievances, alerts) =
                tokio::try_join!(api.my_requests(), api.grievances(), api.alerts())?;

            Ok(Collections {
                grievances,
                my_requests,
                alerts,
            })
        }
    }
}

struct Feeds {
    grievances: Subscription<Grievance>,
    alerts: Subscription<Alert>,
    deleted: Subscription<i64>,
}

impl Feeds {
    fn open(realtime: &RealtimeClient) -> Self {
        Self {
            grievances: realtime.subscribe(GRIEVANCES),
            alerts: realtime.subscribe(ALERTS),
            deleted: realtime.subscribe(ALERTS_DELETED),
        }
    }

    async fn next(&mut self) -> Option<Event> {
        tokio::select! {
            Some(grievance) = self.grievances.next() => Some(Event::Grievance(grievance)),
            Some(alert) = self.alerts.next() => Some(Event::Alert(alert)),
            Some(id) = self.deleted.next() => Some(Event::AlertDeleted(id)),
            else => None,
        }
    }

    fn close(&mut self) {
        self.grievances.close();
        self.alerts.close();
        self.deleted.close();
    }
}

pub struct DashboardController {
    dashboard: Dashboard,
    api: ApiClient,
    realtime: RealtimeClient,
    session: Session,
    signed_in: Option<watch::Receiver<Option<Identity>>>,
    feeds: Option<Feeds>,
}

impl DashboardController {
    pub fn new(view: View, api: ApiClient, realtime: RealtimeClient) -> Self {
        Self {
            dashboard: Dashboard::new(view),
            session: api.session().clone(),
            api,
            realtime,
            signed_in: None,
            feeds: None,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn observe(&mut self, observer: impl Observer + 'static) {
        self.dashboard.observe(observer);
    }

    /// Gates on the session, subscribes to every feed, then loads.
    pub async fn mount(&mut self) -> Access {
        let signed_in = self.session.watch();
        let identity = self.session.identity();
        let access = gate(self.dashboard.view(), identity.as_ref());

        if let Access::Redirect(route) = access {
            self.dashboard.redirect(route);
            return access;
        }

        self.dashboard
            .set_username(identity.map(|identity| identity.username));
        self.realtime.set_token(self.session.token());

        if self.feeds.is_none() && !self.dashboard.is_disposed() {
            self.feeds = Some(Feeds::open(&self.realtime));
            self.signed_in = Some(signed_in);
        }

        self.refresh().await;

        access
    }

    pub async fn refresh(&mut self) {
        if let Some(pending) = self.begin_refresh() {
            let (ticket, result) = pending.fetch().await;
            self.finish_load(ticket, result);
        }
    }

    pub fn begin_refresh(&mut self) -> Option<PendingLoad> {
        let ticket = self.dashboard.begin_load()?;

        Some(PendingLoad {
            ticket,
            api: self.api.clone(),
            view: self.dashboard.view(),
        })
    }

    pub fn finish_load(&mut self, ticket: Ticket, result: Result<Collections>) -> bool {
        self.dashboard.finish_load(ticket, result)
    }

    /// Next realtime event, `None` once unmounted.
    ///
    /// Session changes are handled while waiting: a new token is used from the
    /// next reconnect on, and a sign-out or role change redirects and unmounts.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            let feeds = self.feeds.as_mut()?;

            let changed = match self.signed_in.as_mut() {
                Some(signed_in) => tokio::select! {
                    event = feeds.next() => return event,
                    changed = signed_in.changed() => changed.is_ok(),
                },
                None => return feeds.next().await,
            };

            if changed {
                self.follow_session();
            } else {
                self.signed_in = None;
            }
        }
    }

    pub fn apply(&mut self, event: Event) {
        self.dashboard.apply(event);
    }

    /// Applies events until `shutdown` resolves, then unmounts.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = self.next_event() => match event {
                    Some(event) => self.apply(event),
                    None => break,
                },
            }
        }

        self.unmount();
    }

    pub async fn change_status(&mut self, id: i64, status: Status) -> Result<()> {
        self.authorize()?;

        match self.api.change_status(id, status).await {
            Ok(_) => {
                self.dashboard.toast(Toast::info(
                    "Status Updated",
                    format!("Grievance status has been changed to {status}."),
                ));
                Ok(())
            }
            Err(e) => {
                warn!("Status change of grievance {id} failed: {e}");
                self.dashboard
                    .toast(Toast::error("Update Failed", "Could not update status."));
                Err(e)
            }
        }
    }

    pub async fn submit_grievance(&mut self, grievance: NewGrievance) -> Result<()> {
        self.authorize()?;

        let result = self.api.submit_grievance(grievance).await.map(|_| ());
        self.report_request(result, "submit", "submitted")
    }

    pub async fn edit_grievance(&mut self, id: i64, edit: &GrievanceEdit) -> Result<()> {
        self.authorize()?;

        let result = self.api.edit_grievance(id, edit).await.map(|_| ());
        self.report_request(result, "update", "updated")
    }

    pub async fn create_alert(&mut self, draft: &AlertDraft) -> Result<()> {
        self.authorize()?;

        let result = self.api.create_alert(draft).await.map(|_| ());
        self.report_alert(result, "create", "created")
    }

    pub async fn update_alert(&mut self, id: i64, draft: &AlertDraft) -> Result<()> {
        self.authorize()?;

        let result = self.api.update_alert(id, draft).await.map(|_| ());
        self.report_alert(result, "update", "updated")
    }

    /// The removal itself is announced when the deletion event arrives.
    pub async fn delete_alert(&mut self, id: i64) -> Result<()> {
        self.authorize()?;

        self.api.delete_alert(id).await.inspect_err(|e| {
            warn!("Deleting alert {id} failed: {e}");
            self.dashboard
                .toast(Toast::error("Error", "Could not delete the alert."));
        })
    }

    /// Closes every feed and drops pending loads. Idempotent.
    pub fn unmount(&mut self) {
        self.signed_in = None;
        if let Some(mut feeds) = self.feeds.take() {
            feeds.close();
        }

        if self.dashboard.dispose() {
            info!("Unmounted {:?} dashboard", self.dashboard.view());
        }
    }

    fn follow_session(&mut self) {
        let identity = self.session.identity();
        self.realtime.set_token(self.session.token());

        match gate(self.dashboard.view(), identity.as_ref()) {
            Access::Granted => {
                info!("Session changed, reconnects use the new token");
                self.dashboard
                    .set_username(identity.map(|identity| identity.username));
            }
            Access::Redirect(route) => {
                self.dashboard.clear();
                self.dashboard.redirect(route);
                self.unmount();
            }
        }
    }

    fn authorize(&self) -> Result<()> {
        let identity = self.session.identity().ok_or(AppError::Unauthenticated)?;

        match gate(self.dashboard.view(), Some(&identity)) {
            Access::Granted => Ok(()),
            Access::Redirect(_) => Err(AppError::Forbidden(identity.role)),
        }
    }

    fn report_request(&mut self, result: Result<()>, verb: &str, done: &str) -> Result<()> {
        match result {
            Ok(()) => {
                self.dashboard.toast(Toast::info(
                    "Success!",
                    format!("Your request has been {done}."),
                ));
                Ok(())
            }
            Err(e) => {
                warn!("Could not {verb} request: {e}");
                self.dashboard.toast(Toast::error("Failed", e.to_string()));
                Err(e)
            }
        }
    }

    fn report_alert(&mut self, result: Result<()>, verb: &str, done: &str) -> Result<()> {
        match result {
            Ok(()) => {
                self.dashboard
                    .toast(Toast::info("Success", format!("Alert has been {done}.")));
                Ok(())
            }
            Err(e) => {
                warn!("Could not {verb} alert: {e}");
                self.dashboard
                    .toast(Toast::error("Error", format!("Could not {verb} the alert.")));
                Err(e)
            }
        }
    }
}

impl Drop for DashboardController {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;
    use models::{EscalationLevel, Priority};
    use reqwest::StatusCode;

    use super::*;

    fn at(day: u32) -> Option<chrono::NaiveDateTime> {
        NaiveDate::from_ymd_opt(2025, 3, day).and_then(|d| d.and_hms_opt(9, 0, 0))
    }

    fn grievance(id: i64, owner: &str, day: u32) -> Grievance {
        Grievance {
            id,
            title: format!("Issue {id}"),
            description: "Needs attention".to_string(),
            status: Status::Received,
            priority: Priority::Medium,
            category: "Water Supply".to_string(),
            created_at: at(day),
            submitted_by: owner.to_string(),
            latitude: None,
            longitude: None,
            file_url: None,
            is_overdue: false,
            report_count: 0,
            escalation_level: EscalationLevel::GRAM_PANCHAYAT,
        }
    }

    fn alert(id: i64, day: u32) -> Alert {
        Alert {
            id,
            title: format!("Alert {id}"),
            description: "Heads up".to_string(),
            category: "General".to_string(),
            severity: "Medium".to_string(),
            start_time: None,
            end_time: None,
            created_at: at(day),
        }
    }

    fn recorded(dashboard: &mut Dashboard) -> Arc<Mutex<Vec<Notification>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dashboard.observe(move |notification: &Notification| {
            sink.lock().unwrap().push(notification.clone());
        });

        seen
    }

    fn toasts(seen: &Arc<Mutex<Vec<Notification>>>) -> Vec<String> {
        seen.lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                Notification::Toast(toast) => Some(toast.title.clone()),
                _ => None,
            })
            .collect()
    }

    fn failure() -> AppError {
        AppError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "boom".to_string(),
        }
    }

    fn villager_ready(owner: &str) -> Dashboard {
        let mut dashboard = Dashboard::new(View::Villager);
        dashboard.set_username(Some(owner.to_string()));

        let ticket = dashboard.begin_load().unwrap();
        dashboard.finish_load(ticket, Ok(Collections::default()));

        dashboard
    }

    #[test]
    fn test_gate_scenarios() {
        let villager = Identity {
            username: "ravi".to_string(),
            role: Role::Villager,
        };

        assert_eq!(
            gate(View::Admin, Some(&villager)),
            Access::Redirect(Route::VillagerDashboard)
        );
        assert_eq!(gate(View::Villager, Some(&villager)), Access::Granted);
        assert_eq!(gate(View::Admin, None), Access::Redirect(Route::Login));
    }

    #[test]
    fn test_redirect_renders_nothing() {
        let mut dashboard = Dashboard::new(View::Admin);
        let seen = recorded(&mut dashboard);

        dashboard.redirect(Route::VillagerDashboard);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Notification::Redirect(Route::VillagerDashboard)]
        );
        assert_eq!(dashboard.phase(), &Phase::Uninitialized);
        assert!(dashboard.grievances().is_empty());
    }

    #[test]
    fn test_load_is_all_or_nothing() {
        let mut dashboard = Dashboard::new(View::Admin);
        let ticket = dashboard.begin_load().unwrap();
        dashboard.finish_load(
            ticket,
            Ok(Collections {
                grievances: vec![grievance(1, "ravi", 1)],
                my_requests: Vec::new(),
                alerts: vec![alert(9, 1)],
            }),
        );
        let before = dashboard.collections().clone();
        let seen = recorded(&mut dashboard);

        let ticket = dashboard.begin_load().unwrap();
        assert!(dashboard.finish_load(ticket, Err(failure())));

        assert_eq!(dashboard.collections(), &before);
        assert!(matches!(dashboard.phase(), Phase::Error(_)));
        assert_eq!(toasts(&seen), vec!["Failed to load data"]);
    }

    #[test]
    fn test_load_sorts_and_notifies() {
        let mut dashboard = Dashboard::new(View::Admin);
        let seen = recorded(&mut dashboard);

        let ticket = dashboard.begin_load().unwrap();
        dashboard.finish_load(
            ticket,
            Ok(Collections {
                grievances: vec![grievance(1, "a", 1), grievance(2, "b", 2)],
                ..Collections::default()
            }),
        );

        let ids: Vec<i64> = dashboard.grievances().iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Notification::Phase(Phase::Loading),
                Notification::Collection(Collection::Grievances),
                Notification::Collection(Collection::Alerts),
                Notification::Phase(Phase::Ready),
            ]
        );
    }

    #[test]
    fn test_stale_load_is_discarded() {
        let mut dashboard = Dashboard::new(View::Admin);

        let first = dashboard.begin_load().unwrap();
        let second = dashboard.begin_load().unwrap();

        let stale = Collections {
            grievances: vec![grievance(1, "ravi", 1)],
            ..Collections::default()
        };
        assert!(!dashboard.finish_load(first, Ok(stale)));
        assert_eq!(dashboard.phase(), &Phase::Loading);
        assert!(dashboard.grievances().is_empty());

        assert!(dashboard.finish_load(second, Ok(Collections::default())));
        assert_eq!(dashboard.phase(), &Phase::Ready);
    }

    #[test]
    fn test_clear_drops_records_and_pending_load() {
        let mut dashboard = Dashboard::new(View::Admin);
        let loaded = dashboard.begin_load().unwrap();
        dashboard.finish_load(
            loaded,
            Ok(Collections {
                grievances: vec![grievance(1, "ravi", 1)],
                alerts: vec![alert(1, 1)],
                ..Collections::default()
            }),
        );
        let pending = dashboard.begin_load().unwrap();
        let seen = recorded(&mut dashboard);

        dashboard.clear();

        assert!(dashboard.grievances().is_empty());
        assert!(dashboard.alerts().is_empty());
        assert!(!dashboard.finish_load(pending, Ok(Collections::default())));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Notification::Collection(Collection::Grievances),
                Notification::Collection(Collection::Alerts),
            ]
        );
    }

    #[test]
    fn test_disposed_dashboard_ignores_everything() {
        let mut dashboard = Dashboard::new(View::Admin);
        let ticket = dashboard.begin_load().unwrap();
        let seen = recorded(&mut dashboard);

        assert!(dashboard.dispose());
        assert!(!dashboard.dispose());

        assert!(!dashboard.finish_load(
            ticket,
            Ok(Collections {
                alerts: vec![alert(1, 1)],
                ..Collections::default()
            })
        ));
        dashboard.apply_alert(alert(2, 2));

        assert!(dashboard.alerts().is_empty());
        assert!(dashboard.begin_load().is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_own_grievance_reaches_both_lists() {
        let mut dashboard = villager_ready("ravi");

        dashboard.apply_grievance(grievance(3, "ravi", 3));
        dashboard.apply_grievance(grievance(4, "meena", 4));

        let mine: Vec<i64> = dashboard.my_requests().iter().map(|g| g.id).collect();
        let public: Vec<i64> = dashboard.grievances().iter().map(|g| g.id).collect();

        assert_eq!(mine, vec![3]);
        assert_eq!(public, vec![4, 3]);
        assert_eq!(dashboard.phase(), &Phase::Ready);
    }

    #[test]
    fn test_own_request_update_is_announced() {
        let mut dashboard = villager_ready("ravi");
        dashboard.apply_grievance(grievance(3, "ravi", 3));
        let seen = recorded(&mut dashboard);

        dashboard.apply_grievance(Grievance {
            status: Status::InProgress,
            ..grievance(3, "ravi", 3)
        });

        assert_eq!(dashboard.my_requests()[0].status, Status::InProgress);
        assert_eq!(toasts(&seen), vec!["Your Request Was Updated"]);
    }

    #[test]
    fn test_villager_alert_toasts() {
        let mut dashboard = villager_ready("ravi");
        let seen = recorded(&mut dashboard);

        dashboard.apply_alert(alert(1, 1));
        dashboard.apply_alert(alert(1, 1));
        dashboard.apply_alert_deleted(1);
        dashboard.apply_alert_deleted(1);

        assert_eq!(
            toasts(&seen),
            vec!["New Village Alert", "Village Alert Updated", "Alert Deleted"]
        );
        assert!(dashboard.alerts().is_empty());
    }

    #[test]
    fn test_admin_sees_all_grievances_without_toasts() {
        let mut dashboard = Dashboard::new(View::Admin);
        let seen = recorded(&mut dashboard);

        dashboard.apply(Event::Grievance(grievance(1, "ravi", 1)));
        dashboard.apply(Event::Alert(alert(2, 2)));

        assert_eq!(dashboard.grievances().len(), 1);
        assert!(dashboard.my_requests().is_empty());
        assert!(toasts(&seen).is_empty());
    }
}
