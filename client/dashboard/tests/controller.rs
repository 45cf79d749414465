use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Duration as Days;
use dashboard::{
    api::{ApiClient, NewGrievance},
    controller::{Access, DashboardController, Level, Notification, Phase, Route, View},
    realtime::{RealtimeClient, ALERTS, ALERTS_DELETED, GRIEVANCES},
    session::{MemoryStore, Session},
};
use mock::{state::now, MockServer};
use models::{AlertDraft, Grievance, Status};
use tokio::time::timeout;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

type Seen = Arc<Mutex<Vec<Notification>>>;

async fn api_as(server: &MockServer, username: Option<&str>) -> ApiClient {
    let session = Session::new(MemoryStore::new());
    let api = ApiClient::new(Url::parse(&server.base_url()).unwrap(), session.clone());

    if let Some(username) = username {
        session.login(&api, username, "password").await.unwrap();
    }

    api
}

async fn controller_as(
    server: &MockServer,
    view: View,
    username: Option<&str>,
) -> (DashboardController, Seen) {
    let api = api_as(server, username).await;
    let realtime = RealtimeClient::new(
        Url::parse(&server.ws_url()).unwrap(),
        Duration::from_millis(50),
    );

    let seen: Seen = Arc::default();
    let mut controller = DashboardController::new(view, api, realtime);
    let sink = seen.clone();
    controller.observe(move |notification: &Notification| {
        sink.lock().unwrap().push(notification.clone());
    });

    (controller, seen)
}

async fn feeds_ready(server: &MockServer, sessions: usize) {
    timeout(WAIT, async {
        server.wait_for_subscribers(GRIEVANCES, sessions).await;
        server.wait_for_subscribers(ALERTS, sessions).await;
        server.wait_for_subscribers(ALERTS_DELETED, sessions).await;
    })
    .await
    .unwrap();
}

/// Applies realtime events until `done` holds.
async fn pump(controller: &mut DashboardController, mut done: impl FnMut(&DashboardController) -> bool) {
    timeout(WAIT, async {
        while !done(&*controller) {
            let event = controller.next_event().await.expect("feeds closed");
            controller.apply(event);
        }
    })
    .await
    .expect("event never arrived");
}

fn toasts(seen: &Seen) -> Vec<(Level, String, String)> {
    seen.lock()
        .unwrap()
        .iter()
        .filter_map(|notification| match notification {
            Notification::Toast(toast) => {
                Some((toast.level, toast.title.clone(), toast.description.clone()))
            }
            _ => None,
        })
        .collect()
}

fn grievance(title: &str, category: &str) -> NewGrievance {
    NewGrievance {
        title: title.to_string(),
        description: "Reported from the village square".to_string(),
        category: category.to_string(),
        location: None,
        attachment: None,
    }
}

fn find<'a>(list: &'a [Grievance], title: &str) -> Option<&'a Grievance> {
    list.iter().find(|grievance| grievance.title == title)
}

#[tokio::test]
async fn test_mount_loads_every_collection() {
    let server = MockServer::start().await.unwrap();
    let villager = api_as(&server, Some("villager")).await;
    villager
        .submit_grievance(grievance("Broken pump", "Water"))
        .await
        .unwrap();

    let (mut admin, seen) = controller_as(&server, View::Admin, Some("admin")).await;

    assert_eq!(admin.mount().await, Access::Granted);
    assert_eq!(admin.dashboard().phase(), &Phase::Ready);
    assert_eq!(admin.dashboard().grievances().len(), 1);
    assert!(seen
        .lock()
        .unwrap()
        .contains(&Notification::Phase(Phase::Loading)));
}

#[tokio::test]
async fn test_failed_load_keeps_nothing_and_recovers() {
    let server = MockServer::start().await.unwrap();
    let villager = api_as(&server, Some("villager")).await;
    villager
        .submit_grievance(grievance("Broken pump", "Water"))
        .await
        .unwrap();

    let (mut admin, seen) = controller_as(&server, View::Admin, Some("admin")).await;
    server.fail("/alerts");

    admin.mount().await;

    assert!(matches!(admin.dashboard().phase(), Phase::Error(_)));
    assert!(admin.dashboard().grievances().is_empty());
    assert!(toasts(&seen).contains(&(
        Level::Error,
        "Failed to load data".to_string(),
        "Could not connect to the server.".to_string()
    )));

    server.recover("/alerts");
    admin.refresh().await;

    assert_eq!(admin.dashboard().phase(), &Phase::Ready);
    assert_eq!(admin.dashboard().grievances().len(), 1);
}

#[tokio::test]
async fn test_wrong_role_is_redirected_before_loading() {
    let server = MockServer::start().await.unwrap();
    let (mut controller, seen) = controller_as(&server, View::Admin, Some("villager")).await;

    let access = controller.mount().await;

    assert_eq!(access, Access::Redirect(Route::VillagerDashboard));
    assert_eq!(controller.dashboard().phase(), &Phase::Uninitialized);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Notification::Redirect(Route::VillagerDashboard)]
    );
    assert_eq!(server.session_count(), 0);
}

#[tokio::test]
async fn test_signed_out_goes_to_login() {
    let server = MockServer::start().await.unwrap();
    let (mut controller, _) = controller_as(&server, View::Villager, None).await;

    assert_eq!(
        controller.mount().await,
        Access::Redirect(Route::Login)
    );
}

#[tokio::test]
async fn test_status_change_arrives_through_realtime() {
    let server = MockServer::start().await.unwrap();
    let (mut admin, seen) = controller_as(&server, View::Admin, Some("admin")).await;
    admin.mount().await;
    feeds_ready(&server, 1).await;

    let villager = api_as(&server, Some("villager")).await;
    let submitted = villager
        .submit_grievance(grievance("No street light", "Electricity"))
        .await
        .unwrap();

    pump(&mut admin, |c| find(c.dashboard().grievances(), "No street light").is_some()).await;

    admin
        .change_status(submitted.id, Status::InProgress)
        .await
        .unwrap();

    pump(&mut admin, |c| {
        find(c.dashboard().grievances(), "No street light")
            .is_some_and(|g| g.status == Status::InProgress)
    })
    .await;

    assert_eq!(admin.dashboard().grievances().len(), 1);
    assert!(toasts(&seen).contains(&(
        Level::Info,
        "Status Updated".to_string(),
        "Grievance status has been changed to In Progress.".to_string()
    )));
}

#[tokio::test]
async fn test_failed_mutation_leaves_state_alone() {
    let server = MockServer::start().await.unwrap();
    let villager = api_as(&server, Some("villager")).await;
    let submitted = villager
        .submit_grievance(grievance("Open drain", "Sanitation"))
        .await
        .unwrap();

    let (mut admin, seen) = controller_as(&server, View::Admin, Some("admin")).await;
    admin.mount().await;
    let before = admin.dashboard().grievances().to_vec();

    server.fail(&format!("/grievances/{}", submitted.id));
    let result = admin.change_status(submitted.id, Status::Resolved).await;

    assert!(result.is_err());
    assert_eq!(admin.dashboard().grievances(), before.as_slice());
    assert!(toasts(&seen).contains(&(
        Level::Error,
        "Update Failed".to_string(),
        "Could not update status.".to_string()
    )));
}

#[tokio::test]
async fn test_villager_submission_reaches_both_views() {
    let server = MockServer::start().await.unwrap();
    let (mut admin, _) = controller_as(&server, View::Admin, Some("admin")).await;
    let (mut villager, villager_seen) =
        controller_as(&server, View::Villager, Some("villager")).await;

    admin.mount().await;
    villager.mount().await;
    feeds_ready(&server, 2).await;

    villager
        .submit_grievance(grievance("Pothole on main road", "Roads"))
        .await
        .unwrap();

    pump(&mut villager, |c| {
        find(c.dashboard().my_requests(), "Pothole on main road").is_some()
    })
    .await;
    pump(&mut admin, |c| {
        find(c.dashboard().grievances(), "Pothole on main road").is_some()
    })
    .await;

    assert!(find(villager.dashboard().grievances(), "Pothole on main road").is_some());
    assert!(toasts(&villager_seen).contains(&(
        Level::Info,
        "Success!".to_string(),
        "Your request has been submitted.".to_string()
    )));
}

#[tokio::test]
async fn test_owner_hears_about_status_changes() {
    let server = MockServer::start().await.unwrap();
    let (mut admin, _) = controller_as(&server, View::Admin, Some("admin")).await;
    let (mut villager, villager_seen) =
        controller_as(&server, View::Villager, Some("villager")).await;

    villager
        .submit_grievance(grievance("Clinic closed", "Health"))
        .await
        .unwrap();
    admin.mount().await;
    villager.mount().await;
    feeds_ready(&server, 2).await;

    let id = villager.dashboard().my_requests()[0].id;
    admin.change_status(id, Status::Resolved).await.unwrap();

    pump(&mut villager, |c| {
        c.dashboard().my_requests()[0].status == Status::Resolved
    })
    .await;

    assert!(toasts(&villager_seen).contains(&(
        Level::Info,
        "Your Request Was Updated".to_string(),
        "Status for \"Clinic closed\" is now Resolved.".to_string()
    )));
}

#[tokio::test]
async fn test_alert_lifecycle_is_announced_to_villagers() {
    let server = MockServer::start().await.unwrap();
    let (mut admin, _) = controller_as(&server, View::Admin, Some("admin")).await;
    let (mut villager, villager_seen) =
        controller_as(&server, View::Villager, Some("villager")).await;

    admin.mount().await;
    villager.mount().await;
    feeds_ready(&server, 2).await;

    admin
        .create_alert(&AlertDraft::new("Water cut", "Tank cleaning on Sunday"))
        .await
        .unwrap();
    pump(&mut villager, |c| c.dashboard().alerts().len() == 1).await;

    let id = villager.dashboard().alerts()[0].id;
    admin.delete_alert(id).await.unwrap();
    pump(&mut villager, |c| c.dashboard().alerts().is_empty()).await;

    let titles: Vec<String> = toasts(&villager_seen)
        .into_iter()
        .map(|(_, title, _)| title)
        .collect();
    assert!(titles.contains(&"New Village Alert".to_string()));
    assert!(titles.contains(&"Alert Deleted".to_string()));
}

#[tokio::test]
async fn test_escalation_is_pushed_to_admin() {
    let server = MockServer::start().await.unwrap();
    let villager = api_as(&server, Some("villager")).await;
    villager
        .submit_grievance(grievance("Garbage pile", "Sanitation"))
        .await
        .unwrap();

    let (mut admin, _) = controller_as(&server, View::Admin, Some("admin")).await;
    admin.mount().await;
    feeds_ready(&server, 1).await;

    assert_eq!(server.escalate_overdue(now() + Days::days(8)), 1);

    pump(&mut admin, |c| c.dashboard().grievances()[0].is_overdue).await;

    assert_eq!(
        admin.dashboard().grievances()[0].escalation_level,
        models::EscalationLevel::BLOCK_PANCHAYAT
    );
}

#[tokio::test]
async fn test_unmount_stops_events() {
    let server = MockServer::start().await.unwrap();
    let (mut admin, _) = controller_as(&server, View::Admin, Some("admin")).await;
    admin.mount().await;
    feeds_ready(&server, 1).await;

    admin.unmount();
    admin.unmount();

    assert!(admin.dashboard().is_disposed());
    assert_eq!(admin.next_event().await, None);
    timeout(WAIT, async {
        while server.session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

/// Lets the controller handle whatever is pending without waiting for an event.
async fn settle(controller: &mut DashboardController) {
    let _ = timeout(Duration::from_millis(100), controller.next_event()).await;
}

#[tokio::test]
async fn test_new_login_is_used_on_reconnect() {
    let server = MockServer::start().await.unwrap();
    let (mut admin, _) = controller_as(&server, View::Admin, Some("admin")).await;
    admin.mount().await;
    feeds_ready(&server, 1).await;

    let session = admin.api().session().clone();
    let first = session.token();
    session
        .login(admin.api(), "admin", "password")
        .await
        .unwrap();
    let second = session.token();
    assert_ne!(first, second);

    settle(&mut admin).await;
    server.drop_connections();

    timeout(WAIT, async {
        while server.connect_tokens().last() != Some(&second) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    feeds_ready(&server, 1).await;

    assert_eq!(admin.dashboard().phase(), &Phase::Ready);
    assert!(!admin.dashboard().is_disposed());
}

#[tokio::test]
async fn test_logout_redirects_and_unmounts() {
    let server = MockServer::start().await.unwrap();
    let villager = api_as(&server, Some("villager")).await;
    villager
        .submit_grievance(grievance("Broken pump", "Water"))
        .await
        .unwrap();

    let (mut admin, seen) = controller_as(&server, View::Admin, Some("admin")).await;
    admin.mount().await;
    feeds_ready(&server, 1).await;
    assert_eq!(admin.dashboard().grievances().len(), 1);

    admin.api().session().logout().unwrap();

    assert!(timeout(WAIT, admin.next_event()).await.unwrap().is_none());
    assert!(admin.dashboard().is_disposed());
    assert!(admin.dashboard().grievances().is_empty());
    assert!(seen
        .lock()
        .unwrap()
        .contains(&Notification::Redirect(Route::Login)));

    timeout(WAIT, async {
        while server.session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
