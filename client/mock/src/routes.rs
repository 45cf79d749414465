use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use models::{
    topics::{ALERTS, ALERTS_DELETED, GRIEVANCES},
    Alert, AlertDraft, Credentials, Grievance, GrievanceEdit, LoginResponse, NewUser,
    PasswordCheck, Profile, ProfileUpdate, Registration, StatusChange, User,
};
use tracing::{info, warn};

use crate::{
    error::{AppError, Result},
    state::{now, AppState, Submission},
};

type Shared = State<Arc<AppState>>;

/// Answers 500 for paths a test marked as failing.
pub async fn inject_failures(State(state): Shared, request: Request, next: Next) -> Response {
    if state.is_failing(request.uri().path()) {
        warn!("Failing {} on request", request.uri().path());
        return AppError::Injected.into_response();
    }

    next.run(request).await
}

pub async fn login_handler(
    State(state): Shared,
    Json(credentials): Json<Credentials>,
) -> Result<Json<LoginResponse>> {
    let response = state.store().login(&credentials)?;

    Ok(Json(response))
}

pub async fn register_handler(
    State(state): Shared,
    Json(registration): Json<Registration>,
) -> Result<String> {
    let message = state.store().register(&registration)?;

    Ok(message)
}

pub async fn grievances_handler(
    State(state): Shared,
    headers: HeaderMap,
) -> Result<Json<Vec<Grievance>>> {
    state.caller(&headers)?;
    let grievances = state.store().grievances();

    Ok(Json(grievances))
}

pub async fn my_requests_handler(
    State(state): Shared,
    headers: HeaderMap,
) -> Result<Json<Vec<Grievance>>> {
    let caller = state.caller(&headers)?;
    let grievances = state.store().grievances_of(caller.id);

    Ok(Json(grievances))
}

pub async fn submit_handler(
    State(state): Shared,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Grievance>> {
    let caller = state.caller(&headers)?;
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "title" => submission.title = Some(field.text().await?),
            "description" => submission.description = Some(field.text().await?),
            "category" => submission.category = Some(field.text().await?),
            "latitude" => submission.latitude = Some(coordinate(&field.text().await?)?),
            "longitude" => submission.longitude = Some(coordinate(&field.text().await?)?),
            "file" => {
                submission.file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                info!("Received attachment of {} bytes", bytes.len());
            }
            other => warn!("Ignoring form field {other}"),
        }
    }

    let grievance = state.store().submit(&caller, submission, now())?;
    state.broker.publish_json(GRIEVANCES, &grievance);

    Ok(Json(grievance))
}

fn coordinate(raw: &str) -> Result<f64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::MalformedPayload(format!("not a coordinate: {raw}")))
}

pub async fn edit_handler(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(edit): Json<GrievanceEdit>,
) -> Result<Json<Grievance>> {
    let caller = state.caller(&headers)?;

    let grievance = state.store().edit(id, &caller, &edit)?;
    state.broker.publish_json(GRIEVANCES, &grievance);

    Ok(Json(grievance))
}

pub async fn status_handler(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> Result<Json<Grievance>> {
    state.admin(&headers)?;

    let grievance = state.store().set_status(id, change.status)?;
    state.broker.publish_json(GRIEVANCES, &grievance);

    Ok(Json(grievance))
}

pub async fn alerts_handler(State(state): Shared, headers: HeaderMap) -> Result<Json<Vec<Alert>>> {
    state.caller(&headers)?;
    let alerts = state.store().alerts();

    Ok(Json(alerts))
}

pub async fn create_alert_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(draft): Json<AlertDraft>,
) -> Result<Json<Alert>> {
    state.admin(&headers)?;

    let alert = state.store().create_alert(&draft, now());
    state.broker.publish_json(ALERTS, &alert);

    Ok(Json(alert))
}

pub async fn update_alert_handler(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(draft): Json<AlertDraft>,
) -> Result<Json<Alert>> {
    state.admin(&headers)?;

    let alert = state.store().update_alert(id, &draft)?;
    state.broker.publish_json(ALERTS, &alert);

    Ok(Json(alert))
}

pub async fn delete_alert_handler(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.admin(&headers)?;

    state.store().delete_alert(id)?;
    state.broker.publish(ALERTS_DELETED, &id.to_string());

    Ok(StatusCode::NO_CONTENT)
}

pub async fn users_handler(State(state): Shared, headers: HeaderMap) -> Result<Json<Vec<User>>> {
    state.admin(&headers)?;
    let users = state.store().users();

    Ok(Json(users))
}

pub async fn create_user_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(user): Json<NewUser>,
) -> Result<String> {
    state.admin(&headers)?;

    let message = state.store().create_user(&user)?;

    Ok(message)
}

pub async fn delete_user_handler(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.admin(&headers)?;

    state.store().delete_user(id)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn profile_handler(State(state): Shared, headers: HeaderMap) -> Result<Json<Profile>> {
    let caller = state.caller(&headers)?;

    let profile = state.store().profile(caller.id)?;

    Ok(Json(profile))
}

pub async fn update_profile_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Result<String> {
    let caller = state.caller(&headers)?;

    let message = state.store().update_profile(caller.id, &update)?;

    Ok(message)
}

pub async fn verify_password_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(check): Json<PasswordCheck>,
) -> Result<StatusCode> {
    let caller = state.caller(&headers)?;

    state.store().verify_password(caller.id, &check.password)?;

    Ok(StatusCode::OK)
}
