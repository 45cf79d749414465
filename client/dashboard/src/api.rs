//! # API
//!
//! Typed calls to the GramAlert Plus REST API.
//!
//! Every call except login and register sends the session token as
//! `Authorization: Bearer ..`, read at request time so a new login is picked
//! up without rebuilding the client. Non-2xx answers become
//! [`AppError::Status`] carrying the response text, which the API uses for
//! human-readable reasons.
use std::path::Path;

use models::{
    Alert, AlertDraft, Credentials, Grievance, GrievanceEdit, Location, LoginResponse, NewUser,
    PasswordCheck, Profile, ProfileUpdate, Registration, Status, StatusChange, User,
};
use reqwest::{
    multipart::{Form, Part},
    Client, Method, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::{
    error::{AppError, Result},
    session::Session,
};

/// File attached to a new grievance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl Attachment {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        Ok(Self {
            mime: mime_for(&file_name),
            file_name,
            bytes,
        })
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGrievance {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: Option<Location>,
    pub attachment: Option<Attachment>,
}

impl NewGrievance {
    fn into_form(self) -> Result<Form> {
        let mut form = Form::new()
            .text("title", self.title)
            .text("description", self.description)
            .text("category", self.category);

        if let Some(location) = self.location {
            form = form
                .text("latitude", location.lat.to_string())
                .text("longitude", location.lng.to_string());
        }

        if let Some(attachment) = self.attachment {
            let part = Part::bytes(attachment.bytes)
                .file_name(attachment.file_name)
                .mime_str(attachment.mime)?;
            form = form.part("file", part);
        }

        Ok(form)
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    session: Session,
}

impl ApiClient {
    pub fn new(base: Url, session: Session) -> Self {
        Self {
            http: Client::new(),
            base,
            session,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Attachment paths are relative to the API root, not to the current page.
    pub fn file_url(&self, path: &str) -> Result<Url> {
        self.url(path)
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse> {
        let request = self
            .http
            .post(self.url("/auth/login")?)
            .json(credentials);

        json(request).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<String> {
        let request = self
            .http
            .post(self.url("/auth/register")?)
            .json(registration);

        Ok(send(request).await?.text().await?)
    }

    pub async fn grievances(&self) -> Result<Vec<Grievance>> {
        json(self.authorized(Method::GET, "/grievances")?).await
    }

    pub async fn my_requests(&self) -> Result<Vec<Grievance>> {
        json(self.authorized(Method::GET, "/grievances/my-requests")?).await
    }

    pub async fn submit_grievance(&self, grievance: NewGrievance) -> Result<Grievance> {
        let request = self
            .authorized(Method::POST, "/grievances")?
            .multipart(grievance.into_form()?);

        json(request).await
    }

    pub async fn edit_grievance(&self, id: i64, edit: &GrievanceEdit) -> Result<Grievance> {
        let request = self
            .authorized(Method::PUT, &format!("/grievances/{id}"))?
            .json(edit);

        json(request).await
    }

    pub async fn change_status(&self, id: i64, status: Status) -> Result<Grievance> {
        let request = self
            .authorized(Method::PATCH, &format!("/grievances/{id}"))?
            .json(&StatusChange { status });

        json(request).await
    }

    pub async fn alerts(&self) -> Result<Vec<Alert>> {
        json(self.authorized(Method::GET, "/alerts")?).await
    }

    pub async fn create_alert(&self, draft: &AlertDraft) -> Result<Alert> {
        json(self.authorized(Method::POST, "/alerts")?.json(draft)).await
    }

    pub async fn update_alert(&self, id: i64, draft: &AlertDraft) -> Result<Alert> {
        let request = self
            .authorized(Method::PUT, &format!("/alerts/{id}"))?
            .json(draft);

        json(request).await
    }

    pub async fn delete_alert(&self, id: i64) -> Result<()> {
        send(self.authorized(Method::DELETE, &format!("/alerts/{id}"))?).await?;

        Ok(())
    }

    pub async fn users(&self) -> Result<Vec<User>> {
        json(self.authorized(Method::GET, "/api/users")?).await
    }

    /// The account gets the server's default password.
    pub async fn create_user(&self, user: &NewUser) -> Result<String> {
        let request = self.authorized(Method::POST, "/api/users")?.json(user);

        Ok(send(request).await?.text().await?)
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        send(self.authorized(Method::DELETE, &format!("/api/users/{id}"))?).await?;

        Ok(())
    }

    pub async fn profile(&self) -> Result<Profile> {
        json(self.authorized(Method::GET, "/api/profile/me")?).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<String> {
        let request = self
            .authorized(Method::PUT, "/api/profile/me")?
            .json(update);

        Ok(send(request).await?.text().await?)
    }

    pub async fn verify_password(&self, password: &str) -> Result<()> {
        let request = self
            .authorized(Method::POST, "/api/profile/me/verify-password")?
            .json(&PasswordCheck {
                password: password.to_string(),
            });

        send(request).await?;

        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url> {
        let joined = format!("{}{}", self.base.as_str().trim_end_matches('/'), path);

        Ok(Url::parse(&joined)?)
    }

    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.session.token().ok_or(AppError::Unauthenticated)?;

        Ok(self.http.request(method, self.url(path)?).bearer_auth(token))
    }
}

async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await?;
    let status = response.status();

    debug!("{} {}", status, response.url());

    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();

    Err(AppError::Status { status, message })
}

async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    Ok(send(request).await?.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(Url::parse(base).unwrap(), Session::new(MemoryStore::new()))
    }

    #[test]
    fn test_file_url_is_relative_to_api_root() {
        let api = client("http://localhost:8080/gram/");

        assert_eq!(
            api.file_url("/uploads/pump.jpg").unwrap().as_str(),
            "http://localhost:8080/gram/uploads/pump.jpg"
        );
    }

    #[test]
    fn test_signed_out_requests_fail_early() {
        let api = client("http://localhost:8080");

        assert!(matches!(
            api.authorized(Method::GET, "/alerts"),
            Err(AppError::Unauthenticated)
        ));
    }

    #[test]
    fn test_mime_guess() {
        assert_eq!(mime_for("photo.JPG"), "image/jpeg");
        assert_eq!(mime_for("scan.pdf"), "application/pdf");
        assert_eq!(mime_for("notes"), "application/octet-stream");
    }
}
