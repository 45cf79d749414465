//! # Session
//!
//! Who is signed in and with which bearer token.
//!
//! One [`Session`] is built at startup and handed to every API client and
//! controller. It is hydrated once from a [`SessionStore`], written on login
//! and cleared on logout. Watchers see every identity change.
//!
//! ## Persisted keys
//! - `gramalert_user`: JSON identity, `{"username": .., "role": ..}`
//! - `gramalert_token`: opaque bearer token
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use models::{Credentials, Identity, LoginResponse};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{api::ApiClient, error::Result};

pub const USER_KEY: &str = "gramalert_user";
pub const TOKEN_KEY: &str = "gramalert_token";

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.dir.join(key)) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(key), value)?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.dir.join(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);

        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SignedIn {
    identity: Identity,
    token: String,
}

struct Inner {
    store: Box<dyn SessionStore>,
    current: RwLock<Option<SignedIn>>,
    changes: watch::Sender<Option<Identity>>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Starts signed out; call [`Session::init`] to hydrate.
    pub fn new(store: impl SessionStore + 'static) -> Self {
        let (changes, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                store: Box::new(store),
                current: RwLock::new(None),
                changes,
            }),
        }
    }

    /// Reads both persisted keys. A missing key or unreadable identity leaves the session signed out.
    pub fn init(&self) -> Result<Option<Identity>> {
        let user = self.inner.store.get(USER_KEY)?;
        let token = self.inner.store.get(TOKEN_KEY)?;

        let restored = match (user, token) {
            (Some(user), Some(token)) if !token.is_empty() => {
                match serde_json::from_str::<Identity>(&user) {
                    Ok(identity) => Some(SignedIn { identity, token }),
                    Err(e) => {
                        warn!("Ignoring unreadable {USER_KEY}: {e}");
                        None
                    }
                }
            }
            _ => None,
        };

        match &restored {
            Some(signed_in) => info!("Restored session for {}", signed_in.identity.username),
            None => info!("No stored session"),
        }

        let identity = restored.as_ref().map(|signed_in| signed_in.identity.clone());
        self.replace(restored);

        Ok(identity)
    }

    pub async fn login(&self, api: &ApiClient, username: &str, password: &str) -> Result<Identity> {
        let response = api
            .login(&Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        self.sign_in(response)
    }

    /// Persists a successful login response and makes it current.
    pub fn sign_in(&self, response: LoginResponse) -> Result<Identity> {
        let identity = response.identity();

        self.inner
            .store
            .set(USER_KEY, &serde_json::to_string(&identity)?)?;
        self.inner.store.set(TOKEN_KEY, &response.token)?;

        info!("Signed in as {} ({})", identity.username, identity.role);
        self.replace(Some(SignedIn {
            identity: identity.clone(),
            token: response.token,
        }));

        Ok(identity)
    }

    /// Clears memory first so the session is signed out even if the store fails.
    pub fn logout(&self) -> Result<()> {
        let previous = self.replace(None);
        if let Some(signed_in) = previous {
            info!("Signed out {}", signed_in.identity.username);
        }

        self.inner.store.remove(USER_KEY)?;
        self.inner.store.remove(TOKEN_KEY)?;

        Ok(())
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read().map(|signed_in| signed_in.identity)
    }

    pub fn token(&self) -> Option<String> {
        self.read().map(|signed_in| signed_in.token)
    }

    pub fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.changes.subscribe()
    }

    fn read(&self) -> Option<SignedIn> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps the current sign-in and notifies watchers.
    fn replace(&self, next: Option<SignedIn>) -> Option<SignedIn> {
        let identity = next.as_ref().map(|signed_in| signed_in.identity.clone());

        let previous = {
            let mut current = self
                .inner
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, next)
        };

        self.inner.changes.send_replace(identity);

        previous
    }
}
