//! Command handlers wiring the session store and the authenticated client.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use portalauth_core::{AdminAccount, AuthenticatedClient, LifecyclePhase, SessionStore};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::settings::Settings;

pub struct App {
    settings: Settings,
    store: SessionStore<Value>,
    api: AuthenticatedClient,
    /// Set by the session-lost notifier.
    session_lost: Arc<AtomicBool>,
}

impl App {
    pub fn new(settings: Settings) -> Result<Self> {
        let config = settings.auth_config();
        let storage = settings.session_storage(&config)?;
        debug!(portal = %settings.portal(), base_url = %config.base_url, "Opening session");

        let store: SessionStore<Value> =
            SessionStore::new(config, storage).context("Failed to create HTTP client")?;

        let session_lost = Arc::new(AtomicBool::new(false));
        let api = {
            let lost_store = store.clone();
            let session_lost = Arc::clone(&session_lost);
            store.authenticated_client(move || {
                lost_store.logout();
                session_lost.store(true, Ordering::SeqCst);
            })
        };

        Ok(Self {
            settings,
            store,
            api,
            session_lost,
        })
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username {
            Some(username) => username,
            None => Self::prompt_username(self.settings.last_username.as_deref())?,
        };
        if username.is_empty() {
            anyhow::bail!("Username required");
        }
        let password = rpassword::prompt_password("Password: ")?;

        let credentials = json!({ "username": username, "password": password });
        if let Err(e) = self.store.login(&credentials).await {
            if let Some(fields) = e.field_errors() {
                for (field, messages) in fields {
                    for message in messages {
                        eprintln!("  {}: {}", field, message);
                    }
                }
            }
            return Err(anyhow::anyhow!(e.user_message()));
        }

        self.settings.last_username = Some(username);
        if let Err(e) = self.settings.save() {
            warn!(error = %e, "Failed to save settings");
        }

        self.store
            .fetch_identity()
            .await
            .context("Logged in, but the account could not be loaded")?;
        println!("Logged in as {}", Self::display_identity(self.store.identity().as_ref()));
        Ok(())
    }

    pub async fn whoami(&self) -> Result<()> {
        self.store.init_session().await;
        match self.store.identity() {
            Some(identity) => println!("{}", serde_json::to_string_pretty(&identity)?),
            None => Self::not_logged_in()?,
        }
        Ok(())
    }

    pub fn status(&self) {
        let snapshot = self.store.snapshot();
        let phase = match snapshot.phase {
            LifecyclePhase::Uninitialized => "uninitialized",
            LifecyclePhase::Initializing => "initializing",
            LifecyclePhase::Ready => "ready",
        };
        println!("portal:    {}", self.settings.portal());
        println!("base url:  {}", self.store.config().base_url);
        println!("phase:     {}", phase);
        println!("token:     {}", if snapshot.access_token.is_some() { "present" } else { "absent" });
        println!("identity:  {}", Self::display_identity(snapshot.identity.as_ref()));
    }

    pub async fn get(&self, path: &str) -> Result<()> {
        self.store.init_session().await;
        if !self.store.is_authenticated() {
            return Self::not_logged_in();
        }

        let result = self.api.send(self.api.get(path)).await;
        if self.session_lost.load(Ordering::SeqCst) {
            eprintln!("Session expired. Run `portalauth login` to sign in again.");
        }
        let response = result?;

        let text = response.text().await?;
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
            Err(_) => println!("{}", text),
        }
        Ok(())
    }

    pub async fn logout(&self) {
        self.store.sign_out().await;
        println!("Logged out");
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn prompt_username(last: Option<&str>) -> Result<String> {
        match last {
            Some(last) => print!("Username [{}]: ", last),
            None => print!("Username: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        Ok(match (input.is_empty(), last) {
            (true, Some(last)) => last.to_string(),
            _ => input.to_string(),
        })
    }

    fn display_identity(identity: Option<&Value>) -> String {
        let Some(identity) = identity else {
            return "-".to_string();
        };
        if let Ok(admin) = AdminAccount::deserialize(identity) {
            return format!("{} [{}]", admin.display_name(), admin.admin_type);
        }
        ["name", "username", "email"]
            .iter()
            .find_map(|key| identity.get(key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| identity.to_string())
    }

    fn not_logged_in() -> Result<()> {
        anyhow::bail!("Not logged in. Run `portalauth login` first.")
    }
}
