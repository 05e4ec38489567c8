//! OAuth credential lifecycle.
//!
//! Tokens come from the installed-application flow of `yup_oauth2`: the
//! authorization URL is printed, the pasted code is exchanged at the token
//! endpoint and the token is written to a private cache file. The same
//! authenticator refreshes expired tokens and runs the flow again when no
//! refresh token is available.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use google_gmail1::yup_oauth2::authenticator::DefaultAuthenticator;
use google_gmail1::yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use google_gmail1::yup_oauth2::storage::{TokenInfo, TokenStorage};
use google_gmail1::yup_oauth2::{
    self, ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
};
use tokio::io::AsyncWriteExt;

use crate::error::CredentialError;

/// Name of the token cache file under `~/.credentials`
pub const APP_CACHE_NAME: &str = "duty-gateway.json";

pub const SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// Read the OAuth client registration downloaded from the Google console.
/// Both the `installed` and the `web` layouts are accepted.
pub async fn load_client_secret(path: &Path) -> Result<ApplicationSecret, CredentialError> {
    yup_oauth2::read_application_secret(path)
        .await
        .map_err(|e| CredentialError::ClientSecret {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Token cache path inside the user's home directory.
pub fn default_cache_path() -> Result<PathBuf, CredentialError> {
    let home = dirs::home_dir()
        .ok_or_else(|| CredentialError::CachePath("home directory not found".to_string()))?;
    Ok(home
        .join(".credentials")
        .join(urlencoding::encode(APP_CACHE_NAME).into_owned()))
}

/// Authenticator shared by every Google API client.
#[derive(Clone)]
pub struct AuthorizedTransport {
    pub authenticator: DefaultAuthenticator,
}

/// Single-file token store with owner-only permissions.
///
/// One token is authorized for all of [`SCOPES`], so lookups ignore the
/// scopes asked for. A file that cannot be parsed counts as empty. Write
/// failures are logged and never fail the caller.
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn load(&self) -> Option<TokenInfo> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("No cached token at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::debug!(
                    "Ignoring unreadable token cache {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    async fn save(&self, token: &TokenInfo) -> std::io::Result<()> {
        tracing::info!("Saving credential file to: {}", self.path.display());

        if let Some(dir) = self.path.parent() {
            let mut builder = tokio::fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(0o700);
            builder.create(dir).await?;
        }

        let json = serde_json::to_vec_pretty(token)?;
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        file.write_all(&json).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl TokenStorage for TokenCache {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        if let Err(e) = self.save(&token).await {
            tracing::warn!(
                "Unable to cache oauth token at {}: {}",
                self.path.display(),
                e
            );
        }
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.load().await
    }
}

pub struct CredentialStore {
    secret: ApplicationSecret,
    cache_path: PathBuf,
    delegate: Option<Box<dyn InstalledFlowDelegate>>,
}

impl CredentialStore {
    pub fn new(secret: ApplicationSecret, cache_path: PathBuf) -> Self {
        Self {
            secret,
            cache_path,
            delegate: None,
        }
    }

    /// Replace the stdin prompt used to collect the authorization code.
    pub fn with_delegate(mut self, delegate: Box<dyn InstalledFlowDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Build the authenticator and make sure it holds a token for every
    /// scope, running the interactive flow only when the cache has nothing
    /// usable.
    pub async fn obtain(self) -> Result<AuthorizedTransport, CredentialError> {
        let cache = TokenCache::new(self.cache_path.clone());
        let mut builder = InstalledFlowAuthenticator::builder(
            self.secret,
            InstalledFlowReturnMethod::Interactive,
        )
        .with_storage(Box::new(cache));
        if let Some(delegate) = self.delegate {
            builder = builder.flow_delegate(delegate);
        }

        let authenticator = builder
            .build()
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))?;

        authenticator
            .token(&SCOPES)
            .await
            .map_err(|e| match e {
                yup_oauth2::Error::UserError(message) => CredentialError::Prompt(message),
                other => CredentialError::Exchange(other.to_string()),
            })?;
        tracing::info!(
            "Authorized; tokens cached at {}",
            self.cache_path.display()
        );

        Ok(AuthorizedTransport { authenticator })
    }
}
