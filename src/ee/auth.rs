use std::process::Command;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use super::client::EeError;

/// Environment variable holding a ready-made OAuth access token.
pub const TOKEN_ENV: &str = "GEEFETCH_ACCESS_TOKEN";

/// gcloud tokens live one hour; refresh a bit earlier.
const TOKEN_LIFETIME: Duration = Duration::from_secs(50 * 60);

/// Source of bearer tokens for Earth Engine requests.
pub enum TokenProvider {
    Static(String),
    Gcloud {
        cache: Mutex<Option<(String, Instant)>>,
    },
}

impl TokenProvider {
    /// Token from `GEEFETCH_ACCESS_TOKEN`, falling back to the gcloud CLI.
    pub fn from_env() -> Self {
        match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => TokenProvider::Static(token.trim().to_string()),
            _ => TokenProvider::Gcloud {
                cache: Mutex::new(None),
            },
        }
    }

    pub fn token(&self) -> Result<String, EeError> {
        match self {
            TokenProvider::Static(token) => Ok(token.clone()),
            TokenProvider::Gcloud { cache } => {
                let mut guard = cache
                    .lock()
                    .map_err(|_| EeError::Auth("token cache poisoned".to_string()))?;
                if let Some((token, fetched)) = guard.as_ref() {
                    if fetched.elapsed() < TOKEN_LIFETIME {
                        return Ok(token.clone());
                    }
                }
                let token = gcloud_token()?;
                *guard = Some((token.clone(), Instant::now()));
                Ok(token)
            }
        }
    }
}

fn gcloud_token() -> Result<String, EeError> {
    debug!("Requesting access token from gcloud");
    let output = Command::new("gcloud")
        .args(["auth", "application-default", "print-access-token"])
        .output()
        .map_err(|e| {
            EeError::Auth(format!(
                "could not run gcloud ({e}). Install the Google Cloud CLI or set {TOKEN_ENV}."
            ))
        })?;
    if !output.status.success() {
        return Err(EeError::Auth(format!(
            "gcloud failed: {}. Run `gcloud auth application-default login` first.",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(EeError::Auth("gcloud returned an empty token".to_string()));
    }
    Ok(token)
}
