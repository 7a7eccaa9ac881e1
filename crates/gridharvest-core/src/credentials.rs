//! OAuth2 client credentials loaded from the process environment.

use secrecy::{ExposeSecret, SecretString};

use crate::http_client::HttpAuth;
use crate::ValidationError;

/// Default environment variable holding the client id.
pub const DEFAULT_CLIENT_ID_ENV: &str = "GRIDHARVEST_CLIENT_ID";
/// Default environment variable holding the client secret.
pub const DEFAULT_CLIENT_SECRET_ENV: &str = "GRIDHARVEST_CLIENT_SECRET";

/// Client id/secret pair used for the client-credentials grant.
///
/// The secret is only exposed when the Basic authorization header is built.
#[derive(Debug)]
pub struct Credentials {
    client_id: String,
    client_secret: SecretString,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        if client_id.trim().is_empty() {
            return Err(ValidationError::EmptyClientId);
        }
        if client_secret.trim().is_empty() {
            return Err(ValidationError::EmptyClientSecret);
        }

        Ok(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
        })
    }

    /// Reads the pair from the named environment variables.
    pub fn from_env(id_var: &str, secret_var: &str) -> Result<Self, ValidationError> {
        Self::from_lookup(id_var, secret_var, |name| std::env::var(name).ok())
    }

    /// Reads the pair through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(id_var: &str, secret_var: &str, lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = lookup(id_var).ok_or_else(|| ValidationError::MissingEnvVar {
            var: id_var.to_string(),
        })?;
        let client_secret = lookup(secret_var).ok_or_else(|| ValidationError::MissingEnvVar {
            var: secret_var.to_string(),
        })?;

        Self::new(client_id, client_secret)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn basic_auth(&self) -> HttpAuth {
        HttpAuth::Basic {
            username: self.client_id.clone(),
            password: self.client_secret.expose_secret().to_string(),
        }
    }
}
