use std::sync::Arc;

use gridharvest_core::{HttpClient, ReqwestHttpClient};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;

use super::{env_lookup, load_job, CommandResult, Rows};
use crate::cli::JobArgs;
use crate::error::CliError;

pub async fn run(args: &JobArgs) -> Result<CommandResult, CliError> {
    let job = load_job(args)?;
    let token_url = job
        .auth
        .as_ref()
        .map(|auth| auth.token_url.clone())
        .ok_or_else(|| CliError::Command(String::from("job file has no [auth] table")))?;

    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let session = job
        .token_session(http, env_lookup)?
        .ok_or_else(|| CliError::Command(String::from("job file has no [auth] table")))?;

    let token = session.current().await?;
    let expires_at = token
        .expires_at()
        .map(|expires_at| expires_at.format(&Rfc3339))
        .transpose()
        .map_err(|error| CliError::Command(format!("cannot format token expiry: {error}")))?;

    let row = vec![
        Value::from(token_url.as_str()),
        Value::from(token.token_type()),
        token.scope().map_or(Value::Null, Value::from),
        expires_at.clone().map_or(Value::Null, Value::from),
    ];

    let data = json!({
        "token_url": token_url,
        "token_type": token.token_type(),
        "scope": token.scope(),
        "expires_at": expires_at,
    });
    let rows = Rows {
        columns: ["token_url", "token_type", "scope", "expires_at"]
            .into_iter()
            .map(String::from)
            .collect(),
        rows: vec![row],
    };

    Ok(CommandResult::ok(data, rows))
}
