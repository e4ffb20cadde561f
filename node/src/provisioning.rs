use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Form, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{info, warn};

use purifier_common::{
    config::NodeConfig,
    connectivity::{Credentials, MAX_PASSWORD_BYTES, MAX_SSID_BYTES},
    store::{KvStore, StoreError},
};

const MAX_FORM_BODY_BYTES: usize = 512;
const RESTART_DELAY: Duration = Duration::from_secs(2);

const FORM_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Purifier Setup</title>
  <style>
    body{font-family:Arial,sans-serif;max-width:480px;margin:2rem auto;padding:0 1rem;color:#111}
    h1{margin:0 0 .5rem}.card{border:1px solid #ddd;border-radius:8px;padding:1rem}
    label{display:block;margin:.5rem 0 .2rem}input{width:100%;padding:.5rem;box-sizing:border-box}
    button{padding:.55rem .9rem;margin-top:.8rem}.muted{color:#555}
  </style>
</head>
<body>
  <h1>Purifier Setup</h1>
  <p class="muted">Enter the network this purifier should join. The device restarts after saving.</p>
  <div class="card">
    <form action="/submit" method="post">
      <label>Network name (SSID)</label><input name="ssid" type="text" maxlength="32" required>
      <label>Password</label><input name="password" type="password" maxlength="64">
      <button type="submit">Save and restart</button>
    </form>
  </div>
</body>
</html>
"#;

const CONFIRM_HTML: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Purifier Setup</title></head>
<body>
  <h1>Credentials saved</h1>
  <p>The purifier is restarting and will join the configured network shortly.</p>
</body>
</html>
"#;

#[derive(Debug, Deserialize)]
struct ProvisionSubmission {
    ssid: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Error)]
enum SubmissionError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct ProvisioningCtx<S> {
    kv: Arc<Mutex<S>>,
}

impl<S> Clone for ProvisioningCtx<S> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
        }
    }
}

/// Serves the two-route configuration endpoint for as long as the node stays
/// in provisioning mode; a successful submission restarts the process.
pub async fn serve<S>(kv: S, config: &NodeConfig) -> anyhow::Result<()>
where
    S: KvStore + Send + 'static,
{
    let ctx = ProvisioningCtx {
        kv: Arc::new(Mutex::new(kv)),
    };

    let app = Router::new()
        .route("/", get(handle_form))
        .route("/submit", post(handle_submit::<S>))
        .layer(DefaultBodyLimit::max(MAX_FORM_BODY_BYTES))
        .with_state(ctx);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.provisioning.http_port)
        .parse()
        .context("invalid provisioning listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind provisioning endpoint at {addr}"))?;

    info!(%addr, "provisioning endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_form() -> Html<&'static str> {
    Html(FORM_HTML)
}

async fn handle_submit<S: KvStore + Send + 'static>(
    State(ctx): State<ProvisioningCtx<S>>,
    Form(submission): Form<ProvisionSubmission>,
) -> Response {
    let mut kv = ctx.kv.lock().await;
    match apply_submission(&mut *kv, submission) {
        Ok(credentials) => {
            info!(ssid = %credentials.ssid, "credentials provisioned");
            schedule_restart();
            Html(CONFIRM_HTML).into_response()
        }
        Err(SubmissionError::Invalid(message)) => {
            (StatusCode::BAD_REQUEST, message).into_response()
        }
        Err(SubmissionError::Store(err)) => {
            warn!("failed to persist credentials: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to persist credentials",
            )
                .into_response()
        }
    }
}

/// Validates and persists a submitted credential pair.
fn apply_submission<S: KvStore>(
    kv: &mut S,
    submission: ProvisionSubmission,
) -> Result<Credentials, SubmissionError> {
    let ssid = submission.ssid.trim();
    if ssid.is_empty() {
        return Err(SubmissionError::Invalid("ssid must not be empty"));
    }
    if ssid.len() > MAX_SSID_BYTES {
        return Err(SubmissionError::Invalid("ssid exceeds 32 bytes"));
    }
    if submission.password.len() > MAX_PASSWORD_BYTES {
        return Err(SubmissionError::Invalid("password exceeds 64 bytes"));
    }

    let credentials = Credentials {
        ssid: ssid.to_string(),
        password: submission.password,
        provisioned: true,
    };
    credentials.save(kv)?;
    Ok(credentials)
}

/// Normal boot picks up the new credentials; the supervisor brings the
/// process back after exit.
fn schedule_restart() {
    tokio::spawn(async {
        tokio::time::sleep(RESTART_DELAY).await;
        info!("restarting to join the configured network");
        std::process::exit(0);
    });
}
