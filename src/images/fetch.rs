/// Remote image download
///
/// One shared `reqwest::Client` serves the whole fetch pool. Each URL gets
/// a GET with connect and read timeouts; transient failures (429, 5xx,
/// connection trouble) are retried with exponential backoff.

use reqwest::{Client, StatusCode};
use tokio::sync::watch;

use crate::catalog::settings::FetchSettings;
use crate::error::FetchError;

/// Build the process-wide HTTP client
pub fn build_client(settings: &FetchSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(settings.connect_timeout())
        .timeout(settings.read_timeout())
        .pool_max_idle_per_host(settings.concurrency * 2)
        .user_agent(settings.user_agent.as_str())
        .build()
}

/// Download `url`, retrying transient failures
///
/// Once `stop` is raised no further attempt starts and a pending backoff
/// sleep ends early with [`FetchError::Stopped`]. A request already sent is
/// left to finish or time out.
pub async fn fetch_bytes(
    client: &Client,
    url: &str,
    settings: &FetchSettings,
    stop: &mut watch::Receiver<bool>,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 0;
    loop {
        if *stop.borrow() {
            return Err(FetchError::Stopped);
        }
        match fetch_once(client, url).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) if err.is_transient() && attempt < settings.max_retries => {
                attempt += 1;
                let delay = settings.backoff(attempt);
                tracing::debug!(url, attempt, ?delay, error = %err, "retrying image fetch");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stopped(stop) => return Err(FetchError::Stopped),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Resolves once the flag is raised. A sender dropped unraised never stops anyone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|raised| *raised).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn fetch_once(client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(response.bytes().await?.to_vec())
}
