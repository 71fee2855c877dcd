/**
 * SurveySync Entry Point
 *
 * Opens the local store, signs in the user named by SURVEY_USER_ID, runs one
 * push and pull against the configured remote and prints the local totals.
 * Without SURVEY_REMOTE_URL / SURVEY_API_KEY an in-memory remote is used.
 */
use std::sync::Arc;
use surveysync::app::config::Config;
use surveysync::app::state::AppState;
use surveysync::app::sync::{BlobStore, MemoryRemote, RemoteStore, RestRemote};

const USER_ENV: &str = "SURVEY_USER_ID";
const TOKEN_ENV: &str = "SURVEY_ACCESS_TOKEN";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "surveysync=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let mut config = Config::from_env()?;
    config.set_token(std::env::var(TOKEN_ENV).ok());

    let (remote, blobs) = connect(&config)?;

    tracing::info!(path = %config.database_path().display(), "opening local store");
    let state = AppState::init(config, remote, blobs).await?;
    state.set_online(true);

    match std::env::var(USER_ENV) {
        Ok(user) => match state.sign_in(&user).await? {
            Some(report) => tracing::info!(?report, "pulled remote data"),
            None => tracing::warn!("signed in without a pull"),
        },
        Err(_) => tracing::warn!("{} not set, staying signed out", USER_ENV),
    }

    let stats = state.database().get_stats().await?;
    let status = state.sync_status().await?;
    println!("user:          {}", state.current_user().as_deref().unwrap_or("<none>"));
    println!("projects:      {}", stats.project_count);
    println!("floors:        {}", stats.floor_count);
    println!("measurements:  {}", stats.measurement_count);
    println!("speed tests:   {}", stats.speed_test_count);
    println!("photos:        {}", stats.photo_count);
    println!("pending:       {}", stats.pending_mutations);
    println!("parked:        {}", stats.parked_mutations);
    if let Some(error) = status.last_error {
        println!("last error:    {}", error);
    }

    state.teardown().await;
    Ok(())
}

/// REST remote when credentials are configured, in-memory otherwise
fn connect(
    config: &Config,
) -> Result<(Arc<dyn RemoteStore>, Arc<dyn BlobStore>), Box<dyn std::error::Error>> {
    match config.remote_credentials() {
        Ok((url, key)) => {
            let rest = RestRemote::new(
                url,
                key,
                config.app().photo_bucket.clone(),
                config.app().remote_timeout(),
            )?;
            rest.set_access_token(config.get_token().map(str::to_string));
            tracing::info!(url, "using remote authority");
            let rest = Arc::new(rest);
            let remote: Arc<dyn RemoteStore> = rest.clone();
            let blobs: Arc<dyn BlobStore> = rest;
            Ok((remote, blobs))
        }
        Err(e) => {
            tracing::warn!(error = %e, "no remote configured, using in-memory remote");
            let memory = Arc::new(MemoryRemote::new());
            let remote: Arc<dyn RemoteStore> = memory.clone();
            let blobs: Arc<dyn BlobStore> = memory;
            Ok((remote, blobs))
        }
    }
}
