use std::io::Read;
use std::process::ExitCode;

use nestq_client::{ApiClient, ClientConfig};
use nestq_query::{ApiClientParams, ApiGetResponse, build_query_params};

/// Reads an `ApiClientParams` document on stdin. Without `NESTQ_BASE_URL` the
/// compiled parameters are printed; with it, `argv[1]` (default `/`) is fetched
/// and the decoded response printed.
fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("nestq-fetch: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let params: ApiClientParams = if input.trim().is_empty() {
        ApiClientParams::default()
    } else {
        serde_json::from_str(&input)?
    };

    if std::env::var_os(ClientConfig::BASE_URL_VAR).is_none() {
        let query = build_query_params(&params)?;
        println!("{}", serde_json::to_string_pretty(&query)?);
        return Ok(());
    }

    let config = ClientConfig::from_env()?;
    let path = std::env::args().nth(1).unwrap_or_else(|| "/".into());
    let client = ApiClient::new(&config);
    tracing::info!(base_url = client.base_url(), %path, "fetching");

    let response: ApiGetResponse<serde_json::Value> = client.get(&path, &params)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
