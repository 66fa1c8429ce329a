//! `tripforge plan`: plan one trip from the command line.
//!
//! The request comes either from flags or from a JSON file holding a
//! `TripRequest` (bare, or wrapped as `{"prompt": ...}` like the HTTP body).
//! The plan is printed to stdout as `{"result": TripPlan}`.

use clap::Args;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tripforge_config::AppConfig;
use tripforge_core::trip::TripRequest;
use tripforge_planner::{Provenance, TripPlanner};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Read the request from a JSON file ("-" for stdin)
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub request: Option<PathBuf>,

    /// Origin location
    #[arg(long)]
    pub from: Option<String>,

    /// Destination location
    #[arg(long)]
    pub to: Option<String>,

    #[arg(long, default_value = "")]
    pub start_date: String,

    #[arg(long, default_value = "")]
    pub end_date: String,

    /// Trip name
    #[arg(long, default_value = "")]
    pub name: String,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long, default_value = "cli")]
    pub user_id: String,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

impl PlanArgs {
    /// Build the request from the file or the flags.
    pub fn to_request(&self) -> Result<TripRequest, Box<dyn std::error::Error>> {
        if let Some(path) = &self.request {
            let raw = if path.as_os_str() == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(path)
                    .map_err(|e| format!("cannot read {}: {e}", path.display()))?
            };
            return parse_request(&raw);
        }

        let (Some(from), Some(to)) = (&self.from, &self.to) else {
            return Err("either --request or both --from and --to are required".into());
        };

        Ok(TripRequest {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            start_position: from.clone(),
            end_position: to.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
        })
    }
}

fn parse_request(raw: &str) -> Result<TripRequest, Box<dyn std::error::Error>> {
    let mut value: serde_json::Value = serde_json::from_str(raw)?;
    let inner = match value.get_mut("prompt") {
        Some(prompt) => prompt.take(),
        None => value,
    };
    Ok(serde_json::from_value(inner)?)
}

pub async fn run(args: PlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let request = args.to_request()?;

    if !config.has_api_key() {
        eprintln!("warning: no API key configured; set TRIPFORGE_API_KEY or GEMINI_API_KEY");
    }

    let router = tripforge_providers::router::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;
    let search = Arc::new(tripforge_tools::GoogleSearchProvider::from_config(&config.search));
    let planner = TripPlanner::from_config(&config, provider, search)?;

    tracing::info!(
        from = %request.start_position,
        to = %request.end_position,
        model = %planner.model(),
        "Planning trip"
    );
    let outcome = planner.run(&request).await?;
    tracing::debug!(
        rounds = outcome.rounds,
        searches = outcome.search_calls,
        "Planning finished"
    );
    if let Provenance::Fallback(reason) = &outcome.provenance {
        eprintln!("warning: returning a placeholder plan ({reason})");
    }

    let body = serde_json::json!({ "result": outcome.plan });
    let text = if args.pretty {
        serde_json::to_string_pretty(&body)?
    } else {
        serde_json::to_string(&body)?
    };
    println!("{text}");

    Ok(())
}
