use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "redirect-cli")]
#[command(about = "Management CLI for redirect-gate", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "REDIRECT_GATE_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show resolver status
    Status,
    /// List rules
    Rules {
        /// url, hits, last_access, position or id
        #[arg(long)]
        orderby: Option<String>,
        /// asc or desc
        #[arg(long)]
        direction: Option<String>,
        /// enabled or disabled
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    /// Apply delete, enable, disable or reset to a comma-separated id list
    Bulk { action: String, items: String },
    /// List audit log entries
    Logs {
        /// redirect or not_found
        #[arg(long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!("{}/_redirects", cli.url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/status", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Rules {
            orderby,
            direction,
            status,
            group,
        } => {
            let query: Vec<(&str, String)> = [
                ("orderby", orderby),
                ("direction", direction),
                ("status", status),
                ("group", group),
            ]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();
            client
                .get(format!("{}/rules", base))
                .query(&query)
                .headers(headers)
                .send()
                .await?
        }
        Commands::Bulk { action, items } => {
            client
                .post(format!("{}/rules/bulk", base))
                .headers(headers)
                .json(&json!({ "action": action, "items": items }))
                .send()
                .await?
        }
        Commands::Logs { kind } => {
            let query: Vec<(&str, String)> = kind.map(|k| ("kind", k)).into_iter().collect();
            client
                .get(format!("{}/logs", base))
                .query(&query)
                .headers(headers)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
