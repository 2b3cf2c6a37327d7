use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "keygate-cli")]
#[command(about = "Manage access keys on a running keygate proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Operator bearer token (`admin.api_key`)
    #[arg(short, long, env = "KEYGATE_ADMIN_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every stored key
    List,
    /// Issue a new key
    Create {
        #[arg(long)]
        region: String,
        /// Lifetime in seconds: 3600, 86400, 604800, 2592000, or 0 for unlimited
        #[arg(long, default_value_t = 0)]
        lifetime: u64,
    },
    /// Delete a key by id
    Delete { id: String },
    /// Check proxy status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let res = match cli.command {
        Commands::List => client.get(format!("{}/keys", base)).headers(headers).send().await?,
        Commands::Create { region, lifetime } => {
            client
                .post(format!("{}/keys", base))
                .headers(headers)
                .json(&json!({ "region": region, "lifetime": lifetime }))
                .send()
                .await?
        }
        Commands::Delete { id } => {
            client
                .delete(format!("{}/keys/{}", base, id))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Status => client.get(format!("{}/health", base)).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let body = res.bytes().await?;
    if body.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_slice(&body)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
