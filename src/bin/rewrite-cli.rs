use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "rewrite-cli")]
#[command(about = "Management CLI for DNS rewrites", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:3000")]
    url: String,

    /// API key; sent as a bearer token when set.
    #[arg(short, long, default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service status and rule counts
    Status,
    /// List all rewrites
    List,
    /// Add a rewrite
    Add { domain: String, answer: String },
    /// Delete every rewrite equal to the given one
    Delete { domain: String, answer: String },
    /// Check how a hostname is rewritten
    Check {
        name: String,
        #[arg(short, long, default_value = "A")]
        qtype: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if !cli.key.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
        );
    }

    let base = cli.url.trim_end_matches('/');
    let res = match cli.command {
        Commands::Status => {
            client.get(format!("{}/control/status", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::List => {
            client.get(format!("{}/control/rewrite/list", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Add { domain, answer } => {
            client.post(format!("{}/control/rewrite/add", base))
                .headers(headers)
                .json(&json!({ "domain": domain, "answer": answer }))
                .send()
                .await?
        }
        Commands::Delete { domain, answer } => {
            client.post(format!("{}/control/rewrite/delete", base))
                .headers(headers)
                .json(&json!({ "domain": domain, "answer": answer }))
                .send()
                .await?
        }
        Commands::Check { name, qtype } => {
            client.get(format!("{}/control/rewrite/check", base))
                .headers(headers)
                .query(&[("name", name), ("qtype", qtype)])
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if !text.is_empty() {
            eprintln!("{}", text);
        }
        std::process::exit(1);
    }

    if text.is_empty() {
        println!("OK");
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
