use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "cfgstore-cli")]
#[command(about = "Management CLI for the cfgstore daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// List persisted namespaces
    Namespaces,
    /// Print a namespace map, or one value
    Get { namespace: String, key: Option<String> },
    /// Set one value
    Set {
        namespace: String,
        key: String,
        value: String,
    },
    /// Delete one value
    Unset { namespace: String, key: String },
    /// List registered plugins
    Plugins,
    /// Upload plugin content from a local file
    PluginContent { key: String, file: PathBuf },
    /// Write an encrypted backup on the device
    Backup {
        path: String,
        /// Defaults to the module password
        #[arg(short, long, default_value = "")]
        password: String,
    },
    /// Restore a backup; the daemon restarts afterwards
    Restore {
        path: String,
        #[arg(short, long, default_value = "")]
        password: String,
    },
    /// Print a file from the device
    Cat { path: String },
    /// List a directory on the device
    Ls { path: String },
    /// Change the module password
    Passwd {
        new_password: String,
        /// Current password; omit while none is set
        #[arg(short, long, default_value = "")]
        old: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = format!("{}/api", cli.url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/status", api)),
        Commands::Namespaces => client.get(format!("{}/namespaces", api)),
        Commands::Get { namespace, key } => match key {
            Some(key) => client.get(format!("{}/namespaces/{}/{}", api, namespace, key)),
            None => client.get(format!("{}/namespaces/{}", api, namespace)),
        },
        Commands::Set {
            namespace,
            key,
            value,
        } => client
            .put(format!("{}/namespaces/{}/{}", api, namespace, key))
            .json(&json!({ "value": value })),
        Commands::Unset { namespace, key } => {
            client.delete(format!("{}/namespaces/{}/{}", api, namespace, key))
        }
        Commands::Plugins => client.get(format!("{}/plugins", api)),
        Commands::PluginContent { key, file } => client
            .put(format!("{}/plugins/{}/content", api, key))
            .body(tokio::fs::read(&file).await?),
        Commands::Backup { path, password } => client
            .post(format!("{}/backup", api))
            .json(&json!({ "path": path, "password": password })),
        Commands::Restore { path, password } => client
            .post(format!("{}/restore", api))
            .json(&json!({ "path": path, "password": password })),
        Commands::Cat { path } => {
            let res = client
                .get(format!("{}/files", api))
                .query(&[("path", path)])
                .headers(headers)
                .send()
                .await?;
            return print_raw(res).await;
        }
        Commands::Ls { path } => client.get(format!("{}/dir", api)).query(&[("path", path)]),
        Commands::Passwd { new_password, old } => client
            .put(format!("{}/forms/password", api))
            .json(&json!({
                "old_password": old,
                "new_password": new_password,
                "confirm": new_password,
            })),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("OK");
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_raw(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        std::process::exit(1);
    }
    print!("{}", String::from_utf8_lossy(&res.bytes().await?));
    Ok(())
}
