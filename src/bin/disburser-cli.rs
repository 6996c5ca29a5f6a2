use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "disburser-cli")]
#[command(about = "Management CLI for the treasury disbursement service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "DISBURSER_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show identity and connection state
    Status,
    /// Check the service is up
    Health,
    /// Show the custodial account balance
    Balance,
    /// Transfer funds to an address
    Transfer {
        /// Destination address
        #[arg(long)]
        to: String,
        /// Amount in ETH
        #[arg(long)]
        amount: f64,
        /// Gas price override in gwei
        #[arg(long)]
        gas_price_gwei: Option<f64>,
    },
    /// Transfer funds to the configured treasury
    Sweep {
        /// Amount in ETH
        #[arg(long)]
        amount: f64,
    },
    /// Estimate a payout and pay it if the account can cover it
    Disburse {
        /// Principal in ETH
        #[arg(long)]
        principal: Option<f64>,
        /// Destination (defaults to the configured treasury)
        #[arg(long)]
        destination: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/status", base)).send().await?,
        Commands::Health => client.get(format!("{}/health", base)).send().await?,
        Commands::Balance => client.get(format!("{}/balance", base)).send().await?,
        Commands::Transfer {
            to,
            amount,
            gas_price_gwei,
        } => {
            let mut body = json!({ "to": to, "amount": amount });
            if let Some(gwei) = gas_price_gwei {
                body["gasPriceGwei"] = json!(gwei);
            }
            client
                .post(format!("{}/transfers", base))
                .json(&body)
                .send()
                .await?
        }
        Commands::Sweep { amount } => {
            client
                .post(format!("{}/transfers/treasury", base))
                .json(&json!({ "amount": amount }))
                .send()
                .await?
        }
        Commands::Disburse {
            principal,
            destination,
        } => {
            let mut body = json!({});
            if let Some(principal) = principal {
                body["principal"] = json!(principal);
            }
            if let Some(destination) = destination {
                body["destination"] = json!(destination);
            }
            client
                .post(format!("{}/disbursements", base))
                .json(&body)
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
        eprintln!("Error: service returned status {}", status);
        match serde_json::from_str::<Value>(&text) {
            Ok(json) => eprintln!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) => eprintln!("Response: {}", text),
        }
        std::process::exit(1);
    }

    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
