use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "payfast-cli")]
#[command(about = "Management CLI for the PayFast API gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:5000")]
    url: String,

    #[arg(short, long, env = "PAYFAST_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// Show the bank circuit breaker
    Circuit,
    /// Force the bank circuit breaker closed
    ResetCircuit,
    /// Make the simulated bank fail every charge
    BankFail,
    /// Let the simulated bank succeed again
    BankRecover,
    /// Show the rate limit policy and tracked clients
    RateLimits,
    /// Create a payment intent
    Pay {
        /// Amount in minor currency units
        amount: i64,
        #[arg(short, long)]
        payment_method: Option<String>,
        #[arg(short, long)]
        currency: Option<String>,
        #[arg(short, long)]
        return_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let admin = |path: &str| format!("{}/admin/{}", cli.url, path);

    let res = match cli.command {
        Commands::Status => client.get(admin("status")).headers(headers).send().await?,
        Commands::Circuit => client.get(admin("circuit")).headers(headers).send().await?,
        Commands::ResetCircuit => {
            client.post(admin("circuit/reset")).headers(headers).send().await?
        }
        Commands::BankFail => {
            client
                .put(admin("bank/failure"))
                .headers(headers)
                .json(&json!({ "failing": true }))
                .send()
                .await?
        }
        Commands::BankRecover => {
            client
                .put(admin("bank/failure"))
                .headers(headers)
                .json(&json!({ "failing": false }))
                .send()
                .await?
        }
        Commands::RateLimits => client.get(admin("rate-limits")).headers(headers).send().await?,
        Commands::Pay {
            amount,
            payment_method,
            currency,
            return_url,
        } => {
            let mut body = json!({ "amount": amount });
            if let Some(pm) = payment_method {
                body["payment_method"] = json!(pm);
            }
            if let Some(currency) = currency {
                body["currency"] = json!(currency);
            }
            if let Some(url) = return_url {
                body["return_url"] = json!(url);
            }
            client
                .post(format!("{}/v2/payment-intents", cli.url))
                .json(&body)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(retry_after) = res.headers().get("retry-after") {
        eprintln!("Retry-After: {}", retry_after.to_str().unwrap_or("?"));
    }
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
