//! Interactive entry point: prompts for the account and key, then claims every
//! matured position.
//!
//! Run with:
//!   cargo run --release
//!   MINTCLAIM_RPC_URL=http://localhost:8545 MINTCLAIM_CACHE_PATH=dev.csv cargo run
//!
//! `RUST_LOG=debug` shows RPC traffic.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use mintclaim::config::ENV_ACCOUNT;
use mintclaim::{Address, BatchDriver, ClaimerConfig, JsonRpcGateway, SigningKey};
use secrecy::SecretString;

fn prompt_line(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn read_account() -> Result<Address, Box<dyn std::error::Error>> {
    let raw = match std::env::var(ENV_ACCOUNT) {
        Ok(v) => v,
        Err(_) => prompt_line("Enter your account address: ")?,
    };
    Ok(raw.parse()?)
}

/// The key is wrapped immediately and dropped (zeroised) when the run ends.
fn read_signing_key(account: &Address) -> Result<SigningKey, Box<dyn std::error::Error>> {
    let secret = SecretString::from(rpassword::prompt_password("Enter your private key: ")?);
    let key = SigningKey::new(secret)?;
    key.ensure_controls(account)?;
    Ok(key)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Welcome to the XENFT Claiming Tool");
    let config = ClaimerConfig::from_env()?;
    log::info!(
        "endpoint {} contract {} chain id {}",
        config.endpoint,
        config.contract_address,
        config.chain_id
    );

    let account = read_account()?;
    let key = read_signing_key(&account)?;

    let gateway = JsonRpcGateway::new(config.endpoint_url()?, config.contract_address)?;
    let driver = BatchDriver::new(gateway, config);
    let summary = driver.run_batch(&account, &key).await?;
    drop(key);

    println!("{summary}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
