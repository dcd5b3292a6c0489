#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use emberchain::error::Result;
use emberchain::wallet;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "emberchain-wallet", version, about = "Emberchain keystore management")]
struct Cli {
    /// Data directory containing the keystore
    #[arg(long, default_value = "./data")]
    datadir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new account and store its key in the keystore
    NewAccount,
    /// List the accounts in the keystore
    List,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::NewAccount => {
            let account = wallet::new_account(&cli.datadir)?;
            println!("New account: {}", account);
            println!(
                "Key stored under {}",
                wallet::keystore_dir(&cli.datadir).display()
            );
        }
        Command::List => {
            let accounts = wallet::list_accounts(&cli.datadir)?;
            if accounts.is_empty() {
                println!("Keystore is empty");
            }
            for account in accounts {
                println!("{}", account);
            }
        }
    }

    Ok(())
}
