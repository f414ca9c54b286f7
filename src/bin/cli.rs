//! entitykv CLI Client
//!
//! Command-line interface for interacting with a running entitykv server.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use reqwest::blocking::Client;

/// entitykv CLI
#[derive(Parser, Debug)]
#[command(name = "entitykv-cli")]
#[command(about = "CLI for the entitykv HTTP service")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    let url = format!("http://{}/v0/entity", args.server);
    let client = Client::new();

    let request = match &args.command {
        Commands::Get { key } => client.get(&url).query(&[("id", key)]),
        Commands::Put { key, value } => client
            .put(&url)
            .query(&[("id", key)])
            .body(value.clone()),
        Commands::Del { key } => client.delete(&url).query(&[("id", key)]),
    };

    let response = match request.send() {
        Ok(response) => response,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let status = response.status();
    let body = match response.bytes() {
        Ok(body) => body,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if status.is_success() {
        if !body.is_empty() {
            let mut stdout = io::stdout();
            let _ = stdout.write_all(&body);
            let _ = stdout.write_all(b"\n");
        } else {
            println!("{}", status);
        }
        ExitCode::SUCCESS
    } else {
        eprintln!("{}", status);
        ExitCode::FAILURE
    }
}
