//! Symbol Scout - look up C/C++ symbols through clangd.
//!
//! Usage: symbol-scout <WORKSPACE> <SYMBOL>

use std::env;
use std::path::Path;
use std::process::ExitCode;
use symbol_scout_lsp::{ClangdClient, ClangdConfig, ClientError};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let (Some(workspace), Some(symbol)) = (args.get(1), args.get(2)) else {
        eprintln!("usage: symbol-scout <workspace> <symbol>");
        return ExitCode::FAILURE;
    };

    match run(workspace, symbol).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(workspace: &str, symbol: &str) -> Result<(), ClientError> {
    let root = Path::new(workspace);
    let mut client = ClangdClient::new(ClangdConfig::default());

    client.start(root).await?;

    for location in client.find_symbol_definition(symbol).await? {
        println!("definition: {}", location.display_relative(root));
    }

    match client.find_symbol_references(symbol).await {
        Ok(references) => {
            for location in references {
                println!("reference:  {}", location.display_relative(root));
            }
        }
        Err(ClientError::EmptyResult { .. }) => {
            println!("no references found");
        }
        Err(e) => return Err(e),
    }

    client.stop().await;
    Ok(())
}
