// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use clap::Parser;
use draftsearch_server::{config::ServerConfig, init_tracing, run_server};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "DRAFTSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(long, env = "DRAFTSEARCH_HTTP_ADDR")]
    http_addr: Option<String>,

    /// Rounds per search (overrides config file)
    #[arg(long)]
    iterations: Option<usize>,

    /// Simulations per round (overrides config file)
    #[arg(long)]
    simulations: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long, env = "DRAFTSEARCH_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    // Load configuration
    let mut config = ServerConfig::load(args.config)?;

    // Apply CLI overrides
    if let Some(addr) = args.http_addr {
        config.server.listen_addr = addr;
    }
    if let Some(iterations) = args.iterations {
        config.core.search.max_iterations = iterations;
    }
    if let Some(simulations) = args.simulations {
        config.core.search.max_simulations = simulations;
    }

    run_server(config).await
}
