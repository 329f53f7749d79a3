//! This module contains the main entrypoint to the verdict cli.

use clap::Clap;
use colored::Colorize;
use std::path::PathBuf;
use verdict_deps::tracing_subscriber;
use verdict_util::error::Result;

#[derive(Clap)]
#[clap(
	about = "Serve predictions for a tabular dataset model.",
	setting = clap::AppSettings::DisableHelpSubcommand,
)]
enum Options {
	#[clap(name = "serve")]
	Serve(Box<ServeOptions>),
}

#[derive(Clap, Debug)]
#[clap(about = "run the inference server")]
struct ServeOptions {
	#[clap(long, env = "HOST", default_value = "0.0.0.0")]
	host: std::net::IpAddr,
	#[clap(long, env = "PORT", default_value = "8080")]
	port: u16,
	#[clap(long, about = "the path to the dataset schema json file")]
	schema: PathBuf,
	#[clap(long, about = "the path to the model artifact file")]
	model: PathBuf,
}

fn main() {
	let options = Options::parse();
	// The subscriber is installed once for the lifetime of the process, before any request is handled. Handlers only emit events through the global dispatcher.
	init_tracing();
	let result = match options {
		Options::Serve(options) => cli_serve(*options),
	};
	if let Err(error) = result {
		eprintln!("{}: {}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

fn init_tracing() {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn cli_serve(options: ServeOptions) -> Result<()> {
	verdict_app::run(verdict_app::Options {
		host: options.host,
		port: options.port,
		schema: options.schema,
		model: options.model,
	})
}
