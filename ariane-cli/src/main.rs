//! Ariane CLI - operator tools for signed cookies, sessions and passkeys.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error
  65  Invalid signature, expired token or malformed data
  66  Input file not found
  78  SESSION_SECRET not set";

#[derive(Parser)]
#[command(name = "ariane")]
#[command(author, version, about = "Signed-cookie and session tools for the Ariane identity layer", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// HMAC signing secret shared with the server
    #[arg(long, global = true, env = "SESSION_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Print bare values only
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log to stderr (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a payload into `base64url(payload).base64url(mac)`
    Sign {
        /// Payload text, or `-` to read stdin
        #[arg(value_name = "PAYLOAD")]
        payload: String,
    },

    /// Verify a signed token and print its payload
    Verify {
        /// Token, or `-` to read stdin
        #[arg(value_name = "TOKEN")]
        token: String,
    },

    /// Mint or inspect session cookies
    #[command(subcommand)]
    Session(SessionCommand),

    /// Inspect OAuth state values
    #[command(subcommand)]
    State(StateCommand),

    /// Inspect the passkey credential store
    #[command(subcommand)]
    Credentials(CredentialsCommand),
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Mint a session token
    Mint {
        /// Session subject
        #[arg(long, default_value = "admin")]
        sub: String,

        /// Lifetime in seconds
        #[arg(long, default_value_t = ariane_core::SESSION_TTL_SECS)]
        ttl: u64,

        #[arg(long)]
        email: Option<String>,

        /// Identity provider, e.g. `github`
        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        login: Option<String>,

        /// Print as `session=<token>` for a Cookie header
        #[arg(long)]
        cookie: bool,
    },

    /// Verify a session token and show its claims
    Inspect {
        /// Token or `session=<token>`, or `-` to read stdin
        #[arg(value_name = "TOKEN")]
        token: String,
    },
}

#[derive(Subcommand)]
enum StateCommand {
    /// Verify an OAuth state and show the redirect it carries
    Decode {
        #[arg(value_name = "STATE")]
        state: String,

        /// Also print the derived PKCE verifier
        #[arg(long)]
        show_verifier: bool,
    },
}

#[derive(Subcommand)]
enum CredentialsCommand {
    /// List stored passkeys
    List {
        /// Path to the JSON credential document
        #[arg(long, env = "CREDENTIAL_STORE_PATH", default_value = commands::credentials::DEFAULT_STORE_PATH)]
        path: PathBuf,

        /// Only credentials for this user id
        #[arg(long)]
        user: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "ariane=info,ariane_cli=info",
        _ => "ariane=debug,ariane_cli=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let secret = cli.secret.as_deref();

    match cli.command {
        Commands::Sign { payload } => commands::token::sign(&payload, secret),
        Commands::Verify { token } => commands::token::verify(&token, secret, cli.quiet),
        Commands::Session(SessionCommand::Mint {
            sub,
            ttl,
            email,
            provider,
            login,
            cookie,
        }) => commands::session::mint(
            commands::session::MintOptions {
                sub,
                ttl_secs: ttl,
                email,
                provider,
                login,
                cookie,
            },
            secret,
        ),
        Commands::Session(SessionCommand::Inspect { token }) => {
            commands::session::inspect(&token, secret, cli.quiet)
        }
        Commands::State(StateCommand::Decode {
            state,
            show_verifier,
        }) => commands::state::decode(&state, secret, show_verifier),
        Commands::Credentials(CredentialsCommand::List { path, user, json }) => {
            commands::credentials::list(&path, user.as_deref(), json)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit = match run(cli) {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };

    if let Some(message) = &exit.message {
        eprintln!("{} {message}", "error:".red().bold());
    }
    std::process::exit(exit.code);
}
