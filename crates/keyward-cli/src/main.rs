//! keyward CLI - operator tooling
//!
//! Usage:
//!   keyward gen-key [--bytes N]
//!   keyward hash-password <password>
//!   keyward issue-token --subject <email> [--ttl-ms N]
//!   keyward verify-token <jwt>
//!   keyward migrate

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use keyward_api::auth::{
    generate_secret, signing::MIN_KEY_BYTES, AccessTokenCodec, Argon2Verifier, PasswordConfig,
    PasswordVerifier, SigningKey,
};
use keyward_core::{AppConfig, PgDatabase, SystemClock};

#[derive(Parser)]
#[command(name = "keyward")]
#[command(about = "Credential lifecycle operator tooling")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a base64 signing key for JWT_SECRET
    GenKey {
        /// Key length in bytes
        #[arg(long, default_value_t = 48)]
        bytes: usize,
    },
    /// Hash a password with the configured Argon2id parameters
    HashPassword { password: String },
    /// Issue an access token for a subject
    IssueToken {
        /// Login e-mail carried as `sub`
        #[arg(long)]
        subject: String,
        /// Lifetime in milliseconds; defaults to the configured access TTL
        #[arg(long)]
        ttl_ms: Option<i64>,
    },
    /// Verify an access token and print its claims
    VerifyToken { token: String },
    /// Apply database migrations to DATABASE_URL
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config).context("Failed to load configuration")?;

    match cli.command {
        Commands::GenKey { bytes } => {
            if bytes < MIN_KEY_BYTES {
                bail!("key must be at least {MIN_KEY_BYTES} bytes");
            }
            println!("{}", generate_secret(bytes));
        }
        Commands::HashPassword { password } => {
            let verifier = Argon2Verifier::new(&PasswordConfig::from(&config.password))?;
            println!("{}", verifier.hash(&password)?);
        }
        Commands::IssueToken { subject, ttl_ms } => {
            let codec = codec(&config)?;
            let token = match ttl_ms {
                Some(ms) if ms <= 0 => bail!("--ttl-ms must be positive"),
                Some(ms) => codec.issue_with_ttl(&subject, chrono::Duration::milliseconds(ms))?,
                None => codec.issue(&subject)?,
            };
            println!("{token}");
        }
        Commands::VerifyToken { token } => {
            let claims = codec(&config)?.verify(&token)?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Commands::Migrate => {
            let db = PgDatabase::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            db.migrate().await.context("Failed to apply migrations")?;
            println!("Migrations applied");
        }
    }

    Ok(())
}

fn codec(config: &AppConfig) -> anyhow::Result<AccessTokenCodec> {
    if config.tokens.uses_development_secret() {
        tracing::warn!("JWT_SECRET is not set; using the development signing key");
    }
    let key = SigningKey::from_base64(&config.tokens.secret)?;
    Ok(AccessTokenCodec::new(
        key,
        config.tokens.issuer.clone(),
        config.tokens.access_token_ttl(),
        Arc::new(SystemClock),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_issue_token() {
        let cli = Cli::try_parse_from([
            "keyward",
            "issue-token",
            "--subject",
            "a@x.com",
            "--ttl-ms",
            "60000",
        ])
        .unwrap();

        match cli.command {
            Commands::IssueToken { subject, ttl_ms } => {
                assert_eq!(subject, "a@x.com");
                assert_eq!(ttl_ms, Some(60_000));
            }
            _ => panic!("expected issue-token"),
        }
    }

    #[test]
    fn test_issued_token_verifies_with_default_config() {
        let codec = codec(&AppConfig::default()).unwrap();
        let token = codec.issue("a@x.com").unwrap();
        assert_eq!(codec.verify(&token).unwrap().sub, "a@x.com");
    }
}
