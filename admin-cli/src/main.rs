use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trustboot::secrets::{decrypt_secret, encrypt_secret};
use trustboot::{AppConfig, Bootstrapper, CryptoKey, KeyDeriver};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "trustboot-admin")]
#[command(about = "Admin CLI for trustboot secrets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a value for use as a TRUSTBOOT_SECRETS__* variable
    Encrypt(ValueArgs),
    /// Decrypt a previously encrypted value
    Decrypt(ValueArgs),
    /// Run the bootstrap against the current environment and report
    Check,
}

#[derive(Args)]
struct ValueArgs {
    /// Deployment key fragment (prompted for when omitted)
    #[arg(long, env = "TRUSTBOOT_SECRETS__KEY_FRAGMENT", hide_env_values = true)]
    fragment: Option<String>,

    /// Value to process
    #[arg(long, conflicts_with = "file")]
    value: Option<String>,

    /// Read the value from a file, e.g. a PEM certificate
    #[arg(long)]
    file: Option<PathBuf>,
}

impl ValueArgs {
    fn key(&self) -> anyhow::Result<CryptoKey> {
        let fragment = match &self.fragment {
            Some(fragment) => Zeroizing::new(fragment.clone()),
            None => Zeroizing::new(
                rpassword::prompt_password_stderr("Key fragment: ")
                    .context("failed to read key fragment")?,
            ),
        };
        Ok(KeyDeriver::new().derive_key(&fragment)?)
    }

    fn input(&self) -> anyhow::Result<Zeroizing<String>> {
        match (&self.value, &self.file) {
            (Some(value), None) => Ok(Zeroizing::new(value.clone())),
            (None, Some(path)) => fs::read_to_string(path)
                .map(Zeroizing::new)
                .with_context(|| format!("failed to read {}", path.display())),
            _ => bail!("either --value or --file is required"),
        }
    }
}

fn check() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    let result = Bootstrapper::new(config.secrets.clone())
        .policy(config.policy)
        .bootstrap();

    let key = if result.crypto_key().is_some() { "ready" } else { "failed" };
    println!("crypto key:          {}", key);
    println!(
        "server certificate:  {}",
        describe(result.server_certificate().map(|c| c.is_some()))
    );
    println!(
        "client certificate:  {}",
        describe(result.client_certificate().map(|c| c.is_some()))
    );
    println!(
        "CA trust pool:       {}",
        describe(result.trust_pool().map(|p| p.is_some()))
    );

    match result.failure() {
        None => {
            println!("\nall steps succeeded");
            Ok(())
        }
        Some(failure) => {
            println!();
            for (i, err) in failure.iter().enumerate() {
                println!("[{}] {}: {}", i + 1, err.step(), err);
            }
            bail!("{} bootstrap step(s) failed", failure.len())
        }
    }
}

fn describe<E>(state: Result<bool, E>) -> &'static str {
    match state {
        Ok(true) => "ready",
        Ok(false) => "not configured",
        Err(_) => "failed",
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "trustboot=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Before parsing, so --fragment can fall back to a .env entry.
    // A missing .env file is fine
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Encrypt(args) => {
            let key = args.key()?;
            let input = args.input()?;
            println!("{}", encrypt_secret(&key, &input)?);
            Ok(())
        }
        Commands::Decrypt(args) => {
            let key = args.key()?;
            let input = args.input()?;
            let plaintext = Zeroizing::new(decrypt_secret(&key, &input)?);
            println!("{}", plaintext.as_str());
            Ok(())
        }
        Commands::Check => check(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_read_from_dotenv_file() {
        let path = std::env::temp_dir().join(format!("trustboot-admin-{}.env", std::process::id()));
        fs::write(&path, "TRUSTBOOT_SECRETS__KEY_FRAGMENT=0123456789012345\n").unwrap();
        dotenvy::from_path(&path).unwrap();
        fs::remove_file(&path).unwrap();

        let cli = Cli::try_parse_from(["trustboot-admin", "encrypt", "--value", "hello"]).unwrap();
        let args = match cli.command {
            Commands::Encrypt(args) => args,
            _ => panic!("expected encrypt"),
        };
        assert_eq!(args.fragment.as_deref(), Some("0123456789012345"));

        let sealed = encrypt_secret(&args.key().unwrap(), &args.input().unwrap()).unwrap();
        assert_eq!(decrypt_secret(&args.key().unwrap(), &sealed).unwrap(), "hello");
    }
}
