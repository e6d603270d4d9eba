//! Visit Photos Vault - CLI
//!
//! Maintenance tool for a photo data directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use visit_photos_vault::{
    crypto, BlobStore, ContentId, FileSecretStore, FsBlobStore, KeyVault, PhotoPipeline,
    PhotoReference, VaultSettings,
};

#[derive(Parser)]
#[command(name = "visit-photos")]
#[command(version = visit_photos_vault::VERSION)]
#[command(about = "Visit Photos Vault - encrypted photo storage maintenance")]
struct Cli {
    /// Data directory (config, sealed keystore, photo blobs)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keystore PIN
    #[arg(short, long, global = true, env = "VISIT_PHOTOS_PIN", hide_env_values = true)]
    pin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store photos; prints one identifier per input, in order
    Store {
        /// Image files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Decrypt a photo to a JPEG file
    Load {
        /// Photo identifier
        id: String,

        /// Output path
        output: PathBuf,
    },

    /// Delete photos
    Delete {
        /// Photo identifiers
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List stored photo identifiers
    List,

    /// Check that photos decrypt and authenticate (all photos if none given)
    Verify {
        /// Photo identifiers
        ids: Vec<String>,
    },

    /// Print the SHA-256 digest of a file
    Digest {
        path: PathBuf,
    },

    /// Permanently delete the photo key; every stored photo becomes unreadable
    ForgetKey {
        /// Confirm the irreversible deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Digest { path } => {
            let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            println!("{}  {}", crypto::digest(&data), path.display());
        }

        Commands::Store { paths } => {
            let pipeline = open_pipeline(&cli)?;

            let mut images = Vec::with_capacity(paths.len());
            for path in paths {
                images.push(std::fs::read(path).with_context(|| format!("reading {}", path.display()))?);
            }

            let report = pipeline.store_photos(images).await;
            for (path, result) in paths.iter().zip(report.results()) {
                match result {
                    Ok(id) => println!("{}\t{}", id, path.display()),
                    Err(e) => println!("FAILED\t{}\t{}", path.display(), e),
                }
            }
            if let Some((index, err)) = report.first_error() {
                bail!("storing {} failed: {}", paths[index].display(), err);
            }
        }

        Commands::Load { id, output } => {
            let pipeline = open_pipeline(&cli)?;
            let id: ContentId = id.parse()?;

            let bytes = pipeline.load_photo_bytes(id).await?;
            std::fs::write(output, &*bytes).with_context(|| format!("writing {}", output.display()))?;
            println!("Photo {} written to {}", id, output.display());
        }

        Commands::Delete { ids } => {
            let pipeline = open_pipeline(&cli)?;
            let reference = PhotoReference::parse(ids.as_slice())?;

            let report = pipeline.delete_photos(&reference).await;
            println!("Deleted: {}  Already absent: {}", report.deleted, report.missing);
            for (id, reason) in &report.failed {
                println!("FAILED\t{}\t{}", id, reason);
            }
        }

        Commands::List => {
            let settings = VaultSettings::load(&data_dir(&cli)?)?;
            let store = FsBlobStore::new(&settings.storage_path(&data_dir(&cli)?));
            let ids = store.list()?;

            if ids.is_empty() {
                println!("No photos stored");
            }
            for id in ids {
                println!("{}", id);
            }
        }

        Commands::Verify { ids } => {
            let pipeline = open_pipeline(&cli)?;
            let ids = if ids.is_empty() {
                pipeline.blob_store().list()?
            } else {
                PhotoReference::parse(ids.as_slice())?.ids().to_vec()
            };

            let report = pipeline.audit(&ids).await?;
            println!("Healthy:    {}", report.healthy.len());
            println!("Missing:    {}", report.missing.len());
            println!("Damaged:    {}", report.damaged.len());
            println!("Unreadable: {}", report.unreadable.len());
            for id in report.missing.iter().chain(&report.damaged) {
                println!("  - {}", id);
            }
            for (id, reason) in &report.unreadable {
                println!("  - {}: {}", id, reason);
            }
            if !report.is_healthy() {
                bail!("integrity check failed");
            }
        }

        Commands::ForgetKey { yes } => {
            if !yes {
                bail!("refusing to delete the photo key without --yes; all stored photos would become unreadable");
            }
            let pipeline = open_pipeline(&cli)?;
            pipeline.key_vault().delete_key()?;
            println!("Photo key deleted");
        }
    }

    Ok(())
}

fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
    match &cli.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => dirs::data_dir()
            .map(|dir| dir.join("visit-photos"))
            .context("no data directory available; pass --data-dir"),
    }
}

fn open_pipeline(cli: &Cli) -> anyhow::Result<PhotoPipeline> {
    let data_dir = data_dir(cli)?;
    let settings = VaultSettings::load(&data_dir)?;

    let pin = cli
        .pin
        .clone()
        .context("a PIN is required (--pin or VISIT_PHOTOS_PIN)")?;
    let secrets = Arc::new(FileSecretStore::new(&data_dir));
    secrets.unlock(&SecretString::new(pin))?;

    let keys = Arc::new(KeyVault::new(secrets).key_name(settings.key_name.clone()));
    let store = Arc::new(FsBlobStore::new(&settings.storage_path(&data_dir)));

    Ok(PhotoPipeline::new(keys, store, settings.pipeline)?)
}
