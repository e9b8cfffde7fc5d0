//! zilfs - encrypted single-file directory containers.
//!
//! Packs a directory into an AES-256-GCM sealed container, restores it, and
//! manages labelled snapshots of it.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use zilfs::container::{is_valid_container, read_header};
use zilfs::{
    diff_snapshots, snapshot_container, ContainerCodec, ContainerConfig, Key, KeyDerivation,
    Transport,
};

#[derive(Parser)]
#[command(name = "zilfs")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Encrypted single-file containers for directory trees",
    long_about = "Packs a directory into an authenticated-encrypted container, restores it, and takes labelled snapshots with rollback detection."
)]
struct Cli {
    /// Default log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into a container
    Pack {
        /// Directory to pack
        src: PathBuf,

        /// Container to write (replaced if it exists)
        container: PathBuf,

        /// Stream the archive through the cipher; large files become sparse placeholders
        #[arg(long)]
        stream: bool,
    },

    /// Unpack a container into a directory
    Unpack {
        /// Container to read
        container: PathBuf,

        /// Destination directory
        dest: PathBuf,
    },

    /// Take a labelled snapshot of a container
    Snapshot {
        /// Container to snapshot
        container: PathBuf,

        /// Snapshot label (used in the snapshot's file name)
        label: String,
    },

    /// List files whose content differs between two containers
    Diff {
        /// First container
        a: PathBuf,

        /// Second container
        b: PathBuf,
    },

    /// Show the clear-text header of a container
    Info {
        /// Container to inspect
        container: PathBuf,
    },

    /// Authenticate the whole payload without extracting it
    Verify {
        /// Container to check
        container: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str) {
    let level: tracing::Level = log_level.parse().unwrap_or(tracing::Level::WARN);
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .compact()
        .with_writer(io::stderr)
        .with_env_filter(env_filter)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let codec = ContainerCodec::new(ContainerConfig::from_env())?;

    match cli.command {
        Commands::Pack {
            src,
            container,
            stream,
        } => cmd_pack(&codec, &src, &container, stream),

        Commands::Unpack { container, dest } => cmd_unpack(&codec, &container, &dest),

        Commands::Snapshot { container, label } => cmd_snapshot(&codec, &container, &label),

        Commands::Diff { a, b } => cmd_diff(&codec, &a, &b),

        Commands::Info { container } => cmd_info(&container),

        Commands::Verify { container } => cmd_verify(&codec, &container),
    }
}

fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    match rpassword::prompt_password(prompt) {
        Ok(password) => Ok(password),
        Err(_) => {
            eprint!("{}", prompt);
            io::stderr().flush()?;
            let mut password = String::new();
            io::stdin().read_line(&mut password)?;
            Ok(password.trim().to_string())
        }
    }
}

/// Derive the key of an existing container from its recorded salt.
fn open_key(container: &Path) -> anyhow::Result<Key> {
    let header = read_header(container)
        .with_context(|| format!("reading header of {}", container.display()))?;
    let salt = header.kdf_salt.with_context(|| {
        format!(
            "{} carries no key-derivation salt; it was not packed from a password",
            container.display()
        )
    })?;

    let password = prompt_password("Password: ")?;
    Ok(KeyDerivation::from_hex_salt(&salt)?.derive_key(&password)?)
}

fn cmd_pack(codec: &ContainerCodec, src: &Path, container: &Path, stream: bool) -> anyhow::Result<()> {
    let existing_salt = if is_valid_container(container) {
        read_header(container)?.kdf_salt
    } else {
        None
    };

    let key = match existing_salt {
        Some(salt) => {
            let password = prompt_password("Password: ")?;
            KeyDerivation::from_hex_salt(&salt)?.derive_key(&password)?
        }
        None => {
            let password = prompt_password("New password: ")?;
            let confirm = prompt_password("Confirm password: ")?;
            if password != confirm {
                bail!("passwords do not match");
            }
            KeyDerivation::new().derive_key(&password)?
        }
    };

    let transport = if stream {
        Transport::Streamed
    } else {
        Transport::Buffered
    };
    codec
        .pack(src, container, &key, transport)
        .with_context(|| format!("packing {}", src.display()))?;

    println!(
        "Packed {} into {} ({})",
        src.display(),
        container.display(),
        transport.magic()
    );
    Ok(())
}

fn cmd_unpack(codec: &ContainerCodec, container: &Path, dest: &Path) -> anyhow::Result<()> {
    let key = open_key(container)?;
    let report = codec
        .unpack_dir(container, dest, &key)
        .with_context(|| format!("unpacking {}", container.display()))?;

    println!("Unpacked {} into {}", container.display(), dest.display());
    println!("  Directories:    {}", report.directories);
    println!("  Files:          {}", report.files);
    println!("  Sparse files:   {}", report.placeholders);
    if report.skipped > 0 {
        println!("  Skipped:        {}", report.skipped);
    }
    Ok(())
}

fn cmd_snapshot(codec: &ContainerCodec, container: &Path, label: &str) -> anyhow::Result<()> {
    let key = open_key(container)?;
    let snapshot = snapshot_container(codec, container, &key, label)?;
    println!("Snapshot '{}' written to {}", label, snapshot.display());
    Ok(())
}

fn cmd_diff(codec: &ContainerCodec, a: &Path, b: &Path) -> anyhow::Result<()> {
    let salt_a = read_header(a)?.kdf_salt;
    let salt_b = read_header(b)?.kdf_salt;
    if salt_a != salt_b {
        bail!(
            "{} and {} were sealed with different keys",
            a.display(),
            b.display()
        );
    }

    let key = open_key(a)?;
    let diff = diff_snapshots(codec, a, b, &key)?;

    if diff.is_empty() {
        println!("(no differences)");
    }
    for (path, (left, right)) in &diff {
        let marker = match (left.is_empty(), right.is_empty()) {
            (true, _) => '+',
            (_, true) => '-',
            _ => '~',
        };
        println!("{} {}", marker, path);
    }
    Ok(())
}

fn cmd_info(container: &Path) -> anyhow::Result<()> {
    let header = read_header(container)
        .with_context(|| format!("reading header of {}", container.display()))?;

    println!("Container Information");
    println!("=====================");
    println!("Path:             {}", container.display());
    println!("Transport:        {}", header.magic.magic());
    println!("Version:          {}", header.version);
    println!(
        "Label:            {}",
        header.label.as_deref().unwrap_or("-")
    );
    println!(
        "Latest snapshot:  {}",
        header.latest_snapshot_id.as_deref().unwrap_or("-")
    );
    println!(
        "Password-derived: {}",
        if header.kdf_salt.is_some() { "yes" } else { "no" }
    );
    if header.has_diverged() {
        println!("Lineage:          diverged (mount requires force)");
    }

    if !header.snapshots.is_empty() {
        println!();
        println!("Snapshots:");
        for (label, timestamp) in &header.snapshots {
            println!("  {:<16} {}", label, timestamp);
        }
    }
    Ok(())
}

fn cmd_verify(codec: &ContainerCodec, container: &Path) -> anyhow::Result<()> {
    let key = open_key(container)?;
    codec.verify(container, &key)?;
    println!("✓ {} is intact", container.display());
    Ok(())
}
