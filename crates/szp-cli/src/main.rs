//! Command-line interface for szp signed archive containers.
//!
//! Builds a signed container from a directory, inspects one, or extracts one
//! after verifying its signer and every file's digest.

use clap::{Args, Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;
use szp::{RecordMatch, Szp, DEFAULT_CONTAINER_NAME};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "szp")]
#[command(author, version, about = "Signed, tamper-evident archive containers", long_about = None)]
struct Cli {
    /// Log pipeline progress (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack a directory into a new signed container
    #[command(after_help = "EXAMPLES:
    # Sign ./site with a PEM certificate and key, writing release.szp
    szp build --path site --name release --cert signer.pem --pkey signer.key

    # Use a PKCS#12 bundle, uncompressed
    szp build --path site --pkcs12 signer.p12 --password secret -z 0
")]
    Build(BuildArgs),

    /// Verify a container and list its files
    #[command(after_help = "EXAMPLES:
    # Trust only signer.pem, pinned to its fingerprint
    szp inspect --name release --cert signer.pem --hash 3f2a...

    # Machine-readable listing
    szp inspect --name release --cert signer.pem --json
")]
    Inspect(InspectArgs),

    /// Verify a container and unpack it
    #[command(after_help = "EXAMPLES:
    # Unpack into ./out, leaving ./out untouched on failure
    szp extract --name release --path out --cert signer.pem --staged
")]
    Extract(ExtractArgs),
}

#[derive(Args)]
struct CredentialArgs {
    /// Certificate file (PEM or DER)
    #[arg(long, env = "SZP_CERT", value_name = "FILE")]
    cert: Option<PathBuf>,

    /// PKCS#8 private key file (PEM or DER)
    #[arg(long, alias = "key", env = "SZP_KEY", value_name = "FILE")]
    pkey: Option<PathBuf>,

    /// PKCS#12 bundle holding both certificate and key
    #[arg(long, env = "SZP_PKCS12", value_name = "FILE")]
    pkcs12: Option<PathBuf>,

    /// Password for the PKCS#12 bundle
    #[arg(long, env = "SZP_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl fmt::Debug for CredentialArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialArgs")
            .field("cert", &self.cert)
            .field("pkey", &self.pkey)
            .field("pkcs12", &self.pkcs12)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CredentialArgs {
    fn apply(self, mut szp: Szp) -> Szp {
        if let Some(cert) = self.cert {
            szp = szp.certificate(cert);
        }
        if let Some(key) = self.pkey {
            szp = szp.private_key(key);
        }
        if let Some(p12) = self.pkcs12 {
            szp = szp.pkcs12(p12);
        }
        if let Some(password) = self.password {
            szp = szp.password(password);
        }
        szp
    }
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Directory (or file) to pack
    #[arg(long, value_name = "DIR")]
    path: PathBuf,

    /// Container name; ".szp" is appended when missing
    #[arg(long, default_value = DEFAULT_CONTAINER_NAME)]
    name: PathBuf,

    /// ZIP compression level (0-9, default: 6)
    /// 0 = store members uncompressed
    #[arg(short = 'z', long, default_value = "6")]
    zip_level: u32,

    #[command(flatten)]
    credentials: CredentialArgs,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Container name; ".szp" is appended when missing
    #[arg(long, default_value = DEFAULT_CONTAINER_NAME)]
    name: PathBuf,

    /// Expected SHA-256 fingerprint of the signer certificate
    #[arg(long, value_name = "HEX")]
    hash: Option<String>,

    #[command(flatten)]
    credentials: CredentialArgs,
}

impl VerifyArgs {
    fn configure(self) -> (PathBuf, Szp) {
        let mut szp = self.credentials.apply(Szp::new());
        if let Some(hash) = self.hash {
            szp = szp.expected_fingerprint(hash);
        }
        (self.name, szp)
    }
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[command(flatten)]
    verify: VerifyArgs,

    /// Print the metadata as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Destination directory
    #[arg(long, value_name = "DIR")]
    path: PathBuf,

    /// Match files to records by full path instead of basename
    #[arg(long)]
    strict: bool,

    /// Extract into a scratch directory and move into place on success
    #[arg(long)]
    staged: bool,

    #[command(flatten)]
    verify: VerifyArgs,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("szp: {} error: {}", e.kind(), e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> szp::Result<()> {
    match command {
        Commands::Build(args) => run_build(args),
        Commands::Inspect(args) => run_inspect(args),
        Commands::Extract(args) => run_extract(args),
    }
}

fn run_build(args: BuildArgs) -> szp::Result<()> {
    debug!(source = %args.path.display(), name = %args.name.display(), "building container");
    let report = args
        .credentials
        .apply(Szp::new())
        .compression_level(args.zip_level)
        .build(&args.path, &args.name)?;

    println!("Certificate's hash: {}", report.signer_fingerprint);
    println!(
        "Wrote {} ({} files, {} bytes)",
        report.path.display(),
        report.files,
        report.bytes
    );
    Ok(())
}

fn run_inspect(args: InspectArgs) -> szp::Result<()> {
    let (name, szp) = args.verify.configure();
    debug!(name = %name.display(), "inspecting container");
    let report = szp.inspect(&name)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.metadata)?);
        return Ok(());
    }

    println!("Certificate's hash: {}", report.signer_fingerprint);
    if let Some(subject) = &report.signer_subject {
        println!("Signed by: {}", subject);
    }
    for record in &report.metadata {
        println!(
            "{}  {:>10}  {}  {}",
            record.content_digest,
            record.original_size,
            record.last_modified.to_rfc3339(),
            record.relative_path
        );
    }
    println!("{} files", report.metadata.len());
    Ok(())
}

fn run_extract(args: ExtractArgs) -> szp::Result<()> {
    let record_match = if args.strict {
        RecordMatch::FullPath
    } else {
        RecordMatch::Basename
    };
    let (name, szp) = args.verify.configure();
    debug!(name = %name.display(), dest = %args.path.display(), "extracting container");
    let report = szp
        .record_match(record_match)
        .staged_extraction(args.staged)
        .extract(&name, &args.path)?;

    println!("Certificate's hash: {}", report.signer_fingerprint);
    println!(
        "Extracted {} files into {}",
        report.summary.files_written,
        report.destination.display()
    );
    Ok(())
}
