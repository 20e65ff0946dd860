use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the Spring Boot on EKS stack workspace",
    long_about = "A unified CLI for synthesizing the stack, rendering workload\n\
                  manifests, packaging the cloud assembly and running CI checks."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the stack into a cloud assembly directory
    Synth {
        /// Output directory
        #[arg(long, default_value = "cdk.out")]
        out: String,
        /// TOML file overriding stack defaults
        #[arg(long)]
        config: Option<String>,
        /// Target account
        #[arg(long, env = "CDK_DEFAULT_ACCOUNT")]
        account: Option<String>,
        /// Target region
        #[arg(long, env = "CDK_DEFAULT_REGION")]
        region: Option<String>,
    },
    /// Print the workload manifests as YAML
    Manifests {
        /// Concrete image reference instead of the registry placeholder
        #[arg(long)]
        image: Option<String>,
    },
    /// Synthesize and zip the cloud assembly for a deployment pipeline
    AssemblyPackage {
        /// Cloud assembly directory
        #[arg(long, default_value = "cdk.out")]
        out: String,
        /// Zip file to write
        #[arg(long, default_value = "dist/assembly.zip")]
        dest: String,
    },
    /// Run CI checks (fmt, clippy, tests, synth)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Synthesize the default stack into a scratch directory
    Synth,
    /// Run check + synth
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_eks_stack(args: &[&str]) {
    let mut cargo_args = vec!["run", "-p", "eks_stack_app", "--bin", "eks-stack", "--"];
    cargo_args.extend_from_slice(args);
    run_cargo(&cargo_args);
}

fn synth(out: &str, config: Option<&str>, account: Option<&str>, region: Option<&str>) {
    let mut args = vec!["synth", "--out", out];
    if let Some(config) = config {
        args.extend(["--config", config]);
    }
    if let Some(account) = account {
        args.extend(["--account", account]);
    }
    if let Some(region) = region {
        args.extend(["--region", region]);
    }
    run_eks_stack(&args);
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|error| panic!("failed to read '{}': {error}", dir.display()));
    for entry in entries {
        let path = entry.expect("failed to read directory entry").path();
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.push(path);
        }
    }
}

fn package_assembly_zip(assembly_dir: &Path, zip_path: &Path) {
    if !assembly_dir.join("manifest.json").exists() {
        panic!(
            "expected a cloud assembly at '{}'; run `cargo run -p xtask -- synth` first",
            assembly_dir.display()
        );
    }

    let mut files = Vec::new();
    collect_files(assembly_dir, &mut files);
    files.sort();

    if let Some(parent) = zip_path.parent() {
        fs::create_dir_all(parent).expect("failed to create dist directory");
    }
    let file = fs::File::create(zip_path).expect("failed to create assembly zip");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in &files {
        let relative = path
            .strip_prefix(assembly_dir)
            .expect("assembly file outside assembly directory");
        let entry_name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let body = fs::read(path).expect("failed to read assembly file");
        zip.start_file(entry_name.as_str(), options)
            .expect("failed to start assembly zip entry");
        zip.write_all(&body)
            .expect("failed to write assembly zip entry");
    }
    zip.finish().expect("failed to finish assembly zip");

    eprintln!(
        "\nPackaged {} files:\n- {}",
        files.len(),
        zip_path.display()
    );
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test eks_stack_core");
    run_cargo(&["test", "-p", "eks_stack_core"]);

    step("Test eks_stack_app");
    run_cargo(&["test", "-p", "eks_stack_app"]);
}

fn ci_synth() {
    step("Synthesize default stack");
    synth("target/ci-cdk.out", None, None, None);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Synth {
            out,
            config,
            account,
            region,
        } => {
            synth(
                &out,
                config.as_deref(),
                account.as_deref(),
                region.as_deref(),
            );
        }
        Commands::Manifests { image } => match image {
            Some(image) => run_eks_stack(&["manifests", "--image", &image]),
            None => run_eks_stack(&["manifests"]),
        },
        Commands::AssemblyPackage { out, dest } => {
            step("Synthesize cloud assembly");
            synth(&out, None, None, None);

            step("Package cloud assembly");
            package_assembly_zip(Path::new(&out), Path::new(&dest));
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Synth => ci_synth(),
                CiJob::All => {
                    ci_check();
                    ci_synth();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
