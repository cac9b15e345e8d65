//! forgepkg CLI
//!
//! Entry point for the `forgepkg` command-line tool.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use forgepkg::checksum::HashKind;
use forgepkg::hub::{task_url, BuildOptions, TaskId};
use forgepkg::lookaside::HttpCacheTransport;
use forgepkg::vcs::{module_name, BranchProfile, GitCli};
use forgepkg::{
    BuildSubmitter, ClientConfig, HubSession, LookasideCache, Reporter, SourcesManifest,
    TaskRegistry,
};

#[derive(Parser)]
#[command(name = "forgepkg")]
#[command(about = "Build farm and lookaside cache client for package maintainers", version)]
struct Cli {
    /// Directory to interact with instead of the current one
    #[arg(long, global = true, default_value = ".")]
    path: PathBuf,

    /// Explicit config file layered over the site and user configs
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a build of the current branch on the build farm
    Build {
        /// Perform a scratch build (output is never tagged)
        #[arg(long)]
        scratch: bool,

        /// Run the build at low priority
        #[arg(long)]
        background: bool,

        /// Skip the tag step after the build
        #[arg(long)]
        skip_tag: bool,

        /// Build from an already-uploaded srpm instead of the pushed commit
        #[arg(long)]
        srpm_url: Option<String>,

        /// Print the task id and return instead of watching
        #[arg(long)]
        nowait: bool,
    },

    /// Build the current package in order with other packages
    ChainBuild {
        /// Package names in build order; `:` separates parallel groups
        #[arg(required = true)]
        packages: Vec<String>,

        /// Perform a scratch build (output is never tagged)
        #[arg(long)]
        scratch: bool,

        /// Run the builds at low priority
        #[arg(long)]
        background: bool,

        /// Skip the tag step after the builds
        #[arg(long)]
        skip_tag: bool,

        /// Print the task id and return instead of watching
        #[arg(long)]
        nowait: bool,
    },

    /// Watch build farm tasks until they finish
    WatchTask {
        /// Task ids to watch
        #[arg(required = true)]
        ids: Vec<TaskId>,
    },

    /// Download source blobs listed in the sources manifest
    Sources {
        /// Directory to download into (defaults to the module path)
        #[arg(long)]
        outdir: Option<PathBuf>,
    },

    /// Upload new source blobs to the lookaside cache
    NewSources {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            1
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let config = ClientConfig::load(cli.config.as_deref())?;
    let reporter = Reporter::stdout(cli.quiet);
    let hash: HashKind = config.lookaside_hash.parse()?;

    match cli.command {
        Commands::Build {
            scratch,
            background,
            skip_tag,
            srpm_url,
            nowait,
        } => {
            let opts = BuildOptions {
                skip_tag,
                scratch,
                background,
            };
            run_build(&cli.path, &config, &reporter, &opts, srpm_url.as_deref(), None, nowait)
        }
        Commands::ChainBuild {
            packages,
            scratch,
            background,
            skip_tag,
            nowait,
        } => {
            let opts = BuildOptions {
                skip_tag,
                scratch,
                background,
            };
            run_build(
                &cli.path,
                &config,
                &reporter,
                &opts,
                None,
                Some(&packages),
                nowait,
            )
        }
        Commands::WatchTask { ids } => {
            let hub = HubSession::connect(&config)?;
            watch(&hub, &config, &reporter, &ids)
        }
        Commands::Sources { outdir } => {
            let module = module_name(&cli.path)?;
            let manifest = SourcesManifest::load(&cli.path.join("sources"))?;
            let transport = HttpCacheTransport::connect(&config)?;
            let cache = LookasideCache::new(&transport, &reporter, &config.lookaside_url, hash);
            let outdir = outdir.unwrap_or_else(|| cli.path.clone());
            cache.sync(&module, &manifest, &outdir)?;
            Ok(0)
        }
        Commands::NewSources { files } => {
            let module = module_name(&cli.path)?;
            let transport = HttpCacheTransport::connect(&config)?;
            let cache = LookasideCache::new(&transport, &reporter, &config.lookaside_url, hash);
            let manifest_path = cli.path.join("sources");
            let ignore_path = cli.path.join(".gitignore");
            for file in &files {
                cache.upload(&module, file, &manifest_path, &ignore_path)?;
            }
            Ok(0)
        }
    }
}

fn run_build(
    path: &Path,
    config: &ClientConfig,
    reporter: &Reporter,
    opts: &BuildOptions,
    srpm_url: Option<&str>,
    chain: Option<&[String]>,
    nowait: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let module = module_name(path)?;
    let profile = BranchProfile::detect(path)?;
    let git = GitCli::new(path, &config.anongit_url);
    let hub = HubSession::connect(config)?;

    let submitter = BuildSubmitter::new(&hub, &git, &profile, &module, &config.anongit_url);
    let task_id = submitter.submit(opts, srpm_url, chain)?;

    reporter.status(&format!("Created task: {task_id}"));
    reporter.status(&format!("Task info: {}", task_url(&config.web_url, task_id)));

    if nowait {
        return Ok(0);
    }
    watch(&hub, config, reporter, &[task_id])
}

fn watch(
    hub: &HubSession,
    config: &ClientConfig,
    reporter: &Reporter,
    ids: &[TaskId],
) -> Result<i32, Box<dyn std::error::Error>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
    })?;

    let mut registry = TaskRegistry::new(
        hub,
        reporter,
        &config.web_url,
        Duration::from_secs(config.poll_interval_secs),
        interrupted,
    );
    Ok(registry.poll_until_done(ids)?)
}
