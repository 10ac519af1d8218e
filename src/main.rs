//! Strata CLI
//!
//! Entry point for the `strata` command-line tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use strata_cli::config::{self, ConfigError, LoadConfigParams, SECRETS_KEY};
use strata_cli::effects;
use strata_cli::engine::{EngineTransport, ProcessTransport};
use strata_cli::ghasset::{self, AssetQuery};
use strata_cli::keygen::{KeyAlgorithm, KeyPair};
use strata_cli::mock::MockTransport;
use strata_cli::render::{render, RenderRequest};
use strata_cli::secrets::SopsCli;
use strata_cli::Effect;
use strata_store::{LayeredStore, StoreOptions};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Render declarative configuration modules with encrypted secret sources", version)]
struct Cli {
    /// Load configuration from FILE
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Evaluation engine executable ("mock" runs the in-process engine)
    #[arg(long, global = true, default_value = "strata-engine")]
    engine: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a configuration module
    Render {
        /// Module file to evaluate
        module: PathBuf,

        /// Expression to evaluate instead of the default text output
        #[arg(long, short = 'x')]
        expression: Option<String>,

        /// Destination path (a directory with --files)
        #[arg(long, short = 'o', default_value = "/dev/stdout")]
        output: PathBuf,

        /// Project scope directory, bypassing the tree search
        #[arg(long, short = 'p')]
        project_file: Option<PathBuf>,

        /// Split the output into multiple files
        #[arg(long, short = 'f')]
        files: bool,
    },

    /// Generate an SSH key pair
    Keygen {
        #[command(subcommand)]
        algorithm: KeygenCommands,
    },

    /// Look up release assets of a GitHub repository
    Asset {
        /// Secrets store key holding the API token
        #[arg(long, default_value = "github.token")]
        token_ref: String,

        #[command(subcommand)]
        action: AssetCommands,
    },

    /// Run tofu with the secrets injected as TF_VAR_* variables
    #[command(alias = "tf")]
    Tofu {
        /// Arguments passed through to the tofu binary (default: -version)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Configuration inspection commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum KeygenCommands {
    /// Generate an Ed25519 key pair
    Ed25519 {
        /// Private key destination; the public half lands beside it as
        /// OUTPUT.pub
        #[arg(long, short = 'o', default_value = "/dev/stdout")]
        output: PathBuf,

        /// Comment embedded in both key halves
        #[arg(long, short = 'C')]
        comment: String,
    },
}

#[derive(Subcommand)]
enum AssetCommands {
    /// Resolve one asset and print its dotenv lines
    GetOne {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        repo: String,

        /// Pattern matched against asset names
        #[arg(long)]
        pattern: String,

        /// Pattern selecting the checksums asset
        #[arg(long)]
        checksums_pattern: Option<String>,
    },

    /// Resolve every query in a file into one dotenv output
    GetMany {
        /// TOML file holding a [[queries]] table array
        #[arg(long, short = 'q')]
        queries_file: PathBuf,

        #[arg(long, short = 'o', default_value = "/dev/stdout")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print every key of the merged configuration
    Debug,
}

fn main() {
    let cli = Cli::parse();

    let (cli_config, secrets) = match load_stores(cli.config) {
        Ok(stores) => stores,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Render {
            module,
            expression,
            output,
            project_file,
            files,
        } => {
            run_render(
                &cli.engine,
                module,
                expression,
                output,
                project_file,
                files,
                &secrets,
            );
        }
        Commands::Keygen { algorithm } => match algorithm {
            KeygenCommands::Ed25519 { output, comment } => {
                run_keygen(KeyAlgorithm::Ed25519, &output, &comment);
            }
        },
        Commands::Asset { token_ref, action } => {
            let token = secrets.string(&token_ref);
            match action {
                AssetCommands::GetOne {
                    owner,
                    repo,
                    pattern,
                    checksums_pattern,
                } => {
                    run_asset_get_one(&token, owner, repo, pattern, checksums_pattern);
                }
                AssetCommands::GetMany {
                    queries_file,
                    output,
                } => {
                    run_asset_get_many(&token, &queries_file, output);
                }
            }
        }
        Commands::Tofu { args } => {
            run_tofu(args, &secrets);
        }
        Commands::Config { action } => match action {
            ConfigCommands::Debug => {
                run_config_debug(&cli_config);
            }
        },
    }
}

/// Assemble the bootstrap configuration and the secrets store.
///
/// Both merge strictly: config files first, then the `STRATA` environment
/// namespace; secrets are decrypted from the file named by the
/// `commands.root.secrets` key, when set.
fn load_stores(config_path: Option<PathBuf>) -> Result<(LayeredStore, LayeredStore), ConfigError> {
    let path = match config_path {
        Some(path) => path,
        None => config::default_config_path()?,
    };

    let mut cli_config = LayeredStore::new(StoreOptions::strict());
    let params = LoadConfigParams {
        config_paths: vec![path],
        ..Default::default()
    };
    config::load_config(&params, &mut cli_config)?;

    let mut secrets = LayeredStore::new(StoreOptions::strict());
    if cli_config.exists(SECRETS_KEY) {
        let secrets_path = PathBuf::from(cli_config.string(SECRETS_KEY));
        config::load_secrets(&[secrets_path], &SopsCli::new(), &mut secrets)?;
    }

    Ok((cli_config, secrets))
}

fn run_render(
    engine: &str,
    module: PathBuf,
    expression: Option<String>,
    output: PathBuf,
    project_file: Option<PathBuf>,
    files: bool,
    secrets: &LayeredStore,
) {
    // The scope search compares directory prefixes, so the module path must
    // be absolute like the walk root.
    let module = if module.is_absolute() {
        module
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(module),
            Err(e) => {
                eprintln!("Error determining working directory: {}", e);
                process::exit(1);
            }
        }
    };

    let transport: Box<dyn EngineTransport> = if engine == "mock" {
        Box::new(MockTransport::new())
    } else {
        match ProcessTransport::spawn(engine, &[]) {
            Ok(transport) => Box::new(transport),
            Err(e) => {
                eprintln!("Error starting engine: {}", e);
                process::exit(1);
            }
        }
    };

    let request = RenderRequest {
        module,
        expression,
        output,
        project_path: project_file,
        multi_file: files,
    };

    let decryptor = SopsCli::new();
    let effect = match render(&request, secrets, &decryptor, transport) {
        Ok(effect) => effect,
        Err(e) => {
            eprintln!("Render failed: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = effect.apply() {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn run_keygen(algorithm: KeyAlgorithm, output: &std::path::Path, comment: &str) {
    let pair = KeyPair::generate(algorithm);
    let effects = pair.prepare(output, comment);
    if let Err(e) = effects::invoke(&effects) {
        eprintln!("Error writing key pair: {}", e);
        process::exit(1);
    }
}

fn run_asset_get_one(
    token: &str,
    owner: String,
    repo: String,
    pattern: String,
    checksums_pattern: Option<String>,
) {
    let query = AssetQuery {
        owner,
        repo,
        pattern,
        checksums_pattern,
    };
    match ghasset::fetch_latest(token, &query) {
        Ok(result) => {
            let lines = ghasset::dotenv_lines(std::slice::from_ref(&result));
            let effect = Effect::stdout(lines.trim_end());
            if let Err(e) = effect.apply() {
                eprintln!("Error writing output: {}", e);
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Asset lookup failed: {}", e);
            process::exit(1);
        }
    }
}

fn run_asset_get_many(token: &str, queries_file: &std::path::Path, output: PathBuf) {
    let text = match std::fs::read_to_string(queries_file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {}: {}", queries_file.display(), e);
            process::exit(1);
        }
    };
    let queries = match ghasset::parse_queries(&text) {
        Ok(queries) => queries,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let mut results = Vec::with_capacity(queries.len());
    for query in &queries {
        match ghasset::fetch_latest(token, query) {
            Ok(result) => results.push(result),
            Err(e) => {
                eprintln!("Asset lookup failed for {}/{}: {}", query.owner, query.repo, e);
                process::exit(1);
            }
        }
    }

    let effect = Effect::write_file(output, ghasset::dotenv_lines(&results).into_bytes());
    if let Err(e) = effect.apply() {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn run_tofu(args: Vec<String>, secrets: &LayeredStore) {
    let args = if args.is_empty() {
        vec!["-version".to_string()]
    } else {
        args
    };

    let mut command = process::Command::new("tofu");
    command.args(&args);
    for (name, value) in config::secrets_to_env(secrets, "TF_VAR") {
        command.env(name, value);
    }

    match command.status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            process::exit(status.code().unwrap_or(1));
        }
        Err(e) => {
            eprintln!("Failed to run tofu: {}", e);
            process::exit(1);
        }
    }
}

fn run_config_debug(cli_config: &LayeredStore) {
    for key in cli_config.keys() {
        println!("{} = {}", key, cli_config.string(&key));
    }
}
