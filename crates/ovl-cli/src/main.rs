use camino::Utf8PathBuf;
use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{
    apply_patch, diff_documents, info_bundle, init_bundle, show_entity, ApplyPatchArgs,
    DiffDocumentsArgs, InfoBundleArgs, InitBundleArgs, ShowEntityArgs,
};
use miette::{IntoDiagnostic, Result};

mod commands;
mod errors;
mod utils;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty bundle directory
    Init {
        /// The bundle name, also used as the directory name
        name: String,

        /// The directory to create the bundle in
        #[arg(short, long)]
        output_dir: Option<Utf8PathBuf>,

        /// The game version the bundle targets
        #[arg(short, long)]
        game_version: Option<String>,
    },
    /// Show a summary of a bundle
    Info {
        /// The bundle directory containing bundle.json
        bundle_dir: Utf8PathBuf,
    },
    /// Print the patch that turns one JSON document into another
    Diff {
        /// The original document
        base: Utf8PathBuf,

        /// The modified document
        modified: Utf8PathBuf,
    },
    /// Apply a patch to a JSON document and print the result
    Apply {
        /// The document to patch
        base: Utf8PathBuf,

        /// The patch to apply
        patch: Utf8PathBuf,
    },
    /// Show an entity through a stack of bundles
    Show {
        /// The engine configuration file (.json or .toml)
        #[arg(short, long)]
        config: Utf8PathBuf,

        /// The game directory
        #[arg(short, long)]
        game_dir: Utf8PathBuf,

        /// The directory holding decoded objects, one subdirectory per decoder
        /// (defaults to <game-dir>/decoded)
        #[arg(long)]
        decoded_dir: Option<Utf8PathBuf>,

        /// Bundle directories, lowest priority first
        #[arg(short, long = "bundle")]
        bundles: Vec<Utf8PathBuf>,

        /// The bundle being edited, one of the --bundle directories
        #[arg(short, long)]
        active: Option<Utf8PathBuf>,

        /// The entity type
        entity_type: String,

        /// The entity id
        id: i64,
    },
}

fn parse_args() -> Result<Args> {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    Args::from_arg_matches(&matches).into_diagnostic()
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "ovl_engine=debug,ovl_bundle=debug,ovl_cli=debug"
    } else {
        "warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = parse_args()?;
    init_logging(args.verbose);

    match args.command {
        Commands::Init {
            name,
            output_dir,
            game_version,
        } => init_bundle(InitBundleArgs {
            name,
            output_dir,
            game_version,
        }),
        Commands::Info { bundle_dir } => info_bundle(InfoBundleArgs { bundle_dir }),
        Commands::Diff { base, modified } => diff_documents(DiffDocumentsArgs { base, modified }),
        Commands::Apply { base, patch } => apply_patch(ApplyPatchArgs { base, patch }),
        Commands::Show {
            config,
            game_dir,
            decoded_dir,
            bundles,
            active,
            entity_type,
            id,
        } => show_entity(ShowEntityArgs {
            config,
            game_dir,
            decoded_dir,
            bundles,
            active,
            entity_type,
            id,
        }),
    }
}
