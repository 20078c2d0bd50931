use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use miette::IntoDiagnostic;
use ovl_bundle::{Bundle, BUNDLE_FILE_NAME};

use crate::errors::CliError;
use crate::println_pad;
use crate::utils::validate_bundle_name;

#[derive(Debug, Clone)]
pub struct InitBundleArgs {
    pub name: String,
    pub output_dir: Option<Utf8PathBuf>,
    pub game_version: Option<String>,
}

pub fn init_bundle(args: InitBundleArgs) -> miette::Result<()> {
    validate_bundle_name(&args.name)?;

    println_pad!(
        "{} {}",
        "🚀 Initializing new bundle:".bright_blue().bold(),
        args.name.bright_cyan().bold()
    );

    let bundle_dir = match args.output_dir {
        Some(ref output_dir) => output_dir.join(&args.name),
        None => Utf8PathBuf::from(&args.name),
    };

    create_bundle(&bundle_dir, &args.name, args.game_version.as_deref().unwrap_or(""))?;

    println_pad!(
        "{}\n{} {}",
        "Bundle initialized successfully!".bright_green().bold(),
        "Location:".bright_green(),
        bundle_dir.as_str().bright_white().bold()
    );

    Ok(())
}

fn create_bundle(bundle_dir: &Utf8Path, name: &str, game_version: &str) -> miette::Result<Bundle> {
    let manifest = bundle_dir.join(BUNDLE_FILE_NAME);
    if manifest.as_std_path().exists() {
        return Err(CliError::BundleExists { path: manifest }.into());
    }

    let bundle = Bundle::new(name, game_version).with_root(bundle_dir);
    bundle.save().into_diagnostic()?;
    Ok(bundle)
}
