use camino::Utf8PathBuf;
use colored::Colorize;
use miette::IntoDiagnostic;
use serde_json::to_string_pretty;

use crate::println_pad;
use crate::utils::read_document;

pub struct DiffDocumentsArgs {
    pub base: Utf8PathBuf,
    pub modified: Utf8PathBuf,
}

pub fn diff_documents(args: DiffDocumentsArgs) -> miette::Result<()> {
    let base = read_document(&args.base)?;
    let modified = read_document(&args.modified)?;

    match ovl_diff::diff(&base, &modified) {
        Some(patch) => println!("{}", to_string_pretty(&patch).into_diagnostic()?),
        None => println_pad!("{}", "No changes".bright_green().bold()),
    }

    Ok(())
}
