use camino::Utf8PathBuf;
use miette::IntoDiagnostic;
use serde_json::to_string_pretty;

use crate::utils::read_document;

pub struct ApplyPatchArgs {
    pub base: Utf8PathBuf,
    pub patch: Utf8PathBuf,
}

pub fn apply_patch(args: ApplyPatchArgs) -> miette::Result<()> {
    let base = read_document(&args.base)?;
    let patch = read_document(&args.patch)?;

    let patched = ovl_diff::apply(&base, &patch).into_diagnostic()?;
    println!("{}", to_string_pretty(&patched).into_diagnostic()?);

    Ok(())
}
