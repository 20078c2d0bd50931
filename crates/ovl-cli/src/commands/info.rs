use camino::Utf8PathBuf;
use colored::Colorize;
use miette::IntoDiagnostic;
use ovl_bundle::{Bundle, FileDiffState, ListingEntry};

use crate::println_pad;

pub struct InfoBundleArgs {
    pub bundle_dir: Utf8PathBuf,
}

pub fn info_bundle(args: InfoBundleArgs) -> miette::Result<()> {
    let bundle = Bundle::load(&args.bundle_dir).into_diagnostic()?;

    println_pad!(
        "{} {}",
        "📦 Bundle:".bright_blue().bold(),
        bundle.name.bright_cyan().bold()
    );
    println_pad!(
        "{} {}",
        "🏷️ Game version:".bright_green(),
        if bundle.game_version.is_empty() {
            "unknown".dimmed()
        } else {
            bundle.game_version.bright_white().bold()
        }
    );

    println_pad!("\n{}", "📄 Files:".bright_magenta().bold());
    if bundle.resource_listing.is_empty() {
        println_pad!("   {}", "none".dimmed());
    }
    for (local, entry) in &bundle.resource_listing {
        println_pad!(
            "   {} {} {} {}",
            "•".bright_cyan(),
            entry.target.as_str().bright_cyan().bold(),
            format!("<- {local}").dimmed(),
            describe_listing(entry)
        );
    }

    println_pad!("\n{}", "🧩 Entity edits:".bright_magenta().bold());
    if bundle.entities.is_empty() {
        println_pad!("   {}", "none".dimmed());
    }
    for edit in &bundle.entities {
        let fields: Vec<&str> = edit.data.keys().map(String::as_str).collect();
        println_pad!(
            "   {} {} {}",
            "•".bright_cyan(),
            format!("{} #{}", edit.type_name, edit.id).bright_cyan().bold(),
            format!("({})", fields.join(", ")).dimmed()
        );
    }

    if !bundle.enums.is_empty() {
        println_pad!("\n{}", "🔢 Enum labels:".bright_magenta().bold());
        for (enum_name, labels) in &bundle.enums {
            for (label, value) in labels {
                println_pad!(
                    "   {} {}.{} = {}",
                    "•".bright_cyan(),
                    enum_name.bright_cyan(),
                    label.bright_white().bold(),
                    value
                );
            }
        }
    }

    Ok(())
}

fn describe_listing(entry: &ListingEntry) -> String {
    match entry.diff_state() {
        FileDiffState::Unchecked => "(unchecked)".to_string(),
        FileDiffState::FullReplace => "(full replacement)".to_string(),
        FileDiffState::Patch(_) => match entry.diff_time {
            Some(time) => format!("(patch, {})", time.format("%Y-%m-%d %H:%M")),
            None => "(patch)".to_string(),
        },
    }
}
