use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use miette::IntoDiagnostic;
use ovl_bundle::Bundle;
use ovl_diff::Document;
use ovl_engine::{EngineConfig, Error, JsonDirDecoder, OverlayEngine, ResourceState, Schema};

use crate::errors::CliError;
use crate::println_pad;

pub struct ShowEntityArgs {
    pub config: Utf8PathBuf,
    pub game_dir: Utf8PathBuf,
    pub decoded_dir: Option<Utf8PathBuf>,
    pub bundles: Vec<Utf8PathBuf>,
    pub active: Option<Utf8PathBuf>,
    pub entity_type: String,
    pub id: i64,
}

/// One entity as seen through the layer stack.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityView {
    pub label: String,
    /// Field name, Base value, Active value.
    pub fields: Vec<(String, Option<Document>, Option<Document>)>,
}

pub fn show_entity(args: ShowEntityArgs) -> miette::Result<()> {
    let view = materialize_entity(&args)?;

    println_pad!(
        "{} {}",
        "🧩 Entity:".bright_blue().bold(),
        view.label.bright_cyan().bold()
    );

    for (name, base, active) in &view.fields {
        let base_text = render_value(base.as_ref());
        let active_text = render_value(active.as_ref());

        println_pad!("\n{} {}", "•".bright_cyan(), name.bright_white().bold());
        println_pad!("   {} {}", "Base:  ".dimmed(), base_text);
        if base_text == active_text {
            println_pad!("   {} {}", "Active:".dimmed(), "(unchanged)".dimmed());
        } else {
            println_pad!("   {} {}", "Active:".bright_yellow(), active_text.bright_yellow());
        }
    }

    Ok(())
}

/// Build an engine from the arguments and read every field of the entity in
/// both states.
pub fn materialize_entity(args: &ShowEntityArgs) -> miette::Result<EntityView> {
    let config = EngineConfig::load(&args.config).into_diagnostic()?;
    let mut engine = build_engine(&config, &args.game_dir, args.decoded_dir.as_deref());

    let mut bundles = Vec::with_capacity(args.bundles.len());
    for dir in &args.bundles {
        bundles.push(Bundle::load(dir).into_diagnostic()?);
    }
    let active = match &args.active {
        Some(active) => Some(
            args.bundles
                .iter()
                .position(|dir| dir == active)
                .ok_or_else(|| CliError::UnknownActiveBundle { path: active.clone() })?,
        ),
        None => None,
    };
    engine.set_bundles(bundles, active).into_diagnostic()?;

    let label = match engine.get_active_entity(&args.entity_type, args.id).into_diagnostic()? {
        Some(entity) => entity.label.clone(),
        None => {
            return Err(CliError::EntityNotFound {
                entity_type: args.entity_type.clone(),
                id: args.id,
            }
            .into())
        }
    };

    let field_names: Vec<String> = engine
        .schema()
        .entity(&args.entity_type)
        .into_diagnostic()?
        .fields
        .iter()
        .map(|field| field.name().to_string())
        .collect();

    let mut fields = Vec::with_capacity(field_names.len());
    for name in field_names {
        let base = read_field(&mut engine, &args.entity_type, args.id, &name, ResourceState::Base)?;
        let active = read_field(&mut engine, &args.entity_type, args.id, &name, ResourceState::Active)?;
        fields.push((name, base, active));
    }

    Ok(EntityView { label, fields })
}

fn build_engine(config: &EngineConfig, game_dir: &Utf8Path, decoded_dir: Option<&Utf8Path>) -> OverlayEngine {
    let decoded_dir = decoded_dir
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|| game_dir.join("decoded"));

    let decoders: BTreeSet<&str> = config
        .resources
        .values()
        .filter_map(|resource| resource.decoder.as_deref())
        .collect();

    let mut engine = OverlayEngine::new(Schema::compile(config), game_dir);
    for name in decoders {
        tracing::debug!("Registering decoder name={} dir={}", name, decoded_dir.join(name));
        engine = engine.with_decoder(name, JsonDirDecoder::new(decoded_dir.join(name)));
    }
    engine
}

fn read_field(
    engine: &mut OverlayEngine,
    entity_type: &str,
    id: i64,
    field: &str,
    state: ResourceState,
) -> miette::Result<Option<Document>> {
    match engine.field_value(entity_type, id, field, state) {
        Ok(value) => Ok(value.cloned()),
        // Entities created by a bundle have no Base counterpart.
        Err(Error::EntityNotFound { .. }) => Ok(None),
        Err(e) => Err(e).into_diagnostic(),
    }
}

fn render_value(value: Option<&Document>) -> String {
    match value {
        None => "-".to_string(),
        Some(value) => serde_json::to_string(value).unwrap_or_else(|_| value.to_string()),
    }
}
