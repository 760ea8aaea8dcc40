//! Binary entry point for the `stixgraph` CLI.
#![forbid(unsafe_code)]

#[path = "stixgraph/ui.rs"]
mod ui;

use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use stixgraph::{
    config::{resolve_settings_path, Settings, SettingsError},
    extract,
    load::{LoadSummary, Loader, TypeQlWriter},
    mapping::Mapping,
    transform::{TransformOutput, Transformer},
};
use tracing_subscriber::EnvFilter;
use ui::{format_duration, Stream, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "stixgraph",
    version,
    about = "Compile STIX 2.1 bundles into TypeQL insert statements",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "STIXGRAPH_CONFIG",
        help = "Settings file (defaults to <config dir>/stixgraph/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase log verbosity (-v debug, -vv trace)"
    )]
    verbose: u8,

    #[arg(long, global = true, help = "Print only essential output")]
    quiet: bool,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Colour theme for the summary"
    )]
    theme: Theme,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a STIX bundle into TypeQL insert statements
    Transform(TransformCmd),
    /// Load and validate the mapping documents
    CheckMapping(MappingArgs),
    /// Inspect or create the settings file
    #[command(subcommand)]
    Config(ConfigCmd),
}

#[derive(Args, Debug)]
struct MappingArgs {
    #[arg(
        long,
        value_name = "DIR",
        help = "Directory holding the mapping documents (defaults to the built-in mapping)"
    )]
    mapping: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TransformCmd {
    #[arg(value_name = "BUNDLE", help = "STIX bundle or JSON array of objects")]
    bundle: PathBuf,

    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Write statements to FILE instead of stdout"
    )]
    output: Option<PathBuf>,

    #[command(flatten)]
    mapping: MappingArgs,

    #[arg(long, value_name = "N", help = "Statements per batch")]
    batch_size: Option<usize>,

    #[arg(long, help = "Drop an object on its first invalid property")]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
    /// Print the resolved settings path
    Path,
    /// Write a settings file with default values
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let settings_path = resolve_settings_path(cli.config.clone());
    let settings = Settings::load(settings_path.as_deref())?;
    install_tracing_subscriber(&settings, cli.verbose, cli.quiet);

    match cli.command {
        Command::Transform(cmd) => {
            let stream = if cmd.output.is_some() {
                Stream::Stdout
            } else {
                Stream::Stderr
            };
            let ui = Ui::new(cli.theme, cli.quiet, stream);
            run_transform(&ui, settings, cmd)?;
        }
        Command::CheckMapping(args) => {
            let ui = Ui::new(cli.theme, cli.quiet, Stream::Stdout);
            run_check_mapping(&ui, settings, args)?;
        }
        Command::Config(cmd) => {
            let ui = Ui::new(cli.theme, cli.quiet, Stream::Stdout);
            let path = settings_path.ok_or(SettingsError::NoSettingsPath)?;
            match cmd {
                ConfigCmd::Path => println!("{}", path.display()),
                ConfigCmd::Init { force } => {
                    if path.exists() && !force {
                        return Err(format!(
                            "{} already exists; pass --force to overwrite",
                            path.display()
                        )
                        .into());
                    }
                    Settings::default().persist(&path)?;
                    ui.success(&format!("wrote {}", path.display()));
                }
            }
        }
    }

    Ok(())
}

fn run_transform(ui: &Ui, mut settings: Settings, cmd: TransformCmd) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = cmd.mapping.mapping {
        settings.mapping.dir = Some(dir);
    }
    if let Some(batch_size) = cmd.batch_size {
        settings.load.batch_size = batch_size;
    }
    settings.transform.strict |= cmd.strict;

    let task = ui.task("loading mapping");
    let mapping = Arc::new(settings.load_mapping()?);
    task.finish();

    let task = ui.task(format!("reading {}", cmd.bundle.display()));
    let objects = extract::read_bundle(&cmd.bundle)?;
    task.finish();

    let task = ui.task(format!("transforming {} objects", objects.len()));
    let transformer = Transformer::new(mapping, settings.transform);
    let output = transformer.transform_all(&objects);
    let transform_time = task.finish();

    let loader = Loader::new(settings.load);
    let summary = match &cmd.output {
        Some(path) => {
            let file = File::create(path).map_err(|err| {
                format!("failed to create {}: {err}", path.display())
            })?;
            write_statements(&loader, BufWriter::new(file), &output)?
        }
        None => write_statements(&loader, io::stdout().lock(), &output)?,
    };

    report_transform(ui, &output, &summary, cmd.output.as_deref());
    if let Some(path) = &cmd.output {
        ui.info(&format!("statements written to {}", path.display()));
    }
    ui.success(&format!(
        "transformed {} objects in {}",
        output.objects,
        format_duration(transform_time)
    ));
    Ok(())
}

fn write_statements<W: Write>(
    loader: &Loader,
    out: W,
    output: &TransformOutput,
) -> io::Result<LoadSummary> {
    let mut writer = TypeQlWriter::new(out);
    let summary = loader.load_output(&mut writer, output);
    writer.into_inner()?;
    Ok(summary)
}

fn report_transform(ui: &Ui, output: &TransformOutput, summary: &LoadSummary, path: Option<&Path>) {
    ui.section(
        "Transform",
        [
            ("objects", output.objects),
            ("failed objects", output.failures.len()),
            ("skipped properties", output.skipped.len()),
            ("entity statements", output.entities.len()),
            ("relation statements", output.relations.len()),
            ("embedded statements", output.embedded.len()),
        ],
    );
    ui.section(
        "Output",
        [
            (
                "destination",
                path.map(|p| p.display().to_string())
                    .unwrap_or_else(|| "stdout".to_string()),
            ),
            ("batches", summary.batches.to_string()),
            ("written", summary.inserted.to_string()),
            ("rejected", summary.rejected.to_string()),
        ],
    );
    ui.list(
        "Failed objects",
        output.failures.iter().map(|failure| {
            format!(
                "{}: {}",
                failure.stix_id.as_deref().unwrap_or("<no id>"),
                failure.error
            )
        }),
    );
    ui.list(
        "Skipped properties",
        output
            .skipped
            .iter()
            .map(|(stix_id, skipped)| format!("{stix_id} {skipped}")),
    );
    if output.failures.iter().any(|failure| failure.error.is_config()) {
        ui.warn("some objects failed because of mapping defects; run `stixgraph check-mapping`");
    }
}

fn run_check_mapping(ui: &Ui, settings: Settings, args: MappingArgs) -> Result<(), Box<dyn Error>> {
    let source = args.mapping.or(settings.mapping.dir);
    let task = ui.task("validating mapping");
    let mapping = match &source {
        Some(dir) => Mapping::from_dir(dir)?,
        None => Mapping::builtin()?,
    };
    task.finish();
    ui.section(
        "Mapping",
        [
            (
                "source",
                source
                    .map(|dir| dir.display().to_string())
                    .unwrap_or_else(|| "built-in".to_string()),
            ),
            ("object types", mapping.object_type_count().to_string()),
            ("composites", mapping.composite_count().to_string()),
            ("key-value schemas", mapping.key_value_count().to_string()),
            ("relation role tables", mapping.role_table_count().to_string()),
        ],
    );
    ui.success("mapping is valid");
    Ok(())
}

fn install_tracing_subscriber(settings: &Settings, verbose: u8, quiet: bool) {
    let directive = match (verbose, quiet) {
        (0, true) => "error".to_string(),
        (0, false) => settings
            .log
            .filter
            .clone()
            .unwrap_or_else(|| "info".to_string()),
        (1, _) => "stixgraph=debug".to_string(),
        _ => "stixgraph=trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}
