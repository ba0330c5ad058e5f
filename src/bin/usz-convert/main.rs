use clap::Parser;
use std::path::PathBuf;

use usz_neuro_conversion::{
    convert_project, convert_session, discover_sessions, read_back, reader, ConverterConfig,
    DocumentStore, MetadataTable, OutputContext, SessionKey,
};

mod cli;

use cli::{Cli, Command, InspectArgs, ProjectArgs, SessionArgs};

mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const EXECUTION_ERROR: i32 = 1;
    pub const INPUT_ERROR: i32 = 2;
    pub const PARTIAL_FAILURE: i32 = 3;
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let config = match load_config(cli.config, cli.project_dir) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            std::process::exit(exit_codes::INPUT_ERROR);
        }
    };

    let exit_code = match cli.command {
        Command::Convert(args) => convert(&config, args),
        Command::Batch(args) => batch(&config, args),
        Command::Discover(args) => discover(&config, args),
        Command::Inspect(args) => inspect(&config, args),
        Command::Show(args) => show(&config, args),
    };

    std::process::exit(exit_code);
}

/// HDF5 documents with `nwb-support`, JSON otherwise.
#[cfg(feature = "nwb-support")]
fn document_store() -> &'static dyn DocumentStore {
    &usz_neuro_conversion::Hdf5DocumentStore
}

#[cfg(not(feature = "nwb-support"))]
fn document_store() -> &'static dyn DocumentStore {
    &usz_neuro_conversion::JsonDocumentStore
}

fn load_config(
    file: Option<PathBuf>,
    project_dir: Option<PathBuf>,
) -> Result<ConverterConfig, String> {
    let mut config = match file {
        Some(path) => ConverterConfig::from_toml_file(&path)
            .map_err(|e| format!("reading {}: {}", path.display(), e))?,
        None => ConverterConfig::default(),
    };
    // The command line wins over the file
    if let Some(dir) = project_dir {
        config.project_dir = dir;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn session_key(args: &SessionArgs) -> SessionKey {
    SessionKey::new(args.subject, args.session, args.project.as_str())
}

fn convert(config: &ConverterConfig, args: SessionArgs) -> i32 {
    let table = match MetadataTable::load(config.layout().metadata_path()) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    match convert_session(config, &table, &session_key(&args), document_store()) {
        Ok(path) => {
            println!("{}", path.display());
            exit_codes::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}

fn batch(config: &ConverterConfig, args: ProjectArgs) -> i32 {
    let summary = match convert_project(config, &args.project, document_store()) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    for (key, path) in &summary.converted {
        println!("ok     {}  {}", key, path.display());
    }
    for (key, e) in &summary.failed {
        println!("FAILED {}  {}", key, e);
    }
    eprintln!(
        "{} converted, {} failed",
        summary.converted.len(),
        summary.failed.len()
    );

    if summary.total() == 0 {
        eprintln!("Error: No sessions found for '{}'", args.project);
        exit_codes::INPUT_ERROR
    } else if summary.is_success() {
        exit_codes::SUCCESS
    } else {
        exit_codes::PARTIAL_FAILURE
    }
}

fn discover(config: &ConverterConfig, args: ProjectArgs) -> i32 {
    match discover_sessions(&config.layout(), &args.project) {
        Ok(index) => {
            for (subject, session, path) in index.sessions() {
                println!("subject {:02}  session {:02}  {}", subject, session, path.display());
            }
            eprintln!("Found {} session(s)", index.len());
            exit_codes::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::INPUT_ERROR
        }
    }
}

fn inspect(config: &ConverterConfig, args: InspectArgs) -> i32 {
    let path = match (args.file, args.project, args.subject, args.session) {
        (Some(file), _, _, _) => file,
        (None, Some(project), Some(subject), Some(session)) => config
            .layout()
            .source_container_path(&SessionKey::new(subject, session, project)),
        _ => {
            eprintln!("Error: pass --file or --project with --subject and --session");
            return exit_codes::INPUT_ERROR;
        }
    };

    match reader::inspect(&path) {
        Ok(summary) => {
            println!("File: {}", summary.path.display());
            println!("Size: {} bytes", summary.size);
            println!("Signature offset: {}", summary.signature_offset);
            println!("Superblock version: {}", summary.superblock_version);
            println!("Offset size: {} bytes", summary.offset_size);
            println!("Base address: {}", summary.base_address);
            #[cfg(feature = "nwb-support")]
            print_root_members(&path);
            exit_codes::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}

#[cfg(feature = "nwb-support")]
fn print_root_members(path: &std::path::Path) {
    let members = usz_neuro_conversion::SourceContainer::open(path)
        .and_then(|container| container.root_members());
    match members {
        Ok(members) => println!("Root members: {}", members.join(", ")),
        Err(e) => log::warn!("Could not list root members: {}", e),
    }
}

fn show(config: &ConverterConfig, args: SessionArgs) -> i32 {
    let output = OutputContext::new(session_key(&args));
    let document = match read_back(config, &output, document_store()) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    match serde_json::to_string_pretty(&document) {
        Ok(json) => {
            println!("{}", json);
            exit_codes::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
