use std::error::Error;
use usz_neuro_conversion::{
    convert_session_at, discover_sessions, load_metadata, ConverterConfig, JsonDocumentStore,
    SessionKey,
};

fn main() -> Result<(), Box<dyn Error>> {
    let project_dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let project = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "Human_MTL_units_scalp_EEG_and_iEEG_verbal_WM".to_string());

    let config = ConverterConfig::new(&project_dir);
    let layout = config.layout();

    // Load the participant table
    let table = load_metadata(&project_dir)?;
    println!("Metadata rows: {}", table.len());

    // Print the sessions of this project
    for row in table.project_rows(&project).take(5) {
        println!(
            "  subject {:02} session {:02}: age {}, sex {}, start {}",
            row.subject,
            row.session,
            row.age,
            row.sex(),
            row.session_start
        );
    }

    // List the containers waiting for conversion
    let index = discover_sessions(&layout, &project)?;
    println!("\nSource containers: {}", index.len());
    for (subject, session, path) in index.sessions().take(5) {
        println!("  {:02}/{:02}: {}", subject, session, path.display());
    }

    // Convert the first one
    if let Some((subject, session, source)) = index.sessions().next() {
        let key = SessionKey::new(subject, session, project.as_str());
        let path = convert_session_at(&config, &table, &key, source, &JsonDocumentStore)?;
        println!("\nWrote {}", path.display());
    } else {
        println!("\nNothing to convert.");
    }

    Ok(())
}
