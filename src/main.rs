use schemagraph::document;
use schemagraph::dsl;
use schemagraph::model::Snapshot;
use schemagraph::projection::{DetailLevel, GraphIR};
use std::env;
use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("schemagraph=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <input> [options]", args[0]);
        eprintln!();
        eprintln!("A .json document is printed as source text; source text is printed as JSON.");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  -o, --output <file>   Output file (default: stdout)");
        eprintln!("  -d, --detail <level>  Detail level for --graph: tables, pk, pk_fk, all (default: all)");
        eprintln!("      --graph           Print the projected node/edge graph instead");
        process::exit(1);
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut detail = DetailLevel::All;
    let mut graph = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" => {
                i += 1;
                if i < args.len() {
                    output_path = Some(args[i].clone());
                }
            }
            "-d" | "--detail" => {
                i += 1;
                if i < args.len() {
                    detail = DetailLevel::from_str(&args[i]).unwrap_or_else(|| {
                        eprintln!("Invalid detail level: {}", args[i]);
                        process::exit(1);
                    });
                }
            }
            "--graph" => graph = true,
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let input = match fs::read_to_string(input_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {}", input_path, e);
            process::exit(1);
        }
    };

    let is_document = input_path.ends_with(".json");
    let snapshot: Snapshot = if is_document {
        match document::import_document(&input) {
            Ok(imported) => imported.snapshot,
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
    } else {
        match dsl::from_source(&input) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
    };
    tracing::info!(tables = snapshot.tables.len(), "loaded {}", input_path);

    let rendered = if graph {
        let ir = GraphIR::from_snapshot(&snapshot, None, detail);
        serde_json::to_string_pretty(&ir)
    } else if is_document {
        Ok(dsl::to_source(&snapshot))
    } else {
        document::export_schema(&snapshot)
    };
    let output = match rendered {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to render output: {}", e);
            process::exit(1);
        }
    };

    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(&path, &output) {
                eprintln!("Failed to write {}: {}", path, e);
                process::exit(1);
            }
        }
        None => print!("{}", output),
    }
}
