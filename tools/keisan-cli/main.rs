use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use keisan::ast::TreeDisplay;
use keisan::prelude::*;
use std::fs;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoundingCli {
    HalfAwayFromZero,
    HalfEven,
}

/// Compiles formula graphs and evaluates them against document data
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a canvas document into per-output expressions
    Compile {
        /// Path to the canvas JSON file
        canvas_path: String,
        /// Path to the field catalog JSON file
        #[arg(short, long)]
        fields: Option<String>,
        /// Path to the constant catalog JSON file
        #[arg(short, long)]
        constants: Option<String>,
        /// Treat fields missing from the catalog as errors
        #[arg(long)]
        strict_fields: bool,
        /// Write the compiled query to this file (bincode)
        #[arg(short, long)]
        output: Option<String>,
        /// Print the compiled query as JSON
        #[arg(long)]
        json: bool,
        /// Print each valid expression as a tree
        #[arg(long)]
        tree: bool,
    },
    /// Evaluate a compiled query against a document
    Evaluate {
        /// Path to a compiled query (bincode) or a canvas JSON file
        query_path: String,
        /// Path to the document data JSON file
        document_path: String,
        /// Path to the field catalog JSON file, used when compiling a canvas
        #[arg(short, long)]
        fields: Option<String>,
        /// Path to the constant catalog JSON file
        #[arg(short, long)]
        constants: Option<String>,
        /// How ROUND breaks ties
        #[arg(short, long, value_enum, default_value = "half-away-from-zero")]
        rounding: RoundingCli,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "keisan=info",
        1 => "keisan=debug",
        _ => "keisan=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Compile {
            canvas_path,
            fields,
            constants,
            strict_fields,
            output,
            json,
            tree,
        } => run_compile(canvas_path, fields, constants, strict_fields, output, json, tree),
        Command::Evaluate {
            query_path,
            document_path,
            fields,
            constants,
            rounding,
        } => run_evaluate(query_path, document_path, fields, constants, rounding),
    }
}

fn load_fields(path: Option<&str>) -> FieldCatalog {
    match path {
        Some(path) => {
            let json = read_file(path);
            FieldCatalog::from_json(&json).unwrap_or_else(|e| {
                exit_with_error(&format!("Failed to parse field catalog '{}': {}", path, e))
            })
        }
        None => FieldCatalog::new(),
    }
}

fn load_constants(path: Option<&str>) -> ConstantCatalog {
    match path {
        Some(path) => {
            let json = read_file(path);
            ConstantCatalog::from_json(&json).unwrap_or_else(|e| {
                exit_with_error(&format!("Failed to parse constant catalog '{}': {}", path, e))
            })
        }
        None => ConstantCatalog::new(),
    }
}

fn read_file(path: &str) -> String {
    fs::read_to_string(path)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to read file '{}': {}", path, e)))
}

fn compile_canvas(
    canvas_path: &str,
    fields: FieldCatalog,
    constants: ConstantCatalog,
    strict_fields: bool,
) -> QueryCompilation {
    let parsed = parse_canvas(&read_file(canvas_path))
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse canvas: {}", e)));
    for diagnostic in &parsed.diagnostics {
        println!("  [{}] {}", diagnostic.code(), diagnostic);
    }

    let start = Instant::now();
    let compilation = Compiler::builder(parsed.graph)
        .with_field_catalog(fields)
        .with_constant_catalog(constants)
        .strict_fields(strict_fields)
        .build()
        .compile();
    info!(elapsed = ?start.elapsed(), "compilation finished");
    compilation
}

fn run_compile(
    canvas_path: String,
    fields: Option<String>,
    constants: Option<String>,
    strict_fields: bool,
    output: Option<String>,
    json: bool,
    tree: bool,
) {
    let compilation = compile_canvas(
        &canvas_path,
        load_fields(fields.as_deref()),
        load_constants(constants.as_deref()),
        strict_fields,
    );

    println!("\n--- Compiled Outputs ---");
    for output in &compilation.outputs {
        println!("{:>3}. {} = {}", output.execution_order, output.name, output.expression);
        for diagnostic in &output.diagnostics {
            println!("       {}", diagnostic);
        }
        if let (true, CompiledExpression::Valid(source)) = (tree, &output.expression) {
            match parse_expression(source) {
                Ok(expr) => print!("{}", TreeDisplay { expr: &expr }),
                Err(e) => println!("       (tree unavailable: {})", e),
            }
        }
    }
    if let Some(error) = &compilation.ordering_error {
        println!("\nOrdering: {}", error);
    }

    let valid = compilation.is_valid();
    let query = compilation.into_query();
    if json {
        let rendered = query
            .to_json()
            .unwrap_or_else(|e| exit_with_error(&format!("JSON export failed: {}", e)));
        println!("{}", rendered);
    }
    if let Some(path) = output {
        query
            .save(&path)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to save compiled query: {}", e)));
        println!("\nCompiled query written to '{}'", path);
    }
    if !valid {
        std::process::exit(2);
    }
}

fn run_evaluate(
    query_path: String,
    document_path: String,
    fields: Option<String>,
    constants: Option<String>,
    rounding: RoundingCli,
) {
    let constants = load_constants(constants.as_deref());
    let query = if query_path.ends_with(".json") {
        compile_canvas(&query_path, load_fields(fields.as_deref()), constants.clone(), false).into_query()
    } else {
        CompiledQuery::from_file(&query_path).unwrap_or_else(|e| {
            exit_with_error(&format!("Failed to load compiled query '{}': {}", query_path, e))
        })
    };
    let document = DocumentData::from_file(&document_path).unwrap_or_else(|e| {
        exit_with_error(&format!("Failed to load document data from '{}': {}", document_path, e))
    });

    let rounding = match rounding {
        RoundingCli::HalfAwayFromZero => RoundingMode::HalfAwayFromZero,
        RoundingCli::HalfEven => RoundingMode::HalfEven,
    };
    let evaluator = Evaluator::builder(query.outputs).rounding(rounding).build();

    let start = Instant::now();
    let result = evaluator.evaluate(&document, &constants.values());
    info!(elapsed = ?start.elapsed(), "evaluation finished");

    let rendered = serde_json::to_string_pretty(&result)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to render result: {}", e)));
    println!("{}", rendered);
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
