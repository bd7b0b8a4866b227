use std::path::Path;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use collidb::app::App;
use collidb::archive::HttpArchiveClient;
use collidb::config::Config;
use collidb::query::Query;

#[derive(Parser)]
#[command(name = "collidb")]
#[command(about = "Query the CollisionDB collision-data service and fetch dataset archives")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve a query to its archive URL")]
    Query(QueryArgs),
    #[command(about = "Run a query, download and unpack its archive, and summarize it")]
    Fetch(QueryArgs),
}

#[derive(Args, Clone)]
struct QueryArgs {
    #[arg(long)]
    pk: Option<i64>,

    #[arg(long, value_delimiter = ',')]
    pks: Vec<i64>,

    #[arg(long)]
    reaction_text: Option<String>,

    #[arg(long = "reactant", value_name = "SPECIES")]
    reactants: Vec<String>,

    #[arg(long = "product", value_name = "SPECIES")]
    products: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    process_types: Vec<String>,

    #[arg(long)]
    method: Option<String>,

    #[arg(long)]
    data_type: Option<String>,

    #[arg(long)]
    doi: Option<String>,
}

fn build_query(args: QueryArgs) -> Query {
    let mut query = Query::new();
    if let Some(pk) = args.pk {
        query.insert("pk", pk);
    }
    if !args.pks.is_empty() {
        query.insert("pks", args.pks);
    }
    if let Some(reaction_text) = args.reaction_text {
        query.insert("reaction_text", reaction_text);
    }
    if !args.reactants.is_empty() {
        query.insert("reactants", args.reactants);
    }
    if !args.products.is_empty() {
        query.insert("products", args.products);
    }
    if !args.process_types.is_empty() {
        query.insert("process_types", args.process_types);
    }
    if let Some(method) = args.method {
        query.insert("method", method);
    }
    if let Some(data_type) = args.data_type {
        query.insert("data_type", data_type);
    }
    if let Some(doi) = args.doi {
        query.insert("doi", doi);
    }
    query
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(Path::new(path)).into_diagnostic()?,
        None => Config::default(),
    };
    let client = HttpArchiveClient::new(&config.db_url).into_diagnostic()?;
    let app = App::new(client, config);

    match cli.command {
        Commands::Query(args) => {
            let archive_url = app.query(build_query(args)).into_diagnostic()?;
            println!("{archive_url}");
        }
        Commands::Fetch(args) => {
            let fetched = app.fetch(build_query(args)).into_diagnostic()?;
            println!("dataset dir: {}", fetched.dataset_dir.display());
            println!("records: {}", fetched.manifest.record_count);
            println!();
            for (reaction, pks) in fetched.index.iter() {
                println!("{reaction}");
                println!("{}", "=".repeat(72));
                for pk in pks {
                    println!("   qid: D{pk}");
                }
                println!();
            }
        }
    }
    Ok(())
}
