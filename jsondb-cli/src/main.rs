use clap::{Parser, Subcommand, ValueEnum};
use jsondb::{Database, Document, Filter};
use serde_json::{json, Value};
use std::process;

/// jsondb CLI — inspect and edit jsondb collections from the command line
#[derive(Parser)]
#[command(name = "jsondb", version, about)]
struct Cli {
    /// Directory holding the collection files
    #[arg(long, env = "JSONDB_DATA_DIR", default_value = ".")]
    data_dir: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List collections and their sizes
    List,

    /// Find documents (e.g. --where title=groceries --where 'tags*=home')
    Find {
        /// Collection name
        collection: String,
        /// Filter clauses, all of which must match
        #[arg(long = "where")]
        filters: Vec<String>,
        /// Include each document's position in the collection
        #[arg(long)]
        positions: bool,
    },

    /// Insert a document
    Insert {
        /// Collection name
        collection: String,
        /// Field values (e.g. --field title="Buy milk")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// A JSON object, or an array of objects, to insert as one batch
        #[arg(long, conflicts_with = "fields")]
        json: Option<String>,
    },

    /// Set fields on matching documents
    Update {
        /// Collection name
        collection: String,
        #[arg(long = "where", required = true)]
        filters: Vec<String>,
        /// Field values to set (e.g. --set done=true)
        #[arg(long = "set", value_parser = parse_key_value, required = true)]
        fields: Vec<(String, String)>,
    },

    /// Delete matching documents
    Delete {
        /// Collection name
        collection: String,
        #[arg(long = "where", required = true)]
        filters: Vec<String>,
        /// Show what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Declare a unique field (use `_id` for auto-increment ids)
    Index {
        /// Collection name
        collection: String,
        /// Field name
        field: String,
        /// Remove the field from the unique set instead
        #[arg(long)]
        drop: bool,
    },

    /// Check unique fields against the stored documents
    Validate {
        /// Collection name
        collection: String,
    },

    /// Recompute the `_id` counter from the stored documents
    Reindex {
        /// Collection name
        collection: String,
    },

    /// Print the raw collection file contents
    Export {
        /// Collection name
        collection: String,
        #[arg(long)]
        pretty: bool,
    },

    /// Create an empty collection (replaces existing documents)
    Create {
        /// Collection name
        collection: String,
    },

    /// Delete a collection and its index
    Drop {
        /// Collection name
        collection: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::load(&cli.data_dir)?;
    log::debug!("Using data directory {}", db.root().display());

    match cli.command {
        Command::List => {
            let mut collections = serde_json::Map::new();
            for name in db.names() {
                let col = db.get(name)?;
                collections.insert(
                    name.to_string(),
                    json!({
                        "count": col.len(),
                        "unique": col.index().fields(),
                        "id_counter": col.index().current_id(),
                    }),
                );
            }
            print_output(&Value::Object(collections), &cli.format)?;
        }

        Command::Find {
            collection,
            filters,
            positions,
        } => {
            let col = db.get(&collection)?;
            let filter = Filter::parse_all(&filters)?;
            let result = if positions {
                let rows: Vec<Value> = col
                    .find_with_position(|d| filter.matches(d))
                    .into_iter()
                    .map(|(pos, doc)| json!({ "position": pos, "document": doc }))
                    .collect();
                Value::Array(rows)
            } else {
                Value::Array(
                    col.find(|d| filter.matches(d))
                        .into_iter()
                        .map(Value::Object)
                        .collect(),
                )
            };
            print_output(&result, &cli.format)?;
        }

        Command::Insert {
            collection,
            fields,
            json,
        } => {
            let mut col = db.get(&collection)?;
            let batch = match json {
                Some(text) => parse_batch(&text)?,
                None => vec![fields_to_document(&fields)],
            };
            let inserted = col.insert(batch)?;
            col.commit()?;
            print_output(
                &json!({ "ok": true, "inserted": inserted }),
                &cli.format,
            )?;
        }

        Command::Update {
            collection,
            filters,
            fields,
        } => {
            let mut col = db.get(&collection)?;
            let filter = Filter::parse_all(&filters)?;
            let changes = fields_to_document(&fields);
            let updated = col.update(
                |doc| {
                    let mut doc = doc.clone();
                    doc.extend(changes.clone());
                    Some(doc)
                },
                |d| filter.matches(d),
            )?;
            col.commit()?;
            print_output(&json!({ "ok": true, "updated": updated }), &cli.format)?;
        }

        Command::Delete {
            collection,
            filters,
            dry_run,
        } => {
            let mut col = db.get(&collection)?;
            let filter = Filter::parse_all(&filters)?;
            if dry_run {
                let doomed = col.find(|d| filter.matches(d));
                print_output(
                    &json!({ "dry_run": true, "would_delete": doomed }),
                    &cli.format,
                )?;
            } else {
                let deleted = col.delete(|d| filter.matches(d));
                col.commit()?;
                print_output(&json!({ "ok": true, "deleted": deleted }), &cli.format)?;
            }
        }

        Command::Index {
            collection,
            field,
            drop,
        } => {
            let mut col = db.get(&collection)?;
            if drop {
                let removed = col.drop_unique(&field)?;
                print_output(&json!({ "ok": true, "removed": removed }), &cli.format)?;
            } else {
                col.declare_unique(&field)?;
                print_output(
                    &json!({ "ok": true, "unique": col.index().fields() }),
                    &cli.format,
                )?;
            }
        }

        Command::Validate { collection } => {
            let col = db.get(&collection)?;
            let report = col.report();
            print_output(&serde_json::to_value(&report)?, &cli.format)?;
            col.validate()?;
        }

        Command::Reindex { collection } => {
            let mut col = db.get(&collection)?;
            let counter = col.reindex()?;
            print_output(&json!({ "ok": true, "id_counter": counter }), &cli.format)?;
        }

        Command::Export { collection, pretty } => {
            let col = db.get(&collection)?;
            println!("{}", col.dumps(pretty)?);
        }

        Command::Create { collection } => {
            let col = db.create(&collection)?;
            print_output(
                &json!({ "ok": true, "created": col.name(), "path": col.path().display().to_string() }),
                &cli.format,
            )?;
        }

        Command::Drop { collection } => {
            let col = db.get(&collection)?;
            db.drop(col)?;
            print_output(&json!({ "ok": true, "dropped": collection }), &cli.format)?;
        }
    }

    Ok(())
}

fn print_output(
    value: &Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn fields_to_document(fields: &[(String, String)]) -> Document {
    let mut doc = Document::new();
    for (key, val) in fields {
        // Try to parse as JSON value (for numbers, booleans, arrays, objects)
        let json_val = serde_json::from_str(val).unwrap_or(Value::String(val.clone()));
        doc.insert(key.clone(), json_val);
    }
    doc
}

fn parse_batch(text: &str) -> Result<Vec<Document>, Box<dyn std::error::Error>> {
    let value: Value = serde_json::from_str(text)?;
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    items
        .into_iter()
        .map(|item| {
            jsondb::document::from_value(item)
                .ok_or_else(|| "--json must be an object or an array of objects".into())
        })
        .collect()
}
