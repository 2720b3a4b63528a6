//! Writes the JSON Schema of every timeline payload.
//!
//! One `<EVENT_TYPE>.schema.json` file per payload, for consumers of the
//! timeline that validate events outside Rust.

use anyhow::Context;
use clap::Parser;
use rfq_dispatch::domain::events::{
    AttachmentAdded, CommentCorrected, CommentCreated, Mentioned, RfqAwarded, RfqSendRequested,
    RfqStateChanged, SendAttemptCreated, SendAttemptStatusUpdated, TimelinePayload,
};
use schemars::schema::RootSchema;
use schemars::{JsonSchema, schema_for};
use std::fs;
use std::path::{Path, PathBuf};

/// Exports timeline payload schemas.
#[derive(Parser, Debug)]
#[command(name = "export_schemas", version, about, long_about = None)]
struct Cli {
    /// Output directory.
    #[arg(short, long, default_value = "schemas")]
    out_dir: PathBuf,
}

fn schema<P: TimelinePayload + JsonSchema>() -> (String, RootSchema) {
    (P::EVENT_TYPE.to_string(), schema_for!(P))
}

fn write(dir: &Path, name: &str, schema: &RootSchema) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("{name}.schema.json"));
    let json = serde_json::to_string_pretty(schema).context("serializing schema")?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;

    let schemas = [
        schema::<RfqStateChanged>(),
        schema::<RfqSendRequested>(),
        schema::<SendAttemptCreated>(),
        schema::<SendAttemptStatusUpdated>(),
        schema::<RfqAwarded>(),
        schema::<CommentCreated>(),
        schema::<CommentCorrected>(),
        schema::<Mentioned>(),
        schema::<AttachmentAdded>(),
    ];
    for (name, schema) in &schemas {
        let path = write(&cli.out_dir, name, schema)?;
        println!("{}", path.display());
    }
    Ok(())
}
