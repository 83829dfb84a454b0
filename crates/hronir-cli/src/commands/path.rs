//! `hronir path` subcommands.

use anyhow::{Context, bail};
use clap::Subcommand;
use hronir_core::crypto::hash_content;
use hronir_core::engine::ConsensusEngine;
use hronir_core::ids::{HronirId, PathId};
use hronir_core::storage::Storage;

/// Path subcommands.
#[derive(Debug, Subcommand)]
pub enum PathCommand {
    /// Propose a continuation at a position.
    ///
    /// The successor hrönir is given either as a content hash or as
    /// literal text (which is hashed). Re-submitting an existing edge is
    /// a no-op.
    Create {
        /// Narrative position of the new edge.
        #[arg(long)]
        position: u32,

        /// Predecessor hrönir id (required for every position except 0).
        #[arg(long)]
        predecessor: Option<String>,

        /// Successor hrönir id.
        #[arg(long, conflicts_with = "text")]
        successor: Option<String>,

        /// Successor text; its hash becomes the hrönir id.
        #[arg(long)]
        text: Option<String>,
    },

    /// Check a path's qualification threshold and assign its mandate.
    Qualify {
        /// The path to evaluate.
        path_id: String,
    },

    /// Show a path record.
    Show {
        /// The path to show.
        path_id: String,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Runs a path subcommand.
pub fn run<S: Storage>(engine: &ConsensusEngine<S>, cmd: PathCommand) -> anyhow::Result<()> {
    match cmd {
        PathCommand::Create {
            position,
            predecessor,
            successor,
            text,
        } => {
            let successor = match (successor, text) {
                (Some(hex), None) => hex.parse::<HronirId>().context("bad successor id")?,
                (None, Some(text)) => HronirId::from_bytes(hash_content(text.as_bytes())),
                _ => bail!("exactly one of --successor or --text is required"),
            };
            let predecessor = predecessor
                .map(|p| p.parse::<HronirId>())
                .transpose()
                .context("bad predecessor id")?;

            let path = engine.create_path(position, predecessor, successor)?;
            println!("{}", path.path_id);
            Ok(())
        }

        PathCommand::Qualify { path_id } => {
            let path_id: PathId = path_id.parse().context("bad path id")?;
            let path = engine.check_qualification(&path_id)?;
            let mandate = path
                .mandate_id
                .map_or_else(|| "-".to_string(), |m| m.to_string());
            println!("status: {}", path.status);
            println!("mandate: {mandate}");
            Ok(())
        }

        PathCommand::Show { path_id, json } => {
            let path_id: PathId = path_id.parse().context("bad path id")?;
            let path = engine.get_path(&path_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&path)?);
            } else {
                println!("path:        {}", path.path_id);
                println!("position:    {}", path.position);
                println!(
                    "predecessor: {}",
                    path.predecessor
                        .map_or_else(|| "-".to_string(), |p| p.to_string())
                );
                println!("successor:   {}", path.successor);
                println!("status:      {}", path.status);
            }
            Ok(())
        }
    }
}
