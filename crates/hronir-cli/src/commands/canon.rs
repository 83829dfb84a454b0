//! `hronir canon` subcommands.

use anyhow::Context;
use clap::Subcommand;
use hronir_core::engine::ConsensusEngine;
use hronir_core::storage::Storage;

/// Canon subcommands.
#[derive(Debug, Subcommand)]
pub enum CanonCommand {
    /// Show the cached canonical chain.
    Show {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Recompute the canonical chain from the full path set.
    Resolve {
        /// Persist the result as the new canonical cache.
        #[arg(long)]
        rebuild: bool,

        /// Emit machine-readable JSON (includes per-candidate scores).
        #[arg(long)]
        json: bool,
    },

    /// Rank the heirs competing at a position.
    Ranking {
        /// The position to rank.
        #[arg(long)]
        position: u32,
    },

    /// Show the most informative duel at a position.
    Duel {
        /// The position to select a duel for.
        #[arg(long)]
        position: u32,
    },
}

/// Runs a canon subcommand.
pub fn run<S: Storage>(engine: &ConsensusEngine<S>, cmd: CanonCommand) -> anyhow::Result<()> {
    match cmd {
        CanonCommand::Show { json } => {
            let cache = engine.canonical_cache()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cache)?);
            } else if cache.is_empty() {
                println!("(empty canon)");
            } else {
                for (position, path_id) in &cache {
                    println!("{position}: {path_id}");
                }
            }
            Ok(())
        }

        CanonCommand::Resolve { rebuild, json } => {
            let chain = if rebuild {
                engine.rebuild_canonical_cache()?
            } else {
                engine.canonical_path()?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&chain)?);
            } else {
                for entry in &chain {
                    println!(
                        "{}: {} ({} candidate{})",
                        entry.position,
                        entry.winner,
                        entry.scores.len(),
                        if entry.scores.len() == 1 { "" } else { "s" }
                    );
                }
            }
            Ok(())
        }

        CanonCommand::Ranking { position } => {
            let ranked = engine.ranking(position).context("ranking failed")?;
            if ranked.is_empty() {
                println!("(no heirs at position {position})");
            }
            for (i, heir) in ranked.iter().enumerate() {
                println!(
                    "{:>3}. {} elo {:.1} ({}W/{}L)",
                    i + 1,
                    heir.path_id,
                    heir.rating,
                    heir.wins,
                    heir.losses
                );
            }
            Ok(())
        }

        CanonCommand::Duel { position } => {
            match engine.next_duel(position)? {
                None => println!("(no duel at position {position})"),
                Some(duel) => println!(
                    "{} vs {} (entropy {:.3})",
                    duel.candidate_a, duel.candidate_b, duel.entropy
                ),
            }
            Ok(())
        }
    }
}
