//! `hronir session` subcommands.

use std::collections::BTreeMap;

use anyhow::Context;
use clap::Subcommand;
use hronir_core::engine::ConsensusEngine;
use hronir_core::ids::{PathId, SessionId};
use hronir_core::storage::Storage;

/// Session subcommands.
#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Activate a qualified path's mandate and freeze its dossier.
    Start {
        /// The qualified path.
        path_id: String,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Commit verdicts against a session's frozen dossier.
    ///
    /// Each verdict names a dossier position and the winning path, as
    /// `position=path_id`. The mandate is consumed whether or not any
    /// verdict survives screening.
    Commit {
        /// The active session.
        session_id: String,

        /// A verdict, repeatable: `position=path_id`.
        #[arg(long = "verdict", value_name = "POS=PATH_ID")]
        verdicts: Vec<String>,
    },
}

fn parse_verdict(raw: &str) -> anyhow::Result<(u32, PathId)> {
    let (position, path_id) = raw
        .split_once('=')
        .with_context(|| format!("bad verdict '{raw}': expected position=path_id"))?;
    let position: u32 = position
        .parse()
        .with_context(|| format!("bad verdict position '{position}'"))?;
    let path_id: PathId = path_id
        .parse()
        .with_context(|| format!("bad verdict path id '{path_id}'"))?;
    Ok((position, path_id))
}


/// Runs a session subcommand.
pub fn run<S: Storage>(engine: &ConsensusEngine<S>, cmd: SessionCommand) -> anyhow::Result<()> {
    match cmd {
        SessionCommand::Start { path_id, json } => {
            let path_id: PathId = path_id.parse().context("bad path id")?;
            let session = engine.start_session(&path_id)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                println!("session: {}", session.session_id);
                println!("budget:  {}", hronir_core::mandate::vote_budget(session.position_of_mandate));
                println!("dossier:");
                for (position, duel) in &session.dossier {
                    println!(
                        "  {position}: {} vs {} (entropy {:.3})",
                        duel.candidate_a, duel.candidate_b, duel.entropy
                    );
                }
            }
            Ok(())
        }

        SessionCommand::Commit {
            session_id,
            verdicts,
        } => {
            let session_id: SessionId = session_id.parse().context("bad session id")?;
            let verdicts = verdicts
                .iter()
                .map(|raw| parse_verdict(raw))
                .collect::<anyhow::Result<BTreeMap<u32, PathId>>>()?;

            let outcome = engine.commit_session(&session_id, &verdicts)?;

            println!("status: {}", outcome.status);
            for (position, winner) in &outcome.accepted {
                println!("accepted: {position} -> {winner}");
            }
            for rejection in &outcome.rejected {
                println!(
                    "rejected: {} -> {} ({})",
                    rejection.position, rejection.winner, rejection.reason
                );
            }
            if let Some(tx) = &outcome.transaction {
                println!("transaction: {}", tx.tx_id);
            }
            if let Some(cascade) = &outcome.cascade {
                for (position, winner) in &cascade.updated {
                    println!("canon: {position} -> {winner}");
                }
                if let Some(from) = cascade.truncated_from {
                    println!("canon truncated from position {from}");
                }
            }
            Ok(())
        }
    }
}
