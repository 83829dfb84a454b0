//! `hronir ledger` subcommands.

use clap::Subcommand;
use hronir_core::engine::ConsensusEngine;
use hronir_core::storage::Storage;

/// Ledger subcommands.
#[derive(Debug, Subcommand)]
pub enum LedgerCommand {
    /// Verify the transaction chain from HEAD back to genesis.
    Verify,

    /// Show the current ledger HEAD.
    Head,
}

/// Runs a ledger subcommand.
pub fn run<S: Storage>(engine: &ConsensusEngine<S>, cmd: LedgerCommand) -> anyhow::Result<()> {
    match cmd {
        LedgerCommand::Verify => {
            let verified = engine.verify_ledger()?;
            println!("chain ok: {verified} transaction(s) verified");
            Ok(())
        }

        LedgerCommand::Head => {
            match engine.storage().get_head_transaction_id()? {
                None => println!("(empty ledger)"),
                Some(head) => println!("{head}"),
            }
            Ok(())
        }
    }
}
