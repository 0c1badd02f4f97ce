// Collateral Vault Engine for a USD-pegged synthetic asset
// Native Solana implementation - NO ANCHOR

use solana_program::entrypoint;

pub mod engine;
pub mod error;
pub mod instructions;
pub mod processor;
pub mod state;

use processor::process_instruction;

// Declare program ID
solana_program::declare_id!("Co11atVau1tEngine11111111111111111111111111");

#[cfg(not(feature = "no-entrypoint"))]
entrypoint!(process_instruction);
