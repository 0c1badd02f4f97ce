use borsh::BorshDeserialize;
use solana_program::{program_error::ProgramError, pubkey::Pubkey};

pub mod oracle;
pub mod position;
pub mod registry;

pub use oracle::PriceFeed;
pub use position::{CollateralBalance, Position};
pub use registry::{CollateralConfig, Registry, MAX_COLLATERAL_TYPES};

/// Seed prefix of position PDAs
pub const POSITION_SEED: &[u8] = b"position";
/// Seed prefix of the vault authority PDA
pub const VAULT_AUTHORITY_SEED: &[u8] = b"vault_authority";

/// Position PDA of `owner` under `registry`
pub fn find_position_address(
    program_id: &Pubkey,
    registry: &Pubkey,
    owner: &Pubkey,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[POSITION_SEED, registry.as_ref(), owner.as_ref()],
        program_id,
    )
}

/// Custody and mint authority PDA of an engine instance
pub fn find_vault_authority(program_id: &Pubkey, registry: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[VAULT_AUTHORITY_SEED, registry.as_ref()], program_id)
}

/// Deserialize an account payload, tolerating the zero padding that
/// fixed-size accounts carry past the serialized bytes. `try_from_slice`
/// rejects trailing bytes and must not be used on account data.
pub fn unpack_account<T: BorshDeserialize>(data: &[u8]) -> Result<T, ProgramError> {
    let mut slice = data;
    T::deserialize(&mut slice).map_err(|_| ProgramError::InvalidAccountData)
}
