use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{program_error::ProgramError, pubkey::Pubkey};

use crate::error::VaultError;

/// Upper bound on registered collateral types; sizes the registry account
pub const MAX_COLLATERAL_TYPES: usize = 8;

/// One accepted collateral type and its price source
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct CollateralConfig {
    /// Collateral token mint
    pub mint: Pubkey,

    /// Price feed account for this collateral
    pub price_oracle: Pubkey,

    /// Base-unit decimals of the mint
    pub decimals: u8,

    /// Units of this collateral currently in engine custody
    pub total_deposited: u64,
}

/// Engine-wide registry: accepted collateral set, debt mint reference and
/// the reentrancy lock. Built once at initialization; the collateral set is
/// immutable afterwards.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct Registry {
    /// Account discriminator
    pub discriminator: [u8; 8],

    /// Is initialized
    pub is_initialized: bool,

    /// Authority that initialized the registry
    pub authority: Pubkey,

    /// Mint of the synthetic debt asset
    pub debt_mint: Pubkey,

    /// Base-unit decimals of the debt mint
    pub debt_decimals: u8,

    /// Bump of the vault authority PDA
    pub vault_authority_bump: u8,

    /// Reentrancy lock, persisted before any external call
    pub locked: bool,

    /// Debt units outstanding across all positions
    pub total_debt: u64,

    /// Accepted collateral types, in registration order
    pub collaterals: Vec<CollateralConfig>,
}

impl Registry {
    pub const DISCRIMINATOR: [u8; 8] = [67, 68, 80, 95, 82, 69, 71, 83]; // "CDP_REGS"

    pub const LEN: usize = 8 + // discriminator
        1 + // is_initialized
        32 + // authority
        32 + // debt_mint
        1 + // debt_decimals
        1 + // vault_authority_bump
        1 + // locked
        8 + // total_debt
        4 + (MAX_COLLATERAL_TYPES * (32 + 32 + 1 + 8)) + // collaterals vec
        64; // padding

    /// The parallel-list contract of registry construction
    pub fn check_parallel_lists(
        collateral_mints: &[Pubkey],
        price_oracles: &[Pubkey],
    ) -> Result<(), VaultError> {
        if collateral_mints.len() != price_oracles.len() {
            return Err(VaultError::ConfigurationMismatch);
        }
        if collateral_mints.len() > MAX_COLLATERAL_TYPES {
            return Err(VaultError::TooManyCollateralTypes);
        }
        Ok(())
    }

    pub fn try_new(
        authority: Pubkey,
        debt_mint: Pubkey,
        debt_decimals: u8,
        vault_authority_bump: u8,
        collaterals: Vec<CollateralConfig>,
    ) -> Result<Self, VaultError> {
        if collaterals.len() > MAX_COLLATERAL_TYPES {
            return Err(VaultError::TooManyCollateralTypes);
        }
        Ok(Self {
            discriminator: Self::DISCRIMINATOR,
            is_initialized: true,
            authority,
            debt_mint,
            debt_decimals,
            vault_authority_bump,
            locked: false,
            total_debt: 0,
            collaterals,
        })
    }

    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.discriminator != Self::DISCRIMINATOR {
            return Err(ProgramError::InvalidAccountData);
        }
        if !self.is_initialized {
            return Err(ProgramError::UninitializedAccount);
        }
        Ok(())
    }

    /// Config for a registered collateral mint
    pub fn collateral_config(&self, mint: &Pubkey) -> Result<&CollateralConfig, ProgramError> {
        self.collaterals
            .iter()
            .find(|c| c.mint == *mint)
            .ok_or_else(|| VaultError::UnsupportedCollateralType.into())
    }

    pub fn collateral_config_mut(
        &mut self,
        mint: &Pubkey,
    ) -> Result<&mut CollateralConfig, ProgramError> {
        self.collaterals
            .iter_mut()
            .find(|c| c.mint == *mint)
            .ok_or_else(|| VaultError::UnsupportedCollateralType.into())
    }

    /// Accepted collateral mints in registration order
    pub fn collateral_types(&self) -> Vec<Pubkey> {
        self.collaterals.iter().map(|c| c.mint).collect()
    }

    /// Take the engine-wide lock; rejects nested mutating operations
    pub fn enter(&mut self) -> Result<(), ProgramError> {
        if self.locked {
            return Err(VaultError::OperationInProgress.into());
        }
        self.locked = true;
        Ok(())
    }

    /// Release the engine-wide lock
    pub fn exit(&mut self) {
        self.locked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_parallel_lists_are_rejected() {
        let mints = vec![Pubkey::new_unique()];
        let oracles = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        assert_eq!(
            Registry::check_parallel_lists(&mints, &oracles),
            Err(VaultError::ConfigurationMismatch)
        );
        assert_eq!(Registry::check_parallel_lists(&mints, &mints), Ok(()));
    }

    #[test]
    fn collateral_set_is_capped() {
        let mints: Vec<Pubkey> = (0..MAX_COLLATERAL_TYPES + 1)
            .map(|_| Pubkey::new_unique())
            .collect();
        assert_eq!(
            Registry::check_parallel_lists(&mints, &mints),
            Err(VaultError::TooManyCollateralTypes)
        );
    }

    #[test]
    fn lock_rejects_nested_entry() {
        let mut registry = Registry::try_new(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            9,
            255,
            Vec::new(),
        )
        .unwrap();
        registry.enter().unwrap();
        assert!(registry.enter().is_err());
        registry.exit();
        assert!(registry.enter().is_ok());
    }
}
