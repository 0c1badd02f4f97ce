use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{program_error::ProgramError, pubkey::Pubkey};

use crate::error::VaultError;
use crate::state::registry::MAX_COLLATERAL_TYPES;

/// Deposited amount of one collateral mint
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy)]
pub struct CollateralBalance {
    pub mint: Pubkey,
    pub amount: u64,
}

/// Per-account position: deposited collateral per mint plus minted debt.
/// Created on first deposit, never destroyed; balances may return to zero.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct Position {
    /// Account discriminator
    pub discriminator: [u8; 8],

    /// Is initialized
    pub is_initialized: bool,

    /// Account this position belongs to
    pub owner: Pubkey,

    /// Bump of the position PDA
    pub bump: u8,

    /// Synthetic debt units minted against this position
    pub minted_debt: u64,

    /// Deposited collateral per mint
    pub collateral: Vec<CollateralBalance>,
}

impl Position {
    pub const DISCRIMINATOR: [u8; 8] = [67, 68, 80, 95, 80, 79, 83, 78]; // "CDP_POSN"

    pub const LEN: usize = 8 + // discriminator
        1 + // is_initialized
        32 + // owner
        1 + // bump
        8 + // minted_debt
        4 + (MAX_COLLATERAL_TYPES * (32 + 8)) + // collateral vec
        64; // padding

    pub fn new(owner: Pubkey, bump: u8) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            is_initialized: true,
            owner,
            bump,
            minted_debt: 0,
            collateral: Vec::new(),
        }
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

    /// Deposited amount of `mint`, zero when never deposited
    pub fn collateral_of(&self, mint: &Pubkey) -> u64 {
        self.collateral
            .iter()
            .find(|b| b.mint == *mint)
            .map(|b| b.amount)
            .unwrap_or(0)
    }

    pub fn credit_collateral(&mut self, mint: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        if let Some(balance) = self.collateral.iter_mut().find(|b| b.mint == *mint) {
            balance.amount = balance
                .amount
                .checked_add(amount)
                .ok_or(VaultError::ArithmeticOverflow)?;
            return Ok(());
        }
        if self.collateral.len() >= MAX_COLLATERAL_TYPES {
            return Err(VaultError::TooManyCollateralTypes.into());
        }
        self.collateral.push(CollateralBalance {
            mint: *mint,
            amount,
        });
        Ok(())
    }

    /// Removes collateral; the entry stays at zero rather than being dropped
    pub fn debit_collateral(&mut self, mint: &Pubkey, amount: u64) -> Result<(), ProgramError> {
        let balance = self
            .collateral
            .iter_mut()
            .find(|b| b.mint == *mint)
            .ok_or(VaultError::InsufficientBalance)?;
        balance.amount = balance
            .amount
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBalance)?;
        Ok(())
    }

    pub fn incur_debt(&mut self, amount: u64) -> Result<(), ProgramError> {
        self.minted_debt = self
            .minted_debt
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;
        Ok(())
    }

    pub fn repay_debt(&mut self, amount: u64) -> Result<(), ProgramError> {
        self.minted_debt = self
            .minted_debt
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientBalance)?;
        Ok(())
    }
}
