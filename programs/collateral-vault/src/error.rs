use num_derive::FromPrimitive;
use solana_program::{
    decode_error::DecodeError,
    msg,
    program_error::{PrintProgramError, ProgramError},
};
use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum VaultError {
    #[error("Amount must be positive")]
    AmountMustBePositive,

    #[error("Collateral type is not registered")]
    UnsupportedCollateralType,

    #[error("Collateral and oracle lists differ in length")]
    ConfigurationMismatch,

    #[error("External token transfer failed")]
    TransferFailed,

    #[error("Debt asset mint failed")]
    MintFailed,

    #[error("Operation would leave the account below the minimum health factor")]
    HealthFactorBroken,

    #[error("Account is not liquidatable")]
    HealthFactorOk,

    #[error("Liquidation did not improve the debtor's health factor")]
    HealthFactorNotImproved,

    #[error("Insufficient tracked balance")]
    InsufficientBalance,

    #[error("Invalid instruction")]
    InvalidInstruction,

    #[error("Account not initialized")]
    AccountNotInitialized,

    #[error("Debt mint authority is not held by the engine")]
    InvalidMintAuthority,

    #[error("Token ledger account does not match the registry")]
    InvalidVaultAccount,

    #[error("Price oracle account does not match the registry")]
    OracleMismatch,

    #[error("Another vault operation is already in flight")]
    OperationInProgress,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("Too many collateral types")]
    TooManyCollateralTypes,
}

impl From<VaultError> for ProgramError {
    fn from(e: VaultError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for VaultError {
    fn type_of() -> &'static str {
        "VaultError"
    }
}

impl PrintProgramError for VaultError {
    fn print<E>(&self)
    where
        E: 'static
            + std::error::Error
            + DecodeError<E>
            + PrintProgramError
            + num_traits::FromPrimitive,
    {
        msg!("{}", self);
    }
}
