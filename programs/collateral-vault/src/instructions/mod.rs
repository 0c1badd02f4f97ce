use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
};
use spl_associated_token_account::get_associated_token_address;

use crate::state::{find_position_address, find_vault_authority};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub enum VaultInstruction {
    /// Build the protocol registry from parallel collateral/oracle lists
    /// Accounts:
    /// 0. `[signer, writable]` Authority (pays for the registry account)
    /// 1. `[signer, writable]` Registry account (fresh keypair)
    /// 2. `[]` Debt asset mint
    /// 3. `[]` System program
    /// 4. `[]` Rent sysvar
    /// 5... `[]` One collateral mint account per entry, registry order
    InitializeRegistry {
        collateral_mints: Vec<Pubkey>,
        price_oracles: Vec<Pubkey>,
    },

    /// Deposit collateral into the caller's position
    /// Accounts:
    /// 0. `[signer, writable]` Depositor (pays position rent on first deposit)
    /// 1. `[writable]` Registry account
    /// 2. `[writable]` Depositor position (PDA)
    /// 3. `[writable]` Depositor collateral token account
    /// 4. `[writable]` Vault collateral custody account
    /// 5. `[]` Token program
    /// 6. `[]` System program
    Deposit {
        collateral_mint: Pubkey,
        amount: u64,
    },

    /// Deposit collateral and mint debt as one atomic operation
    /// Accounts:
    /// 0. `[signer, writable]` Caller
    /// 1. `[writable]` Registry account
    /// 2. `[writable]` Caller position (PDA)
    /// 3. `[writable]` Caller collateral token account
    /// 4. `[writable]` Vault collateral custody account
    /// 5. `[writable]` Debt asset mint
    /// 6. `[writable]` Caller debt token account
    /// 7. `[]` Vault authority (PDA)
    /// 8. `[]` Token program
    /// 9. `[]` System program
    /// 10... `[]` One price feed per registered collateral, registry order
    DepositAndMint {
        collateral_mint: Pubkey,
        collateral_amount: u64,
        debt_amount: u64,
    },

    /// Redeem deposited collateral out of the caller's position
    /// Accounts:
    /// 0. `[signer]` Caller
    /// 1. `[writable]` Registry account
    /// 2. `[writable]` Caller position (PDA)
    /// 3. `[writable]` Recipient collateral token account
    /// 4. `[writable]` Vault collateral custody account
    /// 5. `[]` Vault authority (PDA)
    /// 6. `[]` Token program
    /// 7... `[]` One price feed per registered collateral, registry order
    Redeem {
        collateral_mint: Pubkey,
        amount: u64,
    },

    /// Burn debt, then redeem collateral, as one atomic operation
    /// Accounts:
    /// 0. `[signer]` Caller
    /// 1. `[writable]` Registry account
    /// 2. `[writable]` Caller position (PDA)
    /// 3. `[writable]` Debt asset mint
    /// 4. `[writable]` Caller debt token account
    /// 5. `[writable]` Vault debt custody account
    /// 6. `[writable]` Recipient collateral token account
    /// 7. `[writable]` Vault collateral custody account
    /// 8. `[]` Vault authority (PDA)
    /// 9. `[]` Token program
    /// 10... `[]` One price feed per registered collateral, registry order
    RedeemForBurn {
        collateral_mint: Pubkey,
        collateral_amount: u64,
        debt_amount: u64,
    },

    /// Mint synthetic debt against the caller's position
    /// Accounts:
    /// 0. `[signer]` Caller
    /// 1. `[writable]` Registry account
    /// 2. `[writable]` Caller position (PDA)
    /// 3. `[writable]` Debt asset mint
    /// 4. `[writable]` Caller debt token account
    /// 5. `[]` Vault authority (PDA)
    /// 6. `[]` Token program
    /// 7... `[]` One price feed per registered collateral, registry order
    Mint { amount: u64 },

    /// Repay (burn) synthetic debt of the payer's position
    /// Accounts:
    /// 0. `[signer]` Payer
    /// 1. `[writable]` Registry account
    /// 2. `[writable]` Payer position (PDA)
    /// 3. `[writable]` Debt asset mint
    /// 4. `[writable]` Payer debt token account
    /// 5. `[writable]` Vault debt custody account
    /// 6. `[]` Vault authority (PDA)
    /// 7. `[]` Token program
    Burn { amount: u64 },

    /// Liquidate an unhealthy position
    /// Accounts:
    /// 0. `[signer]` Liquidator
    /// 1. `[writable]` Registry account
    /// 2. `[writable]` Debtor position (PDA)
    /// 3. `[]` Liquidator position (PDA, may be uninitialized)
    /// 4. `[writable]` Liquidator collateral token account
    /// 5. `[writable]` Vault collateral custody account
    /// 6. `[writable]` Debt asset mint
    /// 7. `[writable]` Liquidator debt token account
    /// 8. `[writable]` Vault debt custody account
    /// 9. `[]` Vault authority (PDA)
    /// 10. `[]` Token program
    /// 11... `[]` One price feed per registered collateral, registry order
    Liquidate {
        collateral_mint: Pubkey,
        debtor: Pubkey,
        debt_to_cover: u64,
    },
}

impl VaultInstruction {
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (&variant, rest) = input
            .split_first()
            .ok_or(ProgramError::InvalidInstructionData)?;

        Ok(match variant {
            0 => {
                let payload = InitializeRegistryPayload::try_from_slice(rest)?;
                Self::InitializeRegistry {
                    collateral_mints: payload.collateral_mints,
                    price_oracles: payload.price_oracles,
                }
            }
            1 => {
                let payload = DepositPayload::try_from_slice(rest)?;
                Self::Deposit {
                    collateral_mint: payload.collateral_mint,
                    amount: payload.amount,
                }
            }
            2 => {
                let payload = DepositAndMintPayload::try_from_slice(rest)?;
                Self::DepositAndMint {
                    collateral_mint: payload.collateral_mint,
                    collateral_amount: payload.collateral_amount,
                    debt_amount: payload.debt_amount,
                }
            }
            3 => {
                let payload = RedeemPayload::try_from_slice(rest)?;
                Self::Redeem {
                    collateral_mint: payload.collateral_mint,
                    amount: payload.amount,
                }
            }
            4 => {
                let payload = RedeemForBurnPayload::try_from_slice(rest)?;
                Self::RedeemForBurn {
                    collateral_mint: payload.collateral_mint,
                    collateral_amount: payload.collateral_amount,
                    debt_amount: payload.debt_amount,
                }
            }
            5 => {
                let payload = AmountPayload::try_from_slice(rest)?;
                Self::Mint {
                    amount: payload.amount,
                }
            }
            6 => {
                let payload = AmountPayload::try_from_slice(rest)?;
                Self::Burn {
                    amount: payload.amount,
                }
            }
            7 => {
                let payload = LiquidatePayload::try_from_slice(rest)?;
                Self::Liquidate {
                    collateral_mint: payload.collateral_mint,
                    debtor: payload.debtor,
                    debt_to_cover: payload.debt_to_cover,
                }
            }
            _ => return Err(ProgramError::InvalidInstructionData),
        })
    }

    fn pack(&self) -> Vec<u8> {
        let (variant, payload) = match self {
            Self::InitializeRegistry {
                collateral_mints,
                price_oracles,
            } => (
                0u8,
                borsh::to_vec(&InitializeRegistryPayload {
                    collateral_mints: collateral_mints.clone(),
                    price_oracles: price_oracles.clone(),
                }),
            ),
            Self::Deposit {
                collateral_mint,
                amount,
            } => (
                1,
                borsh::to_vec(&DepositPayload {
                    collateral_mint: *collateral_mint,
                    amount: *amount,
                }),
            ),
            Self::DepositAndMint {
                collateral_mint,
                collateral_amount,
                debt_amount,
            } => (
                2,
                borsh::to_vec(&DepositAndMintPayload {
                    collateral_mint: *collateral_mint,
                    collateral_amount: *collateral_amount,
                    debt_amount: *debt_amount,
                }),
            ),
            Self::Redeem {
                collateral_mint,
                amount,
            } => (
                3,
                borsh::to_vec(&RedeemPayload {
                    collateral_mint: *collateral_mint,
                    amount: *amount,
                }),
            ),
            Self::RedeemForBurn {
                collateral_mint,
                collateral_amount,
                debt_amount,
            } => (
                4,
                borsh::to_vec(&RedeemForBurnPayload {
                    collateral_mint: *collateral_mint,
                    collateral_amount: *collateral_amount,
                    debt_amount: *debt_amount,
                }),
            ),
            Self::Mint { amount } => (5, borsh::to_vec(&AmountPayload { amount: *amount })),
            Self::Burn { amount } => (6, borsh::to_vec(&AmountPayload { amount: *amount })),
            Self::Liquidate {
                collateral_mint,
                debtor,
                debt_to_cover,
            } => (
                7,
                borsh::to_vec(&LiquidatePayload {
                    collateral_mint: *collateral_mint,
                    debtor: *debtor,
                    debt_to_cover: *debt_to_cover,
                }),
            ),
        };
        let mut data = vec![variant];
        data.extend(payload.unwrap());
        data
    }
}

// Payload structs for the instruction data
#[derive(BorshSerialize, BorshDeserialize)]
struct InitializeRegistryPayload {
    collateral_mints: Vec<Pubkey>,
    price_oracles: Vec<Pubkey>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct DepositPayload {
    collateral_mint: Pubkey,
    amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct DepositAndMintPayload {
    collateral_mint: Pubkey,
    collateral_amount: u64,
    debt_amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct RedeemPayload {
    collateral_mint: Pubkey,
    amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct RedeemForBurnPayload {
    collateral_mint: Pubkey,
    collateral_amount: u64,
    debt_amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct AmountPayload {
    amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct LiquidatePayload {
    collateral_mint: Pubkey,
    debtor: Pubkey,
    debt_to_cover: u64,
}

fn feed_metas(price_oracles: &[Pubkey]) -> impl Iterator<Item = AccountMeta> + '_ {
    price_oracles
        .iter()
        .map(|feed| AccountMeta::new_readonly(*feed, false))
}

// Helper functions to create instructions
pub fn initialize_registry(
    program_id: &Pubkey,
    authority: &Pubkey,
    registry: &Pubkey,
    debt_mint: &Pubkey,
    collateral_mints: &[Pubkey],
    price_oracles: &[Pubkey],
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(*authority, true),
        AccountMeta::new(*registry, true),
        AccountMeta::new_readonly(*debt_mint, false),
        AccountMeta::new_readonly(solana_program::system_program::id(), false),
        AccountMeta::new_readonly(solana_program::sysvar::rent::id(), false),
    ];
    accounts.extend(
        collateral_mints
            .iter()
            .map(|mint| AccountMeta::new_readonly(*mint, false)),
    );

    Instruction {
        program_id: *program_id,
        accounts,
        data: VaultInstruction::InitializeRegistry {
            collateral_mints: collateral_mints.to_vec(),
            price_oracles: price_oracles.to_vec(),
        }
        .pack(),
    }
}

pub fn deposit(
    program_id: &Pubkey,
    depositor: &Pubkey,
    registry: &Pubkey,
    collateral_mint: &Pubkey,
    depositor_token_account: &Pubkey,
    amount: u64,
) -> Instruction {
    let (position, _) = find_position_address(program_id, registry, depositor);
    let (vault_authority, _) = find_vault_authority(program_id, registry);
    let vault_token_account = get_associated_token_address(&vault_authority, collateral_mint);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*depositor, true),
            AccountMeta::new(*registry, false),
            AccountMeta::new(position, false),
            AccountMeta::new(*depositor_token_account, false),
            AccountMeta::new(vault_token_account, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(solana_program::system_program::id(), false),
        ],
        data: VaultInstruction::Deposit {
            collateral_mint: *collateral_mint,
            amount,
        }
        .pack(),
    }
}

pub fn deposit_and_mint(
    program_id: &Pubkey,
    caller: &Pubkey,
    registry: &Pubkey,
    collateral_mint: &Pubkey,
    caller_collateral_account: &Pubkey,
    debt_mint: &Pubkey,
    caller_debt_account: &Pubkey,
    price_oracles: &[Pubkey],
    collateral_amount: u64,
    debt_amount: u64,
) -> Instruction {
    let (position, _) = find_position_address(program_id, registry, caller);
    let (vault_authority, _) = find_vault_authority(program_id, registry);
    let vault_token_account = get_associated_token_address(&vault_authority, collateral_mint);

    let mut accounts = vec![
        AccountMeta::new(*caller, true),
        AccountMeta::new(*registry, false),
        AccountMeta::new(position, false),
        AccountMeta::new(*caller_collateral_account, false),
        AccountMeta::new(vault_token_account, false),
        AccountMeta::new(*debt_mint, false),
        AccountMeta::new(*caller_debt_account, false),
        AccountMeta::new_readonly(vault_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(solana_program::system_program::id(), false),
    ];
    accounts.extend(feed_metas(price_oracles));

    Instruction {
        program_id: *program_id,
        accounts,
        data: VaultInstruction::DepositAndMint {
            collateral_mint: *collateral_mint,
            collateral_amount,
            debt_amount,
        }
        .pack(),
    }
}

pub fn redeem(
    program_id: &Pubkey,
    caller: &Pubkey,
    registry: &Pubkey,
    collateral_mint: &Pubkey,
    recipient_token_account: &Pubkey,
    price_oracles: &[Pubkey],
    amount: u64,
) -> Instruction {
    let (position, _) = find_position_address(program_id, registry, caller);
    let (vault_authority, _) = find_vault_authority(program_id, registry);
    let vault_token_account = get_associated_token_address(&vault_authority, collateral_mint);

    let mut accounts = vec![
        AccountMeta::new_readonly(*caller, true),
        AccountMeta::new(*registry, false),
        AccountMeta::new(position, false),
        AccountMeta::new(*recipient_token_account, false),
        AccountMeta::new(vault_token_account, false),
        AccountMeta::new_readonly(vault_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];
    accounts.extend(feed_metas(price_oracles));

    Instruction {
        program_id: *program_id,
        accounts,
        data: VaultInstruction::Redeem {
            collateral_mint: *collateral_mint,
            amount,
        }
        .pack(),
    }
}

pub fn redeem_for_burn(
    program_id: &Pubkey,
    caller: &Pubkey,
    registry: &Pubkey,
    collateral_mint: &Pubkey,
    debt_mint: &Pubkey,
    caller_debt_account: &Pubkey,
    recipient_token_account: &Pubkey,
    price_oracles: &[Pubkey],
    collateral_amount: u64,
    debt_amount: u64,
) -> Instruction {
    let (position, _) = find_position_address(program_id, registry, caller);
    let (vault_authority, _) = find_vault_authority(program_id, registry);
    let vault_collateral_account = get_associated_token_address(&vault_authority, collateral_mint);
    let vault_debt_account = get_associated_token_address(&vault_authority, debt_mint);

    let mut accounts = vec![
        AccountMeta::new_readonly(*caller, true),
        AccountMeta::new(*registry, false),
        AccountMeta::new(position, false),
        AccountMeta::new(*debt_mint, false),
        AccountMeta::new(*caller_debt_account, false),
        AccountMeta::new(vault_debt_account, false),
        AccountMeta::new(*recipient_token_account, false),
        AccountMeta::new(vault_collateral_account, false),
        AccountMeta::new_readonly(vault_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];
    accounts.extend(feed_metas(price_oracles));

    Instruction {
        program_id: *program_id,
        accounts,
        data: VaultInstruction::RedeemForBurn {
            collateral_mint: *collateral_mint,
            collateral_amount,
            debt_amount,
        }
        .pack(),
    }
}

pub fn mint(
    program_id: &Pubkey,
    caller: &Pubkey,
    registry: &Pubkey,
    debt_mint: &Pubkey,
    caller_debt_account: &Pubkey,
    price_oracles: &[Pubkey],
    amount: u64,
) -> Instruction {
    let (position, _) = find_position_address(program_id, registry, caller);
    let (vault_authority, _) = find_vault_authority(program_id, registry);

    let mut accounts = vec![
        AccountMeta::new_readonly(*caller, true),
        AccountMeta::new(*registry, false),
        AccountMeta::new(position, false),
        AccountMeta::new(*debt_mint, false),
        AccountMeta::new(*caller_debt_account, false),
        AccountMeta::new_readonly(vault_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];
    accounts.extend(feed_metas(price_oracles));

    Instruction {
        program_id: *program_id,
        accounts,
        data: VaultInstruction::Mint { amount }.pack(),
    }
}

pub fn burn(
    program_id: &Pubkey,
    payer: &Pubkey,
    registry: &Pubkey,
    debt_mint: &Pubkey,
    payer_debt_account: &Pubkey,
    amount: u64,
) -> Instruction {
    let (position, _) = find_position_address(program_id, registry, payer);
    let (vault_authority, _) = find_vault_authority(program_id, registry);
    let vault_debt_account = get_associated_token_address(&vault_authority, debt_mint);

    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*payer, true),
            AccountMeta::new(*registry, false),
            AccountMeta::new(position, false),
            AccountMeta::new(*debt_mint, false),
            AccountMeta::new(*payer_debt_account, false),
            AccountMeta::new(vault_debt_account, false),
            AccountMeta::new_readonly(vault_authority, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: VaultInstruction::Burn { amount }.pack(),
    }
}

pub fn liquidate(
    program_id: &Pubkey,
    liquidator: &Pubkey,
    registry: &Pubkey,
    collateral_mint: &Pubkey,
    debtor: &Pubkey,
    liquidator_collateral_account: &Pubkey,
    debt_mint: &Pubkey,
    liquidator_debt_account: &Pubkey,
    price_oracles: &[Pubkey],
    debt_to_cover: u64,
) -> Instruction {
    let (debtor_position, _) = find_position_address(program_id, registry, debtor);
    let (liquidator_position, _) = find_position_address(program_id, registry, liquidator);
    let (vault_authority, _) = find_vault_authority(program_id, registry);
    let vault_collateral_account = get_associated_token_address(&vault_authority, collateral_mint);
    let vault_debt_account = get_associated_token_address(&vault_authority, debt_mint);

    let mut accounts = vec![
        AccountMeta::new_readonly(*liquidator, true),
        AccountMeta::new(*registry, false),
        AccountMeta::new(debtor_position, false),
        AccountMeta::new_readonly(liquidator_position, false),
        AccountMeta::new(*liquidator_collateral_account, false),
        AccountMeta::new(vault_collateral_account, false),
        AccountMeta::new(*debt_mint, false),
        AccountMeta::new(*liquidator_debt_account, false),
        AccountMeta::new(vault_debt_account, false),
        AccountMeta::new_readonly(vault_authority, false),
        AccountMeta::new_readonly(spl_token::id(), false),
    ];
    accounts.extend(feed_metas(price_oracles));

    Instruction {
        program_id: *program_id,
        accounts,
        data: VaultInstruction::Liquidate {
            collateral_mint: *collateral_mint,
            debtor: *debtor,
            debt_to_cover,
        }
        .pack(),
    }
}
