use borsh::BorshSerialize;
use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::{invoke, invoke_signed},
    program_error::ProgramError,
    program_option::COption,
    program_pack::Pack,
    pubkey::Pubkey,
    system_instruction,
    sysvar::{rent::Rent, Sysvar},
};
use spl_associated_token_account::get_associated_token_address;
use spl_token::{
    instruction as token_instruction,
    state::{Account as TokenAccount, Mint},
};

use crate::{
    engine::{SolvencyEngine, MIN_HEALTH_FACTOR},
    error::VaultError,
    instructions::VaultInstruction,
    state::{
        find_position_address, find_vault_authority, unpack_account, CollateralConfig, Position,
        PriceFeed, Registry, POSITION_SEED, VAULT_AUTHORITY_SEED,
    },
};

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    let instruction = VaultInstruction::unpack(instruction_data)?;

    match instruction {
        VaultInstruction::InitializeRegistry {
            collateral_mints,
            price_oracles,
        } => {
            msg!("Instruction: InitializeRegistry");
            process_initialize_registry(program_id, accounts, collateral_mints, price_oracles)
        }

        VaultInstruction::Deposit {
            collateral_mint,
            amount,
        } => {
            msg!("Instruction: Deposit");
            process_deposit(program_id, accounts, collateral_mint, amount)
        }

        VaultInstruction::DepositAndMint {
            collateral_mint,
            collateral_amount,
            debt_amount,
        } => {
            msg!("Instruction: DepositAndMint");
            process_deposit_and_mint(
                program_id,
                accounts,
                collateral_mint,
                collateral_amount,
                debt_amount,
            )
        }

        VaultInstruction::Redeem {
            collateral_mint,
            amount,
        } => {
            msg!("Instruction: Redeem");
            process_redeem(program_id, accounts, collateral_mint, amount)
        }

        VaultInstruction::RedeemForBurn {
            collateral_mint,
            collateral_amount,
            debt_amount,
        } => {
            msg!("Instruction: RedeemForBurn");
            process_redeem_for_burn(
                program_id,
                accounts,
                collateral_mint,
                collateral_amount,
                debt_amount,
            )
        }

        VaultInstruction::Mint { amount } => {
            msg!("Instruction: Mint");
            process_mint(program_id, accounts, amount)
        }

        VaultInstruction::Burn { amount } => {
            msg!("Instruction: Burn");
            process_burn(program_id, accounts, amount)
        }

        VaultInstruction::Liquidate {
            collateral_mint,
            debtor,
            debt_to_cover,
        } => {
            msg!("Instruction: Liquidate");
            process_liquidate(program_id, accounts, collateral_mint, debtor, debt_to_cover)
        }
    }
}

/// Build the protocol registry from parallel collateral/oracle lists
fn process_initialize_registry(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    collateral_mints: Vec<Pubkey>,
    price_oracles: Vec<Pubkey>,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let authority_info = next_account_info(account_info_iter)?;
    let registry_info = next_account_info(account_info_iter)?;
    let debt_mint_info = next_account_info(account_info_iter)?;
    let system_program = next_account_info(account_info_iter)?;
    let rent_sysvar = next_account_info(account_info_iter)?;

    if !authority_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    // The parallel lists must agree before any account work happens
    Registry::check_parallel_lists(&collateral_mints, &price_oracles)?;

    let (vault_authority, vault_authority_bump) =
        find_vault_authority(program_id, registry_info.key);

    // The engine must already hold the debt mint capability
    if debt_mint_info.owner != &spl_token::id() {
        return Err(ProgramError::IncorrectProgramId);
    }
    let debt_mint = Mint::unpack(&debt_mint_info.data.borrow())?;
    if debt_mint.mint_authority != COption::Some(vault_authority) {
        return Err(VaultError::InvalidMintAuthority.into());
    }

    let mut collaterals = Vec::with_capacity(collateral_mints.len());
    for (mint_key, oracle_key) in collateral_mints.iter().zip(price_oracles.iter()) {
        let mint_info = next_account_info(account_info_iter)?;
        if mint_info.key != mint_key {
            return Err(VaultError::ConfigurationMismatch.into());
        }
        if mint_info.owner != &spl_token::id() {
            return Err(ProgramError::IncorrectProgramId);
        }
        let mint = Mint::unpack(&mint_info.data.borrow())?;
        collaterals.push(CollateralConfig {
            mint: *mint_key,
            price_oracle: *oracle_key,
            decimals: mint.decimals,
            total_deposited: 0,
        });
    }

    // Create the registry account
    let rent = &Rent::from_account_info(rent_sysvar)?;
    let required_lamports = rent.minimum_balance(Registry::LEN);

    invoke(
        &system_instruction::create_account(
            authority_info.key,
            registry_info.key,
            required_lamports,
            Registry::LEN as u64,
            program_id,
        ),
        &[
            authority_info.clone(),
            registry_info.clone(),
            system_program.clone(),
        ],
    )?;

    let registry = Registry::try_new(
        *authority_info.key,
        *debt_mint_info.key,
        debt_mint.decimals,
        vault_authority_bump,
        collaterals,
    )?;
    store(&registry, registry_info)?;

    msg!(
        "Registry initialized with {} collateral types, debt mint {}",
        registry.collaterals.len(),
        registry.debt_mint
    );

    Ok(())
}

/// Deposit collateral into the caller's position
fn process_deposit(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    collateral_mint: Pubkey,
    amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let depositor_info = next_account_info(account_info_iter)?;
    let registry_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let depositor_token_info = next_account_info(account_info_iter)?;
    let vault_token_info = next_account_info(account_info_iter)?;
    let token_program = next_account_info(account_info_iter)?;
    let system_program = next_account_info(account_info_iter)?;

    if !depositor_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut registry = load_registry(program_id, registry_info)?;
    registry.enter()?;
    store(&registry, registry_info)?;

    let mut position = load_or_create_position(
        program_id,
        registry_info.key,
        depositor_info,
        position_info,
        system_program,
    )?;

    deposit_collateral(
        program_id,
        registry_info,
        &mut registry,
        position_info,
        &mut position,
        depositor_info,
        depositor_token_info,
        vault_token_info,
        token_program,
        &collateral_mint,
        amount,
    )?;

    registry.exit();
    store(&registry, registry_info)
}

/// Deposit collateral and mint debt as one atomic operation
fn process_deposit_and_mint(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    collateral_mint: Pubkey,
    collateral_amount: u64,
    debt_amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let caller_info = next_account_info(account_info_iter)?;
    let registry_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let caller_collateral_info = next_account_info(account_info_iter)?;
    let vault_collateral_info = next_account_info(account_info_iter)?;
    let debt_mint_info = next_account_info(account_info_iter)?;
    let caller_debt_info = next_account_info(account_info_iter)?;
    let vault_authority_info = next_account_info(account_info_iter)?;
    let token_program = next_account_info(account_info_iter)?;
    let system_program = next_account_info(account_info_iter)?;

    if !caller_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut registry = load_registry(program_id, registry_info)?;
    registry.enter()?;
    store(&registry, registry_info)?;

    let prices = read_prices(&registry, account_info_iter)?;

    let mut position = load_or_create_position(
        program_id,
        registry_info.key,
        caller_info,
        position_info,
        system_program,
    )?;

    deposit_collateral(
        program_id,
        registry_info,
        &mut registry,
        position_info,
        &mut position,
        caller_info,
        caller_collateral_info,
        vault_collateral_info,
        token_program,
        &collateral_mint,
        collateral_amount,
    )?;

    mint_debt_step(
        program_id,
        registry_info,
        &mut registry,
        position_info,
        &mut position,
        debt_mint_info,
        caller_debt_info,
        vault_authority_info,
        token_program,
        &prices,
        debt_amount,
    )?;

    registry.exit();
    store(&registry, registry_info)
}

/// Redeem deposited collateral out of the caller's position
fn process_redeem(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    collateral_mint: Pubkey,
    amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let caller_info = next_account_info(account_info_iter)?;
    let registry_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let recipient_token_info = next_account_info(account_info_iter)?;
    let vault_token_info = next_account_info(account_info_iter)?;
    let vault_authority_info = next_account_info(account_info_iter)?;
    let token_program = next_account_info(account_info_iter)?;

    if !caller_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut registry = load_registry(program_id, registry_info)?;
    registry.enter()?;
    store(&registry, registry_info)?;

    let prices = read_prices(&registry, account_info_iter)?;

    let mut position = load_position(
        program_id,
        registry_info.key,
        caller_info.key,
        position_info,
    )?;

    redeem_collateral_step(
        program_id,
        registry_info,
        &mut registry,
        position_info,
        &mut position,
        recipient_token_info,
        vault_token_info,
        vault_authority_info,
        token_program,
        &collateral_mint,
        amount,
    )?;

    // The caller must stay healthy once the collateral is gone
    let health_factor = SolvencyEngine::health_factor_of(&registry, &position, &prices)?;
    if health_factor < MIN_HEALTH_FACTOR {
        msg!(
            "Health factor {} below minimum {}",
            health_factor,
            MIN_HEALTH_FACTOR
        );
        return Err(VaultError::HealthFactorBroken.into());
    }

    registry.exit();
    store(&registry, registry_info)
}

/// Burn debt, then redeem collateral, as one atomic operation. Debt goes
/// first so the post-redeem health check sees the reduced balance.
fn process_redeem_for_burn(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    collateral_mint: Pubkey,
    collateral_amount: u64,
    debt_amount: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let caller_info = next_account_info(account_info_iter)?;
    let registry_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let debt_mint_info = next_account_info(account_info_iter)?;
    let caller_debt_info = next_account_info(account_info_iter)?;
    let vault_debt_info = next_account_info(account_info_iter)?;
    let recipient_token_info = next_account_info(account_info_iter)?;
    let vault_collateral_info = next_account_info(account_info_iter)?;
    let vault_authority_info = next_account_info(account_info_iter)?;
    let token_program = next_account_info(account_info_iter)?;

    if !caller_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut registry = load_registry(program_id, registry_info)?;
    registry.enter()?;
    store(&registry, registry_info)?;

    let prices = read_prices(&registry, account_info_iter)?;

    let mut position = load_position(
        program_id,
        registry_info.key,
        caller_info.key,
        position_info,
    )?;

    burn_debt_step(
        program_id,
        registry_info,
        &mut registry,
        position_info,
        &mut position,
        caller_info,
        caller_debt_info,
        vault_debt_info,
        debt_mint_info,
        vault_authority_info,
        token_program,
        debt_amount,
    )?;

    redeem_collateral_step(
        program_id,
        registry_info,
        &mut registry,
        position_info,
        &mut position,
        recipient_token_info,
        vault_collateral_info,
        vault_authority_info,
        token_program,
        &collateral_mint,
        collateral_amount,
    )?;

    let health_factor = SolvencyEngine::health_factor_of(&registry, &position, &prices)?;
    if health_factor < MIN_HEALTH_FACTOR {
        msg!(
            "Health factor {} below minimum {}",
            health_factor,
            MIN_HEALTH_FACTOR
        );
        return Err(VaultError::HealthFactorBroken.into());
    }

    registry.exit();
    store(&registry, registry_info)
}

/// Mint synthetic debt against the caller's position
fn process_mint(program_id: &Pubkey, accounts: &[AccountInfo], amount: u64) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let caller_info = next_account_info(account_info_iter)?;
    let registry_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let debt_mint_info = next_account_info(account_info_iter)?;
    let caller_debt_info = next_account_info(account_info_iter)?;
    let vault_authority_info = next_account_info(account_info_iter)?;
    let token_program = next_account_info(account_info_iter)?;

    if !caller_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut registry = load_registry(program_id, registry_info)?;
    registry.enter()?;
    store(&registry, registry_info)?;

    let prices = read_prices(&registry, account_info_iter)?;

    let (expected_position, _) =
        find_position_address(program_id, registry_info.key, caller_info.key);
    if expected_position != *position_info.key {
        return Err(ProgramError::InvalidSeeds);
    }

    // A caller with no deposits has nothing backing the new debt; the
    // health check below rejects the mint with a zero factor
    let mut position = if position_info.data_is_empty() {
        Position::new(*caller_info.key, 0)
    } else {
        let position: Position = unpack_account(&position_info.data.borrow())?;
        position.validate()?;
        position
    };

    mint_debt_step(
        program_id,
        registry_info,
        &mut registry,
        position_info,
        &mut position,
        debt_mint_info,
        caller_debt_info,
        vault_authority_info,
        token_program,
        &prices,
        amount,
    )?;

    registry.exit();
    store(&registry, registry_info)
}

/// Repay (burn) synthetic debt of the payer's position
fn process_burn(program_id: &Pubkey, accounts: &[AccountInfo], amount: u64) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let payer_info = next_account_info(account_info_iter)?;
    let registry_info = next_account_info(account_info_iter)?;
    let position_info = next_account_info(account_info_iter)?;
    let debt_mint_info = next_account_info(account_info_iter)?;
    let payer_debt_info = next_account_info(account_info_iter)?;
    let vault_debt_info = next_account_info(account_info_iter)?;
    let vault_authority_info = next_account_info(account_info_iter)?;
    let token_program = next_account_info(account_info_iter)?;

    if !payer_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }

    let mut registry = load_registry(program_id, registry_info)?;
    registry.enter()?;
    store(&registry, registry_info)?;

    let mut position = load_position(
        program_id,
        registry_info.key,
        payer_info.key,
        position_info,
    )?;

    burn_debt_step(
        program_id,
        registry_info,
        &mut registry,
        position_info,
        &mut position,
        payer_info,
        payer_debt_info,
        vault_debt_info,
        debt_mint_info,
        vault_authority_info,
        token_program,
        amount,
    )?;

    registry.exit();
    store(&registry, registry_info)
}

/// Liquidate an unhealthy position: seize oracle-priced collateral plus the
/// bonus, cancel the covered debt at the liquidator's expense, and verify
/// the debtor ends up strictly better off.
fn process_liquidate(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    collateral_mint: Pubkey,
    debtor: Pubkey,
    debt_to_cover: u64,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let liquidator_info = next_account_info(account_info_iter)?;
    let registry_info = next_account_info(account_info_iter)?;
    let debtor_position_info = next_account_info(account_info_iter)?;
    let liquidator_position_info = next_account_info(account_info_iter)?;
    let liquidator_collateral_info = next_account_info(account_info_iter)?;
    let vault_collateral_info = next_account_info(account_info_iter)?;
    let debt_mint_info = next_account_info(account_info_iter)?;
    let liquidator_debt_info = next_account_info(account_info_iter)?;
    let vault_debt_info = next_account_info(account_info_iter)?;
    let vault_authority_info = next_account_info(account_info_iter)?;
    let token_program = next_account_info(account_info_iter)?;

    if !liquidator_info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    if debt_to_cover == 0 {
        return Err(VaultError::AmountMustBePositive.into());
    }

    let mut registry = load_registry(program_id, registry_info)?;
    registry.enter()?;
    store(&registry, registry_info)?;

    let prices = read_prices(&registry, account_info_iter)?;

    let mut debtor_position =
        load_position(program_id, registry_info.key, &debtor, debtor_position_info)?;

    let factor_before =
        SolvencyEngine::health_factor_of(&registry, &debtor_position, &prices)?;
    if factor_before >= MIN_HEALTH_FACTOR {
        return Err(VaultError::HealthFactorOk.into());
    }

    // Covered debt converted into collateral units, plus the bonus
    let index = registry
        .collaterals
        .iter()
        .position(|c| c.mint == collateral_mint)
        .ok_or(VaultError::UnsupportedCollateralType)?;
    let feed_price = prices[index];
    let decimals = registry.collaterals[index].decimals;

    let covered_value = SolvencyEngine::debt_value_usd(debt_to_cover, registry.debt_decimals)?;
    let (base_amount, seized_amount) =
        SolvencyEngine::seizure_for_debt(feed_price, decimals, covered_value)?;

    // Move the seized collateral to the liquidator (redeem mechanics,
    // source account is the debtor)
    redeem_collateral_step(
        program_id,
        registry_info,
        &mut registry,
        debtor_position_info,
        &mut debtor_position,
        liquidator_collateral_info,
        vault_collateral_info,
        vault_authority_info,
        token_program,
        &collateral_mint,
        seized_amount,
    )?;

    // Cancel the covered debt (burn mechanics, payer is the liquidator)
    burn_debt_step(
        program_id,
        registry_info,
        &mut registry,
        debtor_position_info,
        &mut debtor_position,
        liquidator_info,
        liquidator_debt_info,
        vault_debt_info,
        debt_mint_info,
        vault_authority_info,
        token_program,
        debt_to_cover,
    )?;

    msg!(
        "Liquidation: debtor={} liquidator={} debt_covered={} collateral_seized={} (base {})",
        debtor,
        liquidator_info.key,
        debt_to_cover,
        seized_amount,
        base_amount
    );

    let factor_after = SolvencyEngine::health_factor_of(&registry, &debtor_position, &prices)?;
    if factor_after <= factor_before {
        return Err(VaultError::HealthFactorNotImproved.into());
    }

    // The liquidator's own position must stay strictly healthy
    let (expected_liquidator_position, _) =
        find_position_address(program_id, registry_info.key, liquidator_info.key);
    if expected_liquidator_position != *liquidator_position_info.key {
        return Err(ProgramError::InvalidSeeds);
    }
    let liquidator_factor = if liquidator_position_info.key == debtor_position_info.key {
        factor_after
    } else if liquidator_position_info.data_is_empty() {
        u128::MAX
    } else {
        let liquidator_position: Position =
            unpack_account(&liquidator_position_info.data.borrow())?;
        liquidator_position.validate()?;
        SolvencyEngine::health_factor_of(&registry, &liquidator_position, &prices)?
    };
    if liquidator_factor < MIN_HEALTH_FACTOR {
        msg!(
            "Health factor {} below minimum {}",
            liquidator_factor,
            MIN_HEALTH_FACTOR
        );
        return Err(VaultError::HealthFactorBroken.into());
    }

    registry.exit();
    store(&registry, registry_info)
}

/// Credit collateral and pull the tokens into custody. Internal state is
/// committed before the transfer CPI.
fn deposit_collateral<'a>(
    program_id: &Pubkey,
    registry_info: &AccountInfo<'a>,
    registry: &mut Registry,
    position_info: &AccountInfo<'a>,
    position: &mut Position,
    depositor_info: &AccountInfo<'a>,
    depositor_token_info: &AccountInfo<'a>,
    vault_token_info: &AccountInfo<'a>,
    token_program: &AccountInfo<'a>,
    collateral_mint: &Pubkey,
    amount: u64,
) -> ProgramResult {
    if amount == 0 {
        return Err(VaultError::AmountMustBePositive.into());
    }

    let vault_authority = vault_authority_address(program_id, registry_info.key, registry)?;
    if *vault_token_info.key != get_associated_token_address(&vault_authority, collateral_mint) {
        return Err(VaultError::InvalidVaultAccount.into());
    }

    let config = registry.collateral_config_mut(collateral_mint)?;
    config.total_deposited = config
        .total_deposited
        .checked_add(amount)
        .ok_or(VaultError::ArithmeticOverflow)?;
    position.credit_collateral(collateral_mint, amount)?;

    // The transfer below cannot be caught once dispatched; insufficient
    // source funds are rejected here as the transfer failure they are
    let source = TokenAccount::unpack(&depositor_token_info.data.borrow())?;
    if source.amount < amount {
        return Err(VaultError::TransferFailed.into());
    }

    store(position, position_info)?;
    store(registry, registry_info)?;

    msg!(
        "CollateralDeposited: account={} mint={} amount={}",
        position.owner,
        collateral_mint,
        amount
    );

    let ix = token_instruction::transfer(
        token_program.key,
        depositor_token_info.key,
        vault_token_info.key,
        depositor_info.key,
        &[],
        amount,
    )?;
    invoke(
        &ix,
        &[
            depositor_token_info.clone(),
            vault_token_info.clone(),
            depositor_info.clone(),
            token_program.clone(),
        ],
    )
    .map_err(|err| {
        msg!("Collateral transfer failed: {:?}", err);
        VaultError::TransferFailed.into()
    })
}

/// Incur debt, verify the resulting health factor, then mint the debt asset
fn mint_debt_step<'a>(
    program_id: &Pubkey,
    registry_info: &AccountInfo<'a>,
    registry: &mut Registry,
    position_info: &AccountInfo<'a>,
    position: &mut Position,
    debt_mint_info: &AccountInfo<'a>,
    recipient_debt_info: &AccountInfo<'a>,
    vault_authority_info: &AccountInfo<'a>,
    token_program: &AccountInfo<'a>,
    prices: &[u64],
    amount: u64,
) -> ProgramResult {
    if amount == 0 {
        return Err(VaultError::AmountMustBePositive.into());
    }
    if *debt_mint_info.key != registry.debt_mint {
        return Err(VaultError::InvalidVaultAccount.into());
    }
    let vault_authority = vault_authority_address(program_id, registry_info.key, registry)?;
    if *vault_authority_info.key != vault_authority {
        return Err(ProgramError::InvalidSeeds);
    }

    position.incur_debt(amount)?;
    registry.total_debt = registry
        .total_debt
        .checked_add(amount)
        .ok_or(VaultError::ArithmeticOverflow)?;

    let health_factor = SolvencyEngine::health_factor_of(registry, position, prices)?;
    if health_factor < MIN_HEALTH_FACTOR {
        msg!(
            "Health factor {} below minimum {}",
            health_factor,
            MIN_HEALTH_FACTOR
        );
        return Err(VaultError::HealthFactorBroken.into());
    }

    store(position, position_info)?;
    store(registry, registry_info)?;

    let bump = [registry.vault_authority_bump];
    let seeds: &[&[u8]] = &[VAULT_AUTHORITY_SEED, registry_info.key.as_ref(), &bump];
    let ix = token_instruction::mint_to(
        token_program.key,
        debt_mint_info.key,
        recipient_debt_info.key,
        vault_authority_info.key,
        &[],
        amount,
    )?;
    invoke_signed(
        &ix,
        &[
            debt_mint_info.clone(),
            recipient_debt_info.clone(),
            vault_authority_info.clone(),
            token_program.clone(),
        ],
        &[seeds],
    )
    .map_err(|err| {
        msg!("Debt mint failed: {:?}", err);
        VaultError::MintFailed.into()
    })
}

/// Reduce recorded debt, pull the debt asset from the payer, and destroy it
fn burn_debt_step<'a>(
    program_id: &Pubkey,
    registry_info: &AccountInfo<'a>,
    registry: &mut Registry,
    position_info: &AccountInfo<'a>,
    position: &mut Position,
    payer_info: &AccountInfo<'a>,
    payer_debt_info: &AccountInfo<'a>,
    vault_debt_info: &AccountInfo<'a>,
    debt_mint_info: &AccountInfo<'a>,
    vault_authority_info: &AccountInfo<'a>,
    token_program: &AccountInfo<'a>,
    amount: u64,
) -> ProgramResult {
    if amount == 0 {
        return Err(VaultError::AmountMustBePositive.into());
    }
    if *debt_mint_info.key != registry.debt_mint {
        return Err(VaultError::InvalidVaultAccount.into());
    }
    let vault_authority = vault_authority_address(program_id, registry_info.key, registry)?;
    if *vault_authority_info.key != vault_authority {
        return Err(ProgramError::InvalidSeeds);
    }
    if *vault_debt_info.key != get_associated_token_address(&vault_authority, &registry.debt_mint)
    {
        return Err(VaultError::InvalidVaultAccount.into());
    }

    position.repay_debt(amount)?;
    registry.total_debt = registry
        .total_debt
        .checked_sub(amount)
        .ok_or(VaultError::InsufficientBalance)?;

    let source = TokenAccount::unpack(&payer_debt_info.data.borrow())?;
    if source.amount < amount {
        return Err(VaultError::TransferFailed.into());
    }

    store(position, position_info)?;
    store(registry, registry_info)?;

    // Pull the debt asset from the payer, then destroy it
    let ix = token_instruction::transfer(
        token_program.key,
        payer_debt_info.key,
        vault_debt_info.key,
        payer_info.key,
        &[],
        amount,
    )?;
    invoke(
        &ix,
        &[
            payer_debt_info.clone(),
            vault_debt_info.clone(),
            payer_info.clone(),
            token_program.clone(),
        ],
    )
    .map_err(|err| {
        msg!("Debt transfer failed: {:?}", err);
        ProgramError::from(VaultError::TransferFailed)
    })?;

    let bump = [registry.vault_authority_bump];
    let seeds: &[&[u8]] = &[VAULT_AUTHORITY_SEED, registry_info.key.as_ref(), &bump];
    let ix = token_instruction::burn(
        token_program.key,
        vault_debt_info.key,
        debt_mint_info.key,
        vault_authority_info.key,
        &[],
        amount,
    )?;
    invoke_signed(
        &ix,
        &[
            vault_debt_info.clone(),
            debt_mint_info.clone(),
            vault_authority_info.clone(),
            token_program.clone(),
        ],
        &[seeds],
    )
    .map_err(|err| {
        msg!("Debt burn failed: {:?}", err);
        VaultError::TransferFailed.into()
    })
}

/// Debit collateral and transfer it out of custody. The caller is
/// responsible for any health check that must follow.
fn redeem_collateral_step<'a>(
    program_id: &Pubkey,
    registry_info: &AccountInfo<'a>,
    registry: &mut Registry,
    position_info: &AccountInfo<'a>,
    position: &mut Position,
    recipient_token_info: &AccountInfo<'a>,
    vault_token_info: &AccountInfo<'a>,
    vault_authority_info: &AccountInfo<'a>,
    token_program: &AccountInfo<'a>,
    collateral_mint: &Pubkey,
    amount: u64,
) -> ProgramResult {
    if amount == 0 {
        return Err(VaultError::AmountMustBePositive.into());
    }
    let vault_authority = vault_authority_address(program_id, registry_info.key, registry)?;
    if *vault_authority_info.key != vault_authority {
        return Err(ProgramError::InvalidSeeds);
    }
    if *vault_token_info.key != get_associated_token_address(&vault_authority, collateral_mint) {
        return Err(VaultError::InvalidVaultAccount.into());
    }

    let config = registry.collateral_config_mut(collateral_mint)?;
    config.total_deposited = config
        .total_deposited
        .checked_sub(amount)
        .ok_or(VaultError::InsufficientBalance)?;
    position.debit_collateral(collateral_mint, amount)?;

    store(position, position_info)?;
    store(registry, registry_info)?;

    let recipient_owner = TokenAccount::unpack(&recipient_token_info.data.borrow())?.owner;
    msg!(
        "CollateralRedeemed: from={} to={} mint={} amount={}",
        position.owner,
        recipient_owner,
        collateral_mint,
        amount
    );

    let bump = [registry.vault_authority_bump];
    let seeds: &[&[u8]] = &[VAULT_AUTHORITY_SEED, registry_info.key.as_ref(), &bump];
    let ix = token_instruction::transfer(
        token_program.key,
        vault_token_info.key,
        recipient_token_info.key,
        vault_authority_info.key,
        &[],
        amount,
    )?;
    invoke_signed(
        &ix,
        &[
            vault_token_info.clone(),
            recipient_token_info.clone(),
            vault_authority_info.clone(),
            token_program.clone(),
        ],
        &[seeds],
    )
    .map_err(|err| {
        msg!("Collateral transfer failed: {:?}", err);
        VaultError::TransferFailed.into()
    })
}

fn load_registry(
    program_id: &Pubkey,
    registry_info: &AccountInfo,
) -> Result<Registry, ProgramError> {
    if registry_info.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    let registry: Registry = unpack_account(&registry_info.data.borrow())?;
    registry.validate()?;
    Ok(registry)
}

fn load_position(
    program_id: &Pubkey,
    registry_key: &Pubkey,
    owner: &Pubkey,
    position_info: &AccountInfo,
) -> Result<Position, ProgramError> {
    let (expected, _) = find_position_address(program_id, registry_key, owner);
    if expected != *position_info.key {
        return Err(ProgramError::InvalidSeeds);
    }
    if position_info.data_is_empty() {
        return Err(VaultError::AccountNotInitialized.into());
    }
    if position_info.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    let position: Position = unpack_account(&position_info.data.borrow())?;
    position.validate()?;
    Ok(position)
}

/// Positions come into existence on first deposit
fn load_or_create_position<'a>(
    program_id: &Pubkey,
    registry_key: &Pubkey,
    owner_info: &AccountInfo<'a>,
    position_info: &AccountInfo<'a>,
    system_program: &AccountInfo<'a>,
) -> Result<Position, ProgramError> {
    let (expected, bump) = find_position_address(program_id, registry_key, owner_info.key);
    if expected != *position_info.key {
        return Err(ProgramError::InvalidSeeds);
    }

    if position_info.data_is_empty() {
        let rent = Rent::get()?;
        invoke_signed(
            &system_instruction::create_account(
                owner_info.key,
                position_info.key,
                rent.minimum_balance(Position::LEN),
                Position::LEN as u64,
                program_id,
            ),
            &[
                owner_info.clone(),
                position_info.clone(),
                system_program.clone(),
            ],
            &[&[
                POSITION_SEED,
                registry_key.as_ref(),
                owner_info.key.as_ref(),
                &[bump],
            ]],
        )?;
        return Ok(Position::new(*owner_info.key, bump));
    }

    if position_info.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }
    let position: Position = unpack_account(&position_info.data.borrow())?;
    position.validate()?;
    Ok(position)
}

/// Price feeds arrive as trailing accounts in registry order
fn read_prices<'a, 'b: 'a, I: Iterator<Item = &'a AccountInfo<'b>>>(
    registry: &Registry,
    account_info_iter: &mut I,
) -> Result<Vec<u64>, ProgramError> {
    let mut prices = Vec::with_capacity(registry.collaterals.len());
    for config in &registry.collaterals {
        let feed_info = next_account_info(account_info_iter)?;
        if feed_info.key != &config.price_oracle {
            return Err(VaultError::OracleMismatch.into());
        }
        let feed: PriceFeed = unpack_account(&feed_info.data.borrow())?;
        prices.push(feed.price);
    }
    Ok(prices)
}

fn vault_authority_address(
    program_id: &Pubkey,
    registry_key: &Pubkey,
    registry: &Registry,
) -> Result<Pubkey, ProgramError> {
    Pubkey::create_program_address(
        &[
            VAULT_AUTHORITY_SEED,
            registry_key.as_ref(),
            &[registry.vault_authority_bump],
        ],
        program_id,
    )
    .map_err(|_| ProgramError::InvalidSeeds)
}

fn store<T: BorshSerialize>(value: &T, info: &AccountInfo) -> ProgramResult {
    value.serialize(&mut &mut info.data.borrow_mut()[..])?;
    Ok(())
}
