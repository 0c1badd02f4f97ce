use borsh::BorshDeserialize;
use solana_program::{program_pack::Pack, pubkey::Pubkey};
use solana_program_test::{processor, BanksClientError, ProgramTest, ProgramTestContext};
use solana_sdk::{
    account::{Account, AccountSharedData},
    instruction::{Instruction, InstructionError},
    signature::{Keypair, Signer},
    system_instruction,
    transaction::{Transaction, TransactionError},
};
use spl_associated_token_account::get_associated_token_address;
use spl_token::state::{Account as TokenAccount, Mint};

use collateral_vault::{
    engine::{SolvencyEngine, MIN_HEALTH_FACTOR, PRECISION},
    error::VaultError,
    instructions as vault_instructions,
    state::{find_position_address, find_vault_authority, Position, PriceFeed, Registry},
};

const WETH_DECIMALS: u8 = 9;
const DEBT_DECIMALS: u8 = 9;

const PRICE_2000: u64 = 200_000_000_000; // 2000 USD, 8 decimals
const PRICE_1800: u64 = 180_000_000_000;
const PRICE_1000: u64 = 100_000_000_000;

const WETH_1: u64 = 1_000_000_000;
const WETH_10: u64 = 10 * WETH_1;
const WETH_100: u64 = 100 * WETH_1;
const DEBT_UNIT: u64 = 1_000_000_000;
// 10 WETH at 2000 USD and a 50% threshold back exactly 10000 debt units
const DEBT_10000: u64 = 10_000 * DEBT_UNIT;
const DEBT_5000: u64 = 5_000 * DEBT_UNIT;

struct TestVault {
    context: ProgramTestContext,
    registry: Pubkey,
    vault_authority: Pubkey,
    debt_mint: Pubkey,
    weth_mint: Pubkey,
    weth_oracle: Pubkey,
    oracle_owner: Pubkey,
    collateral_authority: Keypair,
}

fn feed_account(price: u64, owner: Pubkey) -> Account {
    Account {
        lamports: 10_000_000,
        data: borsh::to_vec(&PriceFeed {
            price,
            published_at: 0,
        })
        .unwrap(),
        owner,
        executable: false,
        rent_epoch: 0,
    }
}

async fn create_mint(
    context: &mut ProgramTestContext,
    mint: &Keypair,
    authority: &Pubkey,
    decimals: u8,
) {
    let rent = context.banks_client.get_rent().await.unwrap();
    let instructions = [
        system_instruction::create_account(
            &context.payer.pubkey(),
            &mint.pubkey(),
            rent.minimum_balance(Mint::LEN),
            Mint::LEN as u64,
            &spl_token::id(),
        ),
        spl_token::instruction::initialize_mint(
            &spl_token::id(),
            &mint.pubkey(),
            authority,
            None,
            decimals,
        )
        .unwrap(),
    ];
    let blockhash = context.get_new_latest_blockhash().await.unwrap();
    let transaction = Transaction::new_signed_with_payer(
        &instructions,
        Some(&context.payer.pubkey()),
        &[&context.payer, mint],
        blockhash,
    );
    context
        .banks_client
        .process_transaction(transaction)
        .await
        .unwrap();
}

async fn create_ata(context: &mut ProgramTestContext, wallet: &Pubkey, mint: &Pubkey) {
    let instruction = spl_associated_token_account::instruction::create_associated_token_account(
        &context.payer.pubkey(),
        wallet,
        mint,
        &spl_token::id(),
    );
    let blockhash = context.get_new_latest_blockhash().await.unwrap();
    let transaction = Transaction::new_signed_with_payer(
        &[instruction],
        Some(&context.payer.pubkey()),
        &[&context.payer],
        blockhash,
    );
    context
        .banks_client
        .process_transaction(transaction)
        .await
        .unwrap();
}

impl TestVault {
    async fn new() -> Self {
        let program_id = collateral_vault::id();
        let mut program_test = ProgramTest::new(
            "collateral_vault",
            program_id,
            processor!(collateral_vault::processor::process_instruction),
        );

        let weth_oracle = Pubkey::new_unique();
        let oracle_owner = Pubkey::new_unique();
        program_test.add_account(weth_oracle, feed_account(PRICE_2000, oracle_owner));

        let mut context = program_test.start_with_context().await;

        let registry_keypair = Keypair::new();
        let registry = registry_keypair.pubkey();
        let (vault_authority, _) = find_vault_authority(&program_id, &registry);

        let collateral_authority = Keypair::new();
        let debt_mint_keypair = Keypair::new();
        let weth_mint_keypair = Keypair::new();

        // Debt mint capability belongs to the engine from the start
        create_mint(&mut context, &debt_mint_keypair, &vault_authority, DEBT_DECIMALS).await;
        create_mint(
            &mut context,
            &weth_mint_keypair,
            &collateral_authority.pubkey(),
            WETH_DECIMALS,
        )
        .await;

        let instruction = vault_instructions::initialize_registry(
            &program_id,
            &context.payer.pubkey(),
            &registry,
            &debt_mint_keypair.pubkey(),
            &[weth_mint_keypair.pubkey()],
            &[weth_oracle],
        );
        let blockhash = context.get_new_latest_blockhash().await.unwrap();
        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&context.payer.pubkey()),
            &[&context.payer, &registry_keypair],
            blockhash,
        );
        context
            .banks_client
            .process_transaction(transaction)
            .await
            .unwrap();

        // Custody accounts for collateral and for debt awaiting burn
        create_ata(&mut context, &vault_authority, &weth_mint_keypair.pubkey()).await;
        create_ata(&mut context, &vault_authority, &debt_mint_keypair.pubkey()).await;

        Self {
            context,
            registry,
            vault_authority,
            debt_mint: debt_mint_keypair.pubkey(),
            weth_mint: weth_mint_keypair.pubkey(),
            weth_oracle,
            oracle_owner,
            collateral_authority,
        }
    }

    fn weth_ata(&self, owner: &Pubkey) -> Pubkey {
        get_associated_token_address(owner, &self.weth_mint)
    }

    fn debt_ata(&self, owner: &Pubkey) -> Pubkey {
        get_associated_token_address(owner, &self.debt_mint)
    }

    async fn send(
        &mut self,
        instruction: Instruction,
        extra_signers: &[&Keypair],
    ) -> Result<(), BanksClientError> {
        let blockhash = self.context.get_new_latest_blockhash().await.unwrap();
        let mut signers: Vec<&Keypair> = vec![&self.context.payer];
        signers.extend_from_slice(extra_signers);
        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.context.payer.pubkey()),
            &signers,
            blockhash,
        );
        self.context
            .banks_client
            .process_transaction(transaction)
            .await
    }

    /// A funded user with token accounts and `weth_amount` of collateral
    async fn new_user(&mut self, weth_amount: u64) -> Keypair {
        let user = Keypair::new();

        let fund = system_instruction::transfer(
            &self.context.payer.pubkey(),
            &user.pubkey(),
            1_000_000_000,
        );
        self.send(fund, &[]).await.unwrap();

        create_ata(&mut self.context, &user.pubkey(), &self.weth_mint).await;
        create_ata(&mut self.context, &user.pubkey(), &self.debt_mint).await;

        if weth_amount > 0 {
            let mint_to = spl_token::instruction::mint_to(
                &spl_token::id(),
                &self.weth_mint,
                &self.weth_ata(&user.pubkey()),
                &self.collateral_authority.pubkey(),
                &[],
                weth_amount,
            )
            .unwrap();
            let authority = Keypair::from_bytes(&self.collateral_authority.to_bytes()).unwrap();
            self.send(mint_to, &[&authority]).await.unwrap();
        }

        user
    }

    async fn deposit(&mut self, user: &Keypair, amount: u64) -> Result<(), BanksClientError> {
        let instruction = vault_instructions::deposit(
            &collateral_vault::id(),
            &user.pubkey(),
            &self.registry,
            &self.weth_mint,
            &self.weth_ata(&user.pubkey()),
            amount,
        );
        self.send(instruction, &[user]).await
    }

    async fn mint_debt(&mut self, user: &Keypair, amount: u64) -> Result<(), BanksClientError> {
        let instruction = vault_instructions::mint(
            &collateral_vault::id(),
            &user.pubkey(),
            &self.registry,
            &self.debt_mint,
            &self.debt_ata(&user.pubkey()),
            &[self.weth_oracle],
            amount,
        );
        self.send(instruction, &[user]).await
    }

    async fn deposit_and_mint(
        &mut self,
        user: &Keypair,
        collateral_amount: u64,
        debt_amount: u64,
    ) -> Result<(), BanksClientError> {
        let instruction = vault_instructions::deposit_and_mint(
            &collateral_vault::id(),
            &user.pubkey(),
            &self.registry,
            &self.weth_mint,
            &self.weth_ata(&user.pubkey()),
            &self.debt_mint,
            &self.debt_ata(&user.pubkey()),
            &[self.weth_oracle],
            collateral_amount,
            debt_amount,
        );
        self.send(instruction, &[user]).await
    }

    async fn burn_debt(&mut self, user: &Keypair, amount: u64) -> Result<(), BanksClientError> {
        let instruction = vault_instructions::burn(
            &collateral_vault::id(),
            &user.pubkey(),
            &self.registry,
            &self.debt_mint,
            &self.debt_ata(&user.pubkey()),
            amount,
        );
        self.send(instruction, &[user]).await
    }

    async fn redeem(&mut self, user: &Keypair, amount: u64) -> Result<(), BanksClientError> {
        let instruction = vault_instructions::redeem(
            &collateral_vault::id(),
            &user.pubkey(),
            &self.registry,
            &self.weth_mint,
            &self.weth_ata(&user.pubkey()),
            &[self.weth_oracle],
            amount,
        );
        self.send(instruction, &[user]).await
    }

    async fn redeem_for_burn(
        &mut self,
        user: &Keypair,
        collateral_amount: u64,
        debt_amount: u64,
    ) -> Result<(), BanksClientError> {
        let instruction = vault_instructions::redeem_for_burn(
            &collateral_vault::id(),
            &user.pubkey(),
            &self.registry,
            &self.weth_mint,
            &self.debt_mint,
            &self.debt_ata(&user.pubkey()),
            &self.weth_ata(&user.pubkey()),
            &[self.weth_oracle],
            collateral_amount,
            debt_amount,
        );
        self.send(instruction, &[user]).await
    }

    async fn liquidate(
        &mut self,
        liquidator: &Keypair,
        debtor: &Pubkey,
        debt_to_cover: u64,
    ) -> Result<(), BanksClientError> {
        let instruction = vault_instructions::liquidate(
            &collateral_vault::id(),
            &liquidator.pubkey(),
            &self.registry,
            &self.weth_mint,
            debtor,
            &self.weth_ata(&liquidator.pubkey()),
            &self.debt_mint,
            &self.debt_ata(&liquidator.pubkey()),
            &[self.weth_oracle],
            debt_to_cover,
        );
        self.send(instruction, &[liquidator]).await
    }

    fn set_price(&mut self, price: u64) {
        let account = feed_account(price, self.oracle_owner);
        self.context
            .set_account(&self.weth_oracle, &AccountSharedData::from(account));
    }

    async fn price(&mut self) -> u64 {
        let account = self
            .context
            .banks_client
            .get_account(self.weth_oracle)
            .await
            .unwrap()
            .unwrap();
        PriceFeed::deserialize(&mut &account.data[..]).unwrap().price
    }

    async fn position(&mut self, owner: &Pubkey) -> Option<Position> {
        let (address, _) = find_position_address(&collateral_vault::id(), &self.registry, owner);
        let account = self.context.banks_client.get_account(address).await.unwrap()?;
        Some(Position::deserialize(&mut &account.data[..]).unwrap())
    }

    async fn registry_state(&mut self) -> Registry {
        let account = self
            .context
            .banks_client
            .get_account(self.registry)
            .await
            .unwrap()
            .unwrap();
        Registry::deserialize(&mut &account.data[..]).unwrap()
    }

    async fn token_balance(&mut self, token_account: &Pubkey) -> u64 {
        let account = self
            .context
            .banks_client
            .get_account(*token_account)
            .await
            .unwrap()
            .unwrap();
        TokenAccount::unpack(&account.data).unwrap().amount
    }

    async fn debt_supply(&mut self) -> u64 {
        let account = self
            .context
            .banks_client
            .get_account(self.debt_mint)
            .await
            .unwrap()
            .unwrap();
        Mint::unpack(&account.data).unwrap().supply
    }

    async fn health_factor(&mut self, owner: &Pubkey) -> u128 {
        let registry = self.registry_state().await;
        let position = self.position(owner).await.unwrap();
        let price = self.price().await;
        SolvencyEngine::health_factor_of(&registry, &position, &[price]).unwrap()
    }

    /// Engine-held collateral value must cover the debt asset supply
    async fn assert_solvent(&mut self) {
        let vault_weth = self.token_balance(&self.weth_ata(&self.vault_authority)).await;
        let price = self.price().await;
        let collateral_usd =
            SolvencyEngine::usd_value(price, vault_weth, WETH_DECIMALS).unwrap();
        let debt_usd =
            SolvencyEngine::debt_value_usd(self.debt_supply().await, DEBT_DECIMALS).unwrap();
        assert!(
            collateral_usd >= debt_usd,
            "protocol underwater: {} collateral vs {} debt",
            collateral_usd,
            debt_usd
        );
    }
}

fn assert_vault_error(result: Result<(), BanksClientError>, expected: VaultError) {
    match result {
        Err(BanksClientError::TransactionError(TransactionError::InstructionError(
            _,
            InstructionError::Custom(code),
        ))) => {
            assert_eq!(code, expected as u32, "expected {:?}", expected);
        }
        other => panic!("expected {:?}, got {:?}", expected, other),
    }
}

#[tokio::test]
async fn test_initialize_registry() {
    let mut vault = TestVault::new().await;

    let registry = vault.registry_state().await;
    assert_eq!(registry.debt_mint, vault.debt_mint);
    assert_eq!(registry.debt_decimals, DEBT_DECIMALS);
    assert_eq!(registry.total_debt, 0);
    assert!(!registry.locked);
    assert_eq!(registry.collateral_types(), vec![vault.weth_mint]);
    assert_eq!(registry.collaterals[0].price_oracle, vault.weth_oracle);
    assert_eq!(registry.collaterals[0].decimals, WETH_DECIMALS);
    assert_eq!(registry.collaterals[0].total_deposited, 0);
}

#[tokio::test]
async fn test_initialize_registry_with_mismatched_lists() {
    let mut vault = TestVault::new().await;

    // a second engine instance with 1 collateral and 2 oracles
    let bad_registry = Keypair::new();
    let instruction = vault_instructions::initialize_registry(
        &collateral_vault::id(),
        &vault.context.payer.pubkey(),
        &bad_registry.pubkey(),
        &vault.debt_mint,
        &[vault.weth_mint],
        &[vault.weth_oracle, Pubkey::new_unique()],
    );
    let result = vault.send(instruction, &[&bad_registry]).await;
    assert_vault_error(result, VaultError::ConfigurationMismatch);
}

#[tokio::test]
async fn test_deposit_tracks_collateral() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(2 * WETH_10).await;

    vault.deposit(&user, WETH_10).await.unwrap();

    let position = vault.position(&user.pubkey()).await.unwrap();
    assert_eq!(position.owner, user.pubkey());
    assert_eq!(position.collateral_of(&vault.weth_mint), WETH_10);
    assert_eq!(position.minted_debt, 0);

    let user_ata = vault.weth_ata(&user.pubkey());
    let vault_ata = vault.weth_ata(&vault.vault_authority);
    assert_eq!(vault.token_balance(&user_ata).await, WETH_10);
    assert_eq!(vault.token_balance(&vault_ata).await, WETH_10);

    let registry = vault.registry_state().await;
    assert_eq!(registry.collaterals[0].total_deposited, WETH_10);
    assert!(!registry.locked);
}

#[tokio::test]
async fn test_deposit_rejects_zero_amount() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    let result = vault.deposit(&user, 0).await;
    assert_vault_error(result, VaultError::AmountMustBePositive);
}

#[tokio::test]
async fn test_deposit_rejects_unregistered_collateral() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    let instruction = vault_instructions::deposit(
        &collateral_vault::id(),
        &user.pubkey(),
        &vault.registry,
        &Pubkey::new_unique(),
        &vault.weth_ata(&user.pubkey()),
        WETH_10,
    );
    let result = vault.send(instruction, &[&user]).await;
    assert_vault_error(result, VaultError::UnsupportedCollateralType);
}

#[tokio::test]
async fn test_deposit_rejects_missing_source_funds() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_1).await;

    let result = vault.deposit(&user, WETH_10).await;
    assert_vault_error(result, VaultError::TransferFailed);

    // the whole operation rolled back with the failed transfer
    assert!(vault.position(&user.pubkey()).await.is_none());
}

#[tokio::test]
async fn test_deposit_and_mint() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    vault.deposit_and_mint(&user, WETH_10, DEBT_5000).await.unwrap();

    let position = vault.position(&user.pubkey()).await.unwrap();
    assert_eq!(position.collateral_of(&vault.weth_mint), WETH_10);
    assert_eq!(position.minted_debt, DEBT_5000);

    let debt_ata = vault.debt_ata(&user.pubkey());
    assert_eq!(vault.token_balance(&debt_ata).await, DEBT_5000);
    assert_eq!(vault.debt_supply().await, DEBT_5000);

    // 20000 USD of collateral, 10000 adjusted, 5000 debt
    assert_eq!(vault.health_factor(&user.pubkey()).await, 2 * PRECISION);

    let registry = vault.registry_state().await;
    let price = vault.price().await;
    let (minted_debt, collateral_value) =
        SolvencyEngine::account_info(&registry, &position, &[price]).unwrap();
    assert_eq!(minted_debt, DEBT_5000);
    assert_eq!(collateral_value, 20_000 * PRECISION);
}

#[tokio::test]
async fn test_mint_up_to_the_boundary() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    vault.deposit(&user, WETH_10).await.unwrap();
    // the health factor check is strict "less than", so the boundary passes
    vault.mint_debt(&user, DEBT_10000).await.unwrap();

    assert_eq!(
        vault.health_factor(&user.pubkey()).await,
        MIN_HEALTH_FACTOR
    );
}

#[tokio::test]
async fn test_mint_beyond_the_boundary() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    vault.deposit(&user, WETH_10).await.unwrap();
    let result = vault.mint_debt(&user, DEBT_10000 + 1).await;
    assert_vault_error(result, VaultError::HealthFactorBroken);

    // the debt increment rolled back
    let position = vault.position(&user.pubkey()).await.unwrap();
    assert_eq!(position.minted_debt, 0);
    assert_eq!(vault.debt_supply().await, 0);
}

#[tokio::test]
async fn test_mint_without_collateral() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(0).await;

    let result = vault.mint_debt(&user, DEBT_UNIT).await;
    assert_vault_error(result, VaultError::HealthFactorBroken);
    assert!(vault.position(&user.pubkey()).await.is_none());
}

#[tokio::test]
async fn test_composite_rolls_back_as_a_unit() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    // the mint leg fails, so the deposit leg must leave no trace
    let result = vault.deposit_and_mint(&user, WETH_10, DEBT_10000 + 1).await;
    assert_vault_error(result, VaultError::HealthFactorBroken);

    assert!(vault.position(&user.pubkey()).await.is_none());
    let user_ata = vault.weth_ata(&user.pubkey());
    let vault_ata = vault.weth_ata(&vault.vault_authority);
    assert_eq!(vault.token_balance(&user_ata).await, WETH_10);
    assert_eq!(vault.token_balance(&vault_ata).await, 0);
}

#[tokio::test]
async fn test_burn_reduces_debt() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    vault.deposit_and_mint(&user, WETH_10, DEBT_5000).await.unwrap();
    vault.burn_debt(&user, 2_000 * DEBT_UNIT).await.unwrap();

    let position = vault.position(&user.pubkey()).await.unwrap();
    assert_eq!(position.minted_debt, 3_000 * DEBT_UNIT);

    let debt_ata = vault.debt_ata(&user.pubkey());
    assert_eq!(vault.token_balance(&debt_ata).await, 3_000 * DEBT_UNIT);
    // burned units leave the total supply
    assert_eq!(vault.debt_supply().await, 3_000 * DEBT_UNIT);

    let registry = vault.registry_state().await;
    assert_eq!(registry.total_debt, 3_000 * DEBT_UNIT);
}

#[tokio::test]
async fn test_burn_more_than_owed() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    vault.deposit_and_mint(&user, WETH_10, DEBT_5000).await.unwrap();
    let result = vault.burn_debt(&user, DEBT_5000 + 1).await;
    assert_vault_error(result, VaultError::InsufficientBalance);
}

#[tokio::test]
async fn test_redeem_returns_collateral() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    vault.deposit(&user, WETH_10).await.unwrap();
    vault.redeem(&user, 4 * WETH_1).await.unwrap();

    let position = vault.position(&user.pubkey()).await.unwrap();
    assert_eq!(position.collateral_of(&vault.weth_mint), 6 * WETH_1);

    let user_ata = vault.weth_ata(&user.pubkey());
    assert_eq!(vault.token_balance(&user_ata).await, 4 * WETH_1);

    let registry = vault.registry_state().await;
    assert_eq!(registry.collaterals[0].total_deposited, 6 * WETH_1);
}

#[tokio::test]
async fn test_redeem_rejects_overdraw() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    vault.deposit(&user, WETH_10).await.unwrap();
    let result = vault.redeem(&user, WETH_10 + 1).await;
    assert_vault_error(result, VaultError::InsufficientBalance);
}

#[tokio::test]
async fn test_redeem_guards_the_health_factor() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    vault.deposit_and_mint(&user, WETH_10, DEBT_10000).await.unwrap();

    // at the boundary, removing a single unit of collateral breaks it
    let result = vault.redeem(&user, 1).await;
    assert_vault_error(result, VaultError::HealthFactorBroken);

    let position = vault.position(&user.pubkey()).await.unwrap();
    assert_eq!(position.collateral_of(&vault.weth_mint), WETH_10);
}

#[tokio::test]
async fn test_redeem_for_burn_unwinds_the_position() {
    let mut vault = TestVault::new().await;
    let user = vault.new_user(WETH_10).await;

    vault.deposit_and_mint(&user, WETH_10, DEBT_10000).await.unwrap();
    vault.redeem_for_burn(&user, WETH_10, DEBT_10000).await.unwrap();

    let position = vault.position(&user.pubkey()).await.unwrap();
    assert_eq!(position.minted_debt, 0);
    assert_eq!(position.collateral_of(&vault.weth_mint), 0);

    let user_ata = vault.weth_ata(&user.pubkey());
    assert_eq!(vault.token_balance(&user_ata).await, WETH_10);
    assert_eq!(vault.debt_supply().await, 0);
}

#[tokio::test]
async fn test_liquidation_seizes_collateral_and_improves_the_debtor() {
    let mut vault = TestVault::new().await;
    let debtor = vault.new_user(WETH_10).await;
    let liquidator = vault.new_user(WETH_100).await;

    vault.deposit_and_mint(&debtor, WETH_10, DEBT_10000).await.unwrap();
    vault
        .deposit_and_mint(&liquidator, WETH_100, DEBT_10000)
        .await
        .unwrap();

    // 2000 -> 1800 USD: the debtor's factor drops to 0.9
    vault.set_price(PRICE_1800);
    let factor_before = vault.health_factor(&debtor.pubkey()).await;
    assert!(factor_before < MIN_HEALTH_FACTOR);

    vault
        .liquidate(&liquidator, &debtor.pubkey(), DEBT_5000)
        .await
        .unwrap();

    // 5000 USD of debt at 1800 USD/unit, plus the 10% bonus
    let seized_base = 2_777_777_777u64;
    let seized_total = seized_base + seized_base / 10;

    let debtor_position = vault.position(&debtor.pubkey()).await.unwrap();
    assert_eq!(
        debtor_position.collateral_of(&vault.weth_mint),
        WETH_10 - seized_total
    );
    assert_eq!(debtor_position.minted_debt, DEBT_5000);

    // liquidator paid debt tokens and received the seized collateral
    let liquidator_weth = vault.weth_ata(&liquidator.pubkey());
    let liquidator_debt = vault.debt_ata(&liquidator.pubkey());
    assert_eq!(vault.token_balance(&liquidator_weth).await, seized_total);
    assert_eq!(vault.token_balance(&liquidator_debt).await, DEBT_5000);

    let factor_after = vault.health_factor(&debtor.pubkey()).await;
    assert!(factor_after > factor_before);

    vault.assert_solvent().await;
}

#[tokio::test]
async fn test_liquidation_requires_an_unhealthy_debtor() {
    let mut vault = TestVault::new().await;
    let debtor = vault.new_user(WETH_10).await;
    let liquidator = vault.new_user(WETH_100).await;

    vault.deposit_and_mint(&debtor, WETH_10, DEBT_5000).await.unwrap();
    vault
        .deposit_and_mint(&liquidator, WETH_100, DEBT_5000)
        .await
        .unwrap();

    let result = vault
        .liquidate(&liquidator, &debtor.pubkey(), DEBT_5000)
        .await;
    assert_vault_error(result, VaultError::HealthFactorOk);
}

#[tokio::test]
async fn test_liquidation_must_improve_the_debtor() {
    let mut vault = TestVault::new().await;
    let debtor = vault.new_user(WETH_10).await;
    let liquidator = vault.new_user(WETH_100).await;

    vault.deposit_and_mint(&debtor, WETH_10, DEBT_10000).await.unwrap();
    vault
        .deposit_and_mint(&liquidator, WETH_100, DEBT_5000)
        .await
        .unwrap();

    // deep underwater: seizing debt + bonus makes the debtor worse off
    vault.set_price(PRICE_1000);
    let result = vault
        .liquidate(&liquidator, &debtor.pubkey(), DEBT_5000)
        .await;
    assert_vault_error(result, VaultError::HealthFactorNotImproved);

    // nothing moved
    let debtor_position = vault.position(&debtor.pubkey()).await.unwrap();
    assert_eq!(debtor_position.collateral_of(&vault.weth_mint), WETH_10);
    assert_eq!(debtor_position.minted_debt, DEBT_10000);
}

#[tokio::test]
async fn test_liquidation_rejects_zero_cover() {
    let mut vault = TestVault::new().await;
    let debtor = vault.new_user(WETH_10).await;
    let liquidator = vault.new_user(WETH_100).await;

    vault.deposit_and_mint(&debtor, WETH_10, DEBT_10000).await.unwrap();
    vault.set_price(PRICE_1800);

    let result = vault.liquidate(&liquidator, &debtor.pubkey(), 0).await;
    assert_vault_error(result, VaultError::AmountMustBePositive);
}

#[tokio::test]
async fn test_protocol_stays_solvent_across_operations() {
    let mut vault = TestVault::new().await;
    let alice = vault.new_user(WETH_100).await;
    let bob = vault.new_user(WETH_100).await;

    vault.deposit(&alice, WETH_10).await.unwrap();
    vault.assert_solvent().await;

    vault.mint_debt(&alice, DEBT_10000).await.unwrap();
    vault.assert_solvent().await;

    vault
        .deposit_and_mint(&bob, WETH_100, DEBT_10000)
        .await
        .unwrap();
    vault.assert_solvent().await;

    vault.set_price(PRICE_1800);
    vault.assert_solvent().await;

    vault
        .liquidate(&bob, &alice.pubkey(), DEBT_5000)
        .await
        .unwrap();
    vault.assert_solvent().await;

    vault.burn_debt(&bob, 4_000 * DEBT_UNIT).await.unwrap();
    vault.assert_solvent().await;

    vault.redeem(&bob, WETH_10).await.unwrap();
    vault.assert_solvent().await;

    // Alice repays what is left of her debt and exits
    vault.burn_debt(&alice, DEBT_5000).await.unwrap();
    vault.assert_solvent().await;

    let alice_position = vault.position(&alice.pubkey()).await.unwrap();
    assert_eq!(alice_position.minted_debt, 0);
    vault
        .redeem(&alice, alice_position.collateral_of(&vault.weth_mint))
        .await
        .unwrap();
    vault.assert_solvent().await;

    let registry = vault.registry_state().await;
    assert_eq!(registry.total_debt, vault.debt_supply().await);
}
