// Copyright 2020-2021 Plug New Zealand Limited & Centrality Investments Limited
// This file is part of Plug.

#![cfg(test)]

use crate::{self as crml_validator, Config};
use crml_support::{Balance, FactoryHandle, GovernanceHandle, Moment, Quality, SignatureOracle, TokenLedger, ValidatorId};
use frame_support::{parameter_types, traits::UnixTime, PalletId};
use sp_core::H256;
use sp_runtime::{
	traits::{BlakeTwo256, IdentityLookup},
	DispatchError,
};
use std::cell::RefCell;
use std::collections::HashMap;

pub type AccountId = u64;

type UncheckedExtrinsic = frame_system::mocking::MockUncheckedExtrinsic<Test>;
type Block = frame_system::mocking::MockBlock<Test>;

frame_support::construct_runtime!(
	pub enum Test where
		Block = Block,
		NodeBlock = Block,
		UncheckedExtrinsic = UncheckedExtrinsic,
	{
		System: frame_system::{Module, Call, Config, Storage, Event<T>},
		Factory: crml_factory::{Module, Call, Storage, Config, Event<T>},
		Validator: crml_validator::{Module, Call, Storage, Event<T>},
	}
);

parameter_types! {
	pub const BlockHashCount: u64 = 250;
}
impl frame_system::Config for Test {
	type BlockWeights = ();
	type BlockLength = ();
	type BaseCallFilter = ();
	type Origin = Origin;
	type Index = u64;
	type BlockNumber = u64;
	type Call = Call;
	type Hash = H256;
	type Hashing = BlakeTwo256;
	type AccountId = AccountId;
	type Lookup = IdentityLookup<Self::AccountId>;
	type Header = sp_runtime::testing::Header;
	type BlockHashCount = BlockHashCount;
	type Event = Event;
	type DbWeight = ();
	type Version = ();
	type PalletInfo = PalletInfo;
	type AccountData = ();
	type OnNewAccount = ();
	type OnKilledAccount = ();
	type SystemWeightInfo = ();
	type SS58Prefix = ();
}

impl crml_factory::Config for Test {
	type Event = Event;
	type Validator = Validator;
}

thread_local! {
	static NOW: RefCell<Moment> = RefCell::new(0);
	static BALANCES: RefCell<HashMap<AccountId, Balance>> = RefCell::new(HashMap::new());
	static VERIFIER_SIGNS: RefCell<HashMap<Vec<u8>, AccountId>> = RefCell::new(HashMap::new());
	static RESET_VOTES_CALLS: RefCell<Vec<AccountId>> = RefCell::new(Vec::new());
}

/// Move the mock clock to `t`. Every `Validator`/`Factory` call reads this as `now`.
pub fn set_now(t: Moment) {
	NOW.with(|n| *n.borrow_mut() = t);
}

pub fn balance_of(who: AccountId) -> Balance {
	BALANCES.with(|b| *b.borrow().get(&who).unwrap_or(&0))
}

pub fn set_balance(who: AccountId, amount: Balance) {
	BALANCES.with(|b| b.borrow_mut().insert(who, amount));
}

/// Register that `signature` recovers to `signer`, for `MockSignatureOracle`.
pub fn register_signature(signature: [u8; 65], signer: AccountId) {
	VERIFIER_SIGNS.with(|m| m.borrow_mut().insert(signature.to_vec(), signer));
}

pub fn reset_votes_calls() -> Vec<AccountId> {
	RESET_VOTES_CALLS.with(|v| v.borrow().clone())
}

pub struct MockUnixTime;
impl UnixTime for MockUnixTime {
	fn now() -> core::time::Duration {
		core::time::Duration::new(NOW.with(|n| *n.borrow()), 0)
	}
}

/// A flat in-memory ledger keyed by account; good enough to exercise fee-split and
/// principal/reward movements without a real `Currency` instance.
pub struct MockTokenLedger;
impl TokenLedger<AccountId> for MockTokenLedger {
	fn transfer(to: &AccountId, amount: Balance) -> Result<(), DispatchError> {
		BALANCES.with(|b| *b.borrow_mut().entry(*to).or_insert(0) += amount);
		Ok(())
	}

	fn transfer_from(from: &AccountId, to: &AccountId, amount: Balance) -> Result<(), DispatchError> {
		BALANCES.with(|b| {
			let mut b = b.borrow_mut();
			let from_balance = b.entry(*from).or_insert(0);
			if *from_balance < amount {
				return Err(DispatchError::Other("InsufficientBalance"));
			}
			*from_balance -= amount;
			*b.entry(*to).or_insert(0) += amount;
			Ok(())
		})
	}

	fn balance_of(who: &AccountId) -> Balance {
		balance_of(*who)
	}
}

pub struct MockSignatureOracle;
impl SignatureOracle<AccountId> for MockSignatureOracle {
	fn recover(_message: &[u8], signature: &[u8; 65]) -> Option<AccountId> {
		VERIFIER_SIGNS.with(|m| m.borrow().get(signature.to_vec().as_slice()).copied())
	}
}

pub struct MockGovernance;
impl GovernanceHandle<AccountId> for MockGovernance {
	fn reset_votes(who: &AccountId) {
		RESET_VOTES_CALLS.with(|v| v.borrow_mut().push(*who));
	}
}

parameter_types! {
	pub const MinLock: Moment = 100;
	pub const MaxLock: Moment = 1_000;
	pub const DepositMaxFeeBps: u32 = 100;
	pub const ClaimMaxFeeBps: u32 = 500;
	pub const ChainId: u64 = 1;
	pub const TestValidatorPalletId: PalletId = PalletId(*b"cr/valdr");
}

impl Config for Test {
	type Event = Event;
	type UnixTime = MockUnixTime;
	type TokenLedger = MockTokenLedger;
	type SignatureOracle = MockSignatureOracle;
	type Factory = Factory;
	type Governance = MockGovernance;
	type MinLock = MinLock;
	type MaxLock = MaxLock;
	type DepositMaxFeeBps = DepositMaxFeeBps;
	type ClaimMaxFeeBps = ClaimMaxFeeBps;
	type ChainId = ChainId;
}

#[derive(Default)]
pub struct ExtBuilder;

impl ExtBuilder {
	pub fn build(self) -> sp_io::TestExternalities {
		NOW.with(|n| *n.borrow_mut() = 0);
		BALANCES.with(|b| b.borrow_mut().clear());
		VERIFIER_SIGNS.with(|m| m.borrow_mut().clear());
		RESET_VOTES_CALLS.with(|v| v.borrow_mut().clear());
		GenesisConfig::default().build_storage().unwrap().into()
	}
}

/// Creates validator `quality` with `owner`/`verifier`, returning its assigned id.
pub fn new_validator(owner: AccountId, quality: Quality, verifier: AccountId) -> ValidatorId {
	let id = Factory::next_validator_id();
	assert!(crml_factory::Module::<Test>::create_validator(Origin::root(), 0u64, owner, quality, verifier).is_ok());
	id
}
