// Copyright 2020-2021 Plug New Zealand Limited & Centrality Investments Limited
// This file is part of Plug.

#![cfg(test)]

use crate::{self as crml_governance, Config};
use crml_support::{Balance, Moment, Quality, SignatureOracle, TokenLedger, ValidatorId};
use frame_support::{parameter_types, traits::UnixTime};
use sp_core::H256;
use sp_runtime::traits::{BlakeTwo256, IdentityLookup};
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
		Governance: crml_governance::{Module, Call, Storage, Event<T>},
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
}

/// Move the mock clock to `t`. Every `Validator`/`Factory`/`Governance` call reads this as `now`.
pub fn set_now(t: Moment) {
	NOW.with(|n| *n.borrow_mut() = t);
}

pub fn balance_of(who: AccountId) -> Balance {
	BALANCES.with(|b| *b.borrow().get(&who).unwrap_or(&0))
}

pub fn set_balance(who: AccountId, amount: Balance) {
	BALANCES.with(|b| b.borrow_mut().insert(who, amount));
}

pub struct MockUnixTime;
impl UnixTime for MockUnixTime {
	fn now() -> core::time::Duration {
		core::time::Duration::new(NOW.with(|n| *n.borrow()), 0)
	}
}

/// A flat in-memory ledger; governance only ever pays balances out of its own "bank" conceptually,
/// so `transfer` simply credits `to` the same way `crml-validator`'s mock does.
pub struct MockTokenLedger;
impl TokenLedger<AccountId> for MockTokenLedger {
	fn transfer(to: &AccountId, amount: Balance) -> Result<(), sp_runtime::DispatchError> {
		BALANCES.with(|b| *b.borrow_mut().entry(*to).or_insert(0) += amount);
		Ok(())
	}

	fn transfer_from(from: &AccountId, to: &AccountId, amount: Balance) -> Result<(), sp_runtime::DispatchError> {
		BALANCES.with(|b| {
			let mut b = b.borrow_mut();
			let from_balance = b.entry(*from).or_insert(0);
			if *from_balance < amount {
				return Err(sp_runtime::DispatchError::Other("InsufficientBalance"));
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
	fn recover(_message: &[u8], _signature: &[u8; 65]) -> Option<AccountId> {
		None
	}
}

parameter_types! {
	pub const MinLock: Moment = 100;
	pub const MaxLock: Moment = 1_000;
	pub const DepositMaxFeeBps: u32 = 100;
	pub const ClaimMaxFeeBps: u32 = 500;
	pub const ChainId: u64 = 1;
}

impl crml_validator::Config for Test {
	type Event = Event;
	type UnixTime = MockUnixTime;
	type TokenLedger = MockTokenLedger;
	type SignatureOracle = MockSignatureOracle;
	type Factory = Factory;
	type Governance = Governance;
	type MinLock = MinLock;
	type MaxLock = MaxLock;
	type DepositMaxFeeBps = DepositMaxFeeBps;
	type ClaimMaxFeeBps = ClaimMaxFeeBps;
	type ChainId = ChainId;
}

impl Config for Test {
	type Event = Event;
	type UnixTime = MockUnixTime;
	type TokenLedger = MockTokenLedger;
	type Validator = Validator;
	type Factory = Factory;
}

#[derive(Default)]
pub struct ExtBuilder;

impl ExtBuilder {
	pub fn build(self) -> sp_io::TestExternalities {
		NOW.with(|n| *n.borrow_mut() = 0);
		BALANCES.with(|b| b.borrow_mut().clear());
		GenesisConfig::default().build_storage().unwrap().into()
	}
}

/// Creates validator `quality` with `owner`/`verifier`, returning its assigned id.
pub fn new_validator(owner: AccountId, quality: Quality, verifier: AccountId) -> ValidatorId {
	let id = Factory::next_validator_id();
	assert!(crml_factory::Module::<Test>::create_validator(Origin::root(), 0u64, owner, quality, verifier).is_ok());
	id
}

/// Designates `id` (which must be quality 1) as the master validator.
pub fn set_master(id: ValidatorId) {
	assert!(crml_validator::Module::<Test>::set_master_validator(Origin::root(), id).is_ok());
}
