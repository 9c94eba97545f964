// Copyright 2020-2021 Plug New Zealand Limited & Centrality Investments Limited
// This file is part of Plug.

// Plug is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Plug is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Plug.  If not, see <http://www.gnu.org/licenses/>.

#![cfg_attr(not(feature = "std"), no_std)]

//! # Common crml types and traits
//!
//! Shared between `crml-factory`, `crml-validator` and `crml-governance` so that the three
//! pallets can call into one another without a circular crate dependency. Each pallet is the
//! sole implementor of one of these traits; the others only ever see the trait object.

use codec::{Decode, Encode};
pub use primitive_types::U256;
use scale_info::TypeInfo;
use sp_runtime::DispatchError;
use sp_std::prelude::*;

/// Balance of an amount of staked/rewarded token. Matches `cennznet_primitives::types::Balance`.
pub type Balance = u128;

/// Seconds since the unix epoch. The abstract "Clock" of the spec; in a full runtime this is
/// backed by `pallet_timestamp` through `frame_support::traits::UnixTime`.
pub type Moment = u64;

/// Validator tier, 1..=7. Tier 1 is the master validator.
pub type Quality = u8;

/// Sequential id assigned to a validator by the factory at creation time.
pub type ValidatorId = u32;

/// Sequential id assigned to a governance proposal.
pub type ProposalId = u32;

/// `PRECISION` used to scale the running reward accumulator.
pub const PRECISION: u128 = 1_000_000_000_000;

/// `MULTIPLIER` used to scale whole-token amounts (18 decimals).
pub const MULTIPLIER: u128 = 1_000_000_000_000_000_000;

/// Fee denominator: fees are expressed in basis points out of this.
pub const FEE_DENOMINATOR: u32 = 10_000;

/// `a * b / d` widening the product through `U256` so it can never wrap silently, narrowing
/// back down to `Balance` afterwards. Division truncates toward zero. `d == 0` returns 0, the
/// same "guard totalStaked == 0" behaviour spec §9 calls for at every use site.
pub fn mul_div(a: Balance, b: Balance, d: Balance) -> Balance {
	if d == 0 {
		return 0;
	}
	let wide = U256::from(a).saturating_mul(U256::from(b)) / U256::from(d);
	wide.try_into().unwrap_or(Balance::max_value())
}

/// `amount * acc / PRECISION`, the running-accumulator integration used throughout the reward
/// engine (spec §9 "running-sum accumulator math").
pub fn mul_div_precision(amount: Balance, acc: Balance) -> Balance {
	mul_div(amount, acc, PRECISION)
}

/// An ERC-20 shaped token ledger. The core engine only ever calls these three operations;
/// everything else (approvals, total supply, metadata) is out of scope per spec §1 non-goals.
pub trait TokenLedger<AccountId> {
	/// Move `amount` directly out of the ledger's own custody (e.g. a validator's fee escrow) to `to`.
	fn transfer(to: &AccountId, amount: Balance) -> Result<(), DispatchError>;
	/// Move `amount` from `from` to `to`, as if by an already-approved allowance.
	fn transfer_from(from: &AccountId, to: &AccountId, amount: Balance) -> Result<(), DispatchError>;
	/// Read the current balance of `who`.
	fn balance_of(who: &AccountId) -> Balance;
}

/// One validator's aggregate staking state, as returned by `crml-factory`'s
/// `get_all_validator_data` (spec §4.2).
#[derive(Clone, Encode, Decode, Eq, PartialEq, Default, TypeInfo)]
pub struct ValidatorStats<AccountId> {
	pub owner: AccountId,
	pub total_staked: Balance,
	pub deposit_fee_bps: u32,
	pub claim_fee_bps: u32,
	pub is_paused: bool,
	pub is_claimed: bool,
}

/// One validator's boost-reward accumulator progress, as returned alongside `ValidatorStats`.
#[derive(Clone, Copy, Encode, Decode, Eq, PartialEq, Default, TypeInfo)]
pub struct BoostStats {
	pub boost_period_count: u32,
	pub total_boost_reward: Balance,
}

/// One user's staking position on a validator, as returned alongside `ValidatorStats`.
#[derive(Clone, Copy, Encode, Decode, Eq, PartialEq, Default, TypeInfo)]
pub struct UserStats {
	pub amount: Balance,
	pub lock_start_time: Moment,
	pub lock_end_time: Moment,
	pub auto_max: bool,
	pub reward_debt: Balance,
	pub boost_debt: Balance,
}

/// Verifies an off-chain signature over the purchase-authorization preimage described in
/// spec §6 ("Signature scheme for purchase"). A production implementation wraps
/// `sp_io::crypto::secp256k1_ecdsa_recover` over the Ethereum-prefixed message hash.
pub trait SignatureOracle<AccountId> {
	/// Recover the signer of `message` given `signature`. Callers compare the result against
	/// the expected `verifier` account themselves.
	fn recover(message: &[u8], signature: &[u8; 65]) -> Option<AccountId>;
}

/// What `crml-factory` needs from `crml-validator` to bring a freshly registered validator id
/// to life, and what `crml-governance`/purchase flows need from the master instance.
pub trait ValidatorHandle<AccountId> {
	/// Initialize the live, purchase-mutable state for a validator id `crml-factory` just
	/// assigned. Called exactly once per id, from inside `Factory::create_validator`.
	fn init_validator(
		id: ValidatorId,
		owner: AccountId,
		verifier: AccountId,
		quality: Quality,
	) -> Result<(), DispatchError>;
	/// Deposit `amount` into `who`'s position on the master validator on behalf of governance,
	/// bypassing the deposit fee and token transfer (the tokens are already held by the validator).
	fn stake_for(who: &AccountId, amount: Balance) -> Result<(), DispatchError>;
	/// Open a new boost reward period `[start, end]` releasing `total_reward` on `validator`.
	fn add_boost_reward(
		validator: ValidatorId,
		start: Moment,
		end: Moment,
		total_reward: Balance,
	) -> Result<(), DispatchError>;
	/// `true` if `validator` has been claimed (i.e. its purchase-authorization gate has been passed).
	fn is_claimed(validator: ValidatorId) -> bool;
	/// The master validator's time-decayed voting power for `who` at the current time.
	fn ve_balance(who: &AccountId) -> Balance;
	/// The master validator's current `(amount, auto_max)` for `who`.
	fn amount_and_auto_max(who: &AccountId) -> (Balance, bool);
	/// `true` if `who` has already purchased a validator of `quality` via the master registry.
	fn have_purchased(who: &AccountId, quality: Quality) -> bool;
	/// Cumulative principal `who` has spent on validator purchases so far.
	fn player_validator_cost(who: &AccountId) -> Balance;
	/// Aggregate staking state for `validator`, for `Factory::get_all_validator_data` (spec §4.2).
	/// `None` if `validator` has no live state (not yet initialized).
	fn validator_stats(validator: ValidatorId) -> Option<ValidatorStats<AccountId>>;
	/// Boost-reward accumulator progress for `validator`, for `get_all_validator_data`.
	fn boost_stats(validator: ValidatorId) -> BoostStats;
	/// `who`'s staking position on `validator`, for `get_all_validator_data`.
	fn user_stats(validator: ValidatorId, who: &AccountId) -> UserStats;
	/// The shared custody account every validator's staked principal and boost reward is pooled
	/// under. Governance funds `stake_for`/`add_boost_reward` by paying into this account first
	/// (spec §4.3 "transfer ... from bank to validator/masterValidator").
	fn pool_account() -> AccountId;
}

/// No-op implementation for runtimes/tests that haven't wired `crml-validator` in yet.
impl<AccountId> ValidatorHandle<AccountId> for () {
	fn init_validator(_id: ValidatorId, _owner: AccountId, _verifier: AccountId, _quality: Quality) -> Result<(), DispatchError> {
		Ok(())
	}
	fn stake_for(_who: &AccountId, _amount: Balance) -> Result<(), DispatchError> {
		Ok(())
	}
	fn add_boost_reward(_validator: ValidatorId, _start: Moment, _end: Moment, _total_reward: Balance) -> Result<(), DispatchError> {
		Ok(())
	}
	fn is_claimed(_validator: ValidatorId) -> bool {
		false
	}
	fn ve_balance(_who: &AccountId) -> Balance {
		0
	}
	fn amount_and_auto_max(_who: &AccountId) -> (Balance, bool) {
		(0, false)
	}
	fn have_purchased(_who: &AccountId, _quality: Quality) -> bool {
		false
	}
	fn player_validator_cost(_who: &AccountId) -> Balance {
		0
	}
	fn validator_stats(_validator: ValidatorId) -> Option<ValidatorStats<AccountId>> {
		None
	}
	fn boost_stats(_validator: ValidatorId) -> BoostStats {
		BoostStats::default()
	}
	fn user_stats(_validator: ValidatorId, _who: &AccountId) -> UserStats {
		UserStats::default()
	}
	fn pool_account() -> AccountId {
		panic!("pool_account: ValidatorHandle not wired")
	}
}

/// What `crml-governance` and `crml-validator` need from `crml-factory`'s registry.
pub trait FactoryHandle<AccountId> {
	/// Increase the global staked-amount counter. Called by a registered validator only.
	fn add_total_staked_amount(amount: Balance) -> Result<(), DispatchError>;
	/// Decrease the global staked-amount counter; underflow is `NotEnoughAmount`.
	fn sub_total_staked_amount(amount: Balance) -> Result<(), DispatchError>;
	/// Increase the global staked-wallet counter.
	fn add_total_staked_wallet() -> Result<(), DispatchError>;
	/// Decrease the global staked-wallet counter; underflow is `NotEnoughWallet`.
	fn sub_total_staked_wallet() -> Result<(), DispatchError>;
	/// `true` if `id` is a validator created by this factory.
	fn is_registered(id: ValidatorId) -> bool;
	/// The quality tier a validator was created with.
	fn quality_of(id: ValidatorId) -> Option<Quality>;
	/// The owner a validator was created with (the purchaser, for secondary tiers).
	fn owner_of(id: ValidatorId) -> Option<AccountId>;
	/// Minimum whole-token lock amount required to purchase `quality`, unscaled by `MULTIPLIER`.
	fn min_amount_for_quality(quality: Quality) -> Balance;
	/// All validator ids known to the factory, in creation order.
	fn all_validators() -> Vec<ValidatorId>;
}

/// What `crml-validator` needs from `crml-governance`: resetting a user's accumulated vote
/// weight when their underlying lock is consumed (withdraw, or extend-after-expiry).
pub trait GovernanceHandle<AccountId> {
	/// Zero `who`'s total committed vote weight across all open proposals.
	fn reset_votes(who: &AccountId);
}

/// No-op implementation for runtimes that haven't wired governance in yet.
impl<AccountId> GovernanceHandle<AccountId> for () {
	fn reset_votes(_who: &AccountId) {}
}
