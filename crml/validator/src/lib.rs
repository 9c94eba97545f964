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

//! # Validator
//!
//! The per-validator staking engine: lock lifecycle, multi-period reward accumulators (base
//! and governance-funded boost), time-weighted voting power on the master instance, purchase
//! authorization for secondary tiers, and a per-validator fee escrow.
//!
//! A "validator" here is not a separate pallet instantiation (the upstream EVM contract is
//! cloned per deployment); instead every validator is a row keyed by `ValidatorId` across a
//! handful of storage maps in this single pallet, assigned deterministically by `crml-factory`.
//! See `SPEC_FULL.md` §2 for why this is the idiomatic substitute for proxy/clone creation.

#[cfg(test)]
mod mock;
mod types;
pub use types::*;

use codec::Encode;
use crml_support::{
	mul_div, mul_div_precision, Balance, BoostStats, FactoryHandle, GovernanceHandle, Moment, Quality, SignatureOracle,
	TokenLedger, UserStats, ValidatorHandle, ValidatorId, ValidatorStats, FEE_DENOMINATOR, MULTIPLIER,
};
use frame_support::{decl_error, decl_event, decl_module, decl_storage, ensure, traits::UnixTime, PalletId};
use frame_system::{ensure_root, ensure_signed, pallet_prelude::*};
use sp_runtime::{traits::AccountIdConversion, DispatchError, DispatchResult};
use sp_std::prelude::*;

/// `PalletId` this module's pooled custody account (staked principal + escrowed fees for every
/// validator id) is derived from. Individual validators' balances are bookkept in this
/// pallet's own storage (`UserInfo.amount`, `FeeVaultBalance`), not by separate on-chain accounts,
/// exactly as `crml-support::TokenLedger::transfer` documents ("the ledger's own custody").
const VALIDATOR_POOL_ID: PalletId = PalletId(*b"cr/valdr");

pub trait Config: frame_system::Config {
	/// The system event type.
	type Event: From<Event<Self>> + Into<<Self as frame_system::Config>::Event>;
	/// Source of `now`, the abstract Clock of spec §2.
	type UnixTime: UnixTime;
	/// The external token ledger (spec §1 "assumed as a side-effect port").
	type TokenLedger: TokenLedger<Self::AccountId>;
	/// The external ECDSA recovery oracle backing `purchase_validator` (spec §6).
	type SignatureOracle: SignatureOracle<Self::AccountId>;
	/// The factory registry: quality/owner lookups and the global staked counters.
	type Factory: FactoryHandle<Self::AccountId>;
	/// Governance, for vote-weight resets on withdraw / extend-after-expiry (master only).
	type Governance: GovernanceHandle<Self::AccountId>;
	/// Shortest permitted lock duration.
	type MinLock: frame_support::traits::Get<Moment>;
	/// Longest permitted lock duration; also the `veBalance` denominator.
	type MaxLock: frame_support::traits::Get<Moment>;
	/// Upper bound, in basis points of 10,000, for `deposit_fee_bps`.
	type DepositMaxFeeBps: frame_support::traits::Get<u32>;
	/// Upper bound, in basis points of 10,000, for `claim_fee_bps`.
	type ClaimMaxFeeBps: frame_support::traits::Get<u32>;
	/// Chain identifier mixed into the purchase-authorization preimage (spec §6).
	type ChainId: frame_support::traits::Get<u64>;
}

decl_event! {
	pub enum Event<T> where AccountId = <T as frame_system::Config>::AccountId {
		/// A user locked or added to a lock (user, gross amount, lock_start, duration, lock_end, now).
		Deposit(AccountId, Balance, Moment, Moment, Moment, Moment),
		/// A user claimed pending base reward (user, net, fee).
		Claim(AccountId, Balance, Balance),
		/// A user claimed pending boost reward (user, amount).
		BoostRewardClaimed(AccountId, Balance),
		/// A user withdrew their expired lock (user, principal, now).
		Withdraw(AccountId, Balance, Moment),
		/// A user toggled auto-max-lock renewal.
		SetAutoMax(AccountId, bool),
		/// A user successfully claimed ownership of a secondary-tier validator.
		PurchaseValidator(AccountId, Balance, Quality),
		/// Governance opened a new boost reward window on a validator (start, end, total).
		BoostRewardAdded(Moment, Moment, Balance),
		/// The owner pulled the accumulated deposit-fee escrow.
		FeesClaimed(AccountId, Balance),
	}
}

decl_error! {
	pub enum Error for Module<T: Config> {
		/// No validator is registered under this id.
		NotValidValidator,
		/// Caller is not this validator's current owner.
		NotOwner,
		/// An amount argument that must be non-zero was zero.
		ZeroAmount,
		/// Lock duration outside `[MinLock, MaxLock]` (or `(0, MaxLock]` for extensions).
		WrongDuration,
		/// `create_lock` called when the caller already has an open position.
		AlreadyLocked,
		/// The caller has no staked principal on this validator.
		NoLockCreated,
		/// `increase_amount` called after a non-auto-max lock has expired.
		LockTimeExceeded,
		/// Operation not permitted while `auto_max` is set.
		AutoMaxTime,
		/// The requested new lock end exceeds `now + MaxLock`.
		GreaterThanMaxTime,
		/// `withdraw` called before `lock_end_time`.
		TimeNotUp,
		/// `end_time` must be strictly after `start_time`.
		InvalidTimePeriod,
		/// Reward period total must be non-zero.
		InvalidTotalReward,
		/// `set_auto_max` called with the value it already has.
		TheSameValue,
		/// Purchase-authorization `deadline` has passed.
		SignatureExpired,
		/// Purchase called with zero NP points.
		InsufficientNPPoint,
		/// Purchase `quality` argument doesn't match this validator's tier.
		QualityWrong,
		/// This validator has already been claimed by a purchaser.
		ValidatorIsClaimed,
		/// The caller already purchased a validator of this quality.
		AlreadyPurchasedThisQuality,
		/// The caller's master-validator lock does not have `auto_max` enabled.
		AutoMaxNotEnabled,
		/// The caller's master-validator lock amount is below the purchase threshold.
		InsufficientLockAmount,
		/// Signature did not recover to this validator's `verifier`.
		VerificationFailed,
		/// Fee argument exceeds the pallet-wide cap for its kind.
		FeeTooHigh,
		/// Nothing in the fee vault to claim.
		ZeroFee,
		/// This validator is paused; user-facing mutating operations are blocked.
		ContractPaused,
	}
}

decl_storage! {
	trait Store for Module<T: Config> as Validator {
		/// Live, purchase-mutable state for every validator id `crml-factory` has created.
		pub ValidatorStates get(fn validator_state):
			map hasher(twox_64_concat) ValidatorId => Option<ValidatorState<T::AccountId>>;
		/// The single quality-1 validator id; sole source of `veBalance` and the purchase registry.
		pub MasterValidatorId get(fn master_validator_id): Option<ValidatorId>;
		/// Number of admin-scheduled reward periods recorded for a validator.
		pub RewardPeriodCount get(fn reward_period_count): map hasher(twox_64_concat) ValidatorId => u32;
		/// Append-only admin-scheduled reward periods, indexed `0..RewardPeriodCount`.
		pub RewardPeriods get(fn reward_period):
			double_map hasher(twox_64_concat) ValidatorId, hasher(twox_64_concat) u32 => RewardPeriod;
		/// Number of governance-funded boost reward periods recorded for a validator.
		pub BoostRewardCount get(fn boost_reward_count): map hasher(twox_64_concat) ValidatorId => u32;
		/// Append-only boost reward periods, indexed `0..BoostRewardCount`.
		pub BoostRewards get(fn boost_reward):
			double_map hasher(twox_64_concat) ValidatorId, hasher(twox_64_concat) u32 => RewardPeriod;
		/// Per-validator, per-user staking position.
		pub UserInfos get(fn user_info):
			double_map hasher(twox_64_concat) ValidatorId, hasher(blake2_128_concat) T::AccountId => UserInfo;
		/// Escrowed, not-yet-claimed deposit fees for a validator's `FeeVault`.
		pub FeeVaultBalance get(fn fee_vault_balance): map hasher(twox_64_concat) ValidatorId => Balance;
		/// Master-validator purchase registry: has `(user, quality)` already been claimed.
		pub HavePurchased get(fn have_purchased):
			double_map hasher(blake2_128_concat) T::AccountId, hasher(twox_64_concat) Quality => bool;
		/// Master-validator purchase registry: cumulative principal spent on purchases per user.
		pub PlayerValidatorCost get(fn player_validator_cost): map hasher(blake2_128_concat) T::AccountId => Balance;
	}
}

decl_module! {
	pub struct Module<T: Config> for enum Call where origin: T::Origin {
		type Error = Error<T>;

		fn deposit_event() = default;

		/// Open a brand new lock. Fails `AlreadyLocked` if the caller already has one.
		#[weight = 10_000]
		pub fn create_lock(origin, validator: ValidatorId, amount: Balance, duration: Moment) {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused(validator)?;
			ensure!(amount > 0, Error::<T>::ZeroAmount);
			ensure!(duration >= T::MinLock::get() && duration <= T::MaxLock::get(), Error::<T>::WrongDuration);
			let user = Self::user_info(validator, &who);
			ensure!(user.amount == 0 && user.lock_start_time == 0, Error::<T>::AlreadyLocked);

			T::Factory::add_total_staked_wallet()?;
			let now = Self::now();
			Self::do_deposit(validator, amount, duration, &who, false)?;
			Self::deposit_event(Event::<T>::Deposit(who, amount, now, duration, now + duration, now));
		}

		/// Add principal to an already-open, non-expired (or auto-max) lock.
		#[weight = 10_000]
		pub fn increase_amount(origin, validator: ValidatorId, amount: Balance) {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused(validator)?;
			ensure!(amount > 0, Error::<T>::ZeroAmount);
			let user = Self::user_info(validator, &who);
			ensure!(user.amount > 0, Error::<T>::NoLockCreated);
			ensure!(user.auto_max || Self::now() <= user.lock_end_time, Error::<T>::LockTimeExceeded);

			let now = Self::now();
			Self::do_deposit(validator, amount, 0, &who, false)?;
			let user = Self::user_info(validator, &who);
			Self::deposit_event(Event::<T>::Deposit(who, amount, user.lock_start_time, 0, user.lock_end_time, now));
		}

		/// Push `lock_end_time` out by `duration` (capped at `now + MaxLock`).
		#[weight = 10_000]
		pub fn extend_duration(origin, validator: ValidatorId, duration: Moment) {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused(validator)?;
			ensure!(duration > 0 && duration <= T::MaxLock::get(), Error::<T>::WrongDuration);
			let user = Self::user_info(validator, &who);
			ensure!(!user.auto_max, Error::<T>::AutoMaxTime);

			let now = Self::now();
			let base = if now > user.lock_end_time { now } else { user.lock_end_time };
			let new_end = base.saturating_add(duration);
			ensure!(new_end <= now.saturating_add(T::MaxLock::get()), Error::<T>::GreaterThanMaxTime);

			if user.lock_end_time <= now && Self::is_master(validator) {
				T::Governance::reset_votes(&who);
			}
			Self::do_deposit(validator, 0, duration, &who, false)?;
			Self::deposit_event(Event::<T>::Deposit(who, 0, user.lock_start_time, duration, new_end, now));
		}

		/// Settle and pay out base + boost pending reward, rewriting both reward debts.
		#[weight = 10_000]
		pub fn claim(origin, validator: ValidatorId) {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused(validator)?;
			let mut user = Self::user_info(validator, &who);
			ensure!(user.amount > 0, Error::<T>::NoLockCreated);
			Self::do_claim(validator, &who, &mut user)?;
			UserInfos::<T>::insert(validator, &who, user);
		}

		/// Claim, then return principal once the lock has matured (and `auto_max` is off).
		#[weight = 10_000]
		pub fn withdraw(origin, validator: ValidatorId) {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused(validator)?;
			let mut user = Self::user_info(validator, &who);
			ensure!(user.amount > 0, Error::<T>::ZeroAmount);
			ensure!(Self::now() >= user.lock_end_time, Error::<T>::TimeNotUp);
			ensure!(!user.auto_max, Error::<T>::AutoMaxTime);

			Self::do_claim(validator, &who, &mut user)?;
			let amount = user.amount;
			T::TokenLedger::transfer(&who, amount)?;
			T::Factory::sub_total_staked_amount(amount)?;
			T::Factory::sub_total_staked_wallet()?;
			ValidatorStates::<T>::mutate(validator, |maybe| {
				if let Some(v) = maybe {
					v.total_staked = v.total_staked.saturating_sub(amount);
				}
			});
			UserInfos::<T>::remove(validator, &who);
			if Self::is_master(validator) {
				T::Governance::reset_votes(&who);
			}
			Self::deposit_event(Event::<T>::Withdraw(who, amount, Self::now()));
		}

		/// Toggle the auto-renewing max-lock flag. Both directions snap `lock_end_time` to
		/// `now + MaxLock` (spec §9 "Open question"; preserved deliberately, not a bug fix).
		#[weight = 10_000]
		pub fn set_auto_max(origin, validator: ValidatorId, auto_max: bool) {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused(validator)?;
			let mut user = Self::user_info(validator, &who);
			ensure!(user.amount > 0, Error::<T>::NoLockCreated);
			ensure!(user.auto_max != auto_max, Error::<T>::TheSameValue);

			user.auto_max = auto_max;
			user.lock_end_time = Self::now().saturating_add(T::MaxLock::get());
			UserInfos::<T>::insert(validator, &who, user);
			Self::deposit_event(Event::<T>::SetAutoMax(who, auto_max));
		}

		/// Claim ownership of a secondary-tier validator against a signed authorization and a
		/// sufficiently large, `auto_max` lock on the master validator.
		#[weight = 10_000]
		pub fn purchase_validator(
			origin,
			validator: ValidatorId,
			np: Balance,
			quality: Quality,
			deadline: Moment,
			signature: [u8; 65],
		) {
			let who = ensure_signed(origin)?;
			Self::ensure_not_paused(validator)?;
			let vstate = Self::validator_state(validator).ok_or(Error::<T>::NotValidValidator)?;
			let this_quality = T::Factory::quality_of(validator).ok_or(Error::<T>::NotValidValidator)?;

			ensure!(deadline >= Self::now(), Error::<T>::SignatureExpired);
			ensure!(np > 0, Error::<T>::InsufficientNPPoint);
			ensure!(quality == this_quality, Error::<T>::QualityWrong);
			ensure!(!vstate.is_claimed, Error::<T>::ValidatorIsClaimed);
			ensure!(!Self::have_purchased(&who, quality), Error::<T>::AlreadyPurchasedThisQuality);

			let master_id = Self::master_validator_id().ok_or(Error::<T>::NotValidValidator)?;
			let master_user = Self::user_info(master_id, &who);
			ensure!(master_user.auto_max, Error::<T>::AutoMaxNotEnabled);

			let required = T::Factory::min_amount_for_quality(quality).saturating_mul(MULTIPLIER);
			let spent = Self::player_validator_cost(&who);
			ensure!(master_user.amount >= required.saturating_add(spent), Error::<T>::InsufficientLockAmount);

			let preimage = Self::purchase_preimage(np, validator, deadline, T::ChainId::get(), &who, quality);
			let signer = T::SignatureOracle::recover(&preimage, &signature).ok_or(Error::<T>::VerificationFailed)?;
			ensure!(signer == vstate.verifier, Error::<T>::VerificationFailed);

			ValidatorStates::<T>::mutate(validator, |maybe| {
				if let Some(v) = maybe {
					v.is_claimed = true;
					v.owner = who.clone();
				}
			});
			HavePurchased::<T>::insert(&who, quality, true);
			PlayerValidatorCost::<T>::mutate(&who, |c| *c = c.saturating_add(required));

			Self::deposit_event(Event::<T>::PurchaseValidator(who, np, quality));
		}

		/// Pull the full deposit-fee escrow for this validator to its current owner.
		#[weight = 10_000]
		pub fn claim_fees(origin, validator: ValidatorId) {
			let who = ensure_signed(origin)?;
			Self::ensure_owner(validator, &who)?;
			let fee = Self::fee_vault_balance(validator);
			ensure!(fee > 0, Error::<T>::ZeroFee);
			FeeVaultBalance::remove(validator);
			T::TokenLedger::transfer(&who, fee)?;
			Self::deposit_event(Event::<T>::FeesClaimed(who, fee));
		}

		/// Owner-gated: adjust the deposit fee, capped at `DepositMaxFeeBps`.
		#[weight = 10_000]
		pub fn set_deposit_fee(origin, validator: ValidatorId, fee_bps: u32) {
			let who = ensure_signed(origin)?;
			Self::ensure_owner(validator, &who)?;
			ensure!(fee_bps <= T::DepositMaxFeeBps::get(), Error::<T>::FeeTooHigh);
			ValidatorStates::<T>::mutate(validator, |maybe| {
				if let Some(v) = maybe {
					v.deposit_fee_bps = fee_bps;
				}
			});
		}

		/// Owner-gated: adjust the claim fee, capped at `ClaimMaxFeeBps`.
		#[weight = 10_000]
		pub fn set_claim_fee(origin, validator: ValidatorId, fee_bps: u32) {
			let who = ensure_signed(origin)?;
			Self::ensure_owner(validator, &who)?;
			ensure!(fee_bps <= T::ClaimMaxFeeBps::get(), Error::<T>::FeeTooHigh);
			ValidatorStates::<T>::mutate(validator, |maybe| {
				if let Some(v) = maybe {
					v.claim_fee_bps = fee_bps;
				}
			});
		}

		/// Admin: pause or unpause a validator. While paused, all user-facing mutating calls
		/// fail `ContractPaused` (spec §6 "Pauser-gated").
		#[weight = 10_000]
		pub fn set_pause(origin, validator: ValidatorId, paused: bool) {
			ensure_root(origin)?;
			ValidatorStates::<T>::mutate(validator, |maybe| {
				if let Some(v) = maybe {
					v.is_paused = paused;
				}
			});
		}

		/// Admin: replace a validator's purchase-authorization `verifier` account.
		#[weight = 10_000]
		pub fn set_verifier(origin, validator: ValidatorId, verifier: T::AccountId) {
			ensure_root(origin)?;
			ValidatorStates::<T>::mutate(validator, |maybe| {
				if let Some(v) = maybe {
					v.verifier = verifier;
				}
			});
		}

		/// Admin: designate the quality-1 validator as the master (sole `veBalance` source).
		#[weight = 10_000]
		pub fn set_master_validator(origin, validator: ValidatorId) {
			ensure_root(origin)?;
			ensure!(T::Factory::quality_of(validator) == Some(1), Error::<T>::NotValidValidator);
			MasterValidatorId::put(validator);
		}

		/// Admin: append a new admin-scheduled base reward period.
		#[weight = 10_000]
		pub fn set_reward_period(origin, validator: ValidatorId, start_time: Moment, end_time: Moment, total_reward: Balance) {
			ensure_root(origin)?;
			ensure!(ValidatorStates::<T>::contains_key(validator), Error::<T>::NotValidValidator);
			ensure!(end_time > start_time, Error::<T>::InvalidTimePeriod);
			ensure!(total_reward > 0, Error::<T>::InvalidTotalReward);
			let idx = Self::reward_period_count(validator);
			RewardPeriods::insert(validator, idx, RewardPeriod::new(start_time, end_time, total_reward));
			RewardPeriodCount::insert(validator, idx + 1);
		}
	}
}

impl<T: Config> Module<T> {
	/// This pallet's sovereign account: the single pot of record for every validator's staked
	/// principal and escrowed fees, individually bookkept by `UserInfo.amount`/`FeeVaultBalance`.
	pub fn account_id() -> T::AccountId {
		VALIDATOR_POOL_ID.into_account()
	}

	fn now() -> Moment {
		T::UnixTime::now().as_secs()
	}

	fn is_master(validator: ValidatorId) -> bool {
		Self::master_validator_id() == Some(validator)
	}

	fn ensure_not_paused(validator: ValidatorId) -> DispatchResult {
		let v = Self::validator_state(validator).ok_or(Error::<T>::NotValidValidator)?;
		ensure!(!v.is_paused, Error::<T>::ContractPaused);
		Ok(())
	}

	fn ensure_owner(validator: ValidatorId, who: &T::AccountId) -> Result<ValidatorState<T::AccountId>, DispatchError> {
		let v = Self::validator_state(validator).ok_or(Error::<T>::NotValidValidator)?;
		ensure!(&v.owner == who, Error::<T>::NotOwner);
		Ok(v)
	}

	/// Left-pads `bytes` into a 32-byte big-endian word, the fixed width every scalar Solidity
	/// type (`uint256`, `address`) occupies in an `abi.encodePacked` preimage.
	fn left_pad_32(bytes: &[u8]) -> [u8; 32] {
		let mut out = [0u8; 32];
		let start = 32 - bytes.len();
		out[start..].copy_from_slice(bytes);
		out
	}

	/// Builds the purchase-authorization preimage byte-for-byte as spec §6 "Signature scheme
	/// for purchase" describes: `np ‖ validator ‖ deadline ‖ chain_id ‖ user ‖ quality`, each
	/// numeric field packed big-endian at its Solidity `uint256` width rather than SCALE-encoded
	/// (SCALE is little-endian and omits the EVM side's fixed 32-byte framing, so a tuple
	/// `Encode::encode()` would not reproduce bytes a real `ecrecover`-based verifier accepts).
	fn purchase_preimage(
		np: Balance,
		validator: ValidatorId,
		deadline: Moment,
		chain_id: u64,
		who: &T::AccountId,
		quality: Quality,
	) -> Vec<u8> {
		let mut msg = Vec::with_capacity(32 * 4 + who.encode().len() + 1);
		msg.extend_from_slice(&Self::left_pad_32(&np.to_be_bytes()));
		msg.extend_from_slice(&Self::left_pad_32(&validator.to_be_bytes()));
		msg.extend_from_slice(&Self::left_pad_32(&deadline.to_be_bytes()));
		msg.extend_from_slice(&Self::left_pad_32(&chain_id.to_be_bytes()));
		msg.extend_from_slice(&who.encode());
		msg.push(quality);
		msg
	}

	/// `multiplier(a, b, end)`: seconds of a period actually elapsed between two checkpoints.
	fn multiplier(a: Moment, b: Moment, end: Moment) -> Moment {
		if b <= a {
			0
		} else {
			sp_std::cmp::min(b, end).saturating_sub(a)
		}
	}

	/// Walk every period in `periods`/`count` whose start has passed and whose `last_reward_time`
	/// is behind `now`, integrating `acc_token_per_share` against `total_staked`. Shared by the
	/// base and boost accumulators; they are structurally identical (spec §4.1).
	fn update_periods(
		validator: ValidatorId,
		count: u32,
		total_staked: Balance,
		now: Moment,
		get: impl Fn(ValidatorId, u32) -> RewardPeriod,
		set: impl Fn(ValidatorId, u32, RewardPeriod),
	) {
		for i in 0..count {
			let mut period = get(validator, i);
			if now < period.start_time || period.last_reward_time >= now {
				continue;
			}
			if period.is_active {
				if total_staked > 0 {
					let duration = period.end_time.saturating_sub(period.start_time);
					let rate = if duration > 0 { period.total_reward / duration } else { 0 };
					let elapsed = Self::multiplier(period.last_reward_time, now, period.end_time);
					let lrds_reward = (elapsed as Balance).saturating_mul(rate);
					period.acc_token_per_share =
						period.acc_token_per_share.saturating_add(mul_div(lrds_reward, crml_support::PRECISION, total_staked));
				}
			}
			if now >= period.end_time {
				period.is_active = false;
				period.last_reward_time = period.end_time;
			} else {
				period.last_reward_time = now;
			}
			set(validator, i, period);
		}
	}

	fn update_validator(validator: ValidatorId) {
		let total_staked = Self::validator_state(validator).map(|v| v.total_staked).unwrap_or(0);
		let now = Self::now();
		Self::update_periods(
			validator,
			Self::reward_period_count(validator),
			total_staked,
			now,
			|v, i| RewardPeriods::get(v, i),
			|v, i, p| RewardPeriods::insert(v, i, p),
		);
	}

	fn update_boost(validator: ValidatorId) {
		let total_staked = Self::validator_state(validator).map(|v| v.total_staked).unwrap_or(0);
		let now = Self::now();
		Self::update_periods(
			validator,
			Self::boost_reward_count(validator),
			total_staked,
			now,
			|v, i| BoostRewards::get(v, i),
			|v, i, p| BoostRewards::insert(v, i, p),
		);
	}

	/// `Σ_i (amount · acc_i) / PRECISION` over periods whose start has passed. Used both to
	/// compute pending reward (minus the stored debt) and to rewrite the debt after paying out.
	fn accrued_base(validator: ValidatorId, amount: Balance) -> Balance {
		let now = Self::now();
		(0..Self::reward_period_count(validator))
			.map(|i| RewardPeriods::get(validator, i))
			.filter(|p| now >= p.start_time)
			.fold(0u128, |acc, p| acc.saturating_add(mul_div_precision(amount, p.acc_token_per_share)))
	}

	fn accrued_boost(validator: ValidatorId, amount: Balance) -> Balance {
		let now = Self::now();
		(0..Self::boost_reward_count(validator))
			.map(|i| BoostRewards::get(validator, i))
			.filter(|p| now >= p.start_time)
			.fold(0u128, |acc, p| acc.saturating_add(mul_div_precision(amount, p.acc_token_per_share)))
	}

	/// Settle both accumulators against `user`, paying out any pending base/boost reward and
	/// rewriting `reward_debt`/`boost_debt`. Used by the public `claim` call and internally by
	/// `do_deposit` to flush stale debt before a principal change (spec §4.1, §5 ordering).
	fn do_claim(validator: ValidatorId, who: &T::AccountId, user: &mut UserInfo) -> DispatchResult {
		Self::update_validator(validator);
		Self::update_boost(validator);

		let vstate = Self::validator_state(validator).ok_or(Error::<T>::NotValidValidator)?;

		let accrued = Self::accrued_base(validator, user.amount);
		let pending = accrued.saturating_sub(user.reward_debt);
		if pending > 0 {
			let fee = mul_div(pending, vstate.claim_fee_bps as Balance, FEE_DENOMINATOR as Balance);
			let net = pending.saturating_sub(fee);
			T::TokenLedger::transfer(who, net)?;
			if fee > 0 {
				T::TokenLedger::transfer(&vstate.owner, fee)?;
			}
			Self::deposit_event(Event::<T>::Claim(who.clone(), net, fee));
		}
		user.reward_debt = accrued;

		let boost_accrued = Self::accrued_boost(validator, user.amount);
		let boost_pending = boost_accrued.saturating_sub(user.boost_debt);
		if boost_pending > 0 {
			T::TokenLedger::transfer(who, boost_pending)?;
			Self::deposit_event(Event::<T>::BoostRewardClaimed(who.clone(), boost_pending));
		}
		user.boost_debt = boost_accrued;

		Ok(())
	}

	/// The single mutation path behind `create_lock` / `increase_amount` / `extend_duration` /
	/// `stake_for`. Order is load-bearing (spec §5): update accumulators, settle stale debt,
	/// move principal, rewrite counters and debts, then the lock bounds.
	fn do_deposit(
		validator: ValidatorId,
		amount: Balance,
		duration: Moment,
		who: &T::AccountId,
		from_boost: bool,
	) -> DispatchResult {
		Self::update_validator(validator);
		Self::update_boost(validator);

		let mut user = Self::user_info(validator, who);
		let mut vstate = Self::validator_state(validator).ok_or(Error::<T>::NotValidValidator)?;

		if amount > 0 {
			if user.amount > 0 {
				Self::do_claim(validator, who, &mut user)?;
			}

			let net = if from_boost {
				amount
			} else {
				let fee = mul_div(amount, vstate.deposit_fee_bps as Balance, FEE_DENOMINATOR as Balance);
				let net = amount.saturating_sub(fee);
				ensure!(net > 0, Error::<T>::ZeroAmount);
				T::TokenLedger::transfer_from(who, &Self::account_id(), net)?;
				if fee > 0 {
					T::TokenLedger::transfer_from(who, &Self::account_id(), fee)?;
					FeeVaultBalance::mutate(validator, |b| *b = b.saturating_add(fee));
				}
				net
			};

			user.amount = user.amount.saturating_add(net);
			vstate.total_staked = vstate.total_staked.saturating_add(net);
			T::Factory::add_total_staked_amount(net)?;

			user.reward_debt = Self::accrued_base(validator, user.amount);
			user.boost_debt = Self::accrued_boost(validator, user.amount);
		}

		if duration > 0 {
			let now = Self::now();
			if amount > 0 {
				user.lock_start_time = now;
				user.lock_end_time = now.saturating_add(duration);
			} else {
				let base = if now < user.lock_end_time { user.lock_end_time } else { now };
				user.lock_end_time = base.saturating_add(duration);
			}
		}

		ValidatorStates::<T>::insert(validator, vstate);
		UserInfos::<T>::insert(validator, who, user);
		Ok(())
	}
}

impl<T: Config> ValidatorHandle<T::AccountId> for Module<T> {
	fn init_validator(
		id: ValidatorId,
		owner: T::AccountId,
		verifier: T::AccountId,
		quality: Quality,
	) -> DispatchResult {
		ValidatorStates::<T>::insert(
			id,
			ValidatorState {
				owner,
				verifier,
				deposit_fee_bps: 0,
				claim_fee_bps: 0,
				is_paused: false,
				is_claimed: quality == 1,
				total_staked: 0,
			},
		);
		Ok(())
	}

	fn stake_for(who: &T::AccountId, amount: Balance) -> DispatchResult {
		let id = Self::master_validator_id().ok_or(Error::<T>::NotValidValidator)?;
		Self::do_deposit(id, amount, 0, who, true)
	}

	fn add_boost_reward(validator: ValidatorId, start: Moment, end: Moment, total_reward: Balance) -> DispatchResult {
		ensure!(ValidatorStates::<T>::contains_key(validator), Error::<T>::NotValidValidator);
		let idx = Self::boost_reward_count(validator);
		BoostRewards::insert(validator, idx, RewardPeriod::new(start, end, total_reward));
		BoostRewardCount::insert(validator, idx + 1);
		Self::deposit_event(Event::<T>::BoostRewardAdded(start, end, total_reward));
		Ok(())
	}

	fn is_claimed(validator: ValidatorId) -> bool {
		Self::validator_state(validator).map(|v| v.is_claimed).unwrap_or(false)
	}

	fn ve_balance(who: &T::AccountId) -> Balance {
		let id = match Self::master_validator_id() {
			Some(id) => id,
			None => return 0,
		};
		let user = Self::user_info(id, who);
		if user.amount == 0 {
			return 0;
		}
		let now = Self::now();
		let max_lock = T::MaxLock::get();
		let effective_end = if user.auto_max { now.saturating_add(max_lock) } else { user.lock_end_time };
		if now >= effective_end {
			return 0;
		}
		mul_div(user.amount, effective_end - now, max_lock)
	}

	fn amount_and_auto_max(who: &T::AccountId) -> (Balance, bool) {
		match Self::master_validator_id() {
			Some(id) => {
				let user = Self::user_info(id, who);
				(user.amount, user.auto_max)
			}
			None => (0, false),
		}
	}

	fn have_purchased(who: &T::AccountId, quality: Quality) -> bool {
		HavePurchased::<T>::get(who, quality)
	}

	fn player_validator_cost(who: &T::AccountId) -> Balance {
		Self::player_validator_cost(who)
	}

	fn validator_stats(validator: ValidatorId) -> Option<ValidatorStats<T::AccountId>> {
		Self::validator_state(validator).map(|v| ValidatorStats {
			owner: v.owner,
			total_staked: v.total_staked,
			deposit_fee_bps: v.deposit_fee_bps,
			claim_fee_bps: v.claim_fee_bps,
			is_paused: v.is_paused,
			is_claimed: v.is_claimed,
		})
	}

	fn boost_stats(validator: ValidatorId) -> BoostStats {
		let count = Self::boost_reward_count(validator);
		let total_boost_reward = (0..count)
			.map(|i| BoostRewards::get(validator, i).total_reward)
			.fold(0u128, |acc, r| acc.saturating_add(r));
		BoostStats { boost_period_count: count, total_boost_reward }
	}

	fn user_stats(validator: ValidatorId, who: &T::AccountId) -> UserStats {
		let user = Self::user_info(validator, who);
		UserStats {
			amount: user.amount,
			lock_start_time: user.lock_start_time,
			lock_end_time: user.lock_end_time,
			auto_max: user.auto_max,
			reward_debt: user.reward_debt,
			boost_debt: user.boost_debt,
		}
	}

	fn pool_account() -> T::AccountId {
		Self::account_id()
	}
}
