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

//! # Factory
//!
//! Deterministic creation and registration of validator instances, keyed by
//! `(quality, owner, id)`, plus the aggregate counters (`total_staked_amount`,
//! `total_staked_wallets`) that every validator instance feeds into.

#[cfg(test)]
mod mock;
mod types;
pub use types::*;

use crml_support::{Balance, BoostStats, FactoryHandle, Quality, UserStats, ValidatorHandle, ValidatorId, ValidatorStats};
use frame_support::{decl_error, decl_event, decl_module, decl_storage, ensure};
use frame_system::{ensure_root, pallet_prelude::*};
use sp_std::prelude::*;

pub trait Config: frame_system::Config {
	/// The system event type.
	type Event: From<Event<Self>> + Into<<Self as frame_system::Config>::Event>;
	/// Brings a freshly assigned validator id to life in `crml-validator`'s own storage.
	type Validator: ValidatorHandle<Self::AccountId>;
}

decl_event! {
	pub enum Event<T> where AccountId = <T as frame_system::Config>::AccountId {
		/// A new validator was registered (owner, validator id, new total count).
		ValidatorCreated(AccountId, ValidatorId, u32),
		/// A factory-wide aggregate reward period was recorded.
		TotalValidatorsRewardAdded(crml_support::Moment, crml_support::Moment, Balance),
	}
}

decl_error! {
	pub enum Error for Module<T: Config> {
		/// Only a registered validator may mutate the aggregate counters.
		NotRegisteredValidator,
		/// Subtracting would underflow the global staked-amount counter.
		NotEnoughAmount,
		/// Subtracting would underflow the global staked-wallet counter.
		NotEnoughWallet,
		/// `end_time` must be strictly after `start_time`.
		InvalidTimePeriod,
		/// Requested page is beyond the end of the validator list.
		PageOutOfBounds,
	}
}

decl_storage! {
	trait Store for Module<T: Config> as Factory {
		/// Next id to hand out; equals `allValidators.len()`.
		pub NextValidatorId get(fn next_validator_id): ValidatorId;
		/// Registry record for every validator this factory has created.
		pub ValidatorMetas get(fn validator_meta):
			map hasher(twox_64_concat) ValidatorId => Option<ValidatorMeta<T::AccountId>>;
		/// Validator ids in creation order; the canonical enumeration for pagination and
		/// boost-proposal snapshots.
		pub AllValidators get(fn all_validators_storage): Vec<ValidatorId>;
		/// How many validators of each quality tier have been created so far.
		pub NodeCounts get(fn node_count): map hasher(twox_64_concat) Quality => u32;
		/// Minimum whole-token lock amount (unscaled by `MULTIPLIER`) required to purchase a
		/// validator of a given quality.
		pub MinAmountForQuality get(fn min_amount_for_quality): map hasher(twox_64_concat) Quality => Balance;
		/// Global sum of `UserInfo.amount` across every validator (spec invariant I1, factory-wide).
		pub TotalStakedAmount get(fn total_staked_amount): Balance;
		/// Global count of wallets with a non-zero lock across every validator.
		pub TotalStakedWallets get(fn total_staked_wallets): u32;
		/// Aggregate, dashboard-only reward periods recorded by `add_total_validators`.
		pub AggregateRewardPeriods get(fn aggregate_reward_periods): Vec<AggregateRewardPeriod>;
	}
	add_extra_genesis {
		build(|_config| {
			// Defaults per spec §3: {3:400, 4:1000, 5:3000, 6:5000, 7:10000} whole tokens.
			for (quality, amount) in [(3u8, 400u128), (4, 1_000), (5, 3_000), (6, 5_000), (7, 10_000)].iter() {
				MinAmountForQuality::insert(quality, amount);
			}
		});
	}
}

decl_module! {
	pub struct Module<T: Config> for enum Call where origin: T::Origin {
		type Error = Error<T>;

		fn deposit_event() = default;

		/// Register a new validator instance. Admin-only; the id is `allValidators.len()` at
		/// the time of the call, so creation order is the deterministic identity the spec
		/// substitutes for bit-identical clone bytecode (see SPEC_FULL.md §4).
		#[weight = 10_000]
		pub fn create_validator(
			origin,
			token: T::AccountId,
			owner: T::AccountId,
			quality: Quality,
			verifier: T::AccountId,
		) {
			ensure_root(origin)?;
			let id = Self::next_validator_id();
			let quality_sequence = Self::node_count(quality) + 1;

			ValidatorMetas::<T>::insert(
				id,
				ValidatorMeta { token, owner: owner.clone(), quality, verifier: verifier.clone(), quality_sequence },
			);
			AllValidators::mutate(|v| v.push(id));
			NodeCounts::insert(quality, quality_sequence);
			NextValidatorId::put(id + 1);

			T::Validator::init_validator(id, owner.clone(), verifier, quality)?;

			Self::deposit_event(Event::<T>::ValidatorCreated(owner, id, id + 1));
		}

		/// Append a factory-wide aggregate reward period, used only for reporting dashboards.
		#[weight = 10_000]
		pub fn add_total_validators(origin, start_time: crml_support::Moment, end_time: crml_support::Moment, total_reward: Balance) {
			ensure_root(origin)?;
			ensure!(end_time > start_time, Error::<T>::InvalidTimePeriod);
			AggregateRewardPeriods::mutate(|v| v.push(AggregateRewardPeriod { start_time, end_time, total_reward }));
			Self::deposit_event(Event::<T>::TotalValidatorsRewardAdded(start_time, end_time, total_reward));
		}

		/// Update the minimum lock amount required to purchase a given quality tier.
		#[weight = 10_000]
		pub fn set_min_amount_for_quality(origin, quality: Quality, amount: Balance) {
			ensure_root(origin)?;
			MinAmountForQuality::insert(quality, amount);
		}
	}
}

impl<T: Config> Module<T> {
	/// Paginated view combining this factory's registry with per-validator data supplied by
	/// the caller (`crml-validator`, which owns `UserStats`/`BoostStats`); this pallet only
	/// knows how to slice `AllValidators` and look up `ValidatorMeta`.
	pub fn page_validator_ids(page_index: u32, page_size: u32) -> Result<Vec<ValidatorId>, Error<T>> {
		let all = Self::all_validators_storage();
		let start = (page_index as usize).saturating_mul(page_size as usize);
		ensure!(start < all.len(), Error::<T>::PageOutOfBounds);
		let end = start.saturating_add(page_size as usize).min(all.len());
		Ok(all[start.min(all.len())..end].to_vec())
	}

	/// Three aligned, per-validator-id arrays of `ValidatorStats`/`BoostStats`/`UserStats` for
	/// `user`, one page of `AllValidators` at a time (spec §4.2
	/// `get_all_validator_data(user, page_index, page_size)`). Composed here, across the
	/// `ValidatorHandle` capability boundary, rather than by a downstream runtime layer: this
	/// pallet owns the registry/pagination half of the view and `crml-validator` owns the
	/// per-id stats half, and `ValidatorHandle` is exactly the seam spec §9 "cyclic references"
	/// describes for crossing it.
	pub fn get_all_validator_data(
		user: T::AccountId,
		page_index: u32,
		page_size: u32,
	) -> Result<(Vec<ValidatorStats<T::AccountId>>, Vec<BoostStats>, Vec<UserStats>), Error<T>> {
		let ids = Self::page_validator_ids(page_index, page_size)?;
		let mut validator_stats = Vec::with_capacity(ids.len());
		let mut boost_stats = Vec::with_capacity(ids.len());
		let mut user_stats = Vec::with_capacity(ids.len());
		for id in ids {
			validator_stats.push(T::Validator::validator_stats(id).unwrap_or_default());
			boost_stats.push(T::Validator::boost_stats(id));
			user_stats.push(T::Validator::user_stats(id, &user));
		}
		Ok((validator_stats, boost_stats, user_stats))
	}
}

impl<T: Config> FactoryHandle<T::AccountId> for Module<T> {
	fn add_total_staked_amount(amount: Balance) -> Result<(), sp_runtime::DispatchError> {
		TotalStakedAmount::mutate(|a| *a = a.saturating_add(amount));
		Ok(())
	}

	fn sub_total_staked_amount(amount: Balance) -> Result<(), sp_runtime::DispatchError> {
		let current = Self::total_staked_amount();
		ensure!(current >= amount, Error::<T>::NotEnoughAmount);
		TotalStakedAmount::put(current - amount);
		Ok(())
	}

	fn add_total_staked_wallet() -> Result<(), sp_runtime::DispatchError> {
		TotalStakedWallets::mutate(|w| *w = w.saturating_add(1));
		Ok(())
	}

	fn sub_total_staked_wallet() -> Result<(), sp_runtime::DispatchError> {
		let current = Self::total_staked_wallets();
		ensure!(current >= 1, Error::<T>::NotEnoughWallet);
		TotalStakedWallets::put(current - 1);
		Ok(())
	}

	fn is_registered(id: ValidatorId) -> bool {
		ValidatorMetas::<T>::contains_key(id)
	}

	fn quality_of(id: ValidatorId) -> Option<Quality> {
		Self::validator_meta(id).map(|m| m.quality)
	}

	fn owner_of(id: ValidatorId) -> Option<T::AccountId> {
		Self::validator_meta(id).map(|m| m.owner)
	}

	fn min_amount_for_quality(quality: Quality) -> Balance {
		Self::min_amount_for_quality(quality)
	}

	fn all_validators() -> Vec<ValidatorId> {
		Self::all_validators_storage()
	}
}
