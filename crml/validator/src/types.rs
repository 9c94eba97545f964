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

use codec::{Decode, Encode};
use crml_support::{Balance, Moment};
use scale_info::TypeInfo;

/// An admin-scheduled, linearly-released reward window. Append-only per validator.
#[derive(Clone, Copy, Encode, Decode, Eq, PartialEq, Default, TypeInfo)]
pub struct RewardPeriod {
	pub start_time: Moment,
	pub end_time: Moment,
	pub total_reward: Balance,
	/// Running sum of rewards-per-unit-stake, scaled by `PRECISION`.
	pub acc_token_per_share: Balance,
	pub last_reward_time: Moment,
	pub is_active: bool,
}

impl RewardPeriod {
	pub fn new(start_time: Moment, end_time: Moment, total_reward: Balance) -> Self {
		RewardPeriod {
			start_time,
			end_time,
			total_reward,
			acc_token_per_share: 0,
			last_reward_time: start_time,
			is_active: true,
		}
	}
}

/// Governance-funded top-up reward window. Identical shape and update rule to `RewardPeriod`,
/// but opened by `add_boost_reward` instead of admin scheduling.
pub type BoostReward = RewardPeriod;

/// Per-validator, per-user staking position.
#[derive(Clone, Copy, Encode, Decode, Eq, PartialEq, Default, TypeInfo)]
pub struct UserInfo {
	pub amount: Balance,
	pub lock_start_time: Moment,
	pub lock_end_time: Moment,
	/// Portion of `Σ(amount·acc)` already accounted for against the base reward periods.
	pub reward_debt: Balance,
	/// Portion of `Σ(amount·acc)` already accounted for against the boost reward periods.
	pub boost_debt: Balance,
	pub auto_max: bool,
}

impl UserInfo {
	pub fn is_empty(&self) -> bool {
		self.amount == 0 && self.lock_start_time == 0
	}
}

/// Live, purchase-mutable state of a validator instance. The immutable creation-time record
/// (quality, creation owner) lives in `crml-factory::ValidatorMeta`; this is what changes
/// after creation: current owner, fee schedule, pause flag and purchase-claim status.
#[derive(Clone, Encode, Decode, Eq, PartialEq, TypeInfo)]
pub struct ValidatorState<AccountId> {
	pub owner: AccountId,
	pub verifier: AccountId,
	/// Deposit fee in basis points of 10,000, capped at `DEPOSIT_MAX_FEE`.
	pub deposit_fee_bps: u32,
	/// Claim fee in basis points of 10,000, capped at `CLAIM_MAX_FEE`.
	pub claim_fee_bps: u32,
	pub is_paused: bool,
	/// `true` once `purchase_validator` has succeeded for this instance (always `true` for the
	/// master, which has no purchase gate).
	pub is_claimed: bool,
	pub total_staked: Balance,
}
