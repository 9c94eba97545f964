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
use crml_support::{Balance, Moment, Quality};
use scale_info::TypeInfo;

/// The registry record created once by the factory for each validator instance. Immutable
/// after creation; `crml-validator` tracks the live, purchase-mutable owner separately.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Default, TypeInfo)]
pub struct ValidatorMeta<AccountId> {
	/// Token ledger identifier this validator pays rewards in (opaque to the core engine).
	pub token: AccountId,
	/// The account the validator was created for.
	pub owner: AccountId,
	/// Quality tier, 1..=7.
	pub quality: Quality,
	/// The account whose signature authorizes `purchase_validator` on this instance.
	pub verifier: AccountId,
	/// 1-based position of this validator among others of the same quality, at creation time.
	pub quality_sequence: u32,
}

/// An aggregate, factory-wide reward period used only for dashboard-style reporting
/// (`add_total_validators`); it does not feed any per-validator accumulator.
#[derive(Clone, Copy, Encode, Decode, Eq, PartialEq, Default, TypeInfo)]
pub struct AggregateRewardPeriod {
	pub start_time: Moment,
	pub end_time: Moment,
	pub total_reward: Balance,
}

