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
use crml_support::{Balance, Moment, ValidatorId};
use scale_info::TypeInfo;
use sp_std::prelude::*;

/// Lifecycle status of a proposal. Terminal on `Executed`/`Cancelled`; status may not revert
/// (spec §3 "Lifecycle").
#[derive(Clone, Copy, Encode, Decode, Eq, PartialEq, Debug, TypeInfo)]
pub enum ProposalStatus {
	Pending,
	Executed,
	Cancelled,
}

impl Default for ProposalStatus {
	fn default() -> Self {
		ProposalStatus::Pending
	}
}

/// A governance proposal, regular or boost (spec §3 "Proposal").
#[derive(Clone, Encode, Decode, Eq, PartialEq, Default, TypeInfo)]
pub struct ProposalInfo {
	pub start_time: Moment,
	pub end_time: Moment,
	pub metadata_uri: Vec<u8>,
	/// Number of valid choices for a regular proposal; ignored for boost proposals, which
	/// instead bound `choice_id` by the snapshot `validators` list on `BoostProposalInfo`.
	pub total_choices: u32,
	pub status: ProposalStatus,
	pub is_boost: bool,
}

/// The boost-specific fields and validator snapshot of a boost proposal (spec §3
/// "BoostProposal"). Only present when the owning `ProposalInfo::is_boost` is `true`.
#[derive(Clone, Encode, Decode, Eq, PartialEq, Default, TypeInfo)]
pub struct BoostProposalInfo {
	/// Remaining undistributed boost pool; zeroed by `add_boost_reward` to prevent double
	/// distribution (spec §4.3).
	pub boost_reward: Balance,
	pub boost_start_time: Moment,
	pub boost_end_time: Moment,
	/// Validator ids captured at creation time, restricted to those with `is_claimed == true`
	/// (spec §3). `choice_id` in a vote on this proposal indexes into this list.
	pub validators: Vec<ValidatorId>,
}
