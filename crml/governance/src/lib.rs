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

//! # Governance
//!
//! Proposal and boost-proposal lifecycle, vote accounting bounded by the master validator's
//! `veBalance`, proportional boost distribution to validators, and the claim-and-restake flow
//! that turns a vote reward back into a master-validator lock (spec §4.3).

#[cfg(test)]
mod mock;
mod types;
pub use types::*;

use crml_support::{
	mul_div, Balance, FactoryHandle, GovernanceHandle, Moment, ProposalId, TokenLedger, ValidatorHandle, ValidatorId,
};
use frame_support::{decl_error, decl_event, decl_module, decl_storage, ensure, traits::UnixTime};
use frame_system::{ensure_root, ensure_signed, pallet_prelude::*};
use log::warn;
use sp_std::prelude::*;

pub trait Config: frame_system::Config {
	/// The system event type.
	type Event: From<Event<Self>> + Into<<Self as frame_system::Config>::Event>;
	/// Source of `now`, the abstract Clock of spec §2.
	type UnixTime: UnixTime;
	/// The external token ledger; governance pays vote/boost rewards through it (spec §4.3).
	type TokenLedger: TokenLedger<Self::AccountId>;
	/// The master validator and, generically, every validator a boost proposal may target.
	type Validator: ValidatorHandle<Self::AccountId>;
	/// The factory registry, for the full validator enumeration a boost proposal snapshots.
	type Factory: FactoryHandle<Self::AccountId>;
}

decl_event! {
	pub enum Event<T> where AccountId = <T as frame_system::Config>::AccountId {
		/// A regular proposal was created.
		ProposalCreated(ProposalId),
		/// A boost proposal was created, with its claimed-validator snapshot size.
		BoostProposalCreated(ProposalId, u32),
		/// A user cast a vote (user, proposal, choice, stake weight committed).
		Voted(AccountId, ProposalId, u32, Balance),
		/// Admin set a vote reward pool on a proposal.
		VoteRewardSet(ProposalId, Balance),
		/// A proposal's vote reward distribution was opened for claims.
		RewardDistributionExecuted(ProposalId),
		/// A user claimed their proportional vote reward, restaked into the master validator.
		RewardsClaimedAndLocked(AccountId, ProposalId, Balance),
		/// Governance funded a validator's boost reward pool.
		BoostRewardTransferred(ValidatorId, Balance),
		/// A boost proposal's pool was fully distributed across its snapshot validators.
		BoostRewardDistributed(ProposalId, Balance),
		/// A regular proposal was cancelled before receiving any votes.
		ProposalCancelled(ProposalId),
		/// A boost proposal was cancelled before receiving any votes.
		BoostProposalCancelled(ProposalId),
	}
}

decl_error! {
	pub enum Error for Module<T: Config> {
		/// No proposal is recorded under this id.
		NoSuchProposal,
		/// `end_time` must be strictly after `start_time`, and creation must be forward-looking.
		WrongTime,
		/// Boost window ordering violated: `end_time < boost_start_time < boost_end_time`.
		WrongBoostTime,
		/// Vote `weight` must be in `[1, 100]`.
		InvalidWeight,
		/// `choice_id` is out of range for this proposal.
		NoSuchOption,
		/// The caller has already voted on this proposal.
		UserIsVoted,
		/// The caller never voted on this proposal.
		UserIsNotVoted,
		/// The caller's `veBalance` is zero; nothing to vote with.
		ZeroVelrds,
		/// The caller has already committed `veBalance` worth of votes elsewhere.
		ExceedsAvailableWeight,
		/// Voting window is not currently open, or the proposal is not `Pending`.
		VotingNotOpen,
		/// The proposal is not in the status this operation requires.
		WrongStatus,
		/// `cancel_proposal` called on a proposal that already has staked votes.
		ProposalHasStakedVotes,
		/// The caller already claimed their vote reward for this proposal.
		RewardAlreadyClaimed,
		/// `add_boost_reward` called outside `(end_time, boost_start_time]`.
		RewardDistributionNotAllowed,
		/// A boost proposal received no votes at all; nothing to distribute.
		NoVotes,
		/// An amount argument that must be non-zero was zero.
		ZeroAmount,
	}
}

decl_storage! {
	trait Store for Module<T: Config> as Governance {
		/// Next id to hand out to a new proposal.
		pub NextProposalId get(fn next_proposal_id): ProposalId;
		/// Every proposal ever created, regular or boost.
		pub Proposals get(fn proposal): map hasher(twox_64_concat) ProposalId => Option<ProposalInfo>;
		/// The boost-specific fields of a boost proposal; present iff `Proposals[id].is_boost`.
		pub BoostProposals get(fn boost_proposal): map hasher(twox_64_concat) ProposalId => Option<BoostProposalInfo>;
		/// Admin-set vote reward pool for a proposal, paid out pro-rata via `claim_and_lock`.
		pub VoteReward get(fn vote_reward): map hasher(twox_64_concat) ProposalId => Balance;
		/// Accumulated stake weight per `(proposal, choice)`.
		pub OptionVotes get(fn option_votes):
			double_map hasher(twox_64_concat) ProposalId, hasher(twox_64_concat) u32 => Balance;
		/// Total stake weight committed to a proposal across all choices.
		pub ProposalTotalVotes get(fn proposal_total_votes): map hasher(twox_64_concat) ProposalId => Balance;
		/// `true` once `who` has voted on `id` (a user may vote exactly once per proposal).
		pub VotedStatus get(fn voted_status):
			double_map hasher(twox_64_concat) ProposalId, hasher(blake2_128_concat) T::AccountId => bool;
		/// The stake weight `who` committed to `id` (their chosen option's share).
		pub ProposalUserTotalVotes get(fn proposal_user_total_votes):
			double_map hasher(twox_64_concat) ProposalId, hasher(blake2_128_concat) T::AccountId => Balance;
		/// `who`'s total committed vote weight across every open proposal; bounded by
		/// `veBalance` (spec invariant I5), zeroed by `GovernanceHandle::reset_votes`.
		pub UserTotalVotes get(fn user_total_votes): map hasher(blake2_128_concat) T::AccountId => Balance;
		/// `true` once `who` has pulled their vote reward for `id`.
		pub ClaimedVoteReward get(fn claimed_vote_reward):
			double_map hasher(twox_64_concat) ProposalId, hasher(blake2_128_concat) T::AccountId => bool;
	}
}

decl_module! {
	pub struct Module<T: Config> for enum Call where origin: T::Origin {
		type Error = Error<T>;

		fn deposit_event() = default;

		/// Admin: open a regular proposal with `total_choices` options.
		#[weight = 10_000]
		pub fn create_proposal(origin, start_time: Moment, end_time: Moment, metadata_uri: Vec<u8>, total_choices: u32) {
			ensure_root(origin)?;
			ensure!(start_time < end_time && Self::now() <= start_time, Error::<T>::WrongTime);

			let id = Self::next_proposal_id();
			Proposals::insert(id, ProposalInfo { start_time, end_time, metadata_uri, total_choices, status: ProposalStatus::Pending, is_boost: false });
			NextProposalId::put(id + 1);
			Self::deposit_event(Event::<T>::ProposalCreated(id));
		}

		/// Admin: open a boost proposal, snapshotting the currently claimed validators as its
		/// choice list.
		#[weight = 10_000]
		pub fn create_boost_proposal(
			origin,
			start_time: Moment,
			end_time: Moment,
			metadata_uri: Vec<u8>,
			boost_reward: Balance,
			boost_start_time: Moment,
			boost_end_time: Moment,
		) {
			ensure_root(origin)?;
			ensure!(start_time < end_time && Self::now() <= start_time, Error::<T>::WrongTime);
			ensure!(end_time < boost_start_time, Error::<T>::WrongBoostTime);
			ensure!(boost_start_time < boost_end_time, Error::<T>::WrongBoostTime);
			ensure!(boost_reward > 0, Error::<T>::ZeroAmount);

			let validators: Vec<ValidatorId> =
				T::Factory::all_validators().into_iter().filter(|v| T::Validator::is_claimed(*v)).collect();

			let id = Self::next_proposal_id();
			let total_choices = validators.len() as u32;
			Proposals::insert(id, ProposalInfo { start_time, end_time, metadata_uri, total_choices, status: ProposalStatus::Pending, is_boost: true });
			BoostProposals::insert(id, BoostProposalInfo { boost_reward, boost_start_time, boost_end_time, validators });
			NextProposalId::put(id + 1);
			Self::deposit_event(Event::<T>::BoostProposalCreated(id, total_choices));
		}

		/// Cast a vote weighted `weight` percent of the caller's remaining unspent `veBalance`
		/// onto `choice_id` of proposal `id`. A user may vote on a given proposal exactly once.
		#[weight = 10_000]
		pub fn vote(origin, id: ProposalId, choice_id: u32, weight: u8) {
			let who = ensure_signed(origin)?;
			ensure!(weight >= 1 && weight <= 100, Error::<T>::InvalidWeight);
			ensure!(!Self::voted_status(id, &who), Error::<T>::UserIsVoted);

			let proposal = Self::proposal(id).ok_or(Error::<T>::NoSuchProposal)?;
			let now = Self::now();
			ensure!(now >= proposal.start_time && now <= proposal.end_time, Error::<T>::VotingNotOpen);
			ensure!(proposal.status == ProposalStatus::Pending, Error::<T>::WrongStatus);

			if proposal.is_boost {
				let bp = Self::boost_proposal(id).ok_or(Error::<T>::NoSuchProposal)?;
				ensure!((choice_id as usize) < bp.validators.len(), Error::<T>::NoSuchOption);
			} else {
				ensure!(choice_id < proposal.total_choices, Error::<T>::NoSuchOption);
			}

			let ve_balance = T::Validator::ve_balance(&who);
			ensure!(ve_balance > 0, Error::<T>::ZeroVelrds);
			let already_committed = Self::user_total_votes(&who);
			ensure!(already_committed <= ve_balance, Error::<T>::ExceedsAvailableWeight);

			let stake_weight = mul_div(ve_balance - already_committed, weight as Balance, 100);

			OptionVotes::mutate(id, choice_id, |v| *v = v.saturating_add(stake_weight));
			ProposalTotalVotes::mutate(id, |v| *v = v.saturating_add(stake_weight));
			UserTotalVotes::<T>::mutate(&who, |v| *v = v.saturating_add(stake_weight));
			ProposalUserTotalVotes::<T>::insert(id, &who, stake_weight);
			VotedStatus::<T>::insert(id, &who, true);

			Self::deposit_event(Event::<T>::Voted(who, id, choice_id, stake_weight));
		}

		/// Admin: set (or replace) the vote reward pool available to claim on proposal `id`.
		#[weight = 10_000]
		pub fn set_vote_reward(origin, id: ProposalId, amount: Balance) {
			ensure_root(origin)?;
			ensure!(amount > 0, Error::<T>::ZeroAmount);
			ensure!(Proposals::contains_key(id), Error::<T>::NoSuchProposal);
			VoteReward::insert(id, amount);
			Self::deposit_event(Event::<T>::VoteRewardSet(id, amount));
		}

		/// Admin: after voting closes, mark the proposal `Executed` so `claim_and_lock` can pay
		/// voters pull-based from its vote reward pool.
		#[weight = 10_000]
		pub fn execute_vote_reward_proposal(origin, id: ProposalId) {
			ensure_root(origin)?;
			let mut proposal = Self::proposal(id).ok_or(Error::<T>::NoSuchProposal)?;
			ensure!(Self::now() > proposal.end_time, Error::<T>::WrongTime);
			ensure!(proposal.status == ProposalStatus::Pending, Error::<T>::WrongStatus);
			ensure!(Self::vote_reward(id) > 0, Error::<T>::ZeroAmount);

			proposal.status = ProposalStatus::Executed;
			Proposals::insert(id, proposal);
			Self::deposit_event(Event::<T>::RewardDistributionExecuted(id));
		}

		/// Pull this caller's proportional share of `id`'s vote reward and restake it into the
		/// master validator via `stake_for` (spec §4.3 "claim-and-restake").
		#[weight = 10_000]
		pub fn claim_and_lock(origin, id: ProposalId) {
			let who = ensure_signed(origin)?;
			let proposal = Self::proposal(id).ok_or(Error::<T>::NoSuchProposal)?;
			ensure!(proposal.status == ProposalStatus::Executed, Error::<T>::WrongStatus);
			ensure!(Self::voted_status(id, &who), Error::<T>::UserIsNotVoted);
			ensure!(!Self::claimed_vote_reward(id, &who), Error::<T>::RewardAlreadyClaimed);

			let user_votes = Self::proposal_user_total_votes(id, &who);
			let total_votes = Self::proposal_total_votes(id);
			let reward = mul_div(user_votes, Self::vote_reward(id), total_votes);
			ensure!(reward > 0, Error::<T>::ZeroAmount);

			ClaimedVoteReward::<T>::insert(id, &who, true);
			T::TokenLedger::transfer(&T::Validator::pool_account(), reward)?;
			T::Validator::stake_for(&who, reward)?;

			Self::deposit_event(Event::<T>::RewardsClaimedAndLocked(who, id, reward));
		}

		/// Admin: distribute a boost proposal's pool across its snapshot validators in
		/// proportion to each validator's vote share. Callable once in the window
		/// `(end_time, boost_start_time]`; zeroes the pool afterwards to prevent double
		/// distribution. Integer-division dust is forgone, not an error (spec §5, §9).
		#[weight = 10_000]
		pub fn add_boost_reward(origin, id: ProposalId) {
			ensure_root(origin)?;
			let proposal = Self::proposal(id).ok_or(Error::<T>::NoSuchProposal)?;
			let bp = Self::boost_proposal(id).ok_or(Error::<T>::NoSuchProposal)?;
			let now = Self::now();
			ensure!(now >= proposal.end_time && now <= bp.boost_start_time, Error::<T>::RewardDistributionNotAllowed);

			let total_votes: Balance = (0..bp.validators.len() as u32).map(|c| Self::option_votes(id, c)).fold(0, |a, b| a.saturating_add(b));
			ensure!(total_votes > 0, Error::<T>::NoVotes);

			for (choice_id, validator) in bp.validators.iter().enumerate() {
				let votes = Self::option_votes(id, choice_id as u32);
				if votes == 0 {
					continue;
				}
				// The snapshot at proposal creation already filtered for `is_claimed`, but a
				// validator can still be un-claimed (e.g. re-purchased and reset) by the time
				// the boost window opens; skip it rather than failing the whole distribution.
				if !T::Validator::is_claimed(*validator) {
					warn!("boost proposal {} targets unclaimed validator {}, skipping its share", id, validator);
					continue;
				}
				let share = mul_div(votes, bp.boost_reward, total_votes);
				if share == 0 {
					continue;
				}
				T::TokenLedger::transfer(&T::Validator::pool_account(), share)?;
				T::Validator::add_boost_reward(*validator, bp.boost_start_time, bp.boost_end_time, share)?;
				Self::deposit_event(Event::<T>::BoostRewardTransferred(*validator, share));
			}

			BoostProposals::mutate(id, |maybe| {
				if let Some(b) = maybe {
					b.boost_reward = 0;
				}
			});
			Self::deposit_event(Event::<T>::BoostRewardDistributed(id, total_votes));
		}

		/// Admin: cancel a `Pending` proposal that has not yet received any votes.
		#[weight = 10_000]
		pub fn cancel_proposal(origin, id: ProposalId) {
			ensure_root(origin)?;
			let mut proposal = Self::proposal(id).ok_or(Error::<T>::NoSuchProposal)?;
			ensure!(proposal.status == ProposalStatus::Pending, Error::<T>::WrongStatus);
			ensure!(Self::proposal_total_votes(id) == 0, Error::<T>::ProposalHasStakedVotes);

			proposal.status = ProposalStatus::Cancelled;
			let is_boost = proposal.is_boost;
			Proposals::insert(id, proposal);
			if is_boost {
				Self::deposit_event(Event::<T>::BoostProposalCancelled(id));
			} else {
				Self::deposit_event(Event::<T>::ProposalCancelled(id));
			}
		}
	}
}

impl<T: Config> Module<T> {
	fn now() -> Moment {
		T::UnixTime::now().as_secs()
	}
}

impl<T: Config> GovernanceHandle<T::AccountId> for Module<T> {
	fn reset_votes(who: &T::AccountId) {
		UserTotalVotes::<T>::remove(who);
	}
}
